//! Persistent display names keyed by client identity
//!
//! The first time an identity is seen it is given a generated two-word name
//! such as "Teal Harbor". Later lookups, including ones from a reconnect,
//! return the stored name.

use crate::error::NameStoreError;
use log::debug;
use rand::seq::SliceRandom;
use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;

const COLORS: &[&str] = &[
    "black", "maroon", "green", "navy", "olive", "purple", "teal", "lime", "blue", "silver",
    "gray", "yellow", "fuchsia", "aqua", "white",
];

const WORDS: &[&str] = &[
    "anchor", "badger", "beacon", "canyon", "comet", "falcon", "harbor", "lantern", "meadow",
    "nebula", "orchid", "pebble", "quartz", "raven", "summit", "thistle", "tundra", "willow",
    "zephyr", "ember",
];

/// Storage for identity to display name mappings
pub trait NameStore: Send {
    /// Creates a record with a fresh name unless one already exists.
    fn ensure(&mut self, identity: &str) -> Result<(), NameStoreError>;

    /// Returns the stored name, or `NotFound` if `ensure` never ran.
    fn get_name(&self, identity: &str) -> Result<String, NameStoreError>;
}

/// Generates a "Color Word" display name, both parts title-cased
pub fn generate_display_name<R: Rng + ?Sized>(rng: &mut R) -> String {
    let color = COLORS.choose(rng).copied().unwrap_or("gray");
    let word = WORDS.choose(rng).copied().unwrap_or("meadow");
    format!("{} {}", title_case(color), title_case(word))
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// SQLite-backed store; survives restarts
pub struct SqliteNameStore {
    conn: Connection,
}

impl SqliteNameStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, NameStoreError> {
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, NameStoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, NameStoreError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (uuid TEXT NOT NULL PRIMARY KEY, name TEXT)",
            [],
        )?;
        Ok(Self { conn })
    }
}

impl NameStore for SqliteNameStore {
    fn ensure(&mut self, identity: &str) -> Result<(), NameStoreError> {
        let name = generate_display_name(&mut rand::thread_rng());
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO users (uuid, name) VALUES (?1, ?2)",
            params![identity, name],
        )?;
        if inserted > 0 {
            debug!("assigned name {:?} to {}", name, identity);
        }
        Ok(())
    }

    fn get_name(&self, identity: &str) -> Result<String, NameStoreError> {
        self.conn
            .query_row(
                "SELECT name FROM users WHERE uuid = ?1",
                params![identity],
                |row| row.get::<_, String>(0),
            )
            .optional()?
            .ok_or_else(|| NameStoreError::NotFound(identity.to_string()))
    }
}

/// Process-local store; names are forgotten on restart
#[derive(Debug, Default)]
pub struct MemoryNameStore {
    names: HashMap<String, String>,
}

impl MemoryNameStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NameStore for MemoryNameStore {
    fn ensure(&mut self, identity: &str) -> Result<(), NameStoreError> {
        self.names
            .entry(identity.to_string())
            .or_insert_with(|| generate_display_name(&mut rand::thread_rng()));
        Ok(())
    }

    fn get_name(&self, identity: &str) -> Result<String, NameStoreError> {
        self.names
            .get(identity)
            .cloned()
            .ok_or_else(|| NameStoreError::NotFound(identity.to_string()))
    }
}
