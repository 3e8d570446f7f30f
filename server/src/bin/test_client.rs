//! Terminal client for poking at a running lobby server.
//!
//! Joins with the given identity (or a random one) and turns each stdin line
//! into a request: `ready`, `unready`, `name`, `chat <text>`, `init`,
//! `cancel`, `start`. Every event from the server is printed as it arrives.

use clap::Parser;
use futures::{SinkExt, StreamExt};
use shared::{encode_join, encode_requests, Command};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server websocket URL
    #[arg(short, long, default_value = "ws://127.0.0.1:42069")]
    url: String,

    /// Identity to join with; a random v4 UUID when omitted
    #[arg(short, long)]
    identity: Option<String>,
}

const USAGE: &str = "ready | unready | name | chat <text> | init | cancel | start";

fn parse_line(line: &str) -> Option<Command> {
    let (word, rest) = match line.trim().split_once(' ') {
        Some((word, rest)) => (word, rest.trim()),
        None => (line.trim(), ""),
    };

    match word {
        "ready" => Some(Command::UpdateIsReady { ready: true }),
        "unready" => Some(Command::UpdateIsReady { ready: false }),
        "name" => Some(Command::GetUserName),
        "chat" if !rest.is_empty() => Some(Command::Chat {
            text: rest.to_string(),
        }),
        "init" => Some(Command::InitStartGame),
        "cancel" => Some(Command::CancelStartGame),
        "start" => Some(Command::StartGame),
        _ => None,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();
    let identity = args
        .identity
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    println!("Connecting to {} as {}", args.url, identity);
    let (websocket, _) = connect_async(args.url.as_str()).await?;
    let (mut sink, mut source) = websocket.split();

    sink.send(Message::text(encode_join(&identity))).await?;

    let printer = tokio::spawn(async move {
        while let Some(frame) = source.next().await {
            match frame {
                Ok(Message::Text(text)) => println!("<- {}", text.as_str()),
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    eprintln!("connection error: {}", e);
                    break;
                }
            }
        }
        println!("Disconnected");
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if printer.is_finished() {
            break;
        }
        match parse_line(&line) {
            Some(command) => sink.send(Message::text(encode_requests(&[command]))).await?,
            None => eprintln!("commands: {}", USAGE),
        }
    }

    sink.close().await?;
    let _ = printer.await;
    Ok(())
}
