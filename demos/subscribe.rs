//! Example subscriber: connects to a running depthcast instance and prints
//! the metrics, alert, and status payloads it pushes.
//!
//! Usage:
//!   cargo run --example subscribe -- --host 127.0.0.1 --port 9001

use anyhow::{Context, Result};
use clap::Parser;
use futures_util::StreamExt;
use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;

#[derive(Parser, Debug)]
#[command(name = "subscribe")]
#[command(about = "Print live payloads from a depthcast WebSocket server")]
struct Args {
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(long, default_value = "9001")]
    port: u16,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    let url = format!("ws://{}:{}", args.host, args.port);
    println!("connecting to {url}");

    let (ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .with_context(|| format!("connect to {url} (is depthcast running?)"))?;
    println!("connected");

    let (_tx, mut rx) = ws.split();
    while let Some(frame) = rx.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };
        let payload: Value = match serde_json::from_str(&text) {
            Ok(v) => v,
            Err(_) => {
                eprintln!("invalid payload: {text}");
                continue;
            }
        };

        match payload["type"].as_str() {
            Some("metrics") => {
                let book = &payload["book"];
                let trade = &payload["trade"];
                println!(
                    "bid {:.2} x {:.3} | ask {:.2} x {:.3} | spread {:.4} bps | imb {:+.3} | vwap {:.2} | net {:+.3}",
                    book["bestBid"].as_f64().unwrap_or(0.0),
                    book["bestBidQty"].as_f64().unwrap_or(0.0),
                    book["bestAsk"].as_f64().unwrap_or(0.0),
                    book["bestAskQty"].as_f64().unwrap_or(0.0),
                    book["spreadBps"].as_f64().unwrap_or(0.0),
                    book["imbalance"].as_f64().unwrap_or(0.0),
                    trade["vwap"].as_f64().unwrap_or(0.0),
                    trade["netFlow"].as_f64().unwrap_or(0.0),
                );
            }
            Some("alert") => {
                println!(
                    "LARGE {} {} @ {:.2} ({:.1} sigma)",
                    payload["side"].as_str().unwrap_or("?"),
                    payload["quantity"].as_f64().unwrap_or(0.0),
                    payload["price"].as_f64().unwrap_or(0.0),
                    payload["sigma"].as_f64().unwrap_or(0.0),
                );
            }
            Some("status") => {
                println!("status: {}", payload["state"].as_str().unwrap_or("?"));
            }
            _ => eprintln!("unknown payload type: {text}"),
        }
    }

    println!("disconnected");
    Ok(())
}
