//! Replay a captured batch response body through the decoder.
//! Prints one JSON line per delivered result; useful for debugging framing
//! problems reported against a real endpoint.
//!
//! Usage: batch-replay <response-file> [--filter-errors] [--chunk-size N]

use batch_stream::pipeline::decode_response;
use bytes::Bytes;
use futures::StreamExt;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let mut path: Option<PathBuf> = None;
    let mut filter_errors = false;
    let mut chunk_size = 8 * 1024;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--filter-errors" => filter_errors = true,
            "--chunk-size" => {
                chunk_size = args
                    .next()
                    .and_then(|s| s.parse::<usize>().ok())
                    .filter(|n| *n > 0)
                    .ok_or("--chunk-size expects a positive integer")?;
            }
            other => path = Some(PathBuf::from(other)),
        }
    }
    let path = path.ok_or("usage: batch-replay <response-file> [--filter-errors] [--chunk-size N]")?;

    let raw = tokio::fs::read(&path).await?;
    tracing::info!(path = %path.display(), bytes = raw.len(), chunk_size, "replaying batch response");

    let chunks: Vec<batch_stream::Result<Bytes>> = raw
        .chunks(chunk_size)
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();
    let mut results = decode_response(Box::pin(futures::stream::iter(chunks)), 0, filter_errors);

    let mut delivered = 0usize;
    while let Some(item) = results.next().await {
        match item {
            Ok(result) => {
                delivered += 1;
                println!("{}", serde_json::to_string(&result)?);
            }
            Err(e) => {
                eprintln!("❌ {}", e);
                std::process::exit(1);
            }
        }
    }

    tracing::info!(delivered, "replay finished");
    Ok(())
}
