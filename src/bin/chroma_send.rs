// Sends one image to a running dispatcher and prints the acknowledgement.
//
// usage: chroma_send <server-addr> <opcode|operation-name> <image-path>

use std::time::Duration;

use anyhow::{Context, bail};
use chroma_lens::client::DatagramClient;
use chroma_lens::protocol::MAX_PAYLOAD_SIZE;
use chroma_lens::registry::{Opcode, Operation};
use log::{info, warn};

const USAGE: &str = "usage: chroma_send <server-addr> <opcode|operation-name> <image-path>";

/// Raw opcodes are passed through even when unknown (the server treats them as identity).
fn parse_opcode(arg: &str) -> anyhow::Result<Opcode> {
    if let Ok(opcode) = arg.trim().parse::<Opcode>() {
        if Operation::from_opcode(opcode).is_none() {
            warn!("opcode {opcode} is not assigned; the server will return the image unchanged");
        }
        return Ok(opcode);
    }
    let operation: Operation = arg.parse().map_err(anyhow::Error::msg)?;
    Ok(operation.opcode())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_micros()
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let [server, operation, path] = args.as_slice() else {
        bail!(USAGE);
    };

    let opcode = parse_opcode(operation)?;
    let image = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {path}"))?;
    if image.len() > MAX_PAYLOAD_SIZE {
        bail!(
            "{path} is {} bytes; a single datagram carries at most {MAX_PAYLOAD_SIZE}",
            image.len()
        );
    }

    let client = DatagramClient::connect(server.as_str())
        .await
        .with_context(|| format!("connecting to {server}"))?
        .with_reply_timeout(Duration::from_secs(10));
    info!("sending {} bytes with opcode {opcode} to {server}", image.len());

    let ack = client.send(opcode, &image).await.context("waiting for acknowledgement")?;
    match ack.request_id {
        Some(id) => println!("{} (request id {id})", ack.text),
        None => println!("{}", ack.text),
    }
    Ok(())
}
