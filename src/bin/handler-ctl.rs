use std::time::Duration;

use clap::Parser;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use handler_dispatch::wire::netstring::{format_netstring, read_netstring};
use handler_dispatch::wire::reply::{control_reply, control_request};

const MAX_REPLY_BYTES: usize = 16 * 1024 * 1024;

#[derive(Parser)]
#[command(name = "handler-ctl")]
#[command(about = "Send one command on a proxy control channel", long_about = None)]
struct Cli {
    /// Control channel address.
    #[arg(short, long, default_value = "127.0.0.1:9995")]
    control: String,

    /// Seconds to wait for the reply.
    #[arg(short, long, default_value_t = 5)]
    timeout: u64,

    /// Command sent verbatim, e.g. `status net`.
    #[arg(required = true, num_args = 1..)]
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let command = cli.command.join(" ");

    let mut stream = TcpStream::connect(&cli.control).await?;
    stream
        .write_all(&format_netstring(&control_request(command.as_bytes())))
        .await?;
    stream.flush().await?;

    let raw = tokio::time::timeout(
        Duration::from_secs(cli.timeout),
        read_netstring(&mut stream, MAX_REPLY_BYTES),
    )
    .await??;

    let Some(raw) = raw else {
        eprintln!("Error: control channel closed without a reply");
        std::process::exit(1);
    };

    let payload = control_reply(&raw)?;
    match serde_json::from_slice::<serde_json::Value>(payload) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", String::from_utf8_lossy(payload)),
    }
    Ok(())
}
