//! Interactive terminal client for the line chat server
//!
//! Copies everything the server sends to stdout and forwards each stdin
//! line to the server. `/quit` or end of input exits.

use std::process::ExitCode;

use clap::Parser;
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use line_chat::config::DEFAULT_ADDR;
use line_chat::session::QUIT_COMMAND;

/// Line chat client
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Server address
    #[arg(long, default_value_t = DEFAULT_ADDR.to_string())]
    addr: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let stream = match TcpStream::connect(&args.addr).await {
        Ok(stream) => stream,
        Err(e) => {
            eprintln!("Could not connect to {}: {}", args.addr, e);
            return ExitCode::FAILURE;
        }
    };
    let (mut server_rx, mut server_tx) = stream.into_split();

    // Prompts arrive without a trailing newline, so copy bytes rather than lines
    let mut read_task = tokio::spawn(async move {
        let mut stdout = io::stdout();
        match io::copy(&mut server_rx, &mut stdout).await {
            Ok(_) => println!("Connection closed by the server."),
            Err(_) => println!("Disconnected from server."),
        }
    });

    let mut stdin = BufReader::new(io::stdin()).lines();
    loop {
        tokio::select! {
            line = stdin.next_line() => {
                let Ok(Some(line)) = line else { break };
                if server_tx.write_all(format!("{line}\n").as_bytes()).await.is_err() {
                    break;
                }
                if line.trim().eq_ignore_ascii_case(QUIT_COMMAND) {
                    break;
                }
            }
            _ = &mut read_task => return ExitCode::SUCCESS,
        }
    }

    let _ = server_tx.shutdown().await;
    let _ = read_task.await;
    ExitCode::SUCCESS
}
