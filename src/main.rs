// Remote UART - serial devices over WebSocket
use clap::Parser;
use remote_uart::cli::{execute_command, Args};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = execute_command(args).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
