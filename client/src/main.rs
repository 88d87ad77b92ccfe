mod cache;
mod connection;
mod network;

use clap::Parser;
use log::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:4000")]
    server: String,

    /// Opaque user identity to act as
    #[arg(short, long)]
    user_id: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting client...");
    info!("Connecting to: {}", args.server);
    info!("Commands: ls | add <title> | done <id> | edit <id> <title> | rm <id> | quit");

    let mut client = network::Client::new(&args.server, args.user_id).await?;

    client.run().await?;

    Ok(())
}
