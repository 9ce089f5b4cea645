use anyhow::Result;
use clap::{Parser, Subcommand};

use tubetrack::config::Config;
use tubetrack::youtube::client::YtClient;
use tubetrack::{daily, monthly, trace};

#[derive(Parser, Debug)]
#[command(name = "tubetrack", version, about = "YouTube channel statistics tracker")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Collect today's channel statistics into the daily table
    Daily,
    /// Write this month's curated video snapshot
    Monthly,
}

#[tokio::main]
async fn main() -> Result<()> {
    trace::init_tracing("tubetrack=info")?;
    let cli = Cli::parse();

    let cfg = Config::from_env()?;
    let client = YtClient::new(&cfg)?;

    match cli.command {
        Commands::Daily => daily::run(&cfg, &client).await,
        Commands::Monthly => monthly::run(&cfg, &client).await,
    }
}
