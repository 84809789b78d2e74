use std::{net::SocketAddr, path::PathBuf};

use clap::{Args, Parser, Subcommand};

use crate::{bet::AgencyId, draw::DEFAULT_WINNING_NUMBER};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log filter used when RUST_LOG is unset (e.g. "debug", "lottery_ingest=trace").
    #[arg(long, global = true, env = "LOGGING_LEVEL")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the bet ingestion server.
    Server(ServerArgs),
    /// Upload one agency's bets and wait for its winners.
    Agency(AgencyArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServerArgs {
    /// Socket address the server should bind to. Use port 0 for an ephemeral port.
    #[arg(long, env = "SERVER_LISTEN", default_value = "0.0.0.0:12345")]
    pub listen: SocketAddr,

    /// Number of agencies that must send END before the draw opens.
    #[arg(
        long,
        env = "CLIENTS_AMOUNT",
        value_parser = clap::value_parser!(u8).range(1..)
    )]
    pub clients_amount: AgencyId,

    /// JSON-lines file holding every stored bet.
    #[arg(long, env = "LEDGER_PATH", default_value = "bets.jsonl")]
    pub ledger_path: PathBuf,

    /// Keep the ledger in memory instead of on disk. Overrides `--ledger-path`.
    #[arg(long)]
    pub in_memory: bool,

    /// Bets playing this number win the draw.
    #[arg(
        long,
        env = "WINNING_NUMBER",
        default_value_t = DEFAULT_WINNING_NUMBER,
        allow_negative_numbers = true
    )]
    pub winning_number: i64,
}

#[derive(Args, Debug, Clone)]
pub struct AgencyArgs {
    /// Agency id, between 1 and the server's configured agency count.
    #[arg(long, env = "CLI_ID", value_parser = clap::value_parser!(u8).range(1..))]
    pub id: AgencyId,

    /// Address of the server to connect to.
    #[arg(long, env = "SERVER_ADDRESS", default_value = "127.0.0.1:12345")]
    pub server: String,

    /// CSV file with `first_name,last_name,document,birthdate,number` per line.
    #[arg(long, env = "BETS_FILE")]
    pub bets_file: PathBuf,

    /// Maximum number of bets sent per MULTIPLE_BETS message.
    #[arg(long, env = "BATCH_MAX_AMOUNT", default_value_t = 100)]
    pub batch_max_amount: usize,

    /// Milliseconds to wait between result polls.
    #[arg(long, env = "LOOP_PERIOD_MS", default_value_t = 1000)]
    pub loop_period_ms: u64,
}
