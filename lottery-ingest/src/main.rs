use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

use lottery_ingest::{
    agency,
    cli::{Cli, Command, ServerArgs},
    draw::WinningNumber,
    ledger::{FileLedger, MemoryLedger},
    server::Server,
};

fn init_tracing(log_level: Option<&str>) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.unwrap_or("info")));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    match cli.command {
        Command::Server(args) => run_server(args).await?,
        Command::Agency(args) => agency::run(args).await?,
    }

    Ok(())
}

async fn run_server(args: ServerArgs) -> Result<()> {
    let listener = TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("failed to bind {}", args.listen))?;
    let predicate = WinningNumber(args.winning_number);

    let server = if args.in_memory {
        Server::new(listener, MemoryLedger::new(), args.clients_amount, predicate)
    } else {
        let ledger = FileLedger::open(&args.ledger_path)
            .with_context(|| format!("failed to open ledger {}", args.ledger_path.display()))?;
        Server::new(listener, ledger, args.clients_amount, predicate)
    };

    let addr = server.local_addr()?;
    info!(agencies = args.clients_amount, "server listening on {}", addr);
    if let Err(err) = server.run_until_signal().await {
        warn!("server exited with error: {err:?}");
        return Err(err);
    }
    Ok(())
}
