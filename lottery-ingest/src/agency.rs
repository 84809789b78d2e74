//! Agency client: uploads an agency's bets, signals END, then polls for winners.
//!
//! Each request travels on its own connection because the server answers
//! exactly one message per connection.

use std::{path::Path, time::Duration};

use anyhow::{Context, Result, anyhow, bail};
use tokio::{net::TcpStream, time::sleep};
use tracing::{info, warn};

use crate::{
    bet::{self, AgencyId, Bet},
    cli::AgencyArgs,
    protocol::{self, ClientMessage, ServerMessage},
    stream::Stream,
};

pub async fn run(args: AgencyArgs) -> Result<()> {
    let bets = read_bets_file(&args.bets_file, args.id)
        .await
        .with_context(|| format!("failed to load bets from {}", args.bets_file.display()))?;

    let client = AgencyClient::new(args.id, args.server.clone());
    client.send_bets(&bets, args.batch_max_amount).await?;
    client.send_end().await?;

    let winners = client
        .await_winners(Duration::from_millis(args.loop_period_ms))
        .await?;
    info!(
        action = "query_winners",
        result = "success",
        agency = args.id,
        winners = winners.len()
    );
    Ok(())
}

/// Talks to the server on behalf of one agency.
#[derive(Debug, Clone)]
pub struct AgencyClient {
    agency: AgencyId,
    server: String,
}

impl AgencyClient {
    pub fn new(agency: AgencyId, server: impl Into<String>) -> Self {
        Self {
            agency,
            server: server.into(),
        }
    }

    pub fn agency(&self) -> AgencyId {
        self.agency
    }

    /// Uploads a single bet and waits for its acknowledgement.
    pub async fn send_bet(&self, bet: &Bet) -> Result<()> {
        match self.request(ClientMessage::Bet(bet.encode())).await? {
            ServerMessage::BetAck => {
                info!(
                    action = "bet_sent",
                    result = "success",
                    document = %bet.document,
                    number = bet.number
                );
                Ok(())
            }
            other => Err(anyhow!("unexpected reply to bet: {other:?}")),
        }
    }

    /// Uploads `bets` in batches of at most `batch_max_amount`.
    pub async fn send_bets(&self, bets: &[Bet], batch_max_amount: usize) -> Result<()> {
        if batch_max_amount == 0 {
            bail!("batch size must be at least 1");
        }

        for chunk in bets.chunks(batch_max_amount) {
            let payload = bet::encode_batch(chunk);
            match self.request(ClientMessage::MultipleBets(payload)).await? {
                ServerMessage::BetAck => {
                    info!(action = "batch_sent", result = "success", count = chunk.len());
                }
                ServerMessage::Error => {
                    warn!(action = "batch_sent", result = "fail", count = chunk.len());
                    bail!("server rejected a batch of {} bets", chunk.len());
                }
                other => bail!("unexpected reply to batch: {other:?}"),
            }
        }
        Ok(())
    }

    /// Tells the server this agency has no more bets.
    pub async fn send_end(&self) -> Result<()> {
        let mut stream = self.connect().await?;
        protocol::write_message(&mut stream, ClientMessage::End { agency: self.agency }.into_frame())
            .await?;
        info!(action = "end_sent", result = "success", agency = self.agency);
        Ok(())
    }

    /// Asks once for this agency's winners; `None` while the draw is pending.
    pub async fn request_winners(&self) -> Result<Option<Vec<String>>> {
        match self
            .request(ClientMessage::ResultRequest { agency: self.agency })
            .await?
        {
            ServerMessage::Result { winners } => Ok(Some(winners)),
            ServerMessage::InProgress => Ok(None),
            other => Err(anyhow!("unexpected reply to result request: {other:?}")),
        }
    }

    /// Polls until the draw is available, sleeping `period` between attempts.
    pub async fn await_winners(&self, period: Duration) -> Result<Vec<String>> {
        loop {
            if let Some(winners) = self.request_winners().await? {
                return Ok(winners);
            }
            info!(action = "query_winners", result = "in_progress", agency = self.agency);
            sleep(period).await;
        }
    }

    async fn request(&self, message: ClientMessage) -> Result<ServerMessage> {
        let mut stream = self.connect().await?;
        protocol::write_message(&mut stream, message.into_frame()).await?;
        let frame = protocol::receive(&mut stream)
            .await
            .context("server closed the connection without replying")?;
        Ok(ServerMessage::try_from(frame)?)
    }

    async fn connect(&self) -> Result<Stream<TcpStream>> {
        let stream = TcpStream::connect(&self.server)
            .await
            .with_context(|| format!("failed to connect to {}", self.server))?;
        Ok(Stream::new(stream))
    }
}

/// Reads `first_name,last_name,document,birthdate,number` lines into bets.
pub async fn read_bets_file(path: &Path, agency: AgencyId) -> Result<Vec<Bet>> {
    let contents = tokio::fs::read_to_string(path).await?;
    parse_bets(&contents, agency)
}

pub fn parse_bets(contents: &str, agency: AgencyId) -> Result<Vec<Bet>> {
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            parse_bet_line(line, agency).with_context(|| format!("line {}: {line:?}", index + 1))
        })
        .collect()
}

fn parse_bet_line(line: &str, agency: AgencyId) -> Result<Bet> {
    let parts: Vec<&str> = line.trim_end_matches('\r').split(',').collect();
    let &[first_name, last_name, document, birthdate, number] = parts.as_slice() else {
        bail!("expected 5 comma-separated fields, got {}", parts.len());
    };

    Ok(Bet {
        agency,
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        document: document.to_string(),
        birthdate: birthdate.to_string(),
        number: number
            .trim()
            .parse::<i64>()
            .with_context(|| format!("invalid bet number {number:?}"))?,
    })
}
