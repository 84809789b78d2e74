//! Per-connection client worker.
//!
//! A worker reads exactly one framed message, dispatches it, optionally
//! replies, and closes the connection. Every failure is logged here and ends
//! only this connection; nothing propagates back to the acceptor.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use crate::{
    bet::{self, AgencyId, Bet},
    completion::CompletionTracker,
    draw::{DrawResult, WinningPredicate},
    error::WorkerError,
    protocol::{self, ClientMessage, ServerMessage},
    storage::StorageHandle,
    stream::Stream,
};

/// Everything a worker shares with the rest of the server.
#[derive(Clone)]
pub struct WorkerContext {
    pub storage: StorageHandle,
    pub completion: Arc<CompletionTracker>,
    pub predicate: Arc<dyn WinningPredicate>,
}

/// Serves one message on `transport`, then closes it on every path.
pub async fn serve_connection<T>(transport: T, ctx: WorkerContext)
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let mut stream = Stream::new(transport);

    if let Err(error) = handle_message(&mut stream, &ctx).await {
        warn!(action = "receive_message", result = "fail", %error);
    }

    if let Err(error) = stream.shutdown().await {
        debug!(?error, "connection already closed by peer");
    }
}

async fn handle_message<T>(stream: &mut Stream<T>, ctx: &WorkerContext) -> Result<(), WorkerError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let frame = protocol::receive(stream).await?;
    debug!(message_type = frame.kind.name(), len = frame.payload.len(), "message received");

    match ClientMessage::try_from(frame)? {
        ClientMessage::Bet(payload) => handle_bet(stream, ctx, &payload).await,
        ClientMessage::MultipleBets(payload) => handle_multiple_bets(stream, ctx, &payload).await,
        ClientMessage::End { agency } => handle_end(ctx, agency),
        ClientMessage::ResultRequest { agency } => handle_result_request(stream, ctx, agency).await,
    }
    Ok(())
}

/// A failed single bet gets no reply at all; the agency notices the missing ack.
async fn handle_bet<T>(stream: &mut Stream<T>, ctx: &WorkerContext, payload: &[u8])
where
    T: AsyncWrite + Unpin,
{
    let bet = match Bet::decode(payload) {
        Ok(bet) => bet,
        Err(error) => {
            warn!(action = "store_bet", result = "fail", %error);
            return;
        }
    };

    let document = bet.document.clone();
    let number = bet.number;
    if let Err(error) = ctx.storage.store_bets(vec![bet]).await {
        warn!(action = "store_bet", result = "fail", %document, number, %error);
        return;
    }
    info!(action = "store_bet", result = "success", %document, number);

    if let Err(error) = reply(stream, ServerMessage::BetAck).await {
        warn!(action = "send_ack", result = "fail", %document, %error);
    }
}

async fn handle_multiple_bets<T>(stream: &mut Stream<T>, ctx: &WorkerContext, payload: &[u8])
where
    T: AsyncWrite + Unpin,
{
    let outcome = match bet::decode_batch(payload) {
        Ok(bets) => {
            let count = bets.len();
            ctx.storage
                .store_bets(bets)
                .await
                .map(|()| count)
                .map_err(WorkerError::from)
        }
        Err(error) => Err(error.into()),
    };

    let response = match outcome {
        Ok(count) => {
            info!(action = "store_batch", result = "success", count);
            ServerMessage::BetAck
        }
        Err(error) => {
            warn!(action = "store_batch", result = "fail", %error);
            ServerMessage::Error
        }
    };

    if let Err(error) = reply(stream, response).await {
        warn!(action = "send_batch_reply", result = "fail", %error);
    }
}

fn handle_end(ctx: &WorkerContext, agency: AgencyId) {
    match ctx.completion.mark_finished(agency) {
        Ok(true) => info!(
            action = "end_message",
            result = "success",
            agency,
            finished = ctx.completion.finished_count(),
            total = ctx.completion.total()
        ),
        Ok(false) => debug!(action = "end_message", result = "duplicate", agency),
        Err(error) => warn!(action = "end_message", result = "fail", agency, %error),
    }
}

async fn handle_result_request<T>(stream: &mut Stream<T>, ctx: &WorkerContext, agency: AgencyId)
where
    T: AsyncWrite + Unpin,
{
    if !ctx.completion.is_all_finished() {
        info!(action = "result_request", result = "in_progress", agency);
        if let Err(error) = reply(stream, ServerMessage::InProgress).await {
            warn!(action = "result_request", result = "fail", agency, %error);
        }
        return;
    }

    let snapshot = match ctx.storage.ledger_snapshot().await {
        Ok(snapshot) => snapshot,
        Err(error) => {
            warn!(action = "result_request", result = "fail", agency, %error);
            return;
        }
    };

    let draw = DrawResult::from_ledger(snapshot, ctx.predicate.as_ref());
    let winners = draw.winner_documents(agency);
    let count = winners.len();

    match reply(stream, ServerMessage::Result { winners }).await {
        Ok(()) => info!(action = "result_request", result = "success", agency, winners = count),
        Err(error) => warn!(action = "result_request", result = "fail", agency, %error),
    }
}

async fn reply<T>(stream: &mut Stream<T>, message: ServerMessage) -> Result<(), WorkerError>
where
    T: AsyncWrite + Unpin,
{
    protocol::write_message(stream, message.into_frame()).await?;
    Ok(())
}
