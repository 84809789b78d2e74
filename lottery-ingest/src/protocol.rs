//! Length-prefixed framing and the typed messages carried inside frames.
//!
//! Every frame is a 1-byte message type, a 4-byte big-endian payload length,
//! and the payload itself. [`receive`] only hands back a frame once all of its
//! bytes have arrived, so callers never observe a partial message.

use tokio::io::{AsyncRead, AsyncWrite};

use crate::{
    bet::{self, AgencyId},
    error::{ProtocolError, SerializationError},
    stream::Stream,
};

pub const HEADER_LEN: usize = 5;

/// Upper bound on an announced payload, checked before allocating for it.
pub const MAX_PAYLOAD_LEN: usize = 8 * 1024 * 1024;

pub const ACK_BODY: &[u8] = b"OK";
pub const ERROR_BODY: &[u8] = b"ERROR";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Bet = 0x01,
    MultipleBets = 0x02,
    Error = 0x03,
    BetAck = 0x04,
    End = 0x05,
    ResultRequest = 0x06,
    Result = 0x07,
    InProgress = 0x08,
}

impl MessageType {
    pub fn name(self) -> &'static str {
        match self {
            MessageType::Bet => "BET",
            MessageType::MultipleBets => "MULTIPLE_BETS",
            MessageType::Error => "ERROR",
            MessageType::BetAck => "BET_ACK",
            MessageType::End => "END",
            MessageType::ResultRequest => "RESULT_REQUEST",
            MessageType::Result => "RESULT",
            MessageType::InProgress => "IN_PROGRESS",
        }
    }
}

impl TryFrom<u8> for MessageType {
    type Error = ProtocolError;

    fn try_from(tag: u8) -> Result<Self, ProtocolError> {
        Ok(match tag {
            0x01 => MessageType::Bet,
            0x02 => MessageType::MultipleBets,
            0x03 => MessageType::Error,
            0x04 => MessageType::BetAck,
            0x05 => MessageType::End,
            0x06 => MessageType::ResultRequest,
            0x07 => MessageType::Result,
            0x08 => MessageType::InProgress,
            other => return Err(ProtocolError::UnknownMessageType(other)),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: MessageType,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(kind: MessageType, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let len = u32::try_from(self.payload.len())
            .ok()
            .filter(|len| *len as usize <= MAX_PAYLOAD_LEN)
            .ok_or(ProtocolError::FrameTooLarge {
                max_bytes: MAX_PAYLOAD_LEN,
                got_bytes: self.payload.len(),
            })?;

        let mut buf = Vec::with_capacity(HEADER_LEN + self.payload.len());
        buf.push(self.kind as u8);
        buf.extend_from_slice(&len.to_be_bytes());
        buf.extend_from_slice(&self.payload);
        Ok(buf)
    }
}

/// Reads one complete frame: header first, then exactly the announced payload.
pub async fn receive<T>(stream: &mut Stream<T>) -> Result<Frame, ProtocolError>
where
    T: AsyncRead + Unpin,
{
    let header = stream.read(HEADER_LEN).await.map_err(ProtocolError::Receive)?;
    let kind = MessageType::try_from(header[0])?;
    let len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]) as usize;
    if len > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::FrameTooLarge {
            max_bytes: MAX_PAYLOAD_LEN,
            got_bytes: len,
        });
    }

    let payload = stream.read(len).await.map_err(ProtocolError::Receive)?;
    Ok(Frame { kind, payload })
}

/// Writes header and payload as a single buffer.
pub async fn send<T>(
    stream: &mut Stream<T>,
    kind: MessageType,
    payload: &[u8],
) -> Result<(), ProtocolError>
where
    T: AsyncWrite + Unpin,
{
    let encoded = Frame::new(kind, payload).encode()?;
    stream.write(&encoded).await.map_err(ProtocolError::Send)
}

/// Messages an agency sends to the server.
///
/// Bet payloads stay raw here so the worker can decide how to answer a
/// malformed record, which differs between BET and MULTIPLE_BETS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    Bet(Vec<u8>),
    MultipleBets(Vec<u8>),
    End { agency: AgencyId },
    ResultRequest { agency: AgencyId },
}

impl ClientMessage {
    pub fn into_frame(self) -> Frame {
        match self {
            ClientMessage::Bet(payload) => Frame::new(MessageType::Bet, payload),
            ClientMessage::MultipleBets(payload) => Frame::new(MessageType::MultipleBets, payload),
            ClientMessage::End { agency } => Frame::new(MessageType::End, vec![agency]),
            ClientMessage::ResultRequest { agency } => {
                Frame::new(MessageType::ResultRequest, vec![agency])
            }
        }
    }
}

impl TryFrom<Frame> for ClientMessage {
    type Error = ProtocolError;

    fn try_from(frame: Frame) -> Result<Self, Self::Error> {
        let Frame { kind, payload } = frame;
        match kind {
            MessageType::Bet => Ok(ClientMessage::Bet(payload)),
            MessageType::MultipleBets => Ok(ClientMessage::MultipleBets(payload)),
            MessageType::End => Ok(ClientMessage::End {
                agency: agency_from_payload(kind, &payload)?,
            }),
            MessageType::ResultRequest => Ok(ClientMessage::ResultRequest {
                agency: agency_from_payload(kind, &payload)?,
            }),
            MessageType::Error
            | MessageType::BetAck
            | MessageType::Result
            | MessageType::InProgress => Err(ProtocolError::UnexpectedMessage(kind.name())),
        }
    }
}

/// Replies the server sends back to an agency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    BetAck,
    Error,
    Result { winners: Vec<String> },
    InProgress,
}

impl ServerMessage {
    pub fn into_frame(self) -> Frame {
        match self {
            ServerMessage::BetAck => Frame::new(MessageType::BetAck, ACK_BODY),
            ServerMessage::Error => Frame::new(MessageType::Error, ERROR_BODY),
            ServerMessage::Result { winners } => Frame::new(
                MessageType::Result,
                bet::encode_winners(winners.iter().map(String::as_str)),
            ),
            ServerMessage::InProgress => Frame::new(MessageType::InProgress, Vec::new()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServerMessageError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Serialization(#[from] SerializationError),
}

impl TryFrom<Frame> for ServerMessage {
    type Error = ServerMessageError;

    fn try_from(frame: Frame) -> Result<Self, ServerMessageError> {
        match frame.kind {
            MessageType::BetAck => Ok(ServerMessage::BetAck),
            MessageType::Error => Ok(ServerMessage::Error),
            MessageType::Result => Ok(ServerMessage::Result {
                winners: bet::decode_winners(&frame.payload)?,
            }),
            MessageType::InProgress => Ok(ServerMessage::InProgress),
            kind => Err(ProtocolError::UnexpectedMessage(kind.name()).into()),
        }
    }
}

pub async fn write_message<T>(stream: &mut Stream<T>, frame: Frame) -> Result<(), ProtocolError>
where
    T: AsyncWrite + Unpin,
{
    send(stream, frame.kind, &frame.payload).await
}

fn agency_from_payload(kind: MessageType, payload: &[u8]) -> Result<AgencyId, ProtocolError> {
    payload
        .first()
        .copied()
        .ok_or(ProtocolError::MissingAgency(kind.name()))
}
