//! Bet records and their wire encoding.
//!
//! A record is six fields joined by [`FIELD_SEPARATOR`]; a batch is records
//! joined by [`RECORD_SEPARATOR`] with no trailing separator. Integers travel
//! as decimal ASCII and text as UTF-8.

use std::str;

use serde::{Deserialize, Serialize};

use crate::error::SerializationError;

pub const FIELD_SEPARATOR: u8 = 0x1F;
pub const RECORD_SEPARATOR: u8 = 0x1E;

const FIELD_COUNT: usize = 6;

/// Agencies are identified by a single byte on the wire, capping the system at 255.
pub type AgencyId = u8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bet {
    pub agency: AgencyId,
    pub first_name: String,
    pub last_name: String,
    pub document: String,
    pub birthdate: String,
    pub number: i64,
}

impl Bet {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len_hint());
        self.encode_into(&mut buf);
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, SerializationError> {
        let fields: Vec<&[u8]> = bytes.split(|b| *b == FIELD_SEPARATOR).collect();
        if fields.len() != FIELD_COUNT {
            return Err(SerializationError::FieldCount {
                expected: FIELD_COUNT,
                got: fields.len(),
            });
        }

        Ok(Self {
            agency: parse_integer("agency", fields[0], Sign::Unsigned)?,
            first_name: parse_text("first_name", fields[1])?,
            last_name: parse_text("last_name", fields[2])?,
            document: parse_text("document", fields[3])?,
            birthdate: parse_text("birthdate", fields[4])?,
            number: parse_integer("number", fields[5], Sign::Signed)?,
        })
    }

    fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self.agency.to_string().as_bytes());
        for text in [
            &self.first_name,
            &self.last_name,
            &self.document,
            &self.birthdate,
        ] {
            buf.push(FIELD_SEPARATOR);
            buf.extend_from_slice(text.as_bytes());
        }
        buf.push(FIELD_SEPARATOR);
        buf.extend_from_slice(self.number.to_string().as_bytes());
    }

    fn encoded_len_hint(&self) -> usize {
        // 3 digits of agency, up to 20 of number, plus five separators.
        28 + self.first_name.len() + self.last_name.len() + self.document.len() + self.birthdate.len()
    }
}

pub fn encode_batch(bets: &[Bet]) -> Vec<u8> {
    let mut buf = Vec::new();
    for (index, bet) in bets.iter().enumerate() {
        if index > 0 {
            buf.push(RECORD_SEPARATOR);
        }
        bet.encode_into(&mut buf);
    }
    buf
}

/// Decodes a whole batch, rejecting it entirely if any record is malformed.
///
/// An empty payload is an empty batch.
pub fn decode_batch(bytes: &[u8]) -> Result<Vec<Bet>, SerializationError> {
    if bytes.is_empty() {
        return Ok(Vec::new());
    }

    bytes
        .split(|b| *b == RECORD_SEPARATOR)
        .enumerate()
        .map(|(index, record)| {
            Bet::decode(record).map_err(|source| SerializationError::Record {
                index,
                source: Box::new(source),
            })
        })
        .collect()
}

/// Encodes the documents of winning bets for a RESULT reply.
pub fn encode_winners<'a, I>(documents: I) -> Vec<u8>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut buf = Vec::new();
    for (index, document) in documents.into_iter().enumerate() {
        if index > 0 {
            buf.push(RECORD_SEPARATOR);
        }
        buf.extend_from_slice(document.as_bytes());
    }
    buf
}

pub fn decode_winners(bytes: &[u8]) -> Result<Vec<String>, SerializationError> {
    if bytes.is_empty() {
        return Ok(Vec::new());
    }
    bytes
        .split(|b| *b == RECORD_SEPARATOR)
        .map(|document| parse_text("document", document))
        .collect()
}

fn parse_text(field: &'static str, bytes: &[u8]) -> Result<String, SerializationError> {
    str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|_| SerializationError::InvalidUtf8 { field })
}

#[derive(Clone, Copy)]
enum Sign {
    Unsigned,
    Signed,
}

/// Decimal ASCII only; a single leading `-` is accepted for signed fields.
fn parse_integer<T: str::FromStr>(
    field: &'static str,
    bytes: &[u8],
    sign: Sign,
) -> Result<T, SerializationError> {
    let invalid = || SerializationError::InvalidInteger {
        field,
        value: String::from_utf8_lossy(bytes).into_owned(),
    };
    let text = str::from_utf8(bytes).map_err(|_| invalid())?;
    let digits = match sign {
        Sign::Signed => text.strip_prefix('-').unwrap_or(text),
        Sign::Unsigned => text,
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    text.parse().map_err(|_| invalid())
}
