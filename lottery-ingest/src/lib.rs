//! Concurrent bet ingestion service for a lottery draw.
//!
//! Agencies connect over TCP, send one length-prefixed message per
//! connection, and get at most one reply. Once every configured agency has
//! sent END, any agency may ask for its winning bets.
//!
//! - [`stream`] guarantees exact-length reads and writes over any duplex channel.
//! - [`protocol`] frames typed messages (1-byte type, 4-byte big-endian length).
//! - [`bet`] encodes bet records, batches, and winner lists.
//! - [`ledger`] provides the append-only bet stores.
//! - [`storage`] runs the arbitrator task that exclusively owns the ledger.
//! - [`completion`] tracks which agencies have finished.
//! - [`draw`] computes winners from a ledger snapshot.
//! - [`worker`] handles a single connection end to end.
//! - [`server`] accepts connections and coordinates shutdown.
//! - [`agency`] is the client side used by each agency.
//! - [`cli`] parses the command-line interface for both modes.

pub mod agency;
pub mod bet;
pub mod cli;
pub mod completion;
pub mod draw;
pub mod error;
pub mod ledger;
pub mod protocol;
pub mod server;
pub mod storage;
pub mod stream;
pub mod worker;
