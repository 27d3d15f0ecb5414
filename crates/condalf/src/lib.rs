//! ConDaLF: a constrained-node telemetry pipeline.
//!
//! Sensor readings and diagnostic messages ([`Record`]s) are serialized into
//! compact SenML/CBOR envelopes, optionally buffered to a filesystem-backed
//! long-term store, and shipped to a remote endpoint through pluggable
//! [transfer drivers](driver::TransferDriver).
//!
//! The typical wiring, producer to wire:
//!
//! ```text
//! producer -> RecordStream (Logger) -> Serializer -> envelope
//!                 -> TransferDriver (Ltb -> pool -> Publisher, or Publisher)
//!                 -> Transport
//! ```

mod hexout;
mod logger;
mod name;
mod record;
mod ring;
mod senml;
mod serial;
mod stream;
mod vstorage;

pub mod driver;
pub mod error;
pub mod ltb;
pub mod net;
pub mod pool;
pub mod publisher;
pub mod rdlog;

pub use crate::{
    error::{Error, PutError, Rejected},
    hexout::HexOut,
    logger::{Logger, LoggerOptions},
    name::Name,
    record::{Record, RecordBase, Timestamp, Unit, Value},
    serial::{Queued, Serializer, Swapped},
    stream::{RecordStream, StreamName},
    vstorage::{FileIo, VirtualFile},
};

#[cfg(test)]
mod tests;
