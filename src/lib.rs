//! Multistream Writer
//!
//! A speculative-retry writer for a distributed, segmented append-only log.
//! Each record set is raced across a shuffled roster of equivalent streams:
//! the first stream to acknowledge wins, and an exponential-backoff ladder
//! adds more parallel attempts the longer the fastest stream takes to reply.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use multistream_writer::{HttpWireClient, Writer};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let wire = Arc::new(HttpWireClient::new("https://log.example.com")?);
//!     let writer = Writer::builder()
//!         .streams(vec![
//!             "seg-a".to_string(),
//!             "seg-b".to_string(),
//!             "seg-c".to_string(),
//!         ])
//!         .wire_client(wire)
//!         .build()?;
//!
//!     let coordinate = writer.write(b"hello world".to_vec()).await?;
//!     println!("acknowledged at {coordinate:?}");
//!
//!     writer.close().await;
//!     Ok(())
//! }
//! ```

mod clock;
mod codec;
mod error;
mod pending_write;
mod record_set;
mod roster;
mod speculative;
mod wire;
mod writer;

pub use clock::{Clock, FakeClock, SystemClock};
pub use codec::CompressionCodec;
pub use error::{ConfigError, WireError, WriteError};
pub use record_set::{MAX_RECORDSET_SIZE, MAX_RECORD_SIZE};
pub use speculative::SpeculativePolicy;
pub use wire::{Coordinate, HttpWireClient, WireClient, HEADER_RECORDSET_COORDINATE};
pub use writer::{Writer, WriterBuilder};
