//! `rdt-over-udp`: a reliable byte stream (RDT) implemented over UDP.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────────────────────────────┐
//!  │             RdtTable             │  create / bind / listen / accept /
//!  │  slots: Vec<Option<Connection>>  │  connect / send / receive / close
//!  └────────────────┬─────────────────┘
//!                   │ Handle
//!  ┌────────────────▼─────────────────┐
//!  │            Connection            │  state, loc_seq / rem_seq,
//!  │     handshake      teardown      │  read-ahead, reorder store
//!  └────────────────┬─────────────────┘
//!                   │ ReliabilityStrategy
//!  ┌────────────────▼─────────────────┐
//!  │  StopAndWait   SelectiveRepeat   │  (GoBackN reserved)
//!  └────────────────┬─────────────────┘
//!                   │ 106-byte frames
//!  ┌────────────────▼─────────────────┐
//!  │              Socket              │  socket2 → tokio UdpSocket
//!  └──────────────────────────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`packet`]           : wire format and checksum
//! - [`socket`]           : datagram primitive with receive deadline
//! - [`table`]            : handle arena and the public operation set
//! - [`connection`]       : per-connection record and shared frame I/O
//! - [`state`]            : finite-state-machine types
//! - `handshake`          : SYN / SYN|ACK / ACK
//! - `teardown`           : FIN / ACK, sequential and simultaneous close
//! - [`strategy`]         : protocol selection and the strategy trait
//! - [`stop_and_wait`]    : one frame in flight
//! - [`selective_repeat`] : sliding window with per-frame ACKs
//! - [`read_ahead`]       : bytes accepted but not yet consumed
//! - [`timer`]            : retransmission deadline and retry budget
//! - [`simulator`]        : corruption / loss injection
//! - [`stats`]            : transfer counters
//! - [`config`]           : engine configuration
//! - [`error`]            : error type
//!
//! # Example
//!
//! ```no_run
//! use rdt_over_udp::{Protocol, RdtConfig, RdtTable};
//!
//! # async fn demo() -> Result<(), rdt_over_udp::RdtError> {
//! let mut table = RdtTable::new(RdtConfig::default());
//! let h = table.create(Protocol::StopAndWait)?;
//! table.bind(h, "0.0.0.0", 5791)?;
//! table.connect(h, "127.0.0.1", 18752).await?;
//! table.send(h, b"hello").await?;
//! table.close(h).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod error;
mod handshake;
pub mod packet;
pub mod read_ahead;
pub mod selective_repeat;
pub mod simulator;
pub mod socket;
pub mod state;
pub mod stats;
pub mod stop_and_wait;
pub mod strategy;
pub mod table;
mod teardown;
pub mod timer;

pub use config::RdtConfig;
pub use connection::Connection;
pub use error::RdtError;
pub use packet::{Packet, FRAME_LEN, PAYLOAD_LEN};
pub use simulator::FaultConfig;
pub use state::ConnectionState;
pub use stats::{ReceiveStats, SendStats};
pub use strategy::Protocol;
pub use table::{Handle, RdtTable};
