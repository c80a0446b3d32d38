//! filascale-hardware
//!
//! Transport crate for the FilaScale spool sensor: the framing protocol, the
//! serial session, port discovery, the connection state machine and the
//! request/reply exchange. The daemon drives it from a single polling task.
//
//! Public API:
//! - `exchange::ExchangeEngine`: bounded-retry request/reply over a connection
//! - `connection::ConnectionManager`: Connected/Disconnected state machine
//! - `session::SerialSession`: bounded reads, writes, reset pulse and drain
//! - `ports::resolve_candidates`: ordered candidate ports with the printer's port excluded
//! - `codec::{encode, decode}`: wire frames, `crc::crc16` for their checksum

pub mod codec;
pub mod connection;
pub mod crc;
pub mod exchange;
pub mod ports;
pub mod session;
pub mod test_utils;

pub use codec::{bytes_to_hex, decode, encode, parse_header, Frame};
pub use connection::{ConnectedCallback, ConnectionManager, ConnectionState};
pub use crc::crc16;
pub use exchange::ExchangeEngine;
pub use ports::{order_candidates, resolve_candidates, PortEnumerator, SystemPorts};
pub use session::{NativeOpener, PortOpener, SerialLink, SerialSession};
