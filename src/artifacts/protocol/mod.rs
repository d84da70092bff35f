//! Smart HTTP wire protocol
//!
//! - `transport`: the contract a network transport implements
//! - `pkt_line`: length-prefixed line framing
//! - `packfile`: packfile encoding, decoding and staging
//! - `memory`: an in-process remote implementing the transport

pub mod memory;
pub mod packfile;
pub mod pkt_line;
pub mod transport;
