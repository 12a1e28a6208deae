//! Ports layer.
//!
//! - Inbound (driving): the manager API applications call
//! - Outbound (driven): the mechanism SPI and configuration source

pub mod inbound;
pub mod outbound;

pub use inbound::*;
pub use outbound::*;
