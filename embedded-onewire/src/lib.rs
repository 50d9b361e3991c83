#![no_std]
#![deny(missing_docs)]
//! # embedded-onewire
//! A no-std implementation of the 1-Wire protocol.
//!
//! This crate provides a trait-based interface for 1-Wire communication, allowing you to implement the protocol on various platforms.
//! [OneWire] trait defines the basic operations required for 1-Wire communication, such as resetting the bus, writing and reading bytes, and writing and reading bits.
//! On top of those it provides block transfers ([`OneWire::data_block`]) and the strong pull-up and
//! program pulse primitives needed by EEPROM and EPROM memory devices.
//!
//! The CRC engines used to validate 1-Wire transfers live in [OneWireCrc] (8-bit, ROM ids and
//! short transfers) and [OneWireCrc16] (16-bit, memory pages and scratchpads).

pub mod consts;
mod error;
mod traits;
mod utils;
pub use consts::*;
pub use error::OneWireError;
pub use traits::{OneWire, OneWireStatus, PowerDelivery};
pub use utils::{OneWireCrc, OneWireCrc16};

/// Error type for 1-Wire operations.
pub type OneWireResult<T, E> = Result<T, OneWireError<E>>;
