#![no_std]
#![deny(missing_docs)]

/*! # DS2484
 *
 * Driver for the Analog Devices DS2484 I2C to 1-Wire bridge, implementing
 * the [`OneWire`] trait from `embedded-onewire`.
 *
 * Besides byte and bit transfers the bridge drives the strong pull-up that
 * EEPROM devices need while they copy their scratchpad to memory: arming it
 * sets the SPU bit of the [`DeviceConfiguration`] register, so that the
 * pull-up starts right after the next byte written on the line.
 */

pub use embedded_onewire::{OneWire, OneWireError, OneWireResult, PowerDelivery};
mod error;
mod onewire;
mod registers;
mod traits;

pub use error::Ds2484Error;
pub use registers::{DeviceConfiguration, DeviceStatus, Ds2484, Ds2484Builder};
pub use traits::Register;

/// Results of DS2484-specific function calls.
pub type Ds2484Result<T, E> = Result<T, Ds2484Error<E>>;
