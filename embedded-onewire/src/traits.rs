use crate::{OneWireError, OneWireResult};

/// Status reported by a bus master after a reset pulse.
pub trait OneWireStatus {
    /// A presence pulse was detected.
    fn presence(&self) -> bool;
    /// A short circuit was detected on the bus.
    fn shortcircuit(&self) -> bool;
    /// Logic level of the line, if the bus master reports it.
    fn logic_level(&self) -> Option<bool> {
        None
    }
    /// Search direction taken by the last triplet, if the bus master reports it.
    fn direction(&self) -> Option<bool> {
        None
    }
}

/// When a strong pull-up started through [`OneWire::start_power_delivery`] takes effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerDelivery {
    /// Drive the line immediately.
    Now,
    /// Drive the line as soon as the next byte has been written.
    ///
    /// EEPROM devices start their copy cycle right after the last bit of the
    /// command sequence, so the pull-up must already be armed when it goes out.
    AfterNextByte,
}

/// Trait for 1-Wire communication.
/// This trait defines the basic operations required for 1-Wire communication, such as resetting the bus,
/// writing and reading bytes, and writing and reading bits.
pub trait OneWire {
    /// The status type returned by the reset operation.
    /// This type must implement the [OneWireStatus] trait.
    type Status: OneWireStatus;
    /// The error type returned by the operations of this trait.
    /// This type is used to indicate errors in the underlying hardware or communication.
    type BusError;

    /// Resets the 1-Wire bus and returns the status of the bus.
    ///
    /// # Errors
    /// This method returns an error if the reset operation fails, or if no
    /// device answered with a presence pulse.
    fn reset(&mut self) -> OneWireResult<Self::Status, Self::BusError>;

    /// Writes a byte to the 1-Wire bus.
    fn write_byte(&mut self, byte: u8) -> OneWireResult<(), Self::BusError>;

    /// Reads a byte from the 1-Wire bus.
    fn read_byte(&mut self) -> OneWireResult<u8, Self::BusError>;

    /// Writes a single bit to the 1-Wire bus.
    fn write_bit(&mut self, bit: bool) -> OneWireResult<(), Self::BusError>;

    /// Reads a single bit from the 1-Wire bus.
    fn read_bit(&mut self) -> OneWireResult<bool, Self::BusError>;

    /// Check if the 1-Wire bus is in overdrive mode.
    fn get_overdrive_mode(&mut self) -> OneWireResult<bool, Self::BusError>;

    /// Set the 1-Wire bus to overdrive mode.
    /// # Arguments
    /// * `enable` - A boolean indicating whether to enable or disable overdrive mode.
    fn set_overdrive_mode(&mut self, _enable: bool) -> OneWireResult<(), Self::BusError> {
        Err(OneWireError::Unimplemented)
    }

    /// Addresses devices on the 1-Wire bus.
    /// The first [`OneWire::read_byte`], [`OneWire::read_bit`], [`OneWire::write_byte`], [`OneWire::write_bit`] operation should be preceded by this method to address devices on the bus.
    /// Note: A [`OneWire::read_byte`] or [`OneWire::read_bit`] call will return garbage data if this method is called without specifying a ROM address on a bus with multiple devices.
    /// # Arguments
    /// * `rom` - The ROM address of the device to address. Pass [`None`] to skip ROM addressing and address all devices on the bus.
    fn address(&mut self, rom: Option<u64>) -> OneWireResult<(), Self::BusError> {
        let od = self.get_overdrive_mode()?;
        let cmd = if rom.is_some() {
            if od {
                crate::consts::ONEWIRE_MATCH_ROM_CMD_OD
            } else {
                crate::consts::ONEWIRE_MATCH_ROM_CMD
            }
        } else if od {
            crate::consts::ONEWIRE_SKIP_ROM_CMD_OD
        } else {
            crate::consts::ONEWIRE_SKIP_ROM_CMD
        };
        let status = self.reset()?; // Reset the bus before addressing
        if status.shortcircuit() {
            return Err(OneWireError::ShortCircuit);
        }
        if !status.presence() {
            return Err(OneWireError::NoDevicePresent);
        }
        self.write_byte(cmd)?; // Send the match ROM command
        if let Some(rom) = rom {
            for &b in rom.to_le_bytes().iter() {
                self.write_byte(b)?; // Write each byte of the ROM address
            }
        }
        Ok(())
    }

    /// Exchanges one byte with the bus.
    ///
    /// Writing a one bit and reading a bit share the same time slot, so `0xff`
    /// is a read: the value returned is whatever the device drove onto the
    /// line. Any other byte is written and echoed back unchanged.
    fn touch_byte(&mut self, byte: u8) -> OneWireResult<u8, Self::BusError> {
        if byte == 0xff {
            self.read_byte()
        } else {
            self.write_byte(byte)?;
            Ok(byte)
        }
    }

    /// Exchanges a block of bytes in place, see [`OneWire::touch_byte`].
    ///
    /// Bytes to send are placed in `block`; positions filled with `0xff`
    /// come back holding the device's response.
    fn data_block(&mut self, block: &mut [u8]) -> OneWireResult<(), Self::BusError> {
        for byte in block.iter_mut() {
            *byte = self.touch_byte(*byte)?;
        }
        Ok(())
    }

    /// Whether the bus master can drive a strong pull-up.
    fn can_deliver_power(&self) -> bool {
        false
    }

    /// Arms (or starts) the strong pull-up used to power EEPROM copy cycles.
    ///
    /// The pull-up stays active until [`OneWire::set_power_normal`]; timing the
    /// pull-up is up to the caller.
    fn start_power_delivery(&mut self, _when: PowerDelivery) -> OneWireResult<(), Self::BusError> {
        Err(OneWireError::Unimplemented)
    }

    /// Returns the line to its normal pull-up.
    fn set_power_normal(&mut self) -> OneWireResult<(), Self::BusError> {
        Ok(())
    }

    /// Whether the bus master can generate the 12V EPROM programming pulse.
    fn can_program(&self) -> bool {
        false
    }

    /// Applies one EPROM programming pulse.
    fn program_pulse(&mut self) -> OneWireResult<(), Self::BusError> {
        Err(OneWireError::Unimplemented)
    }
}
