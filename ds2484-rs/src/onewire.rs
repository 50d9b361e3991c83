use crate::{
    Ds2484, Ds2484Error,
    registers::{DeviceStatus, READ_PTR_CMD},
};
use embedded_hal::{
    delay::DelayNs,
    i2c::{I2c, SevenBitAddress},
};
use embedded_onewire::{
    OneWire, OneWireError, OneWireResult, OneWireStatus, PowerDelivery,
    consts::ONEWIRE_SKIP_ROM_CMD_OD,
};

pub(crate) const ONEWIRE_RESET_CMD: u8 = 0xb4;
pub(crate) const ONEWIRE_WRITE_BYTE: u8 = 0xa5;
pub(crate) const ONEWIRE_READ_BYTE: u8 = 0x96;
pub(crate) const ONEWIRE_READ_DATA_PTR: u8 = 0xe1;
pub(crate) const ONEWIRE_SINGLE_BIT: u8 = 0x87;

impl<I2C: I2c<SevenBitAddress>, D: DelayNs> Ds2484<I2C, D> {
    fn ready(&self) -> OneWireResult<(), Ds2484Error<I2C::Error>> {
        if self.reset {
            Err(OneWireError::BusUninitialized)
        } else {
            Ok(())
        }
    }
}

impl<I2C: I2c<SevenBitAddress>, D: DelayNs> OneWire for Ds2484<I2C, D> {
    type Status = DeviceStatus;

    type BusError = Ds2484Error<I2C::Error>;

    fn reset(&mut self) -> OneWireResult<Self::Status, Self::BusError> {
        self.ready()?;
        self.onewire_wait()?;
        self.i2c
            .write(self.addr, &[ONEWIRE_RESET_CMD])
            .map_err(Ds2484Error::from)?;
        let status = self.onewire_wait()?;
        if status.shortcircuit() {
            Err(OneWireError::ShortCircuit)
        } else if !status.presence() {
            Err(OneWireError::NoDevicePresent)
        } else {
            Ok(status)
        }
    }

    fn write_byte(&mut self, byte: u8) -> OneWireResult<(), Self::BusError> {
        self.ready()?;
        self.onewire_wait()?;
        self.i2c
            .write(self.addr, &[ONEWIRE_WRITE_BYTE, byte])
            .map_err(Ds2484Error::from)?;
        Ok(())
    }

    fn read_byte(&mut self) -> OneWireResult<u8, Self::BusError> {
        self.ready()?;
        self.onewire_wait()?;
        self.i2c
            .write(self.addr, &[ONEWIRE_READ_BYTE])
            .map_err(Ds2484Error::from)?;
        self.onewire_wait()?;
        let mut val = [0; 1];
        self.i2c
            .write_read(self.addr, &[READ_PTR_CMD, ONEWIRE_READ_DATA_PTR], &mut val)
            .map_err(Ds2484Error::from)?;
        Ok(val[0])
    }

    fn write_bit(&mut self, bit: bool) -> OneWireResult<(), Self::BusError> {
        self.ready()?;
        self.onewire_wait()?;
        self.i2c
            .write(
                self.addr,
                &[ONEWIRE_SINGLE_BIT, { if bit { 0x80 } else { 0x0 } }],
            )
            .map_err(Ds2484Error::from)?;
        Ok(())
    }

    fn read_bit(&mut self) -> OneWireResult<bool, Self::BusError> {
        self.write_bit(true)?;
        Ok(self.onewire_wait()?.single_bit_result())
    }

    fn get_overdrive_mode(&mut self) -> OneWireResult<bool, Self::BusError> {
        self.ready()?;
        Ok(self.overdrive)
    }

    fn set_overdrive_mode(&mut self, enable: bool) -> OneWireResult<(), Self::BusError> {
        if enable == self.config.onewire_speed() {
            return Ok(());
        }
        if enable {
            // devices follow the Overdrive-Skip ROM, the bridge follows its 1WS bit
            self.reset()?;
            self.write_byte(ONEWIRE_SKIP_ROM_CMD_OD)?;
        }
        self.configure(self.config.with_onewire_speed(enable))?;
        self.overdrive = enable;
        self.reset()?;
        Ok(())
    }

    fn can_deliver_power(&self) -> bool {
        true
    }

    /// Only [`PowerDelivery::AfterNextByte`] is available: the DS2484 starts
    /// its strong pull-up at the end of a 1-Wire command.
    fn start_power_delivery(&mut self, when: PowerDelivery) -> OneWireResult<(), Self::BusError> {
        self.ready()?;
        match when {
            PowerDelivery::AfterNextByte => {
                self.configure(self.config.with_strong_pullup(true))?;
                Ok(())
            }
            PowerDelivery::Now => Err(OneWireError::Unimplemented),
        }
    }

    fn set_power_normal(&mut self) -> OneWireResult<(), Self::BusError> {
        if self.config.strong_pullup() {
            self.configure(self.config.with_strong_pullup(false))?;
        }
        Ok(())
    }
}
