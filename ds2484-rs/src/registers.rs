use crate::{Ds2484Error, Ds2484Result, traits::Register};
use bitfield_struct::bitfield;
use embedded_hal::{
    delay::DelayNs,
    i2c::{I2c, SevenBitAddress},
};
use embedded_onewire::OneWireStatus;

pub(crate) const READ_PTR_CMD: u8 = 0xe1; // Set the read pointer
pub(crate) const DEVICE_STATUS_PTR: u8 = 0xf0; // Device status register
pub(crate) const DEVICE_RST_CMD: u8 = 0xf0; // Reset the device
pub(crate) const DEFAULT_ADDR: u8 = 0x18;

/// A DS2484 I2C to 1-Wire bridge device.
///
/// Takes ownership of an I2C bus (implementing [`I2c`](embedded_hal::i2c::I2c) trait)
/// and a timer object implementing the [`DelayNs`](embedded_hal::delay::DelayNs) trait.
/// Create one with [`Ds2484Builder`].
pub struct Ds2484<I, D> {
    pub(crate) i2c: I,
    pub(crate) addr: u8,
    pub(crate) delay: D,
    pub(crate) retries: u8,
    pub(crate) reset: bool, // Device reset, configuration not written since
    pub(crate) overdrive: bool,
    pub(crate) config: DeviceConfiguration,
}

/// Builder for creating a [`Ds2484`] instance with custom configuration.
pub struct Ds2484Builder {
    pub(crate) retries: u8,
    pub(crate) config: DeviceConfiguration,
}

impl Default for Ds2484Builder {
    fn default() -> Self {
        Ds2484Builder {
            retries: 100,
            config: DeviceConfiguration::new().with_active_pullup(true),
        }
    }
}

impl Ds2484Builder {
    /// Sets the retry count for the device.
    ///
    /// The retry count is used to determine how long
    /// the host waits before operations on the 1-Wire
    /// or I2C bus time out.
    pub fn with_retries(mut self, retries: u8) -> Self {
        self.retries = retries;
        self
    }

    /// Sets the device configuration.
    ///
    /// The strong pull-up bit is ignored: it is armed per transfer through
    /// [`OneWire::start_power_delivery`](embedded_onewire::OneWire::start_power_delivery).
    pub fn with_config(mut self, config: DeviceConfiguration) -> Self {
        self.config = config.with_strong_pullup(false);
        self
    }

    /// Builds a new `Ds2484` instance with the specified configuration.
    pub fn build<I: I2c<SevenBitAddress>, D: DelayNs>(
        self,
        i2c: I,
        delay: D,
    ) -> Ds2484Result<Ds2484<I, D>, I::Error> {
        let mut dev = Ds2484 {
            i2c,
            addr: DEFAULT_ADDR,
            delay,
            retries: self.retries,
            reset: false,
            overdrive: false,
            config: self.config,
        };
        dev.bus_reset()?;
        self.config.write(&mut dev)?;
        dev.overdrive = self.config.onewire_speed();
        Ok(dev)
    }
}

impl<I: I2c<SevenBitAddress>, D: DelayNs> Ds2484<I, D> {
    /// Get the status of the device.
    pub fn get_status(&mut self) -> Ds2484Result<DeviceStatus, I::Error> {
        DeviceStatus::read(self)
    }

    /// Configuration last written to the device.
    pub fn configuration(&self) -> DeviceConfiguration {
        self.config
    }

    /// Give back the I2C bus and the timer.
    pub fn release(self) -> (I, D) {
        (self.i2c, self.delay)
    }

    /// Reset the device.
    ///
    /// Performs a global reset of device state machine logic. Terminates any ongoing 1-Wire
    /// communication, including a strong pull-up.
    pub fn bus_reset(&mut self) -> Ds2484Result<DeviceStatus, I::Error> {
        self.i2c.write(self.addr, &[DEVICE_RST_CMD])?;
        self.reset = true;
        let mut buf = [0];
        for _ in 0..=self.retries {
            self.i2c.read(self.addr, &mut buf)?;
            let status = DeviceStatus::from_bits(buf[0]);
            if status.device_reset() {
                return Ok(status);
            }
            self.delay.delay_ms(1);
        }
        Err(Ds2484Error::RetriesExceeded)
    }

    /// Poll the status register until the 1-Wire line is idle.
    pub(crate) fn onewire_wait(&mut self) -> Ds2484Result<DeviceStatus, I::Error> {
        self.i2c
            .write(self.addr, &[READ_PTR_CMD, DEVICE_STATUS_PTR])?;
        let mut buf = [0];
        for _ in 0..=self.retries {
            self.i2c.read(self.addr, &mut buf)?;
            let status = DeviceStatus::from_bits(buf[0]);
            if !status.onewire_busy() {
                return Ok(status);
            }
            self.delay.delay_ms(1);
        }
        Err(Ds2484Error::RetriesExceeded)
    }

    /// Write `config` and keep it as the current configuration.
    pub(crate) fn configure(&mut self, config: DeviceConfiguration) -> Ds2484Result<(), I::Error> {
        config.write(self)?;
        self.config = config;
        Ok(())
    }
}

/// Status register for DS2484.
///
/// Reports bit-type data from the 1-Wire side, the 1-Wire busy flag and the
/// device reset flag. Every 1-Wire command leaves the read pointer on this
/// register.
#[bitfield(u8)]
pub struct DeviceStatus {
    /// 1-Wire busy (1WB): a 1-Wire command is still running.
    pub(crate) onewire_busy: bool,
    /// Presence pulse detect (PPD), updated by every 1-Wire reset.
    present_pulse_detect: bool,
    /// Short detected (SD) during the last presence-detect cycle.
    pub(crate) short_detect: bool,
    /// Logic level (LL) of the 1-Wire line, sampled when the register is read.
    pub logic_level: bool,
    /// Device reset (RST): the DS2484 has reset and awaits its configuration.
    pub device_reset: bool,
    /// Single bit result (SBR) of the last single bit command.
    pub(crate) single_bit_result: bool,
    /// Triplet second bit (TSB).
    pub(crate) triplet_second_bit: bool,
    /// Branch direction taken (DIR) by the last triplet.
    pub(crate) branch_dir_taken: bool,
}

impl OneWireStatus for DeviceStatus {
    fn presence(&self) -> bool {
        self.present_pulse_detect()
    }

    fn shortcircuit(&self) -> bool {
        self.short_detect()
    }

    fn logic_level(&self) -> Option<bool> {
        Some(self.logic_level())
    }

    fn direction(&self) -> Option<bool> {
        Some(self.branch_dir_taken())
    }
}

impl Register for DeviceStatus {
    const WRITE_CMD: u8 = 0x0;

    const READ_PTR: u8 = DEVICE_STATUS_PTR;

    fn read<I: I2c<SevenBitAddress>, D: DelayNs>(
        dev: &mut crate::Ds2484<I, D>,
    ) -> Result<Self, Ds2484Error<I::Error>> {
        let mut buf = [0];
        dev.i2c
            .write_read(dev.addr, &[READ_PTR_CMD, Self::READ_PTR], &mut buf)?;
        Ok(Self::from_bits(buf[0]))
    }

    fn write<I: I2c<SevenBitAddress>, D: DelayNs>(
        &self,
        _dev: &mut crate::Ds2484<I, D>,
    ) -> Result<(), Ds2484Error<I::Error>> {
        Ok(())
    }
}

#[bitfield(u8, into = cfg_to_u8)]
/// # Device configuration register
///
/// Selects the 1-Wire features of the bridge:
/// - Active Pullup (APU)
/// - 1-Wire Power-Down (PDN)
/// - Strong Pullup (SPU)
/// - 1-Wire Speed (1WS)
///
/// SPU returns to 0 by itself once the strong pull-up has ended. After a
/// device reset the register reads 00h.
pub struct DeviceConfiguration {
    /// Drive rising edges with the active pull-up instead of the resistor.
    pub active_pullup: bool,
    /// Remove power from the 1-Wire port.
    pub power_down_1wire: bool,
    /// Strong pull-up after the next 1-Wire Write Byte or Single Bit.
    ///
    /// EEPROM devices need it while they copy their scratchpad; the pull-up
    /// lasts until the next command sent to the DS2484.
    pub strong_pullup: bool,
    /// Overdrive speed (1WS).
    pub onewire_speed: bool,
    #[bits(4)]
    reserved: u8,
}

/// The upper nibble written must be the one's complement of the lower one.
const fn cfg_to_u8(cfg: u8) -> u8 {
    (cfg & 0x0f) | ((!cfg & 0x0f) << 4)
}

impl Register for DeviceConfiguration {
    const WRITE_CMD: u8 = 0xd2;
    const READ_PTR: u8 = 0xc3;

    fn read<I: I2c<SevenBitAddress>, D: DelayNs>(
        dev: &mut crate::Ds2484<I, D>,
    ) -> Result<Self, Ds2484Error<I::Error>> {
        let mut buf = [0];
        dev.i2c
            .write_read(dev.addr, &[READ_PTR_CMD, Self::READ_PTR], &mut buf)?;
        Ok(Self::from_bits(buf[0] & 0x0f))
    }

    fn write<I: I2c<SevenBitAddress>, D: DelayNs>(
        &self,
        dev: &mut crate::Ds2484<I, D>,
    ) -> Result<(), Ds2484Error<I::Error>> {
        dev.onewire_wait()?;
        let mut echo = [0];
        dev.i2c
            .write_read(dev.addr, &[Self::WRITE_CMD, self.into_bits()], &mut echo)?;
        dev.reset = false;
        Ok(())
    }
}
