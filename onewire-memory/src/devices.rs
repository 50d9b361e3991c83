//! Memory maps of supported devices.

use crate::config::{
    Access, BankConfig, LockCommand, PageCrcLayout, ProtectedWindow, ReadProtocol, ScratchpadConfig, StatusLayout,
    StatusLink, WriteProtocol,
};
use crate::crc::CrcKind;
use crate::scratchpad::PasswordConfirmation;

/// A device family and its memory banks.
#[derive(Debug)]
pub struct DeviceProfile {
    /// Family code, the low byte of the ROM id.
    pub family: u8,
    /// Part name.
    pub name: &'static str,
    /// Memory banks, general purpose memory first.
    pub banks: &'static [&'static BankConfig],
}

const DS2431_SCRATCHPAD: ScratchpadConfig = ScratchpadConfig::new(8)
    .with_crc()
    .with_full_rows()
    .with_strong_pullup(10);

/// DS2431 scratchpad.
pub static DS2431_SCRATCH: BankConfig = BankConfig::scratchpad("Scratchpad", DS2431_SCRATCHPAD);

/// DS2431 page protection and factory bytes.
pub static DS2431_CONTROL: BankConfig = BankConfig::new("Protection control and factory bytes", 0x0080, 8, 1)
    .with_access(Access::EEPROM.register())
    .with_write(WriteProtocol::Scratchpad(DS2431_SCRATCHPAD));

/// DS2431 1 Kbit EEPROM.
pub static DS2431_MAIN: BankConfig = BankConfig::new("Main memory", 0x0000, 32, 4)
    .with_access(Access::EEPROM)
    .with_write(WriteProtocol::Scratchpad(DS2431_SCRATCHPAD))
    .with_lock(StatusLink {
        bank: &DS2431_CONTROL,
        offset: 0,
        layout: StatusLayout::Flag { sentinel: 0x55 },
    })
    .with_write_once(StatusLink {
        bank: &DS2431_CONTROL,
        offset: 0,
        layout: StatusLayout::Flag { sentinel: 0xaa },
    });

const DS2433_SCRATCHPAD: ScratchpadConfig = ScratchpadConfig::new(32).with_strong_pullup(5);

/// DS2433 4 Kbit EEPROM.
pub static DS2433_MAIN: BankConfig = BankConfig::new("Main memory", 0x0000, 32, 16)
    .with_access(Access::EEPROM)
    .with_write(WriteProtocol::Scratchpad(DS2433_SCRATCHPAD));

/// DS2433 scratchpad.
pub static DS2433_SCRATCH: BankConfig = BankConfig::scratchpad("Scratchpad", DS2433_SCRATCHPAD);

const DS28EC20_SCRATCHPAD: ScratchpadConfig = ScratchpadConfig::new(32).with_crc().with_strong_pullup(10);

/// DS28EC20 20 Kbit EEPROM.
pub static DS28EC20_MAIN: BankConfig = BankConfig::new("Main memory", 0x0000, 32, 80)
    .with_access(Access::EEPROM)
    .with_read(ReadProtocol::PageCrc {
        cmd: 0xa5,
        layout: PageCrcLayout::PageWithTrailer,
        crc: CrcKind::Crc16,
        password: false,
    })
    .with_write(WriteProtocol::Scratchpad(DS28EC20_SCRATCHPAD));

/// DS28EC20 scratchpad.
pub static DS28EC20_SCRATCH: BankConfig = BankConfig::scratchpad("Scratchpad", DS28EC20_SCRATCHPAD);

const DS1977_SCRATCHPAD: ScratchpadConfig = ScratchpadConfig::new(64)
    .with_commands(0x0f, 0xaa, 0x99)
    .with_crc()
    .with_password()
    .with_strong_pullup(10)
    .with_confirmation(&PasswordConfirmation);

const DS1977_READ: ReadProtocol = ReadProtocol::PageCrc {
    cmd: 0x69,
    layout: PageCrcLayout::PageWithTrailer,
    crc: CrcKind::Crc16,
    password: true,
};

/// DS1977 32 Kbyte password protected EEPROM.
pub static DS1977_MAIN: BankConfig = BankConfig::new("Main memory", 0x0000, 64, 511)
    .with_access(Access::EEPROM)
    .with_read(DS1977_READ)
    .with_write(WriteProtocol::Scratchpad(DS1977_SCRATCHPAD));

/// DS1977 scratchpad.
pub static DS1977_SCRATCH: BankConfig = BankConfig::scratchpad("Scratchpad", DS1977_SCRATCHPAD);

/// DS1977 password registers and password control byte.
pub static DS1977_REGISTERS: BankConfig = BankConfig::new("Password registers", 0x7fc0, 64, 1)
    .with_access(Access::EEPROM.register())
    .with_read(DS1977_READ)
    .with_write(WriteProtocol::Scratchpad(DS1977_SCRATCHPAD))
    .with_protected(&[ProtectedWindow {
        start: 0x7fc0,
        length: 17,
    }]);

/// DS2505 status memory: write protection bits and page redirection bytes.
pub static DS2505_STATUS: BankConfig = BankConfig::new("Status memory", 0x0000, 32, 11)
    .with_access(Access::EPROM.register())
    .with_read(ReadProtocol::PageCrc {
        cmd: 0xaa,
        layout: PageCrcLayout::HeaderThenPage,
        crc: CrcKind::Crc16,
        password: false,
    })
    .with_write(WriteProtocol::ProgramPulse {
        cmd: 0x55,
        crc: CrcKind::Crc16,
    });

/// DS2505 16 Kbit EPROM.
pub static DS2505_MAIN: BankConfig = BankConfig::new("Main memory", 0x0000, 32, 64)
    .with_access(Access::EPROM)
    .with_extra_info(1, "Inverted redirection page")
    .with_read(ReadProtocol::PageCrc {
        cmd: 0xa5,
        layout: PageCrcLayout::HeaderThenPage,
        crc: CrcKind::Crc16,
        password: false,
    })
    .with_write(WriteProtocol::ProgramPulse {
        cmd: 0x0f,
        crc: CrcKind::Crc16,
    })
    .with_lock(StatusLink {
        bank: &DS2505_STATUS,
        offset: 0x000,
        layout: StatusLayout::Bitmap,
    })
    .with_lock_redirect(StatusLink {
        bank: &DS2505_STATUS,
        offset: 0x020,
        layout: StatusLayout::Bitmap,
    })
    .with_redirect(StatusLink {
        bank: &DS2505_STATUS,
        offset: 0x100,
        layout: StatusLayout::InvertedPage,
    });

/// DS2406 status memory: write protection bits, redirection bytes and
/// the switch control byte.
pub static DS2406_STATUS: BankConfig = BankConfig::new("Status memory", 0x0000, 8, 1)
    .with_access(Access::EPROM.register())
    .with_read(ReadProtocol::PageCrc {
        cmd: 0xaa,
        layout: PageCrcLayout::PageWithTrailer,
        crc: CrcKind::Crc16,
        password: false,
    })
    .with_write(WriteProtocol::ProgramPulse {
        cmd: 0x55,
        crc: CrcKind::Crc16,
    });

/// DS2406 1 Kbit EPROM.
pub static DS2406_MAIN: BankConfig = BankConfig::new("Main memory", 0x0000, 32, 4)
    .with_access(Access::EPROM)
    .with_extra_info(1, "Inverted redirection page")
    .with_read(ReadProtocol::PageCrc {
        cmd: 0xa5,
        layout: PageCrcLayout::HeaderThenPage,
        crc: CrcKind::Crc16,
        password: false,
    })
    .with_write(WriteProtocol::ProgramPulse {
        cmd: 0x0f,
        crc: CrcKind::Crc16,
    })
    .with_lock(StatusLink {
        bank: &DS2406_STATUS,
        offset: 0,
        layout: StatusLayout::Bitmap,
    })
    .with_redirect(StatusLink {
        bank: &DS2406_STATUS,
        offset: 1,
        layout: StatusLayout::InvertedPage,
    });

/// DS2502 status memory.
pub static DS2502_STATUS: BankConfig = BankConfig::new("Status memory", 0x0000, 8, 1)
    .with_access(Access::EPROM.register())
    .with_read(ReadProtocol::PageCrc {
        cmd: 0xaa,
        layout: PageCrcLayout::HeaderThenPage,
        crc: CrcKind::Crc8,
        password: false,
    })
    .with_write(WriteProtocol::ProgramPulse {
        cmd: 0x55,
        crc: CrcKind::Crc8,
    });

/// DS2502 1 Kbit EPROM, CRC8 protected.
pub static DS2502_MAIN: BankConfig = BankConfig::new("Main memory", 0x0000, 32, 4)
    .with_access(Access::EPROM)
    .with_read(ReadProtocol::PageCrc {
        cmd: 0xc3,
        layout: PageCrcLayout::HeaderThenPage,
        crc: CrcKind::Crc8,
        password: false,
    })
    .with_write(WriteProtocol::ProgramPulse {
        cmd: 0x0f,
        crc: CrcKind::Crc8,
    })
    .with_lock(StatusLink {
        bank: &DS2502_STATUS,
        offset: 0,
        layout: StatusLayout::Bitmap,
    })
    .with_redirect(StatusLink {
        bank: &DS2502_STATUS,
        offset: 1,
        layout: StatusLayout::InvertedPage,
    });

/// DS2430 64 bit application register. Locking copies it to EPROM.
pub static DS2430_APPLICATION: BankConfig = BankConfig::new("Application register", 0x0000, 8, 1)
    .with_access(Access {
        general_purpose: true,
        read_write: true,
        write_once: false,
        read_only: false,
        non_volatile: false,
        program_pulse: false,
        power_delivery: true,
    })
    .with_extra_info(1, "Page locked flag")
    .with_read(ReadProtocol::Register { cmd: 0xc3 })
    .with_write(WriteProtocol::Register { cmd: 0x99 })
    .with_lock_command(LockCommand::CopyAndLock {
        cmd: 0x5a,
        key: 0xa5,
        status_cmd: 0x66,
        locked: 0xfc,
    });

/// DS2760 EEPROM, two 16 byte blocks shadowed at 0x20 and 0x30.
pub static DS2760_EEPROM: BankConfig = BankConfig::new("EEPROM blocks", 0x0020, 16, 2)
    .with_access(Access {
        general_purpose: true,
        read_write: true,
        write_once: false,
        read_only: false,
        non_volatile: true,
        program_pulse: false,
        power_delivery: false,
    })
    .with_read(ReadProtocol::Recall { recall: 0xb8, read: 0x69 })
    .with_write(WriteProtocol::Block {
        write: 0x6c,
        copy: 0x48,
        copy_ms: 10,
    })
    .with_lock_command(LockCommand::Block {
        register: 0x07,
        enable: 0x40,
        cmd: 0x6a,
    });

/// Supported devices.
pub static DEVICES: [DeviceProfile; 9] = [
    DeviceProfile {
        family: 0x2d,
        name: "DS2431",
        banks: &[&DS2431_MAIN, &DS2431_CONTROL, &DS2431_SCRATCH],
    },
    DeviceProfile {
        family: 0x23,
        name: "DS2433",
        banks: &[&DS2433_MAIN, &DS2433_SCRATCH],
    },
    DeviceProfile {
        family: 0x43,
        name: "DS28EC20",
        banks: &[&DS28EC20_MAIN, &DS28EC20_SCRATCH],
    },
    DeviceProfile {
        family: 0x37,
        name: "DS1977",
        banks: &[&DS1977_MAIN, &DS1977_REGISTERS, &DS1977_SCRATCH],
    },
    DeviceProfile {
        family: 0x0b,
        name: "DS2505",
        banks: &[&DS2505_MAIN, &DS2505_STATUS],
    },
    DeviceProfile {
        family: 0x12,
        name: "DS2406",
        banks: &[&DS2406_MAIN, &DS2406_STATUS],
    },
    DeviceProfile {
        family: 0x09,
        name: "DS2502",
        banks: &[&DS2502_MAIN, &DS2502_STATUS],
    },
    DeviceProfile {
        family: 0x14,
        name: "DS2430",
        banks: &[&DS2430_APPLICATION],
    },
    DeviceProfile {
        family: 0x30,
        name: "DS2760",
        banks: &[&DS2760_EEPROM],
    },
];

/// Device with the given family code.
pub fn by_family(family: u8) -> Option<&'static DeviceProfile> {
    DEVICES.iter().find(|device| device.family == family)
}

/// Device with the given part name, ignoring case.
pub fn by_name(name: &str) -> Option<&'static DeviceProfile> {
    DEVICES.iter().find(|device| device.name.eq_ignore_ascii_case(name))
}

/// Password handling of the DS1977.
///
/// The password registers can only be written through these functions;
/// plain writes to the register bank are rejected.
pub mod ds1977 {
    use embedded_hal::delay::DelayNs;
    use embedded_onewire::OneWire;
    use log::{info, warn};

    use super::DS1977_REGISTERS;
    use crate::bank::MemoryBank;
    use crate::error::{MemoryError, MemoryResult};
    use crate::session::BusSession;

    /// Address of the read access password.
    pub const READ_ACCESS_PASSWORD: u16 = 0x7fc0;
    /// Address of the full access password.
    pub const FULL_ACCESS_PASSWORD: u16 = 0x7fc8;
    /// Address of the password control byte.
    pub const PASSWORD_CONTROL: u16 = 0x7fd0;

    const VERIFY_PASSWORD_CMD: u8 = 0xc3;
    const PASSWORD_ENABLE: u8 = 0xaa;
    const PASSWORD_DISABLE: u8 = 0x00;

    /// Which password to act on.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum PasswordKind {
        /// Read access.
        Read,
        /// Full (read and write) access.
        Full,
    }

    impl PasswordKind {
        fn register(self) -> u16 {
            match self {
                PasswordKind::Read => READ_ACCESS_PASSWORD,
                PasswordKind::Full => FULL_ACCESS_PASSWORD,
            }
        }
    }

    fn register_offset(address: u16) -> usize {
        (address - DS1977_REGISTERS.start_physical_address()) as usize
    }

    /// Check `password` against the device register.
    ///
    /// Needs a strong pull-up while the device compares.
    pub fn verify_password<O: OneWire, D: DelayNs>(
        session: &mut BusSession<'_, O, D>,
        kind: PasswordKind,
        password: &[u8; 8],
    ) -> MemoryResult<bool, O::BusError> {
        if !session.can_deliver_power() {
            return Err(MemoryError::Unsupported("password verification without strong pull-up"));
        }
        let mut raw = [0xff; 11];
        raw[0] = VERIFY_PASSWORD_CMD;
        raw[1..3].copy_from_slice(&kind.register().to_le_bytes());
        raw[3..].copy_from_slice(password);
        session.select()?;
        session.block(&mut raw[..10])?;
        session.power_after_next_byte()?;
        session.write_byte(raw[10])?;
        session.delay_ms(5);
        session.set_power_normal()?;
        Ok(session.read_byte()? == 0xaa)
    }

    /// Write a new device password.
    ///
    /// The session keeps using the new password once the device confirms it.
    /// Returns whether the device did.
    pub fn set_device_password<O: OneWire, D: DelayNs>(
        session: &mut BusSession<'_, O, D>,
        kind: PasswordKind,
        password: &[u8; 8],
    ) -> MemoryResult<bool, O::BusError> {
        let registers = MemoryBank::new(&DS1977_REGISTERS);
        let offset = register_offset(kind.register());
        registers.settle(registers.write_checked(session, offset, password, false))?;
        let accepted = verify_password(session, kind, password)?;
        if accepted {
            let mut passwords = *session.passwords();
            match kind {
                PasswordKind::Read => passwords.read = Some(*password),
                PasswordKind::Full => passwords.full = Some(*password),
            }
            session.set_passwords(passwords);
            info!("DS1977 {kind:?} password changed");
        } else {
            warn!("DS1977 did not accept the new {kind:?} password");
        }
        Ok(accepted)
    }

    /// Turn password protection on or off.
    ///
    /// Both passwords must be known to the session to enable protection,
    /// the full access password to disable it.
    pub fn set_password_enable<O: OneWire, D: DelayNs>(
        session: &mut BusSession<'_, O, D>,
        enable: bool,
    ) -> MemoryResult<(), O::BusError> {
        let passwords = session.passwords();
        if passwords.full.is_none() || (enable && passwords.read.is_none()) {
            return Err(MemoryError::Unsupported("password control without session passwords"));
        }
        let registers = MemoryBank::new(&DS1977_REGISTERS);
        let value = if enable { PASSWORD_ENABLE } else { PASSWORD_DISABLE };
        registers.settle(registers.write_checked(session, register_offset(PASSWORD_CONTROL), &[value], false))?;
        info!("DS1977 passwords {}", if enable { "enabled" } else { "disabled" });
        Ok(())
    }

    /// Whether password protection is on.
    pub fn is_password_enabled<O: OneWire, D: DelayNs>(
        session: &mut BusSession<'_, O, D>,
    ) -> MemoryResult<bool, O::BusError> {
        let registers = MemoryBank::new(&DS1977_REGISTERS);
        let mut control = [0];
        registers.read(session, register_offset(PASSWORD_CONTROL), &mut control)?;
        Ok(control[0] == PASSWORD_ENABLE)
    }
}
