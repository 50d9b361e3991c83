//! Static description of a memory bank.
//!
//! A [`BankConfig`] captures everything that differs between the memory
//! regions of the supported devices: geometry, access flags, the read and
//! write protocols and where the lock/redirection status bytes live. Banks
//! are built once with the `const` builder and shared by reference.

use crate::crc::CrcKind;
use crate::scratchpad::{CopyConfirmation, NibbleConfirmation};

/// Largest page or scratchpad row handled by the bank layer.
pub const MAX_PAGE_LENGTH: usize = 64;

/// Access capabilities of a bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Access {
    /// Memory may hold user data (packets, files).
    pub general_purpose: bool,
    /// Bytes can be rewritten.
    pub read_write: bool,
    /// Bits can only be programmed from 1 to 0.
    pub write_once: bool,
    /// No write path exists.
    pub read_only: bool,
    /// Contents survive power loss.
    pub non_volatile: bool,
    /// Writes need the EPROM programming pulse.
    pub program_pulse: bool,
    /// Writes need a strong pull-up during the copy cycle.
    pub power_delivery: bool,
}

impl Access {
    /// Rewritable EEPROM committed through a scratchpad.
    pub const EEPROM: Access = Access {
        general_purpose: true,
        read_write: true,
        write_once: false,
        read_only: false,
        non_volatile: true,
        program_pulse: false,
        power_delivery: true,
    };

    /// One-time programmable EPROM.
    pub const EPROM: Access = Access {
        general_purpose: true,
        read_write: false,
        write_once: true,
        read_only: false,
        non_volatile: true,
        program_pulse: true,
        power_delivery: false,
    };

    /// Read-only memory.
    pub const READ_ONLY: Access = Access {
        general_purpose: false,
        read_write: false,
        write_once: false,
        read_only: true,
        non_volatile: true,
        program_pulse: false,
        power_delivery: false,
    };

    /// Volatile staging area in front of the EEPROM.
    pub const SCRATCHPAD: Access = Access {
        general_purpose: false,
        read_write: true,
        write_once: false,
        read_only: false,
        non_volatile: false,
        program_pulse: false,
        power_delivery: false,
    };

    /// The same access, but not meant for user data.
    pub const fn register(mut self) -> Self {
        self.general_purpose = false;
        self
    }
}

/// Per-page information some devices send along with a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtraInfo {
    /// Number of bytes.
    pub length: usize,
    /// What the bytes mean.
    pub description: &'static str,
}

/// Where the CRC sits in a paged read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageCrcLayout {
    /// `[cmd, TA1, TA2, extra.., crc]` followed by `[page.., crc]`.
    /// The second CRC is seeded with 0 and covers the page only.
    HeaderThenPage,
    /// `[cmd, TA1, TA2, page.., extra.., crc]` with one CRC over everything.
    /// No CRC follows the address; pages after the first are checked on
    /// their own, from a seed of 0.
    PageWithTrailer,
}

/// How a bank is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadProtocol {
    /// Plain `[cmd, TA1, TA2]` followed by a data stream without CRC.
    Memory {
        /// Read command.
        cmd: u8,
    },
    /// Paged read in which the device appends a CRC to every page.
    PageCrc {
        /// Read command.
        cmd: u8,
        /// CRC placement.
        layout: PageCrcLayout,
        /// CRC flavour.
        crc: CrcKind,
        /// The 8-byte read password follows the address. It is not part of the CRC.
        password: bool,
    },
    /// Register file with a one byte address: `[cmd, addr]` followed by data.
    Register {
        /// Read command.
        cmd: u8,
    },
    /// EEPROM blocks shadowed in RAM. `[recall, block]` loads a page into the
    /// shadow, which is then read like a register file with `[read, addr]`.
    Recall {
        /// Recall command.
        recall: u8,
        /// Read command.
        read: u8,
    },
    /// The scratchpad itself, read with the read scratchpad command of the
    /// bank's [`WriteProtocol::Scratchpad`].
    Scratchpad,
}

/// Completion handling of a copy scratchpad command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyCompletion {
    /// Strong pull-up time in milliseconds. Without one the copy is polled.
    pub strong_pullup_ms: Option<u32>,
    /// Bytes read after the pull-up; the last one carries the completion nibble.
    pub verify_bytes: usize,
}

/// Scratchpad protocol of an EEPROM bank.
#[derive(Debug, Clone, Copy)]
pub struct ScratchpadConfig {
    pub(crate) write_cmd: u8,
    pub(crate) read_cmd: u8,
    pub(crate) copy_cmd: u8,
    pub(crate) erase_cmd: Option<u8>,
    pub(crate) length: usize,
    pub(crate) crc: bool,
    pub(crate) full_rows: bool,
    pub(crate) ending_mask: u8,
    pub(crate) password: bool,
    pub(crate) completion: CopyCompletion,
    pub(crate) confirm: &'static dyn CopyConfirmation,
}

impl ScratchpadConfig {
    /// A scratchpad of `length` bytes using the common command set
    /// (write `0x0F`, read `0xAA`, copy `0x55`), without CRC.
    ///
    /// # Panics
    /// If `length` is not a power of two or exceeds [`MAX_PAGE_LENGTH`].
    pub const fn new(length: usize) -> Self {
        assert!(length.is_power_of_two() && length <= MAX_PAGE_LENGTH);
        Self {
            write_cmd: 0x0f,
            read_cmd: 0xaa,
            copy_cmd: 0x55,
            erase_cmd: None,
            length,
            crc: false,
            full_rows: false,
            ending_mask: 0,
            password: false,
            completion: CopyCompletion {
                strong_pullup_ms: None,
                verify_bytes: 1,
            },
            confirm: &NibbleConfirmation,
        }
    }

    /// Override the write, read and copy commands.
    pub const fn with_commands(mut self, write: u8, read: u8, copy: u8) -> Self {
        self.write_cmd = write;
        self.read_cmd = read;
        self.copy_cmd = copy;
        self
    }

    /// Erase scratchpad command.
    pub const fn with_erase(mut self, cmd: u8) -> Self {
        self.erase_cmd = Some(cmd);
        self
    }

    /// The device returns a CRC16 after full-row writes and after reads.
    pub const fn with_crc(mut self) -> Self {
        self.crc = true;
        self
    }

    /// The device only commits whole rows.
    pub const fn with_full_rows(mut self) -> Self {
        self.full_rows = true;
        self
    }

    /// Bits OR-ed into the ending offset of the copy authorization.
    pub const fn with_ending_mask(mut self, mask: u8) -> Self {
        self.ending_mask = mask;
        self
    }

    /// Copy needs the 8-byte full-access password.
    pub const fn with_password(mut self) -> Self {
        self.password = true;
        self
    }

    /// Strong pull-up for `ms` milliseconds during the copy cycle.
    pub const fn with_strong_pullup(mut self, ms: u32) -> Self {
        self.completion.strong_pullup_ms = Some(ms);
        self
    }

    /// Number of bytes read after the pull-up (at least one).
    pub const fn with_verify_bytes(mut self, count: usize) -> Self {
        assert!(count >= 1 && count <= 4);
        self.completion.verify_bytes = count;
        self
    }

    /// Decoder for the copy completion byte.
    pub const fn with_confirmation(mut self, confirm: &'static dyn CopyConfirmation) -> Self {
        self.confirm = confirm;
        self
    }

    /// Scratchpad length in bytes.
    pub const fn length(&self) -> usize {
        self.length
    }

    /// Whether writes and reads of the scratchpad carry a CRC16.
    pub const fn has_crc(&self) -> bool {
        self.crc
    }

    /// Copy completion settings.
    pub const fn completion(&self) -> CopyCompletion {
        self.completion
    }
}

/// How a bank is written.
#[derive(Debug, Clone, Copy)]
pub enum WriteProtocol {
    /// Not writable.
    None,
    /// EEPROM: write scratchpad, verify, copy.
    Scratchpad(ScratchpadConfig),
    /// EPROM: per-byte programming with a 12V pulse.
    ProgramPulse {
        /// Write command.
        cmd: u8,
        /// CRC the device echoes for every byte.
        crc: CrcKind,
    },
    /// Register file written in place with `[cmd, addr, data..]`.
    Register {
        /// Write command.
        cmd: u8,
    },
    /// Shadowed EEPROM block: the whole page is written to the shadow RAM
    /// with `[write, block, page..]`, read back and committed with
    /// `[copy, block]`.
    Block {
        /// Write command.
        write: u8,
        /// Copy command.
        copy: u8,
        /// Time the device needs to program the block.
        copy_ms: u32,
    },
}

/// Page locking done by a device command rather than a status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockCommand {
    /// `[cmd, key]` copies the register into its EPROM twin and locks it,
    /// under a strong pull-up. `[status_cmd, 0x00]` then reads a status byte
    /// equal to `locked`.
    CopyAndLock {
        /// Copy and lock command.
        cmd: u8,
        /// Validation key following the command.
        key: u8,
        /// Read status command.
        status_cmd: u8,
        /// Status of a locked register.
        locked: u8,
    },
    /// One lock bit per block in a control register, bit 0 for page 0.
    /// Locking needs the `enable` bit set in the same register before
    /// `[cmd, block address]` is sent.
    Block {
        /// Address of the control register.
        register: u8,
        /// Lock enable bit.
        enable: u8,
        /// Lock command.
        cmd: u8,
    },
}

/// Encoding of a status byte that marks a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLayout {
    /// One bit per page, eight pages per byte. A cleared bit means set.
    Bitmap,
    /// One byte per page, set when it holds `sentinel`.
    Flag {
        /// Marker value.
        sentinel: u8,
    },
    /// One byte per page holding the one's complement of a page number.
    /// `0xFF` means unset.
    InvertedPage,
}

/// Location of per-page status bytes in another bank.
#[derive(Debug, Clone, Copy)]
pub struct StatusLink {
    /// Bank holding the status bytes.
    pub bank: &'static BankConfig,
    /// Offset of the status of page 0 within that bank.
    pub offset: usize,
    /// Encoding of the status.
    pub layout: StatusLayout,
}

impl StatusLink {
    /// Byte offset within the status bank and the bits of that byte that
    /// belong to `page`.
    pub(crate) const fn locate(&self, page: usize) -> (usize, u8) {
        match self.layout {
            StatusLayout::Bitmap => (self.offset + page / 8, 1 << (page % 8)),
            _ => (self.offset + page, 0xff),
        }
    }
}

/// Physical address range that plain writes must never touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtectedWindow {
    /// First address.
    pub start: u16,
    /// Number of bytes.
    pub length: u16,
}

impl ProtectedWindow {
    /// Whether `[start, end)` overlaps this window.
    pub const fn overlaps(&self, start: usize, end: usize) -> bool {
        let first = self.start as usize;
        start < first + self.length as usize && first < end
    }
}

/// Immutable description of one memory bank.
#[derive(Debug, Clone, Copy)]
pub struct BankConfig {
    description: &'static str,
    start: u16,
    page_length: usize,
    number_pages: usize,
    access: Access,
    extra_info: Option<ExtraInfo>,
    read: ReadProtocol,
    write: WriteProtocol,
    lock: Option<StatusLink>,
    write_once: Option<StatusLink>,
    redirect: Option<StatusLink>,
    lock_redirect: Option<StatusLink>,
    lock_command: Option<LockCommand>,
    protected: &'static [ProtectedWindow],
}

impl BankConfig {
    /// A read-only bank of `pages` pages of `page_length` bytes starting at
    /// physical address `start`, read with the plain `0xF0` command.
    ///
    /// # Panics
    /// If the geometry is empty, a page is longer than [`MAX_PAGE_LENGTH`],
    /// or the bank does not fit the 16-bit address space.
    pub const fn new(description: &'static str, start: u16, page_length: usize, pages: usize) -> Self {
        assert!(page_length > 0 && page_length <= MAX_PAGE_LENGTH && pages > 0);
        assert!(start as usize + page_length * pages <= 0x1_0000);
        Self {
            description,
            start,
            page_length,
            number_pages: pages,
            access: Access::READ_ONLY,
            extra_info: None,
            read: ReadProtocol::Memory { cmd: 0xf0 },
            write: WriteProtocol::None,
            lock: None,
            write_once: None,
            redirect: None,
            lock_redirect: None,
            lock_command: None,
            protected: &[],
        }
    }

    /// The scratchpad described by `scratchpad`, exposed as a one page bank.
    ///
    /// Reads return the scratchpad from the offset of its target address
    /// and writes stage data with the bank address as target address.
    pub const fn scratchpad(description: &'static str, scratchpad: ScratchpadConfig) -> Self {
        Self::new(description, 0, scratchpad.length, 1)
            .with_access(Access::SCRATCHPAD)
            .with_extra_info(3, "Target address and ending offset")
            .with_read(ReadProtocol::Scratchpad)
            .with_write(WriteProtocol::Scratchpad(scratchpad))
    }

    /// Access flags.
    pub const fn with_access(mut self, access: Access) -> Self {
        self.access = access;
        self
    }

    /// Extra information returned with each page.
    pub const fn with_extra_info(mut self, length: usize, description: &'static str) -> Self {
        assert!(length <= 8);
        self.extra_info = Some(ExtraInfo {
            length,
            description,
        });
        self
    }

    /// Read protocol.
    pub const fn with_read(mut self, read: ReadProtocol) -> Self {
        self.read = read;
        self
    }

    /// Write protocol.
    pub const fn with_write(mut self, write: WriteProtocol) -> Self {
        if let WriteProtocol::Scratchpad(sp) = &write {
            assert!(self.page_length % sp.length == 0 || sp.length % self.page_length == 0);
        }
        self.write = write;
        self
    }

    /// Page lock status bytes.
    pub const fn with_lock(mut self, link: StatusLink) -> Self {
        self.lock = Some(link);
        self
    }

    /// Write-once (EPROM emulation) status bytes.
    pub const fn with_write_once(mut self, link: StatusLink) -> Self {
        self.write_once = Some(link);
        self
    }

    /// Page redirection bytes.
    pub const fn with_redirect(mut self, link: StatusLink) -> Self {
        self.redirect = Some(link);
        self
    }

    /// Redirection lock bits.
    pub const fn with_lock_redirect(mut self, link: StatusLink) -> Self {
        self.lock_redirect = Some(link);
        self
    }

    /// Locking by device command.
    pub const fn with_lock_command(mut self, command: LockCommand) -> Self {
        self.lock_command = Some(command);
        self
    }

    /// Ranges that plain writes must reject.
    pub const fn with_protected(mut self, windows: &'static [ProtectedWindow]) -> Self {
        self.protected = windows;
        self
    }

    /// Bank description.
    pub const fn description(&self) -> &'static str {
        self.description
    }

    /// First physical address.
    pub const fn start_physical_address(&self) -> u16 {
        self.start
    }

    /// Bank size in bytes.
    pub const fn size(&self) -> usize {
        self.page_length * self.number_pages
    }

    /// Page length in bytes.
    pub const fn page_length(&self) -> usize {
        self.page_length
    }

    /// Number of pages.
    pub const fn number_pages(&self) -> usize {
        self.number_pages
    }

    /// Largest packet payload: the page minus the length byte and the CRC16.
    pub const fn max_packet_data_length(&self) -> usize {
        self.page_length.saturating_sub(3)
    }

    /// Access flags.
    pub const fn access(&self) -> Access {
        self.access
    }

    /// Extra information returned with each page.
    pub const fn extra_info(&self) -> Option<ExtraInfo> {
        self.extra_info
    }

    /// Read protocol.
    pub const fn read_protocol(&self) -> ReadProtocol {
        self.read
    }

    /// Write protocol.
    pub const fn write_protocol(&self) -> &WriteProtocol {
        &self.write
    }

    /// Page lock status bytes.
    pub const fn lock(&self) -> Option<&StatusLink> {
        self.lock.as_ref()
    }

    /// Write-once status bytes.
    pub const fn write_once(&self) -> Option<&StatusLink> {
        self.write_once.as_ref()
    }

    /// Page redirection bytes.
    pub const fn redirect(&self) -> Option<&StatusLink> {
        self.redirect.as_ref()
    }

    /// Redirection lock bits.
    pub const fn lock_redirect(&self) -> Option<&StatusLink> {
        self.lock_redirect.as_ref()
    }

    /// Locking by device command.
    pub const fn lock_command(&self) -> Option<LockCommand> {
        self.lock_command
    }

    /// Ranges plain writes reject.
    pub const fn protected(&self) -> &'static [ProtectedWindow] {
        self.protected
    }

    /// Physical address of the first byte of `page`.
    pub(crate) const fn page_address(&self, page: usize) -> usize {
        self.start as usize + page * self.page_length
    }

    /// Extra information length, 0 when there is none.
    pub(crate) const fn extra_length(&self) -> usize {
        match self.extra_info {
            Some(info) => info.length,
            None => 0,
        }
    }
}
