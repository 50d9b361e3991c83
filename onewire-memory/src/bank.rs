//! Reading and writing a memory bank.

use core::cell::Cell;
use embedded_hal::delay::DelayNs;
use embedded_onewire::{OneWire, OneWireCrc16};
use log::{debug, trace, warn};

use crate::config::{BankConfig, LockCommand, MAX_PAGE_LENGTH, PageCrcLayout, ReadProtocol, ScratchpadConfig, WriteProtocol};
use crate::crc::CrcCheck;
use crate::error::{MemoryError, MemoryResult};
use crate::scratchpad::Scratchpad;
use crate::session::{BusSession, Chain};

/// Whether the bus speed and device presence are known to be good.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyState {
    /// The last operation succeeded.
    Verified,
    /// Renegotiate the bus speed before the next operation.
    NeedsReverify,
}

/// A memory bank of one device.
///
/// The bank holds no bus: every operation takes the [`BusSession`] it runs
/// in. Apart from the write verification switch, the only state kept here
/// is the [`VerifyState`] and the pages this bank has seen locked, which
/// stay locked for the life of the device.
#[derive(Debug)]
pub struct MemoryBank<'c> {
    pub(crate) config: &'c BankConfig,
    pub(crate) state: Cell<VerifyState>,
    pub(crate) write_verification: Cell<bool>,
    pub(crate) locked: Cell<u128>,
}

impl<'c> MemoryBank<'c> {
    /// A bank described by `config`, with write verification on.
    pub fn new(config: &'c BankConfig) -> Self {
        Self {
            config,
            state: Cell::new(VerifyState::NeedsReverify),
            write_verification: Cell::new(true),
            locked: Cell::new(0),
        }
    }

    /// Bank holding status bytes of this one. Shares the verify state and
    /// never verifies writes, those are checked by reading the status back.
    pub(crate) fn auxiliary(&self, config: &'static BankConfig) -> MemoryBank<'static> {
        let bank = MemoryBank::new(config);
        bank.state.set(self.state.get());
        bank.write_verification.set(false);
        bank
    }

    /// Static description of the bank.
    pub fn config(&self) -> &'c BankConfig {
        self.config
    }

    /// Bank description.
    pub fn description(&self) -> &'static str {
        self.config.description()
    }

    /// First physical address of the bank.
    pub fn start_physical_address(&self) -> u16 {
        self.config.start_physical_address()
    }

    /// Size in bytes.
    pub fn size(&self) -> usize {
        self.config.size()
    }

    /// Page length in bytes.
    pub fn page_length(&self) -> usize {
        self.config.page_length()
    }

    /// Number of pages.
    pub fn number_pages(&self) -> usize {
        self.config.number_pages()
    }

    /// Largest payload of a page packet.
    pub fn max_packet_data_length(&self) -> usize {
        self.config.max_packet_data_length()
    }

    /// Memory meant for user data.
    pub fn is_general_purpose_memory(&self) -> bool {
        self.config.access().general_purpose
    }

    /// Bytes can be rewritten.
    pub fn is_read_write(&self) -> bool {
        self.config.access().read_write
    }

    /// Bits can only be cleared.
    pub fn is_write_once(&self) -> bool {
        self.config.access().write_once
    }

    /// No write path.
    pub fn is_read_only(&self) -> bool {
        self.config.access().read_only
    }

    /// Contents survive power loss.
    pub fn is_non_volatile(&self) -> bool {
        self.config.access().non_volatile
    }

    /// Writes need the EPROM programming pulse.
    pub fn needs_program_pulse(&self) -> bool {
        self.config.access().program_pulse
    }

    /// Writes need a strong pull-up.
    pub fn needs_power_delivery(&self) -> bool {
        self.config.access().power_delivery
    }

    /// Pages are read with a device generated CRC.
    pub fn has_page_auto_crc(&self) -> bool {
        matches!(self.config.read_protocol(), ReadProtocol::PageCrc { .. })
    }

    /// Pages are read along with extra information.
    pub fn has_extra_info(&self) -> bool {
        self.config.extra_info().is_some()
    }

    /// Length of the extra information, 0 without.
    pub fn extra_info_length(&self) -> usize {
        self.config.extra_length()
    }

    /// What the extra information means.
    pub fn extra_info_description(&self) -> Option<&'static str> {
        self.config.extra_info().map(|info| info.description)
    }

    /// Whether writes are read back before they are committed.
    pub fn write_verification(&self) -> bool {
        self.write_verification.get()
    }

    /// Turn the read back of written data on or off.
    pub fn set_write_verification(&self, verify: bool) {
        self.write_verification.set(verify);
    }

    /// Current verify state.
    pub fn verify_state(&self) -> VerifyState {
        self.state.get()
    }

    /// Renegotiate the bus speed before the next operation.
    pub fn force_verify(&self) {
        if self.state.replace(VerifyState::NeedsReverify) == VerifyState::Verified {
            debug!("{}: forcing speed verification", self.description());
        }
    }

    /// Scratchpad of the bank, if it is written through one.
    pub fn scratchpad(&self) -> Option<Scratchpad<'c>> {
        match self.config.write_protocol() {
            WriteProtocol::Scratchpad(sp) => Some(Scratchpad::new(sp)),
            _ => None,
        }
    }

    pub(crate) fn settle<T, E>(&self, result: MemoryResult<T, E>) -> MemoryResult<T, E> {
        if let Err(e) = &result {
            if e.needs_reverify() {
                self.force_verify();
            }
        }
        result
    }

    pub(crate) fn ensure_speed<O: OneWire, D: DelayNs>(
        &self,
        session: &mut BusSession<'_, O, D>,
    ) -> MemoryResult<(), O::BusError> {
        if self.state.get() == VerifyState::NeedsReverify {
            session.verify_speed()?;
            self.state.set(VerifyState::Verified);
        }
        Ok(())
    }

    pub(crate) fn check_page<E>(&self, page: usize) -> MemoryResult<(), E> {
        if page < self.number_pages() {
            Ok(())
        } else {
            Err(MemoryError::OutOfRange)
        }
    }

    /// Read `buf.len()` bytes starting at `address`, relative to the bank.
    ///
    /// The device is selected and sent a new read header.
    pub fn read<O: OneWire, D: DelayNs>(
        &self,
        session: &mut BusSession<'_, O, D>,
        address: usize,
        buf: &mut [u8],
    ) -> MemoryResult<(), O::BusError> {
        self.settle(self.read_checked(session, address, buf, Chain::Fresh))
    }

    /// Continue the previous read of this session without a new header.
    ///
    /// `address` must be where the previous read stopped, otherwise the
    /// read fails with [`MemoryError::SessionDesync`].
    pub fn read_continue<O: OneWire, D: DelayNs>(
        &self,
        session: &mut BusSession<'_, O, D>,
        address: usize,
        buf: &mut [u8],
    ) -> MemoryResult<(), O::BusError> {
        self.settle(self.read_checked(session, address, buf, Chain::Required))
    }

    fn read_checked<O: OneWire, D: DelayNs>(
        &self,
        session: &mut BusSession<'_, O, D>,
        address: usize,
        buf: &mut [u8],
        chain: Chain,
    ) -> MemoryResult<(), O::BusError> {
        if address
            .checked_add(buf.len())
            .is_none_or(|end| end > self.size())
        {
            return Err(MemoryError::OutOfRange);
        }
        if buf.is_empty() {
            return Ok(());
        }
        if chain == Chain::Required && self.config.redirect().is_some() {
            return Err(MemoryError::Unsupported("continued read of a redirecting bank"));
        }
        if chain == Chain::Required
            && matches!(
                self.config.read_protocol(),
                ReadProtocol::Recall { .. } | ReadProtocol::Scratchpad
            )
        {
            return Err(MemoryError::Unsupported("continued read of this bank"));
        }
        if chain == Chain::Fresh {
            self.ensure_speed(session)?;
        }
        self.read_span(session, address, buf, chain, true)
    }

    /// Read bytes page by page, following redirections when `resolve` is set.
    pub(crate) fn read_span<O: OneWire, D: DelayNs>(
        &self,
        session: &mut BusSession<'_, O, D>,
        address: usize,
        buf: &mut [u8],
        mut chain: Chain,
        resolve: bool,
    ) -> MemoryResult<(), O::BusError> {
        let pl = self.page_length();
        let mut done = 0;
        while done < buf.len() {
            let logical = address + done;
            let in_page = logical % pl;
            let n = (pl - in_page).min(buf.len() - done);
            let page = if resolve {
                self.resolve_page(session, logical / pl)?
            } else {
                logical / pl
            };
            let physical = self.config.page_address(page) + in_page;
            let part = &mut buf[done..done + n];
            match self.config.read_protocol() {
                ReadProtocol::Memory { cmd } => self.stream(session, cmd, physical, part, chain)?,
                ReadProtocol::PageCrc { .. } => {
                    let mut page_buf = [0; MAX_PAGE_LENGTH];
                    self.page_crc(session, page, &mut page_buf[..pl], None, chain)?;
                    part.copy_from_slice(&page_buf[in_page..in_page + n]);
                }
                ReadProtocol::Register { cmd } => self.read_register(session, cmd, physical, part, chain)?,
                ReadProtocol::Recall { recall, read } => {
                    self.read_recalled(session, recall, read, page, physical, part)?
                }
                ReadProtocol::Scratchpad => {
                    self.read_staged(session, logical, part)?;
                }
            }
            chain = Chain::Auto;
            done += n;
        }
        Ok(())
    }

    /// Read raw bytes at a physical address of this bank, ignoring redirection.
    pub(crate) fn read_physical<O: OneWire, D: DelayNs>(
        &self,
        session: &mut BusSession<'_, O, D>,
        physical: usize,
        buf: &mut [u8],
    ) -> MemoryResult<(), O::BusError> {
        let address = physical
            .checked_sub(self.start_physical_address() as usize)
            .filter(|address| address + buf.len() <= self.size())
            .ok_or(MemoryError::OutOfRange)?;
        self.read_span(session, address, buf, Chain::Auto, false)
    }

    fn stream<O: OneWire, D: DelayNs>(
        &self,
        session: &mut BusSession<'_, O, D>,
        cmd: u8,
        physical: usize,
        buf: &mut [u8],
        chain: Chain,
    ) -> MemoryResult<(), O::BusError> {
        if !session.resume(cmd, physical, chain)? {
            let mut header = [cmd, 0, 0];
            header[1..].copy_from_slice(&(physical as u16).to_le_bytes());
            session.select()?;
            session.block(&mut header)?;
        }
        buf.fill(0xff);
        session.block(buf)?;
        session.park(cmd, physical + buf.len());
        Ok(())
    }

    /// Read one physical page with its CRC.
    fn page_crc<O: OneWire, D: DelayNs>(
        &self,
        session: &mut BusSession<'_, O, D>,
        page: usize,
        data: &mut [u8],
        extra: Option<&mut [u8]>,
        chain: Chain,
    ) -> MemoryResult<(), O::BusError> {
        let ReadProtocol::PageCrc {
            cmd,
            layout,
            crc: kind,
            password,
        } = self.config.read_protocol()
        else {
            return Err(MemoryError::Unsupported("page read with CRC"));
        };
        let pl = self.page_length();
        let xl = self.extra_info_length();
        let cl = kind.trailer_len();
        let physical = self.config.page_address(page);
        let mut raw = [0xff; MAX_PAGE_LENGTH + 10];
        let mut crc = CrcCheck::new(kind, 0);
        let continued = session.resume(cmd, physical, chain)?;
        if !continued {
            let mut header = [cmd, 0, 0];
            header[1..].copy_from_slice(&(physical as u16).to_le_bytes());
            session.select()?;
            session.block(&mut header)?;
            crc.update_slice(&header);
            if password {
                let mut pw = session.passwords().for_read();
                session.block(&mut pw)?;
            }
        }
        match layout {
            PageCrcLayout::HeaderThenPage => {
                if !continued || xl > 0 {
                    let head = &mut raw[..xl + cl];
                    session.block(head)?;
                    crc.update_slice(head);
                    if !crc.is_valid() {
                        warn!("Invalid {kind:?} in the header of page {page} ({})", self.description());
                        return Err(MemoryError::InvalidCrc);
                    }
                    if let Some(extra) = extra {
                        extra[..xl].copy_from_slice(&raw[..xl]);
                    }
                }
                let body = &mut raw[..pl + cl];
                body.fill(0xff);
                session.block(body)?;
                if !CrcCheck::validate(kind, 0, body) {
                    warn!("Invalid {kind:?} reading page {page} ({})", self.description());
                    return Err(MemoryError::InvalidCrc);
                }
                data.copy_from_slice(&raw[..pl]);
            }
            PageCrcLayout::PageWithTrailer => {
                let body = &mut raw[..pl + xl + cl];
                session.block(body)?;
                crc.update_slice(body);
                if !crc.is_valid() {
                    warn!("Invalid {kind:?} reading page {page} ({})", self.description());
                    return Err(MemoryError::InvalidCrc);
                }
                data.copy_from_slice(&raw[..pl]);
                if let Some(extra) = extra {
                    extra[..xl].copy_from_slice(&raw[pl..pl + xl]);
                }
            }
        }
        trace!("Read page {page} ({}), continued {continued}", self.description());
        session.park(cmd, physical + pl);
        Ok(())
    }

    /// Physical page that holds logical `page`.
    pub(crate) fn resolve_page<O: OneWire, D: DelayNs>(
        &self,
        session: &mut BusSession<'_, O, D>,
        page: usize,
    ) -> MemoryResult<usize, O::BusError> {
        if self.config.redirect().is_none() {
            return Ok(page);
        }
        match self.get_redirected_page(session, page)? {
            None => Ok(page),
            Some(target) if target < self.number_pages() => {
                debug!("{}: page {page} redirected to {target}", self.description());
                Ok(target)
            }
            Some(target) => {
                warn!("{}: page {page} redirected outside the bank ({target})", self.description());
                Err(MemoryError::OutOfRange)
            }
        }
    }

    /// Read a full page into `buf`, with CRC checking where the bank
    /// supports it.
    pub fn read_page<O: OneWire, D: DelayNs>(
        &self,
        session: &mut BusSession<'_, O, D>,
        page: usize,
        buf: &mut [u8],
    ) -> MemoryResult<(), O::BusError> {
        let pl = self.page_length();
        if page >= self.number_pages() || buf.len() < pl {
            return Err(MemoryError::OutOfRange);
        }
        if self.has_page_auto_crc() {
            self.read_page_crc(session, page, &mut buf[..pl], None)
        } else {
            self.read(session, page * pl, &mut buf[..pl])
        }
    }

    /// Read a full page and its extra information.
    ///
    /// Depending on the bank the extra information comes with the page, is
    /// the scratchpad authorization (TA1, TA2, E/S) or the register status.
    pub fn read_page_extra<O: OneWire, D: DelayNs>(
        &self,
        session: &mut BusSession<'_, O, D>,
        page: usize,
        buf: &mut [u8],
        extra: &mut [u8],
    ) -> MemoryResult<(), O::BusError> {
        if !self.has_extra_info() {
            return Err(MemoryError::Unsupported("page extra information"));
        }
        if self.has_page_auto_crc() {
            return self.read_page_crc(session, page, buf, Some(extra));
        }
        let pl = self.page_length();
        let xl = self.extra_info_length();
        if page >= self.number_pages() || buf.len() < pl || extra.len() < xl {
            return Err(MemoryError::OutOfRange);
        }
        let result = self.ensure_speed(session).and_then(|_| {
            match (self.config.read_protocol(), self.config.lock_command()) {
                (ReadProtocol::Scratchpad, _) => {
                    let staged = self.read_staged(session, 0, &mut buf[..pl])?;
                    extra[..2].copy_from_slice(&staged.address.to_le_bytes());
                    extra[2] = staged.status.raw;
                    Ok(())
                }
                (_, Some(LockCommand::CopyAndLock { status_cmd, .. })) => {
                    self.read_span(session, page * pl, &mut buf[..pl], Chain::Fresh, false)?;
                    extra[0] = self.register_status(session, status_cmd)?;
                    Ok(())
                }
                _ => Err(MemoryError::Unsupported("page extra information")),
            }
        });
        self.settle(result)
    }

    /// Read a full page verified by the device generated CRC.
    pub fn read_page_crc<O: OneWire, D: DelayNs>(
        &self,
        session: &mut BusSession<'_, O, D>,
        page: usize,
        buf: &mut [u8],
        extra: Option<&mut [u8]>,
    ) -> MemoryResult<(), O::BusError> {
        self.settle(self.page_crc_checked(session, page, buf, extra, Chain::Fresh))
    }

    /// Read the page following the previous paged read of this session.
    pub fn read_page_crc_continue<O: OneWire, D: DelayNs>(
        &self,
        session: &mut BusSession<'_, O, D>,
        page: usize,
        buf: &mut [u8],
        extra: Option<&mut [u8]>,
    ) -> MemoryResult<(), O::BusError> {
        self.settle(self.page_crc_checked(session, page, buf, extra, Chain::Required))
    }

    fn page_crc_checked<O: OneWire, D: DelayNs>(
        &self,
        session: &mut BusSession<'_, O, D>,
        page: usize,
        buf: &mut [u8],
        extra: Option<&mut [u8]>,
        chain: Chain,
    ) -> MemoryResult<(), O::BusError> {
        if !self.has_page_auto_crc() {
            return Err(MemoryError::Unsupported("page read with CRC"));
        }
        let pl = self.page_length();
        if page >= self.number_pages()
            || buf.len() < pl
            || extra
                .as_ref()
                .is_some_and(|extra| extra.len() < self.extra_info_length())
        {
            return Err(MemoryError::OutOfRange);
        }
        if chain == Chain::Required && self.config.redirect().is_some() {
            return Err(MemoryError::Unsupported("continued read of a redirecting bank"));
        }
        if chain == Chain::Fresh {
            self.ensure_speed(session)?;
        }
        let target = self.resolve_page(session, page)?;
        self.page_crc(session, target, &mut buf[..pl], extra, chain)
    }

    /// Write `data` at `address`, relative to the bank.
    ///
    /// Range, access, password window and known page locks are checked
    /// before the bus is touched. An empty write succeeds without bus
    /// traffic.
    pub fn write<O: OneWire, D: DelayNs>(
        &self,
        session: &mut BusSession<'_, O, D>,
        address: usize,
        data: &[u8],
    ) -> MemoryResult<(), O::BusError> {
        self.settle(self.write_checked(session, address, data, true))
    }

    pub(crate) fn write_checked<O: OneWire, D: DelayNs>(
        &self,
        session: &mut BusSession<'_, O, D>,
        address: usize,
        data: &[u8],
        guard_windows: bool,
    ) -> MemoryResult<(), O::BusError> {
        if data.is_empty() {
            return Ok(());
        }
        let end = address
            .checked_add(data.len())
            .filter(|&end| end <= self.size())
            .ok_or(MemoryError::OutOfRange)?;
        if self.is_read_only() || matches!(self.config.write_protocol(), WriteProtocol::None) {
            return Err(MemoryError::Unsupported("write to read-only memory"));
        }
        if guard_windows {
            let physical = self.start_physical_address() as usize + address;
            if let Some(window) = self
                .config
                .protected()
                .iter()
                .find(|w| w.overlaps(physical, physical + data.len()))
            {
                warn!(
                    "{}: write at 0x{physical:04x} overlaps the password registers",
                    self.description()
                );
                return Err(MemoryError::WriteWouldCorruptPasswordRegion {
                    address: window.start,
                });
            }
        }
        let pl = self.page_length();
        let pages = address / pl..=(end - 1) / pl;
        if let Some(page) = pages.clone().find(|&page| self.lock_cached(page)) {
            return Err(MemoryError::PageLocked(page));
        }
        self.ensure_speed(session)?;
        if self.can_lock_page() {
            for page in pages {
                // Locks are kept per logical page. A redirected page is
                // also refused when its target is locked.
                if self.is_page_locked(session, page)? {
                    return Err(MemoryError::PageLocked(page));
                }
                let target = self.resolve_page(session, page)?;
                if target != page && self.is_page_locked(session, target)? {
                    return Err(MemoryError::PageLocked(target));
                }
            }
        }
        match self.config.write_protocol() {
            WriteProtocol::Scratchpad(sp) if self.config.read_protocol() == ReadProtocol::Scratchpad => {
                self.write_staged(session, sp, address, data)
            }
            WriteProtocol::Scratchpad(sp) => self.write_rows(session, sp, address, data),
            WriteProtocol::ProgramPulse { cmd, crc } => {
                crate::eprom::program(self, session, *cmd, *crc, address, data)
            }
            WriteProtocol::Register { cmd } => self.write_register(session, *cmd, address, data),
            WriteProtocol::Block { write, copy, copy_ms } => {
                self.write_blocks(session, *write, *copy, *copy_ms, address, data)
            }
            WriteProtocol::None => Err(MemoryError::Unsupported("write to read-only memory")),
        }
    }

    /// Write through the scratchpad one row at a time.
    fn write_rows<O: OneWire, D: DelayNs>(
        &self,
        session: &mut BusSession<'_, O, D>,
        config: &ScratchpadConfig,
        address: usize,
        data: &[u8],
    ) -> MemoryResult<(), O::BusError> {
        let scratchpad = Scratchpad::new(config);
        let row = config.length();
        let pl = self.page_length();
        // Without a strong pull-up the device only answers with a CRC when the
        // write reaches the end of the row, so short tails are padded with the
        // current memory contents.
        let powered = config.completion().strong_pullup_ms.is_some() && session.can_deliver_power();
        let pad = config.has_crc() && !powered;
        let mut written = 0;
        while written < data.len() {
            let logical = address + written;
            let page = self.resolve_page(session, logical / pl)?;
            let physical = self.config.page_address(page) + logical % pl;
            let row_start = physical & !(row - 1);
            let offset = physical - row_start;
            let n = (row - offset)
                .min(pl - logical % pl)
                .min(data.len() - written);
            let chunk = &data[written..written + n];
            let mut image = [0xff; MAX_PAGE_LENGTH];
            let (target, len) = if config.full_rows && n < row {
                self.read_physical(session, row_start, &mut image[..row])?;
                image[offset..offset + n].copy_from_slice(chunk);
                (row_start, row)
            } else if pad && offset + n < row && !self.touches_protected(physical + n, row_start + row) {
                image[..n].copy_from_slice(chunk);
                self.read_physical(session, physical + n, &mut image[n..row - offset])?;
                (physical, row - offset)
            } else {
                image[..n].copy_from_slice(chunk);
                (physical, n)
            };
            self.commit(session, &scratchpad, target as u16, &image[..len])?;
            written += n;
        }
        Ok(())
    }

    fn touches_protected(&self, start: usize, end: usize) -> bool {
        self.config
            .protected()
            .iter()
            .any(|window| window.overlaps(start, end))
    }

    /// Stage `image` in the scratchpad, check it and copy it to memory.
    fn commit<O: OneWire, D: DelayNs>(
        &self,
        session: &mut BusSession<'_, O, D>,
        scratchpad: &Scratchpad<'_>,
        address: u16,
        image: &[u8],
    ) -> MemoryResult<(), O::BusError> {
        self.stage(session, scratchpad, address, image)?;
        scratchpad.copy_scratchpad(session, address, image.len())
    }

    /// Write `image` to the scratchpad and, with write verification on,
    /// read it back.
    pub(crate) fn stage<O: OneWire, D: DelayNs>(
        &self,
        session: &mut BusSession<'_, O, D>,
        scratchpad: &Scratchpad<'_>,
        address: u16,
        image: &[u8],
    ) -> MemoryResult<(), O::BusError> {
        scratchpad.write_scratchpad(session, address, image)?;
        if self.write_verification() {
            let mut echo = [0; MAX_PAGE_LENGTH];
            let staged = scratchpad.read_scratchpad(session, &mut echo)?;
            if staged.address != address || echo[..image.len()] != *image {
                warn!(
                    "{}: scratchpad holds 0x{:04x}, expected 0x{address:04x} with the written data",
                    self.description(),
                    staged.address
                );
                return Err(MemoryError::ReadBackMismatch);
            }
        }
        Ok(())
    }

    /// Read the packet stored in `page` into `buf` and return its length.
    ///
    /// A packet is `[len, data.., crc16]` where the CRC16 is seeded with the
    /// page number and covers the length byte and the data.
    pub fn read_page_packet<O: OneWire, D: DelayNs>(
        &self,
        session: &mut BusSession<'_, O, D>,
        page: usize,
        buf: &mut [u8],
    ) -> MemoryResult<usize, O::BusError> {
        let pl = self.page_length();
        let mut raw = [0; MAX_PAGE_LENGTH];
        self.read_page(session, page, &mut raw[..pl])?;
        let len = raw[0] as usize;
        if len > self.max_packet_data_length() {
            warn!("{}: packet length {len} in page {page} is too large", self.description());
            return self.settle(Err(MemoryError::InvalidPacketLength(raw[0])));
        }
        if !OneWireCrc16::validate(page as u16, &raw[..len + 3]) {
            warn!("{}: invalid CRC16 in the packet of page {page}", self.description());
            return self.settle(Err(MemoryError::InvalidCrc));
        }
        if buf.len() < len {
            return Err(MemoryError::OutOfRange);
        }
        buf[..len].copy_from_slice(&raw[1..=len]);
        Ok(len)
    }

    /// Write `data` to `page` as a packet.
    pub fn write_page_packet<O: OneWire, D: DelayNs>(
        &self,
        session: &mut BusSession<'_, O, D>,
        page: usize,
        data: &[u8],
    ) -> MemoryResult<(), O::BusError> {
        if !self.is_general_purpose_memory() {
            return Err(MemoryError::Unsupported("packets in non general purpose memory"));
        }
        if page >= self.number_pages() || data.len() > self.max_packet_data_length() {
            return Err(MemoryError::OutOfRange);
        }
        let len = data.len();
        let mut raw = [0; MAX_PAGE_LENGTH];
        raw[0] = len as u8;
        raw[1..=len].copy_from_slice(data);
        let trailer = OneWireCrc16::trailer(page as u16, &raw[..len + 1]);
        raw[len + 1..len + 3].copy_from_slice(&trailer);
        self.write(session, page * self.page_length(), &raw[..len + 3])
    }
}
