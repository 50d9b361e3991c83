//! Page locking, write-once marking and page redirection.
//!
//! The status of a page is stored in another bank of the same device (see
//! [`StatusLink`]), or kept by the device itself behind a
//! [`LockCommand`](crate::LockCommand). Status writes are one way: a page
//! that is locked or redirected stays so, and every status write is
//! confirmed by reading the status back.

use embedded_hal::delay::DelayNs;
use embedded_onewire::OneWire;
use log::{info, warn};

use crate::bank::MemoryBank;
use crate::config::{StatusLayout, StatusLink};
use crate::error::{MemoryError, MemoryResult};
use crate::session::BusSession;

impl MemoryBank<'_> {
    /// Pages of this bank can be locked.
    pub fn can_lock_page(&self) -> bool {
        self.config.lock().is_some() || self.config.lock_command().is_some()
    }

    /// Pages of this bank can be switched to write-once mode.
    pub fn can_set_write_once(&self) -> bool {
        self.config.write_once().is_some()
    }

    /// Pages of this bank can be redirected.
    pub fn can_redirect_page(&self) -> bool {
        self.config.redirect().is_some()
    }

    /// Page redirections can be locked.
    pub fn can_lock_redirect_page(&self) -> bool {
        self.config.lock_redirect().is_some()
    }

    pub(crate) fn lock_cached(&self, page: usize) -> bool {
        page < 128 && self.locked.get() & (1 << page) != 0
    }

    fn cache_lock(&self, page: usize) {
        if page < 128 {
            self.locked.set(self.locked.get() | 1 << page);
        }
    }

    /// Read the status byte of `page` and tell whether it is set.
    fn status<O: OneWire, D: DelayNs>(
        &self,
        session: &mut BusSession<'_, O, D>,
        link: &StatusLink,
        page: usize,
    ) -> MemoryResult<bool, O::BusError> {
        let (index, mask) = link.locate(page);
        let mut byte = [0xff];
        self.auxiliary(link.bank).read(session, index, &mut byte)?;
        Ok(match link.layout {
            StatusLayout::Bitmap => byte[0] & mask == 0,
            StatusLayout::Flag { sentinel } => byte[0] == sentinel,
            StatusLayout::InvertedPage => byte[0] != 0xff,
        })
    }

    /// Set the status of `page` and confirm it by reading it back.
    fn set_status<O: OneWire, D: DelayNs>(
        &self,
        session: &mut BusSession<'_, O, D>,
        link: &StatusLink,
        page: usize,
    ) -> MemoryResult<(), O::BusError> {
        let (index, mask) = link.locate(page);
        let status = self.auxiliary(link.bank);
        let value = match link.layout {
            // the other pages of the byte keep their bits
            StatusLayout::Bitmap => {
                let mut current = [0xff];
                status.read(session, index, &mut current)?;
                current[0] & !mask
            }
            StatusLayout::Flag { sentinel } => sentinel,
            StatusLayout::InvertedPage => return Err(MemoryError::Unsupported("page status")),
        };
        status.write_checked(session, index, &[value], true)?;
        if self.status(session, link, page)? {
            Ok(())
        } else {
            warn!("{}: status of page {page} did not stick", self.description());
            Err(MemoryError::ReadBackMismatch)
        }
    }

    /// Lock `page` against further writes. This cannot be undone.
    pub fn lock_page<O: OneWire, D: DelayNs>(
        &self,
        session: &mut BusSession<'_, O, D>,
        page: usize,
    ) -> MemoryResult<(), O::BusError> {
        if !self.can_lock_page() {
            return Err(MemoryError::Unsupported("page locking"));
        }
        self.check_page(page)?;
        if self.lock_cached(page) {
            return Ok(());
        }
        let result = self.ensure_speed(session).and_then(|_| {
            match (self.config.lock().copied(), self.config.lock_command()) {
                (Some(link), _) => self.set_status(session, &link, page),
                (None, Some(command)) => self.lock_by_command(session, command, page),
                (None, None) => Err(MemoryError::Unsupported("page locking")),
            }
        });
        self.settle(result)?;
        self.cache_lock(page);
        info!("{}: locked page {page}", self.description());
        Ok(())
    }

    /// Whether `page` is locked.
    pub fn is_page_locked<O: OneWire, D: DelayNs>(
        &self,
        session: &mut BusSession<'_, O, D>,
        page: usize,
    ) -> MemoryResult<bool, O::BusError> {
        if !self.can_lock_page() {
            return Err(MemoryError::Unsupported("page locking"));
        }
        self.check_page(page)?;
        if self.lock_cached(page) {
            return Ok(true);
        }
        let locked = match (self.config.lock().copied(), self.config.lock_command()) {
            (Some(link), _) => self.status(session, &link, page),
            (None, Some(command)) => self.locked_by_command(session, command, page),
            (None, None) => Err(MemoryError::Unsupported("page locking")),
        };
        let locked = self.settle(locked)?;
        if locked {
            self.cache_lock(page);
        }
        Ok(locked)
    }

    /// Put `page` in write-once mode: further writes can only clear bits.
    pub fn set_page_write_once<O: OneWire, D: DelayNs>(
        &self,
        session: &mut BusSession<'_, O, D>,
        page: usize,
    ) -> MemoryResult<(), O::BusError> {
        let link = *self
            .config
            .write_once()
            .ok_or(MemoryError::Unsupported("write-once pages"))?;
        self.check_page(page)?;
        if self.lock_cached(page) {
            return Err(MemoryError::PageLocked(page));
        }
        let result = self
            .ensure_speed(session)
            .and_then(|_| self.set_status(session, &link, page));
        self.settle(result)?;
        info!("{}: page {page} is now write-once", self.description());
        Ok(())
    }

    /// Whether `page` is in write-once mode.
    pub fn is_page_write_once<O: OneWire, D: DelayNs>(
        &self,
        session: &mut BusSession<'_, O, D>,
        page: usize,
    ) -> MemoryResult<bool, O::BusError> {
        let link = *self
            .config
            .write_once()
            .ok_or(MemoryError::Unsupported("write-once pages"))?;
        self.check_page(page)?;
        self.settle(self.status(session, &link, page))
    }

    /// Redirect `page` to `new_page`.
    ///
    /// Page 0 cannot be a target: it is stored as `0xFF`, which reads back
    /// as not redirected.
    pub fn redirect_page<O: OneWire, D: DelayNs>(
        &self,
        session: &mut BusSession<'_, O, D>,
        page: usize,
        new_page: usize,
    ) -> MemoryResult<(), O::BusError> {
        let link = *self
            .config
            .redirect()
            .ok_or(MemoryError::Unsupported("page redirection"))?;
        self.check_page(page)?;
        self.check_page(new_page)?;
        if new_page == 0 || new_page >= 0xff {
            return Err(MemoryError::OutOfRange);
        }
        let result = self
            .ensure_speed(session)
            .and_then(|_| self.redirect_unchecked(session, &link, page, new_page));
        self.settle(result)?;
        info!("{}: page {page} redirected to {new_page}", self.description());
        Ok(())
    }

    fn redirect_unchecked<O: OneWire, D: DelayNs>(
        &self,
        session: &mut BusSession<'_, O, D>,
        link: &StatusLink,
        page: usize,
        new_page: usize,
    ) -> MemoryResult<(), O::BusError> {
        if self.can_lock_redirect_page() && self.is_redirect_page_locked(session, page)? {
            return Err(MemoryError::PageLocked(page));
        }
        let (index, _) = link.locate(page);
        self.auxiliary(link.bank)
            .write_checked(session, index, &[!(new_page as u8)], true)?;
        if self.redirected(session, link, page)? == Some(new_page) {
            Ok(())
        } else {
            warn!("{}: redirection of page {page} did not stick", self.description());
            Err(MemoryError::ReadBackMismatch)
        }
    }

    fn redirected<O: OneWire, D: DelayNs>(
        &self,
        session: &mut BusSession<'_, O, D>,
        link: &StatusLink,
        page: usize,
    ) -> MemoryResult<Option<usize>, O::BusError> {
        let (index, _) = link.locate(page);
        let mut byte = [0xff];
        self.auxiliary(link.bank).read(session, index, &mut byte)?;
        Ok(match byte[0] {
            0xff => None,
            inverted => Some(!inverted as usize),
        })
    }

    /// Page that `page` is redirected to, [`None`] if it is not redirected.
    pub fn get_redirected_page<O: OneWire, D: DelayNs>(
        &self,
        session: &mut BusSession<'_, O, D>,
        page: usize,
    ) -> MemoryResult<Option<usize>, O::BusError> {
        let link = *self
            .config
            .redirect()
            .ok_or(MemoryError::Unsupported("page redirection"))?;
        self.check_page(page)?;
        self.settle(self.redirected(session, &link, page))
    }

    /// Freeze the redirection of `page`.
    pub fn lock_redirect_page<O: OneWire, D: DelayNs>(
        &self,
        session: &mut BusSession<'_, O, D>,
        page: usize,
    ) -> MemoryResult<(), O::BusError> {
        let link = *self
            .config
            .lock_redirect()
            .ok_or(MemoryError::Unsupported("redirection locking"))?;
        self.check_page(page)?;
        let result = self
            .ensure_speed(session)
            .and_then(|_| self.set_status(session, &link, page));
        self.settle(result)?;
        info!("{}: redirection of page {page} locked", self.description());
        Ok(())
    }

    /// Whether the redirection of `page` is frozen.
    pub fn is_redirect_page_locked<O: OneWire, D: DelayNs>(
        &self,
        session: &mut BusSession<'_, O, D>,
        page: usize,
    ) -> MemoryResult<bool, O::BusError> {
        let link = *self
            .config
            .lock_redirect()
            .ok_or(MemoryError::Unsupported("redirection locking"))?;
        self.check_page(page)?;
        self.settle(self.status(session, &link, page))
    }
}
