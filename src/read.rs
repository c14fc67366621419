use crate::addr::Address;
use crate::error::Error;
use crate::platform::Platform;
use crate::raw::{PageMarker, RecordMarker, MARKER_FREE, PAGE_HEADER_SIZE};
use crate::Ringlog;
#[cfg(feature = "defmt")]
use defmt::trace;

impl<T: Platform> Ringlog<T> {
    pub(crate) fn read_first_inner(&mut self, buf: &mut [u8]) -> Result<(), Error> {
        #[cfg(feature = "defmt")]
        trace!("read_first");

        let first = self.page_first.ok_or(Error::Empty)?;
        self.scan_forward(Address::first_slot(first), buf, true)
    }

    pub(crate) fn read_next_inner(&mut self, buf: &mut [u8]) -> Result<(), Error> {
        #[cfg(feature = "defmt")]
        trace!("read_next");

        if !self.at_record || !self.cursor_is_live()? {
            // Never positioned, or the page under the cursor was reclaimed by
            // the overwrite path (or demoted): everything at and before the
            // cursor is gone, so the traversal continues at the oldest
            // surviving record.
            return self.read_first_inner(buf);
        }
        let next = self.cfg.next_record_address(self.read_addr);
        self.scan_forward(next, buf, false)
    }

    pub(crate) fn read_last_inner(&mut self, buf: &mut [u8]) -> Result<(), Error> {
        #[cfg(feature = "defmt")]
        trace!("read_last");

        if self.page_first.is_none() {
            return Err(Error::Empty);
        }
        let last = self.cfg.previous_record_address(self.write_addr);
        self.scan_backward(last, buf)
    }

    pub(crate) fn read_previous_inner(&mut self, buf: &mut [u8]) -> Result<(), Error> {
        #[cfg(feature = "defmt")]
        trace!("read_previous");

        if !self.at_record {
            return self.read_last_inner(buf);
        }
        if !self.cursor_is_live()? {
            // nothing older than a reclaimed cursor survives
            return Err(Error::NoRecord);
        }
        if self.page_first == Some(self.read_addr.page)
            && self.read_addr.offset == PAGE_HEADER_SIZE as u32
        {
            // already on the oldest record
            return Err(Error::NoRecord);
        }
        let previous = self.cfg.previous_record_address(self.read_addr);
        self.scan_backward(previous, buf)
    }

    /// Walks forward from `addr`, skipping non-record slots and whole demoted
    /// pages, until a valid record is found or the write cursor is reached.
    /// On `NoRecord` the cursor keeps its position so the traversal can resume
    /// once more records have been appended.
    ///
    /// `at_seed` marks a scan starting at the oldest slot: once the log is
    /// exactly full the write cursor wraps onto that very slot, and meeting it
    /// there must not end the traversal before it began. The writer only ever
    /// parks on a free slot or on the oldest record, so peeking the marker
    /// byte disambiguates the two.
    fn scan_forward(
        &mut self,
        mut addr: Address,
        buf: &mut [u8],
        mut at_seed: bool,
    ) -> Result<(), Error> {
        // generous bound; one iteration never revisits a slot
        let mut budget = self.cfg.page_count() as u64 * self.cfg.records_per_page() as u64 + 1;

        loop {
            if budget == 0 {
                return self.bail_fatal();
            }
            budget -= 1;

            if addr == self.write_addr
                && (!at_seed || self.read_byte(addr.page, addr.offset)? == MARKER_FREE)
            {
                return Err(Error::NoRecord);
            }
            at_seed = false;

            // Crossing onto a fresh page: the page must carry a valid used
            // header. A demoted page is handled corruption and skipped as a
            // whole; a free page before the write cursor means first/last
            // tracking is wrong and the engine cannot safely continue.
            if addr.offset == PAGE_HEADER_SIZE as u32 {
                match self.read_page_header(addr.page)?.marker {
                    PageMarker::Used | PageMarker::UsedArchived => {}
                    PageMarker::Bad => {
                        addr = Address::first_slot(self.cfg.next_page(addr.page));
                        continue;
                    }
                    PageMarker::Free => return self.bail_fatal(),
                }
            }

            match self.read_record(addr, buf)? {
                RecordMarker::Record => {
                    return self.settle_on(addr, false);
                }
                RecordMarker::RecordArchived => {
                    return self.settle_on(addr, true);
                }
                // demoted mid-traversal or free: skipped, never reported
                RecordMarker::Bad | RecordMarker::Free => {
                    addr = self.cfg.next_record_address(addr);
                }
            }
        }
    }

    /// Backward counterpart of [`Self::scan_forward`]; stops once the oldest
    /// record slot has been inspected.
    fn scan_backward(&mut self, mut addr: Address, buf: &mut [u8]) -> Result<(), Error> {
        let first = self.page_first.ok_or(Error::Empty)?;
        let oldest = Address::first_slot(first);
        let mut budget = self.cfg.page_count() as u64 * self.cfg.records_per_page() as u64 + 1;

        loop {
            if budget == 0 {
                return self.bail_fatal();
            }
            budget -= 1;

            // Crossing backward onto a page: same consistency rules as forward,
            // except that losing the oldest page itself is unrecoverable since
            // the traversal bound lives on it.
            if addr.offset == self.cfg.last_slot_offset() || addr.page == first {
                match self.read_page_header(addr.page)?.marker {
                    PageMarker::Used | PageMarker::UsedArchived => {}
                    PageMarker::Bad => {
                        if addr.page == first {
                            return self.bail_fatal();
                        }
                        addr = Address {
                            page: self.cfg.previous_page(addr.page),
                            offset: self.cfg.last_slot_offset(),
                        };
                        continue;
                    }
                    PageMarker::Free => return self.bail_fatal(),
                }
            }

            match self.read_record(addr, buf)? {
                RecordMarker::Record => {
                    return self.settle_on(addr, false);
                }
                RecordMarker::RecordArchived => {
                    return self.settle_on(addr, true);
                }
                RecordMarker::Bad | RecordMarker::Free => {
                    if addr == oldest {
                        return Err(Error::NoRecord);
                    }
                    addr = self.cfg.previous_record_address(addr);
                }
            }
        }
    }

    /// The page and its rolling number pin the cursor to this generation of
    /// data; a later block erase under it is detected by [`Self::cursor_is_live`].
    fn settle_on(&mut self, addr: Address, archived: bool) -> Result<(), Error> {
        let header = self.read_page_header(addr.page)?;
        self.read_addr = addr;
        self.read_seq = header.sequence;
        self.at_record = true;
        self.archived = archived;

        #[cfg(feature = "debug-logs")]
        println!(
            "read: record at page {} offset {} archived {archived}",
            addr.page, addr.offset
        );

        Ok(())
    }

    /// Whether the record under the cursor still belongs to the data it was
    /// read from. A reclaimed block reads free, or used again under a newer
    /// rolling number; a demoted page loses its number entirely.
    pub(crate) fn cursor_is_live(&mut self) -> Result<bool, Error> {
        let header = self.read_page_header(self.read_addr.page)?;
        Ok(header.is_used() && header.sequence == self.read_seq)
    }

    fn bail_fatal(&mut self) -> Result<(), Error> {
        self.fatal = true;
        Err(Error::Fatal)
    }
}
