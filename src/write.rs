use crate::addr::Address;
use crate::error::Error;
use crate::platform::Platform;
use crate::raw::{PageMarker, PAGE_HEADER_SIZE};
use crate::{FullPolicy, Ringlog};
#[cfg(feature = "defmt")]
use defmt::trace;

impl<T: Platform> Ringlog<T> {
    pub(crate) fn append_inner(&mut self, payload: &[u8]) -> Result<(), Error> {
        #[cfg(feature = "defmt")]
        trace!("append");

        if payload.len() != self.cfg.payload_size as usize {
            return Err(Error::InvalidPayloadLength);
        }

        // A write cursor sitting on the first slot means the previous page is
        // exhausted (or nothing was ever written): claim a free page first.
        if self.write_addr.offset == PAGE_HEADER_SIZE as u32 {
            self.claim_page()?;
        }

        let addr = self.write_addr;
        if !self.write_record(addr, payload)? {
            // slot demoted; step past it and let the caller retry
            self.write_addr = self.cfg.next_record_address(addr);
            return Err(Error::WriteFail);
        }

        if self.page_first.is_none() {
            self.page_first = Some(addr.page);
        }
        self.page_last = addr.page;
        self.write_addr = self.cfg.next_record_address(addr);

        #[cfg(feature = "debug-logs")]
        println!(
            "write: record at page {} offset {}, next {:?}",
            addr.page, addr.offset, self.write_addr
        );

        Ok(())
    }

    /// Finds the next free page starting at the write cursor, writes its header
    /// and parks the write cursor on its first slot. Under stop-when-full no
    /// data is ever destroyed: meeting a used page means the cursor caught up
    /// with the tail of the log. Under overwrite-oldest, entering an erase
    /// block that still holds data erases it first, discarding the oldest
    /// records to make room.
    fn claim_page(&mut self) -> Result<(), Error> {
        #[cfg(feature = "defmt")]
        trace!("claim_page");

        let mut page = self.write_addr.page;

        for _ in 0..=self.cfg.page_count() {
            if self.cfg.is_block_start(page)
                && self.cfg.policy == FullPolicy::OverwriteOldest
                && !self.block_is_free(page)?
            {
                self.erase_block(page)?;
            }

            match self.read_page_header(page)?.marker {
                PageMarker::Free => {
                    let sequence = self.next_sequence;
                    // consume the number even on failure; the broken page may
                    // have latched part of it
                    self.next_sequence = self.next_sequence.wrapping_add(1);

                    if !self.write_page_header(page, sequence)? {
                        self.write_addr = Address::first_slot(self.cfg.next_page(page));
                        return Err(Error::WriteFail);
                    }
                    self.write_addr = Address::first_slot(page);
                    return Ok(());
                }
                PageMarker::Bad => {
                    page = self.cfg.next_page(page);
                }
                PageMarker::Used | PageMarker::UsedArchived => match self.cfg.policy {
                    FullPolicy::StopWhenFull => return Err(Error::Full),
                    // stale data mid-block; reclaimed when its block is entered
                    FullPolicy::OverwriteOldest => page = self.cfg.next_page(page),
                },
            }
        }

        // a full circle without a claimable page
        match self.cfg.policy {
            FullPolicy::StopWhenFull => Err(Error::Full),
            FullPolicy::OverwriteOldest => {
                self.fatal = true;
                Err(Error::Fatal)
            }
        }
    }

    fn block_is_free(&mut self, base: u32) -> Result<bool, Error> {
        for page in base..base + self.cfg.pages_per_block {
            if self.read_page_header(page)?.marker != PageMarker::Free {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Erases the block starting at `base`. Old data is only ever discarded
    /// here, physically, to make room for the write cursor; if the oldest live
    /// page was inside the block, `page_first` moves up to the next used page
    /// behind it.
    fn erase_block(&mut self, base: u32) -> Result<(), Error> {
        #[cfg(feature = "defmt")]
        trace!("erase_block: base {}", base);

        #[cfg(feature = "debug-logs")]
        println!("write: erase_block: base {base}");

        let first_destroyed = self
            .page_first
            .is_some_and(|first| self.cfg.contains_block_of(base, first));

        let from = self.cfg.byte_address(base, 0);
        let to = self.cfg.byte_address(base + self.cfg.pages_per_block, 0);
        self.hal.erase(from, to).map_err(|_| Error::FlashError)?;

        if first_destroyed {
            self.page_first = None;
            let mut page = self.cfg.next_page(base + self.cfg.pages_per_block - 1);
            for _ in 0..self.cfg.page_count() {
                if self.read_page_header(page)?.is_used() {
                    self.page_first = Some(page);
                    break;
                }
                page = self.cfg.next_page(page);
            }
        }

        Ok(())
    }
}
