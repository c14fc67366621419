use crate::addr::Address;
use crate::error::Error;
use crate::platform::Platform;
use crate::raw::{MARKER_ARCHIVED, MARKER_BAD};
use crate::Ringlog;
#[cfg(feature = "defmt")]
use defmt::trace;

impl<T: Platform> Ringlog<T> {
    pub(crate) fn is_archived_inner(&self) -> Result<bool, Error> {
        if !self.at_record {
            return Err(Error::NoRecord);
        }
        Ok(self.archived)
    }

    /// Marks the record under the cursor as archived by clearing the archive
    /// bit of its marker in place, a plain bit-clear that needs no erase. When
    /// this completes the page (every slot archived or demoted), the page
    /// header is promoted as well so future scans can skip the page without
    /// inspecting every record. The promotion check scans the whole page, so
    /// it stays correct even when records are archived out of order; it just
    /// fires when the final record of a full page is archived.
    pub(crate) fn set_archived_inner(&mut self) -> Result<(), Error> {
        #[cfg(feature = "defmt")]
        trace!("set_archived");

        if !self.at_record {
            return Err(Error::NoRecord);
        }
        if !self.cursor_is_live()? {
            // the slot may hold a different record by now; never touch it
            return Err(Error::NoRecord);
        }
        let addr = self.read_addr;

        if !self.archived {
            self.write_marker(addr.page, addr.offset, MARKER_ARCHIVED)?;
            if self.read_byte(addr.page, addr.offset)? != MARKER_ARCHIVED {
                self.demote_record(addr)?;
                return Err(Error::WriteFail);
            }
            self.archived = true;
        }

        if self.page_fully_archived(addr.page)? {
            #[cfg(feature = "debug-logs")]
            println!("archive: promoting page {}", addr.page);

            self.write_marker(addr.page, 0, MARKER_ARCHIVED)?;
            if self.read_byte(addr.page, 0)? != MARKER_ARCHIVED {
                self.demote_page(addr.page)?;
                return Err(Error::WriteFail);
            }
        }

        Ok(())
    }

    /// A page qualifies for promotion once no slot can produce an unarchived
    /// record anymore. A free slot (page still being filled) blocks it.
    fn page_fully_archived(&mut self, page: u32) -> Result<bool, Error> {
        let mut slot = Address::first_slot(page);
        for _ in 0..self.cfg.records_per_page() {
            match self.read_byte(slot.page, slot.offset)? {
                MARKER_ARCHIVED | MARKER_BAD => {}
                _ => return Ok(false),
            }
            slot.offset += self.cfg.record_size();
        }
        Ok(true)
    }
}
