use crate::addr::Address;
use crate::error::Error;
use crate::platform::Platform;
use crate::raw::MARKER_FREE;
use crate::Ringlog;
#[cfg(feature = "defmt")]
use defmt::trace;

impl<T: Platform> Ringlog<T> {
    /// Rebuilds `page_first`, `page_last`, the next rolling number and the write
    /// cursor purely from the headers on the medium. Runs once at mount, before
    /// either cursor is used, and tolerates an arbitrary prior crash: headers
    /// that fail validation are demoted by the codec and simply drop out of the
    /// scan. Running this twice over the same image yields the same handle.
    pub(crate) fn rebuild_index(&mut self) -> Result<(), Error> {
        #[cfg(feature = "defmt")]
        trace!("rebuild_index");

        #[cfg(feature = "debug-logs")]
        println!("index: rebuild_index");

        // Find any one used page to anchor the circular walk.
        let mut anchor = None;
        for page in self.cfg.page_start..=self.cfg.page_end {
            let header = self.read_page_header(page)?;
            if header.is_used() {
                anchor = Some((page, header.sequence));
                break;
            }
        }

        let Some((anchor_page, anchor_nr)) = anchor else {
            // Nothing live. The first append claims the first page of the range.
            self.page_first = None;
            self.page_last = self.cfg.page_start;
            self.next_sequence = 0;
            self.write_addr = Address::first_slot(self.cfg.page_start);
            return Ok(());
        };

        // Walk the circle of used pages once. Rolling numbers grow monotonically
        // in write order, so going forward around the physical circle jumps
        // backward in logical time exactly once: at the seam between the newest
        // and the oldest surviving page. That pair has the largest wrapping
        // difference, since skipped (erased or bad) pages only ever inflate the
        // gap at the seam.
        let mut prev = (anchor_page, anchor_nr);
        // (diff, first candidate, last candidate, last candidate's number)
        let mut seam: Option<(u16, u32, u32, u16)> = None;

        let mut page = self.cfg.next_page(anchor_page);
        while page != anchor_page {
            let header = self.read_page_header(page)?;
            if header.is_used() {
                let diff = header.sequence.wrapping_sub(prev.1);
                if seam.is_none_or(|best| diff > best.0) {
                    seam = Some((diff, page, prev.0, prev.1));
                }
                prev = (page, header.sequence);
            }
            page = self.cfg.next_page(page);
        }

        let (page_first, page_last, last_nr) = match seam {
            None => {
                // A single used page is both the oldest and the newest.
                (anchor_page, anchor_page, anchor_nr)
            }
            Some((best_diff, first, last, last_nr)) => {
                // The pair closing the circle competes as well.
                let closing_diff = anchor_nr.wrapping_sub(prev.1);
                if closing_diff > best_diff {
                    (anchor_page, prev.0, prev.1)
                } else {
                    (first, last, last_nr)
                }
            }
        };

        self.page_first = Some(page_first);
        self.page_last = page_last;
        self.next_sequence = last_nr.wrapping_add(1);
        self.write_addr = self.find_write_address(page_last)?;

        #[cfg(feature = "debug-logs")]
        println!(
            "index: first {page_first} last {page_last} next_seq {} write {:?}",
            self.next_sequence, self.write_addr
        );

        Ok(())
    }

    /// Scans the newest page slot by slot for the first free record marker.
    /// Anything other than an untouched 0xFF counts as occupied, including a
    /// record a crash left half-written; such a slot fails its checksum and is
    /// demoted on the next read instead. A completely full page pushes the
    /// write cursor to the first slot of the following page.
    fn find_write_address(&mut self, page_last: u32) -> Result<Address, Error> {
        let mut slot = Address::first_slot(page_last);
        for _ in 0..self.cfg.records_per_page() {
            if self.read_byte(slot.page, slot.offset)? == MARKER_FREE {
                return Ok(slot);
            }
            slot.offset += self.cfg.record_size();
        }
        Ok(Address::first_slot(self.cfg.next_page(page_last)))
    }
}
