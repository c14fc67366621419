use crate::error::Error;
use crate::platform::Platform;
use crate::raw::PAGE_HEADER_SIZE;
use crate::Config;

/// A record slot on the medium. Offsets always land on the record grid that
/// starts right behind the page header.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) struct Address {
    pub(crate) page: u32,
    pub(crate) offset: u32,
}

impl Address {
    pub(crate) fn first_slot(page: u32) -> Self {
        Self {
            page,
            offset: PAGE_HEADER_SIZE as u32,
        }
    }
}

/// Pure address arithmetic over the configured circular page range.
/// None of these touch the medium.
impl Config {
    pub(crate) fn record_size(&self) -> u32 {
        // marker byte + payload + checksum byte
        self.payload_size + 2
    }

    pub(crate) fn records_per_page(&self) -> u32 {
        (self.page_size - PAGE_HEADER_SIZE as u32) / self.record_size()
    }

    pub(crate) fn page_count(&self) -> u32 {
        self.page_end - self.page_start + 1
    }

    pub(crate) fn last_slot_offset(&self) -> u32 {
        PAGE_HEADER_SIZE as u32 + (self.records_per_page() - 1) * self.record_size()
    }

    pub(crate) fn next_page(&self, page: u32) -> u32 {
        if page == self.page_end {
            self.page_start
        } else {
            page + 1
        }
    }

    pub(crate) fn previous_page(&self, page: u32) -> u32 {
        if page == self.page_start {
            self.page_end
        } else {
            page - 1
        }
    }

    pub(crate) fn next_record_address(&self, addr: Address) -> Address {
        if addr.offset >= self.last_slot_offset() {
            Address::first_slot(self.next_page(addr.page))
        } else {
            Address {
                page: addr.page,
                offset: addr.offset + self.record_size(),
            }
        }
    }

    pub(crate) fn previous_record_address(&self, addr: Address) -> Address {
        if addr.offset <= PAGE_HEADER_SIZE as u32 {
            Address {
                page: self.previous_page(addr.page),
                offset: self.last_slot_offset(),
            }
        } else {
            Address {
                page: addr.page,
                offset: addr.offset - self.record_size(),
            }
        }
    }

    pub(crate) fn is_block_start(&self, page: u32) -> bool {
        page.is_multiple_of(self.pages_per_block)
    }

    pub(crate) fn block_base(&self, page: u32) -> u32 {
        page - page % self.pages_per_block
    }

    pub(crate) fn contains_block_of(&self, page: u32, candidate: u32) -> bool {
        let base = self.block_base(page);
        candidate >= base && candidate < base + self.pages_per_block
    }

    pub(crate) fn byte_address(&self, page: u32, offset: u32) -> u32 {
        page * self.page_size + offset
    }

    pub(crate) fn validate<T: Platform>(&self) -> Result<(), Error> {
        if self.payload_size == 0 {
            return Err(Error::InvalidRecordSize);
        }
        if self.page_size < PAGE_HEADER_SIZE as u32 + self.record_size() {
            return Err(Error::InvalidPageSize);
        }
        if self.pages_per_block == 0 || !self.pages_per_block.is_power_of_two() {
            return Err(Error::InvalidEraseBlock);
        }
        if self.pages_per_block as usize * self.page_size as usize != T::ERASE_SIZE {
            return Err(Error::InvalidEraseBlock);
        }
        if T::WRITE_SIZE != 1 || T::READ_SIZE != 1 {
            return Err(Error::UnsupportedMedium);
        }
        if self.page_start > self.page_end {
            return Err(Error::InvalidPageRange);
        }
        if !self.page_start.is_multiple_of(self.pages_per_block)
            || !self.page_count().is_multiple_of(self.pages_per_block)
        {
            return Err(Error::InvalidPageRange);
        }
        if self.page_count() < 2 * self.pages_per_block {
            return Err(Error::InvalidPageRange);
        }
        Ok(())
    }
}
