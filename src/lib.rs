#![doc = include_str!("../README.md")]
#![cfg_attr(not(target_arch = "x86_64"), no_std)]

mod addr;
mod archive;
pub mod error;
mod index;
pub mod platform;
mod raw;
mod read;
mod write;

use crate::addr::Address;
use crate::error::Error;
use crate::platform::Platform;
use crate::raw::PageMarker;

/// What `append` does once the write cursor catches up with the oldest live
/// page. There is no hidden default; the caller has to pick one.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FullPolicy {
    /// Reject further appends with `Error::Full`. Existing data is never touched.
    StopWhenFull,
    /// Erase the oldest erase block to make room, discarding its records.
    OverwriteOldest,
}

/// Store geometry and policy, fixed at mount time. All fields are required;
/// see `Config` validation in the crate docs for the exact constraints.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Bytes per page, including the 4-byte header.
    pub page_size: u32,
    /// Pages per erase block; must be a power of two and multiply with
    /// `page_size` to the erase size of the medium.
    pub pages_per_block: u32,
    /// Record payload bytes, excluding marker and checksum.
    pub payload_size: u32,
    /// First page of the circular range, erase-block aligned.
    pub page_start: u32,
    /// Last page of the circular range, inclusive. The range must span at
    /// least two erase blocks.
    pub page_end: u32,
    pub policy: FullPolicy,
}

/// Per-page usage counters over the configured range.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LogStatistics {
    pub free_pages: u32,
    pub used_pages: u32,
    pub archived_pages: u32,
    pub bad_pages: u32,
}

/// The live engine state. Everything in here is reconstructible from the
/// medium; the handle itself is never persisted. Exactly one handle may exist
/// per physical page range and all calls against it must be serialized by the
/// caller.
pub struct Ringlog<T: Platform> {
    pub(crate) hal: T,
    pub(crate) cfg: Config,

    // set by rebuild_index and maintained by the appender
    pub(crate) page_first: Option<u32>,
    pub(crate) page_last: u32,
    pub(crate) next_sequence: u16,
    pub(crate) write_addr: Address,

    // read cursor; read_seq pins it to the rolling number of its page so a
    // block erase underneath it is detected
    pub(crate) read_addr: Address,
    pub(crate) read_seq: u16,
    pub(crate) at_record: bool,
    pub(crate) archived: bool,

    pub(crate) faulted: bool,
    pub(crate) fatal: bool,
}

impl<T: Platform> Ringlog<T> {
    /// Validates the configuration and scans every page header once to rebuild
    /// the index: the oldest and newest live pages, the next rolling number and
    /// the next free record slot. Headers that fail validation are demoted to
    /// bad and excluded, so a prior crash or power loss at any point never
    /// prevents mounting.
    pub fn mount(cfg: Config, hal: T) -> Result<Ringlog<T>, Error> {
        cfg.validate::<T>()?;

        let mut log = Ringlog {
            hal,
            cfg,
            page_first: None,
            page_last: cfg.page_start,
            next_sequence: 0,
            write_addr: Address::first_slot(cfg.page_start),
            read_addr: Address::first_slot(cfg.page_start),
            read_seq: 0,
            at_record: false,
            archived: false,
            faulted: false,
            fatal: false,
        };

        if (cfg.page_end as usize + 1) * cfg.page_size as usize > log.hal.capacity() {
            return Err(Error::InvalidPageRange);
        }

        match log.rebuild_index() {
            Ok(()) => Ok(log),
            Err(Error::FlashError) => {
                log.faulted = true;
                Err(Error::FlashError)
            }
            Err(e) => Err(e),
        }
    }

    /// Appends one record. `payload` must be exactly the configured payload
    /// size. `Error::Full` (stop-when-full) and `Error::WriteFail` (one slot or
    /// page went bad, already skipped) are recoverable; a retry continues at
    /// the next slot.
    pub fn append(&mut self, payload: &[u8]) -> Result<(), Error> {
        self.guarded(|log| log.append_inner(payload))
    }

    /// Positions the cursor on the oldest record and copies its payload into
    /// `buf`. `Error::Empty` if the store holds no live records.
    pub fn read_first(&mut self, buf: &mut [u8]) -> Result<(), Error> {
        self.check_buf(buf)?;
        self.guarded(|log| log.read_first_inner(buf))
    }

    /// Advances the cursor to the next valid record. Corrupt slots are demoted
    /// and skipped silently. `Error::NoRecord` once the write cursor is
    /// reached; the traversal can resume after further appends. If the page
    /// under the cursor has been reclaimed in the meantime (overwrite-oldest
    /// erased its block), the traversal restarts at the oldest surviving
    /// record instead of failing.
    pub fn read_next(&mut self, buf: &mut [u8]) -> Result<(), Error> {
        self.check_buf(buf)?;
        self.guarded(|log| log.read_next_inner(buf))
    }

    /// Positions the cursor on the newest record.
    pub fn read_last(&mut self, buf: &mut [u8]) -> Result<(), Error> {
        self.check_buf(buf)?;
        self.guarded(|log| log.read_last_inner(buf))
    }

    /// Steps the cursor back to the previous valid record. `Error::NoRecord`
    /// once the oldest record has been passed, or when the cursor's page has
    /// been reclaimed (nothing older can have survived the erase).
    pub fn read_previous(&mut self, buf: &mut [u8]) -> Result<(), Error> {
        self.check_buf(buf)?;
        self.guarded(|log| log.read_previous_inner(buf))
    }

    /// Whether the record most recently returned by a read was marked archived.
    /// `Error::NoRecord` if no record has been read with this cursor yet.
    pub fn is_archived(&self) -> Result<bool, Error> {
        self.is_archived_inner()
    }

    /// Marks the record most recently returned by a read as archived, and the
    /// whole page once every record on it is archived. Archiving strictly
    /// oldest-to-newest keeps page promotion prompt; out-of-order archiving is
    /// tolerated and merely defers promotion until the last record of the page
    /// is archived.
    pub fn set_archived(&mut self) -> Result<(), Error> {
        self.guarded(|log| log.set_archived_inner())
    }

    /// Drops all logical state without erasing: every used page is demoted to
    /// bad with a single byte write, so stale records are skipped after the
    /// next mount. Under overwrite-oldest the pages are reclaimed by the
    /// regular block erases; under stop-when-full a `wipe` is needed before
    /// new data fits. Clears a fatal condition.
    pub fn reset(&mut self) -> Result<(), Error> {
        if self.faulted {
            return Err(Error::FlashError);
        }

        for page in self.cfg.page_start..=self.cfg.page_end {
            match self.read_page_header(page) {
                Ok(header) if header.is_used() => {
                    if let Err(e) = self.demote_page(page) {
                        return self.latch(e);
                    }
                }
                Ok(_) => {}
                Err(e) => return self.latch(e),
            }
        }
        self.clear_state();
        Ok(())
    }

    /// Erases every block in the range, returning the store to its factory
    /// state. Clears a fatal condition.
    pub fn wipe(&mut self) -> Result<(), Error> {
        if self.faulted {
            return Err(Error::FlashError);
        }

        let from = self.cfg.byte_address(self.cfg.page_start, 0);
        let to = self.cfg.byte_address(self.cfg.page_end + 1, 0);
        if self.hal.erase(from, to).is_err() {
            return self.latch(Error::FlashError);
        }
        self.clear_state();
        Ok(())
    }

    /// Counts pages per header state over the whole range. Invalid headers are
    /// demoted while counting, as everywhere else.
    pub fn statistics(&mut self) -> Result<LogStatistics, Error> {
        if self.faulted {
            return Err(Error::FlashError);
        }

        let mut stats = LogStatistics {
            free_pages: 0,
            used_pages: 0,
            archived_pages: 0,
            bad_pages: 0,
        };
        for page in self.cfg.page_start..=self.cfg.page_end {
            match self.read_page_header(page) {
                Ok(header) => match header.marker {
                    PageMarker::Free => stats.free_pages += 1,
                    PageMarker::Used => stats.used_pages += 1,
                    PageMarker::UsedArchived => stats.archived_pages += 1,
                    PageMarker::Bad => stats.bad_pages += 1,
                },
                Err(e) => return self.latch(e),
            }
        }
        Ok(stats)
    }

    fn check_buf(&self, buf: &[u8]) -> Result<(), Error> {
        if buf.len() != self.cfg.payload_size as usize {
            return Err(Error::InvalidPayloadLength);
        }
        Ok(())
    }

    /// Common wrapper for all mutating operations: a flash fault or a fatal
    /// index inconsistency latches and blocks everything but `reset`/`wipe`.
    fn guarded(&mut self, op: impl FnOnce(&mut Self) -> Result<(), Error>) -> Result<(), Error> {
        if self.faulted {
            return Err(Error::FlashError);
        }
        if self.fatal {
            return Err(Error::Fatal);
        }
        match op(self) {
            Err(Error::FlashError) => {
                self.faulted = true;
                Err(Error::FlashError)
            }
            other => other,
        }
    }

    fn latch<R>(&mut self, e: Error) -> Result<R, Error> {
        if e == Error::FlashError {
            self.faulted = true;
        }
        Err(e)
    }
}

impl<T: Platform> Ringlog<T> {
    fn clear_state(&mut self) {
        self.page_first = None;
        self.page_last = self.cfg.page_start;
        self.next_sequence = 0;
        self.write_addr = Address::first_slot(self.cfg.page_start);
        self.read_addr = Address::first_slot(self.cfg.page_start);
        self.read_seq = 0;
        self.at_record = false;
        self.archived = false;
        self.fatal = false;
    }
}
