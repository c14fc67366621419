use crate::addr::Address;
use crate::error::Error;
use crate::platform::{FnCrc8, Platform};
use crate::Ringlog;
#[cfg(feature = "defmt")]
use defmt::warn;

pub(crate) const PAGE_HEADER_SIZE: usize = 4;

const CRC8_INIT: u8 = 0xFF;

// Marker state bits. A header or record only ever moves down the chain by
// clearing bits, never back up, mirroring the 1->0 write property of the medium.
const MB_USED: u8 = 0x01;
const MB_ARCHIVED: u8 = 0x02;

pub(crate) const MARKER_FREE: u8 = 0xFF;
pub(crate) const MARKER_USED: u8 = MARKER_FREE & !MB_USED;
pub(crate) const MARKER_ARCHIVED: u8 = MARKER_USED & !MB_ARCHIVED;
pub(crate) const MARKER_BAD: u8 = 0x00;

#[derive(strum::FromRepr, strum::Display, Debug, PartialEq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub(crate) enum PageMarker {
    // All bits set, default state after erase. No header has been written yet.
    Free = MARKER_FREE,

    // Header written, page holds (or is accepting) records.
    Used = MARKER_USED,

    // Every record on the page has been archived; scans may skip it wholesale.
    UsedArchived = MARKER_ARCHIVED,

    // Header failed validation or a write went wrong. Skipped until erased.
    Bad = MARKER_BAD,
}

#[derive(strum::FromRepr, strum::Display, Debug, PartialEq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub(crate) enum RecordMarker {
    Free = MARKER_FREE,
    Record = MARKER_USED,
    RecordArchived = MARKER_ARCHIVED,
    Bad = MARKER_BAD,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub(crate) struct PageHeader {
    pub(crate) marker: PageMarker,
    pub(crate) sequence: u16,
}

impl PageHeader {
    pub(crate) fn is_used(&self) -> bool {
        matches!(self.marker, PageMarker::Used | PageMarker::UsedArchived)
    }
}

/// Header checksum covers marker and rolling number. The archive bit is forced
/// set during digest computation so it can be cleared in place later without
/// invalidating the stored checksum.
pub(crate) fn header_checksum(crc8: FnCrc8, marker: u8, sequence: u16) -> u8 {
    let seq = sequence.to_le_bytes();
    crc8(CRC8_INIT, &[marker | MB_ARCHIVED, seq[0], seq[1]])
}

/// Record checksum covers marker and payload, archive bit normalized as above.
pub(crate) fn record_checksum(crc8: FnCrc8, marker: u8, payload: &[u8]) -> u8 {
    let digest = crc8(CRC8_INIT, &[marker | MB_ARCHIVED]);
    crc8(digest, payload)
}

impl<T: Platform> Ringlog<T> {
    pub(crate) fn read_byte(&mut self, page: u32, offset: u32) -> Result<u8, Error> {
        let mut buf = [0u8; 1];
        self.hal
            .read(self.cfg.byte_address(page, offset), &mut buf)
            .map_err(|_| Error::FlashError)?;
        Ok(buf[0])
    }

    pub(crate) fn write_marker(&mut self, page: u32, offset: u32, marker: u8) -> Result<(), Error> {
        self.hal
            .write(self.cfg.byte_address(page, offset), &[marker])
            .map_err(|_| Error::FlashError)
    }

    /// Reads back `expected.len()` bytes and compares, in small stack chunks.
    fn verify(&mut self, mut address: u32, expected: &[u8]) -> Result<bool, Error> {
        let mut buf = [0u8; 32];
        let mut remaining = expected;
        while !remaining.is_empty() {
            let chunk = remaining.len().min(buf.len());
            self.hal
                .read(address, &mut buf[..chunk])
                .map_err(|_| Error::FlashError)?;
            if buf[..chunk] != remaining[..chunk] {
                return Ok(false);
            }
            address += chunk as u32;
            remaining = &remaining[chunk..];
        }
        Ok(true)
    }

    /// Reads and validates the 4-byte header of `page`. A header that is neither
    /// cleanly free, bad nor a checksum-valid used header is demoted in place,
    /// so a corrupted header can never be re-read as valid.
    pub(crate) fn read_page_header(&mut self, page: u32) -> Result<PageHeader, Error> {
        let mut buf = [0u8; PAGE_HEADER_SIZE];
        self.hal
            .read(self.cfg.byte_address(page, 0), &mut buf)
            .map_err(|_| Error::FlashError)?;

        match PageMarker::from_repr(buf[0]) {
            Some(PageMarker::Free) => Ok(PageHeader {
                marker: PageMarker::Free,
                sequence: 0,
            }),
            Some(PageMarker::Bad) => Ok(PageHeader {
                marker: PageMarker::Bad,
                sequence: 0,
            }),
            Some(marker @ (PageMarker::Used | PageMarker::UsedArchived)) => {
                let sequence = u16::from_le_bytes([buf[1], buf[2]]);
                if buf[3] != header_checksum(T::crc8, buf[0], sequence) {
                    self.demote_page(page)?;
                    return Ok(PageHeader {
                        marker: PageMarker::Bad,
                        sequence: 0,
                    });
                }
                Ok(PageHeader { marker, sequence })
            }
            None => {
                self.demote_page(page)?;
                Ok(PageHeader {
                    marker: PageMarker::Bad,
                    sequence: 0,
                })
            }
        }
    }

    /// Writes a fresh used header and verifies it by read-back. On mismatch the
    /// page is demoted and `false` is returned so the caller can move on.
    pub(crate) fn write_page_header(&mut self, page: u32, sequence: u16) -> Result<bool, Error> {
        #[cfg(feature = "defmt")]
        defmt::trace!("write_page_header: page {} seq {}", page, sequence);

        #[cfg(feature = "debug-logs")]
        println!("raw: write_page_header: page {page} seq {sequence}");

        let seq = sequence.to_le_bytes();
        let buf = [
            MARKER_USED,
            seq[0],
            seq[1],
            header_checksum(T::crc8, MARKER_USED, sequence),
        ];
        let address = self.cfg.byte_address(page, 0);
        self.hal.write(address, &buf).map_err(|_| Error::FlashError)?;

        if !self.verify(address, &buf)? {
            self.demote_page(page)?;
            return Ok(false);
        }
        Ok(true)
    }

    /// Reads the record at `addr`. The payload is copied into `buf` only when a
    /// checksum-valid `Record`/`RecordArchived` is found; any violation demotes
    /// exactly this record and reports it as `Bad`.
    pub(crate) fn read_record(
        &mut self,
        addr: Address,
        buf: &mut [u8],
    ) -> Result<RecordMarker, Error> {
        let raw = self.read_byte(addr.page, addr.offset)?;
        match RecordMarker::from_repr(raw) {
            Some(RecordMarker::Free) => Ok(RecordMarker::Free),
            Some(RecordMarker::Bad) => Ok(RecordMarker::Bad),
            Some(marker @ (RecordMarker::Record | RecordMarker::RecordArchived)) => {
                self.hal
                    .read(self.cfg.byte_address(addr.page, addr.offset + 1), buf)
                    .map_err(|_| Error::FlashError)?;
                let stored = self.read_byte(addr.page, addr.offset + 1 + self.cfg.payload_size)?;
                if stored != record_checksum(T::crc8, raw, buf) {
                    self.demote_record(addr)?;
                    return Ok(RecordMarker::Bad);
                }
                Ok(marker)
            }
            None => {
                self.demote_record(addr)?;
                Ok(RecordMarker::Bad)
            }
        }
    }

    /// Writes marker, payload and checksum at `addr` and verifies by read-back.
    /// Marker first: a crash mid-write leaves the slot non-free, so boot never
    /// places the write cursor on a half-written record.
    pub(crate) fn write_record(&mut self, addr: Address, payload: &[u8]) -> Result<bool, Error> {
        #[cfg(feature = "defmt")]
        defmt::trace!("write_record: page {} offset {}", addr.page, addr.offset);

        let base = self.cfg.byte_address(addr.page, addr.offset);
        let checksum = record_checksum(T::crc8, MARKER_USED, payload);

        self.hal
            .write(base, &[MARKER_USED])
            .map_err(|_| Error::FlashError)?;
        self.hal
            .write(base + 1, payload)
            .map_err(|_| Error::FlashError)?;
        self.hal
            .write(base + 1 + payload.len() as u32, &[checksum])
            .map_err(|_| Error::FlashError)?;

        let ok = self.verify(base, &[MARKER_USED])?
            && self.verify(base + 1, payload)?
            && self.verify(base + 1 + payload.len() as u32, &[checksum])?;
        if !ok {
            self.demote_record(addr)?;
            return Ok(false);
        }
        Ok(true)
    }

    /// Clears the page marker down to `Bad`. Always a legal write since every
    /// bit of the byte is cleared.
    pub(crate) fn demote_page(&mut self, page: u32) -> Result<(), Error> {
        #[cfg(feature = "defmt")]
        warn!("demoting page {}", page);

        #[cfg(feature = "debug-logs")]
        println!("raw: demote_page: page {page}");

        self.write_marker(page, 0, MARKER_BAD)
    }

    pub(crate) fn demote_record(&mut self, addr: Address) -> Result<(), Error> {
        #[cfg(feature = "defmt")]
        warn!("demoting record at page {} offset {}", addr.page, addr.offset);

        #[cfg(feature = "debug-logs")]
        println!("raw: demote_record: page {} offset {}", addr.page, addr.offset);

        self.write_marker(addr.page, addr.offset, MARKER_BAD)
    }
}
