#![allow(dead_code)]

// filename according to https://doc.rust-lang.org/book/ch11-03-test-organization.html
use embedded_storage::nor_flash::{
    ErrorType, NorFlash, NorFlashError, NorFlashErrorKind, ReadNorFlash,
};
use ringlog::{Config, FullPolicy};

pub const PAGE_SIZE: usize = 64;
pub const PAGES_PER_BLOCK: usize = 4;
pub const BLOCK_SIZE: usize = PAGE_SIZE * PAGES_PER_BLOCK;
pub const PAYLOAD_SIZE: usize = 14;
pub const RECORD_SIZE: usize = PAYLOAD_SIZE + 2;
pub const RECORDS_PER_PAGE: usize = 3;
pub const PAGE_HEADER_SIZE: usize = 4;

pub const MARKER_FREE: u8 = 0xFF;
pub const MARKER_USED: u8 = 0xFE;
pub const MARKER_ARCHIVED: u8 = 0xFC;
pub const MARKER_BAD: u8 = 0x00;

/// 8 pages in 2 erase blocks, 3 records of 14 payload bytes per page.
pub fn config(policy: FullPolicy) -> Config {
    Config {
        page_size: PAGE_SIZE as u32,
        pages_per_block: PAGES_PER_BLOCK as u32,
        payload_size: PAYLOAD_SIZE as u32,
        page_start: 0,
        page_end: 7,
        policy,
    }
}

pub fn payload(fill: u8) -> [u8; PAYLOAD_SIZE] {
    [fill; PAYLOAD_SIZE]
}

/// NOR flash mock: byte write granularity, writes can only clear bits,
/// erase resets whole blocks to all-ones. Keeps an operation log and supports
/// two fault models: hard failures after N operations and individual bits
/// stuck at one (a write appears to succeed but the cell does not clear).
#[derive(Default)]
pub struct Flash {
    pub buf: Vec<u8>,
    pub fail_after_operation: usize,
    pub operations: Vec<Operation>,
    pub stuck_bits: Vec<(usize, u8)>,
}

#[derive(Debug, PartialEq, Clone)]
pub enum Operation {
    Read { offset: u32, len: usize },
    Write { offset: u32, len: usize },
    Erase { offset: u32, len: usize },
}

impl Flash {
    pub fn new(pages: usize) -> Self {
        Self {
            buf: vec![0xffu8; PAGE_SIZE * pages],
            fail_after_operation: usize::MAX,
            ..Default::default()
        }
    }

    pub fn new_with_fault(pages: usize, fail_after_operation: usize) -> Self {
        Self {
            buf: vec![0xffu8; PAGE_SIZE * pages],
            fail_after_operation,
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn disable_faults(&mut self) {
        self.fail_after_operation = usize::MAX;
    }

    /// Marks `mask` bits of the byte at `address` as stuck at one: writes will
    /// not clear them, simulating a failing cell.
    pub fn stick_bits(&mut self, address: usize, mask: u8) {
        self.stuck_bits.push((address, mask));
    }

    fn stuck_mask(&self, address: usize) -> u8 {
        self.stuck_bits
            .iter()
            .filter(|(a, _)| *a == address)
            .fold(0, |acc, (_, mask)| acc | mask)
    }

    pub fn erases(&self) -> usize {
        self.operations
            .iter()
            .filter(|op| matches!(op, Operation::Erase { .. }))
            .count()
    }

    pub fn dump_operations(&self) {
        println!("Operations:");
        for op in &self.operations {
            println!("  {:?}", op);
        }
    }

    // --- image crafting helpers, matching the persisted layout bit for bit ---

    pub fn header_bytes(sequence: u16) -> [u8; PAGE_HEADER_SIZE] {
        let seq = sequence.to_le_bytes();
        let checksum = crc8(0xFF, &[MARKER_USED, seq[0], seq[1]]);
        [MARKER_USED, seq[0], seq[1], checksum]
    }

    pub fn record_bytes(payload: &[u8]) -> Vec<u8> {
        assert_eq!(payload.len(), PAYLOAD_SIZE);
        let mut digest = crc8(0xFF, &[MARKER_USED]);
        digest = crc8(digest, payload);
        let mut raw = vec![MARKER_USED];
        raw.extend_from_slice(payload);
        raw.push(digest);
        raw
    }

    /// Plants a used page with the given sequence number and records directly
    /// into the image, bypassing the engine.
    pub fn plant_page(&mut self, page: usize, sequence: u16, payloads: &[&[u8]]) {
        assert!(payloads.len() <= RECORDS_PER_PAGE);
        let base = page * PAGE_SIZE;
        self.buf[base..base + PAGE_HEADER_SIZE].copy_from_slice(&Self::header_bytes(sequence));
        for (i, payload) in payloads.iter().enumerate() {
            let offset = base + PAGE_HEADER_SIZE + i * RECORD_SIZE;
            self.buf[offset..offset + RECORD_SIZE].copy_from_slice(&Self::record_bytes(payload));
        }
    }

    pub fn page_marker(&self, page: usize) -> u8 {
        self.buf[page * PAGE_SIZE]
    }

    pub fn record_marker(&self, page: usize, slot: usize) -> u8 {
        self.buf[page * PAGE_SIZE + PAGE_HEADER_SIZE + slot * RECORD_SIZE]
    }
}

#[derive(Debug)]
pub struct FlashError;

impl NorFlashError for FlashError {
    fn kind(&self) -> NorFlashErrorKind {
        NorFlashErrorKind::Other
    }
}

impl ErrorType for Flash {
    type Error = FlashError;
}

impl ReadNorFlash for Flash {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        if self.operations.len() >= self.fail_after_operation {
            return Err(FlashError);
        }
        self.operations.push(Operation::Read {
            offset,
            len: bytes.len(),
        });

        let offset = offset as usize;
        bytes.copy_from_slice(&self.buf[offset..offset + bytes.len()]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.buf.len()
    }
}

impl NorFlash for Flash {
    const WRITE_SIZE: usize = 1;

    const ERASE_SIZE: usize = BLOCK_SIZE;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        assert!(from.is_multiple_of(Self::ERASE_SIZE as u32));
        assert!(to.is_multiple_of(Self::ERASE_SIZE as u32));

        if self.operations.len() >= self.fail_after_operation {
            return Err(FlashError);
        }
        self.operations.push(Operation::Erase {
            offset: from,
            len: (to - from) as usize,
        });

        for addr in from..to {
            self.buf[addr as usize] = 0xff;
        }
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        if self.operations.len() >= self.fail_after_operation {
            return Err(FlashError);
        }
        assert!(!bytes.is_empty());

        self.operations.push(Operation::Write {
            offset,
            len: bytes.len(),
        });

        let offset = offset as usize;
        for (i, &val) in bytes.iter().enumerate() {
            // NOR cells only flip bits from 1 to 0; stuck cells not even that
            self.buf[offset + i] &= val | self.stuck_mask(offset + i);
        }
        Ok(())
    }
}

pub fn crc8(init: u8, data: &[u8]) -> u8 {
    unsafe { libz_sys::crc32(init as u64, data.as_ptr(), data.len() as u32) as u8 }
}

impl ringlog::platform::Crc8 for Flash {
    fn crc8(init: u8, data: &[u8]) -> u8 {
        crc8(init, data)
    }
}
