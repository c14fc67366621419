use embedded_storage::nor_flash::NorFlash;

/// See README.md for an example implementation.
pub trait Platform: Crc8 + NorFlash {}

impl<T: Crc8 + NorFlash> Platform for T {}

pub type FnCrc8 = fn(init: u8, data: &[u8]) -> u8;

/// 8-bit checksum capability. The concrete polynomial is the caller's choice;
/// the engine only chains it over byte slices and compares digests. The same
/// function must be used for the lifetime of the stored data.
pub trait Crc8 {
    fn crc8(init: u8, data: &[u8]) -> u8;
}

impl<T: Crc8> Crc8 for &mut T {
    fn crc8(init: u8, data: &[u8]) -> u8 {
        T::crc8(init, data)
    }
}
