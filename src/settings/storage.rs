//! Storage medium for the settings record.
//!
//! The record lives in one erase sector. Raw reads must happen inside an
//! exclusive window (interrupts suppressed on real hardware) so that a
//! half-read record is never observed; [`ExclusiveAccess`] opens the window
//! and closes it again on every exit path.

use std::fmt;
use std::io;

/// Size of the sector holding the settings record.
pub const SECTOR_SIZE: usize = 4096;

/// Value of an erased flash byte.
pub const ERASED_BYTE: u8 = 0xFF;

/// Storage errors.
#[derive(Debug)]
pub enum StorageError {
    /// Host file I/O error.
    Io(io::Error),
    /// NVS error (ESP32 only).
    #[cfg(feature = "esp32")]
    Nvs(esp_idf_sys::EspError),
    /// Data does not fit in the sector.
    TooLarge { size: usize, max: usize },
    /// Data read back after a write differs from what was written.
    VerifyFailed,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "storage I/O error: {}", e),
            #[cfg(feature = "esp32")]
            Self::Nvs(e) => write!(f, "NVS error: {:?}", e),
            Self::TooLarge { size, max } => {
                write!(f, "data too large: {} bytes (max {})", size, max)
            }
            Self::VerifyFailed => write!(f, "read-back verification failed"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<io::Error> for StorageError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// A single-sector non-volatile storage medium.
pub trait Flash {
    /// Read from the start of the sector. Bytes never written read as
    /// [`ERASED_BYTE`].
    fn read(&mut self, buf: &mut [u8]) -> Result<(), StorageError>;

    /// Erase the whole sector.
    fn erase(&mut self) -> Result<(), StorageError>;

    /// Program `data` at the start of a previously erased sector.
    fn program(&mut self, data: &[u8]) -> Result<(), StorageError>;

    /// Open the exclusive window for a raw read.
    fn enter_exclusive(&mut self) {}

    /// Close the exclusive window.
    fn exit_exclusive(&mut self) {}
}

/// Scoped exclusive access to a [`Flash`].
///
/// The window closes when the guard is dropped.
pub struct ExclusiveAccess<'a, F: Flash + ?Sized> {
    flash: &'a mut F,
}

impl<'a, F: Flash + ?Sized> ExclusiveAccess<'a, F> {
    /// Open the exclusive window.
    pub fn enter(flash: &'a mut F) -> Self {
        flash.enter_exclusive();
        Self { flash }
    }

    /// Raw read inside the window.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<(), StorageError> {
        self.flash.read(buf)
    }
}

impl<F: Flash + ?Sized> Drop for ExclusiveAccess<'_, F> {
    fn drop(&mut self) {
        self.flash.exit_exclusive();
    }
}

/// In-memory flash sector.
///
/// Programming can only clear bits, as on real NOR flash, so a write without
/// a preceding erase corrupts the data. Erase/program cycles and exclusive
/// windows are counted.
#[derive(Debug)]
pub struct MemoryFlash {
    data: Vec<u8>,
    erase_count: u32,
    program_count: u32,
    exclusive: bool,
    exclusive_windows: u32,
    unguarded_reads: u32,
    fail_reads: bool,
}

impl Default for MemoryFlash {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFlash {
    /// Create an erased sector.
    pub fn new() -> Self {
        Self {
            data: vec![ERASED_BYTE; SECTOR_SIZE],
            erase_count: 0,
            program_count: 0,
            exclusive: false,
            exclusive_windows: 0,
            unguarded_reads: 0,
            fail_reads: false,
        }
    }

    /// Create a sector pre-loaded with `contents` (no cycle counted).
    pub fn with_contents(contents: &[u8]) -> Self {
        let mut flash = Self::new();
        let len = contents.len().min(SECTOR_SIZE);
        flash.data[..len].copy_from_slice(&contents[..len]);
        flash
    }

    /// Raw sector contents.
    pub fn contents(&self) -> &[u8] {
        &self.data
    }

    /// Overwrite a byte directly (corruption injection).
    pub fn poke(&mut self, offset: usize, value: u8) {
        if let Some(b) = self.data.get_mut(offset) {
            *b = value;
        }
    }

    /// Make subsequent reads fail.
    pub fn set_fail_reads(&mut self, fail: bool) {
        self.fail_reads = fail;
    }

    /// Number of erase operations.
    pub fn erase_count(&self) -> u32 {
        self.erase_count
    }

    /// Number of program operations.
    pub fn program_count(&self) -> u32 {
        self.program_count
    }

    /// Number of exclusive windows opened.
    pub fn exclusive_windows(&self) -> u32 {
        self.exclusive_windows
    }

    /// Whether an exclusive window is currently open.
    pub fn in_exclusive(&self) -> bool {
        self.exclusive
    }

    /// Reads performed outside an exclusive window.
    pub fn unguarded_reads(&self) -> u32 {
        self.unguarded_reads
    }
}

impl Flash for MemoryFlash {
    fn read(&mut self, buf: &mut [u8]) -> Result<(), StorageError> {
        if !self.exclusive {
            self.unguarded_reads += 1;
        }
        if self.fail_reads {
            return Err(StorageError::Io(io::Error::new(
                io::ErrorKind::Other,
                "injected read failure",
            )));
        }
        if buf.len() > SECTOR_SIZE {
            return Err(StorageError::TooLarge {
                size: buf.len(),
                max: SECTOR_SIZE,
            });
        }
        buf.copy_from_slice(&self.data[..buf.len()]);
        Ok(())
    }

    fn erase(&mut self) -> Result<(), StorageError> {
        self.data.fill(ERASED_BYTE);
        self.erase_count += 1;
        Ok(())
    }

    fn program(&mut self, data: &[u8]) -> Result<(), StorageError> {
        if data.len() > SECTOR_SIZE {
            return Err(StorageError::TooLarge {
                size: data.len(),
                max: SECTOR_SIZE,
            });
        }
        for (cell, &b) in self.data.iter_mut().zip(data) {
            *cell &= b;
        }
        self.program_count += 1;
        Ok(())
    }

    fn enter_exclusive(&mut self) {
        self.exclusive = true;
        self.exclusive_windows += 1;
    }

    fn exit_exclusive(&mut self) {
        self.exclusive = false;
    }
}
