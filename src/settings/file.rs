//! File-backed settings sector for host (development) builds.
//!
//! Uses `~/.lora-p2p-node/settings.bin` by default. A missing file reads as
//! an erased sector.

use log::{debug, info};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::storage::{Flash, StorageError, ERASED_BYTE, SECTOR_SIZE};

/// Get the default settings file path.
///
/// Returns `~/.lora-p2p-node/settings.bin`
pub fn default_settings_path() -> io::Result<PathBuf> {
    let home = std::env::var("HOME")
        .map_err(|_| io::Error::new(io::ErrorKind::NotFound, "HOME not set"))?;
    Ok(PathBuf::from(home)
        .join(".lora-p2p-node")
        .join("settings.bin"))
}

/// Settings sector emulated by a file.
#[derive(Debug, Clone)]
pub struct FileFlash {
    path: PathBuf,
}

impl FileFlash {
    /// Use the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> io::Result<Vec<u8>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No settings file at {:?}", self.path);
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    fn store(&self, bytes: &[u8]) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, bytes)?;

        // Verify write by reading back
        let read_back = fs::read(&self.path)?;
        if read_back != bytes {
            return Err(StorageError::VerifyFailed);
        }
        Ok(())
    }
}

impl Flash for FileFlash {
    fn read(&mut self, buf: &mut [u8]) -> Result<(), StorageError> {
        if buf.len() > SECTOR_SIZE {
            return Err(StorageError::TooLarge {
                size: buf.len(),
                max: SECTOR_SIZE,
            });
        }
        let bytes = self.load()?;
        let len = bytes.len().min(buf.len());
        buf[..len].copy_from_slice(&bytes[..len]);
        buf[len..].fill(ERASED_BYTE);
        Ok(())
    }

    fn erase(&mut self) -> Result<(), StorageError> {
        self.store(&vec![ERASED_BYTE; SECTOR_SIZE])
    }

    fn program(&mut self, data: &[u8]) -> Result<(), StorageError> {
        if data.len() > SECTOR_SIZE {
            return Err(StorageError::TooLarge {
                size: data.len(),
                max: SECTOR_SIZE,
            });
        }
        let mut sector = self.load()?;
        sector.resize(SECTOR_SIZE, ERASED_BYTE);
        for (cell, &b) in sector.iter_mut().zip(data) {
            *cell &= b;
        }
        self.store(&sector)?;
        info!("Settings written to {:?}", self.path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::atomic::{AtomicU32, Ordering};

    // Counter to ensure unique test files even in parallel execution
    static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

    fn unique_settings_path() -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let pid = std::process::id();
        env::temp_dir()
            .join(format!("lora-p2p-test-{}-{}", pid, id))
            .join("settings.bin")
    }

    #[test]
    fn test_missing_file_reads_erased() {
        let mut flash = FileFlash::new(unique_settings_path());
        let mut buf = [0u8; 8];
        flash.read(&mut buf).unwrap();
        assert_eq!(buf, [ERASED_BYTE; 8]);
    }

    #[test]
    fn test_erase_program_read() {
        let path = unique_settings_path();
        let mut flash = FileFlash::new(&path);

        flash.erase().unwrap();
        flash.program(&[0xAA, 0x55, 0x01]).unwrap();

        let mut reopened = FileFlash::new(&path);
        let mut buf = [0u8; 4];
        reopened.read(&mut buf).unwrap();
        assert_eq!(buf, [0xAA, 0x55, 0x01, 0xFF]);

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }
}
