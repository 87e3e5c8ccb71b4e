use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use zip::ZipArchive;

use crate::error::{Result, TelemetryError};
use crate::store::BlobStore;
use crate::utils::constants::MMAP_THRESHOLD_BYTES;

/// Read-only store over the file entries of a zip archive, e.g. an export of
/// the collector's container.
pub struct ZipStore {
    archive_path: PathBuf,
}

impl ZipStore {
    pub fn new(archive_path: impl Into<PathBuf>) -> Self {
        Self {
            archive_path: archive_path.into(),
        }
    }

    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    fn open(&self) -> Result<ZipArchive<File>> {
        let file = File::open(&self.archive_path).map_err(|e| {
            TelemetryError::Store(format!(
                "cannot open archive {}: {}",
                self.archive_path.display(),
                e
            ))
        })?;
        ZipArchive::new(file).map_err(|e| {
            TelemetryError::Store(format!(
                "cannot read archive {}: {}",
                self.archive_path.display(),
                e
            ))
        })
    }
}

impl BlobStore for ZipStore {
    fn list(&self) -> Result<Vec<String>> {
        let mut archive = self.open()?;
        let mut names = Vec::with_capacity(archive.len());

        for i in 0..archive.len() {
            let entry = archive.by_index(i)?;
            if entry.is_file() {
                names.push(entry.name().to_string());
            }
        }

        names.sort();
        Ok(names)
    }

    fn read(&self, name: &str) -> Result<Vec<u8>> {
        let mut archive = self.open()?;
        let mut entry = archive.by_name(name).map_err(|_| {
            TelemetryError::Store(format!(
                "blob '{}' not found in archive '{}'",
                name,
                self.archive_path.display()
            ))
        })?;

        // The declared size comes from the archive header and is only a hint.
        let mut bytes = Vec::with_capacity(entry.size().min(MMAP_THRESHOLD_BYTES) as usize);
        entry.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    fn describe(&self) -> String {
        format!("archive {}", self.archive_path.display())
    }
}
