use memmap2::Mmap;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use crate::error::{Result, TelemetryError};
use crate::store::BlobStore;
use crate::utils::constants::{DEFAULT_BUFFER_SIZE, MMAP_THRESHOLD_BYTES};

/// Flat directory of blob files, one blob per regular file.
pub struct DirectoryStore {
    root: PathBuf,
    use_mmap: bool,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            use_mmap: false,
        }
    }

    pub fn with_mmap(mut self, use_mmap: bool) -> Self {
        self.use_mmap = use_mmap;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, name: &str) -> Result<PathBuf> {
        // Blob names are plain file names; anything that walks out of the
        // root is refused.
        let candidate = Path::new(name);
        if candidate.components().count() != 1 || candidate.is_absolute() {
            return Err(TelemetryError::Store(format!(
                "invalid blob name '{}' for {}",
                name,
                self.root.display()
            )));
        }
        Ok(self.root.join(candidate))
    }

    fn read_buffered(&self, path: &Path) -> Result<Vec<u8>> {
        let file = File::open(path)?;
        let mut reader = BufReader::with_capacity(DEFAULT_BUFFER_SIZE, file);
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    fn read_mmap(&self, path: &Path) -> Result<Vec<u8>> {
        let file = File::open(path)?;
        // SAFETY: the map is copied out before returning and never outlives
        // the file handle. Concurrent truncation by a writer surfaces as a
        // short or failed read of a single blob, which callers tolerate.
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(mmap.to_vec())
    }
}

impl BlobStore for DirectoryStore {
    fn list(&self) -> Result<Vec<String>> {
        if !self.root.is_dir() {
            return Err(TelemetryError::Store(format!(
                "not a directory: {}",
                self.root.display()
            )));
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn read(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.blob_path(name)?;
        let len = fs::metadata(&path)?.len();
        if self.use_mmap && len >= MMAP_THRESHOLD_BYTES {
            self.read_mmap(&path)
        } else {
            self.read_buffered(&path)
        }
    }

    fn describe(&self) -> String {
        format!("directory {}", self.root.display())
    }
}
