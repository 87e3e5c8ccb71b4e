pub mod directory;
pub mod zip_store;

pub use directory::DirectoryStore;
pub use zip_store::ZipStore;

use crate::error::Result;

/// Enumerable collection of named byte blobs holding raw telemetry.
///
/// `list` failing means the store as a whole is unavailable. `read` may fail
/// for individual blobs while the rest stay readable.
pub trait BlobStore: Send + Sync {
    fn list(&self) -> Result<Vec<String>>;

    fn read(&self, name: &str) -> Result<Vec<u8>>;

    /// Human-readable location for logs and reports.
    fn describe(&self) -> String;
}

impl<S: BlobStore + ?Sized> BlobStore for Box<S> {
    fn list(&self) -> Result<Vec<String>> {
        (**self).list()
    }

    fn read(&self, name: &str) -> Result<Vec<u8>> {
        (**self).read(name)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
