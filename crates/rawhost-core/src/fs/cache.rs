use super::medium::EntryId;
use crate::error::MediumError;

/// Size of the whole-file cache buffer.
pub const DEFAULT_CACHE_CAPACITY: usize = 210_000;

/// Identity of a cached file: hash of its normalized path plus the entry the
/// path resolved to, so two paths with colliding hashes never share a body.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub hash: u32,
    pub id: EntryId,
}

/// Holds at most one complete file body.
#[derive(Debug)]
pub struct FileCache {
    capacity: usize,
    key: Option<CacheKey>,
    body: Vec<u8>,
}

impl FileCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            key: None,
            body: Vec::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn key(&self) -> Option<CacheKey> {
        self.key
    }

    pub fn holds(&self, key: CacheKey) -> bool {
        self.key == Some(key)
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Evict the current body and load `size` bytes through `load`.
    ///
    /// The cache is left empty if `load` fails. A short load keeps what was
    /// read.
    pub fn replace_with<F>(
        &mut self,
        key: CacheKey,
        size: usize,
        load: F,
    ) -> Result<usize, MediumError>
    where
        F: FnOnce(&mut [u8]) -> Result<usize, MediumError>,
    {
        self.key = None;
        self.body.clear();
        self.body.resize(size, 0);
        let got = match load(&mut self.body) {
            Ok(got) => got,
            Err(err) => {
                self.body.clear();
                return Err(err);
            }
        };
        if got < size {
            log::warn!("cache load returned {got} of {size} bytes");
            self.body.truncate(got);
        }
        self.key = Some(key);
        Ok(got)
    }

    /// Copy from the cached body at `offset`. Returns the number of bytes
    /// copied, short at the end of the body.
    pub fn read(&self, offset: usize, out: &mut [u8]) -> usize {
        let start = offset.min(self.body.len());
        let n = out.len().min(self.body.len() - start);
        out[..n].copy_from_slice(&self.body[start..start + n]);
        n
    }

    pub fn invalidate(&mut self) {
        self.key = None;
        self.body.clear();
    }
}
