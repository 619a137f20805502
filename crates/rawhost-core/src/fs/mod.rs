//! Caching file access over slow read-only media.
//!
//! One directory cursor is shared by every open: opening a file in the
//! directory the cursor already points at costs no directory loads, anything
//! else unwinds to the root and descends again. A single whole-file cache
//! serves reads of the most recently opened file from memory.

pub mod cache;
pub mod medium;
pub mod path;

pub use cache::{CacheKey, DEFAULT_CACHE_CAPACITY, FileCache};
pub use medium::{EntryId, HostDirMedium, Medium, MemoryMedium};
pub use path::MAX_DEPTH;

use crate::error::{MediumError, RuntimeError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Whence {
    Set,
    Cur,
    End,
}

/// An open file. Dropping it is the same as closing it.
#[derive(Debug)]
pub struct FileHandle {
    path: String,
    key: CacheKey,
    size: u64,
    pos: u64,
    io_err: bool,
}

impl FileHandle {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn tell(&self) -> u64 {
        self.pos
    }

    pub fn is_eof(&self) -> bool {
        self.pos >= self.size
    }

    /// Sticky flag raised by a short or failed transfer.
    pub fn io_err(&self) -> bool {
        self.io_err
    }

    pub fn clear_io_err(&mut self) {
        self.io_err = false;
    }

    pub fn content_hash(&self) -> u32 {
        self.key.hash
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FsStats {
    pub opens: u64,
    /// Transfers issued to the medium, bulk cache loads included.
    pub backing_reads: u64,
    pub dir_loads: u64,
    pub cache_loads: u64,
    pub cache_hits: u64,
}

fn not_found(path: &str, err: MediumError) -> RuntimeError {
    log::debug!("lookup of {path} failed: {err}");
    RuntimeError::NotFound(path.to_string())
}

pub struct MediaFs {
    medium: Box<dyn Medium>,
    cursor: Vec<String>,
    cache: FileCache,
    max_depth: usize,
    stats: FsStats,
}

impl MediaFs {
    pub fn new(medium: Box<dyn Medium>) -> Self {
        Self::with_capacity(medium, DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(medium: Box<dyn Medium>, cache_capacity: usize) -> Self {
        Self {
            medium,
            cursor: Vec::new(),
            cache: FileCache::new(cache_capacity),
            max_depth: MAX_DEPTH,
            stats: FsStats::default(),
        }
    }

    pub fn set_max_depth(&mut self, depth: usize) {
        self.max_depth = depth;
    }

    /// Directories the cursor has descended into, outermost first.
    pub fn cursor(&self) -> &[String] {
        &self.cursor
    }

    pub fn cache(&self) -> &FileCache {
        &self.cache
    }

    pub fn stats(&self) -> FsStats {
        self.stats
    }

    /// Open `path`, making it the cached file unless it already is.
    ///
    /// On a failed traversal the cursor stays where the descent stopped.
    pub fn open(&mut self, path: &str) -> Result<FileHandle, RuntimeError> {
        let segs = path::segments(path);
        let Some((file, dirs)) = segs.split_last() else {
            return Err(RuntimeError::NotFound(path.to_string()));
        };
        self.resolve_dirs(dirs, path)?;

        let name = path::file_name(file);
        let id = self.medium.find(&name).map_err(|err| not_found(path, err))?;
        let size = self.medium.file_size(id).map_err(|err| not_found(path, err))?;

        let mut normalized: Vec<String> = dirs.iter().map(|d| path::dir_name(d)).collect();
        normalized.push(name);
        let normalized = normalized.join("/");
        let key = CacheKey {
            hash: path::hash_path(&normalized),
            id,
        };

        self.stats.opens += 1;
        let mut io_err = false;
        if self.cache.holds(key) {
            self.stats.cache_hits += 1;
            io_err = (self.cache.len() as u64) < size;
        } else {
            if size > self.cache.capacity() as u64 {
                return Err(RuntimeError::CacheFull {
                    path: path.to_string(),
                    size,
                    capacity: self.cache.capacity(),
                });
            }
            self.stats.backing_reads += 1;
            self.stats.cache_loads += 1;
            let medium = &mut self.medium;
            let got = self
                .cache
                .replace_with(key, size as usize, |body| medium.read_at(id, 0, body))
                .map_err(|err| not_found(path, err))?;
            io_err = (got as u64) < size;
            log::debug!("cached {normalized} ({got} of {size} bytes)");
        }

        Ok(FileHandle {
            path: path.to_string(),
            key,
            size,
            pos: 0,
            io_err,
        })
    }

    /// Move the cursor of `handle`. Performs no I/O.
    ///
    /// `Set` and `Cur` must land inside the file; `End` may land exactly on
    /// the end.
    pub fn seek(
        &self,
        handle: &mut FileHandle,
        offset: i64,
        whence: Whence,
    ) -> Result<u64, RuntimeError> {
        let size = handle.size as i64;
        let (target, valid) = match whence {
            Whence::Set => (offset, (0..size).contains(&offset)),
            Whence::Cur => {
                let target = handle.pos as i64 + offset;
                (target, (0..size).contains(&target))
            }
            Whence::End => {
                let target = size + offset;
                (target, (0..=size).contains(&target))
            }
        };
        if !valid {
            return Err(RuntimeError::OutOfRange {
                offset: target,
                size: handle.size,
            });
        }
        handle.pos = target as u64;
        Ok(handle.pos)
    }

    pub fn tell(&self, handle: &FileHandle) -> u64 {
        handle.pos
    }

    pub fn eof(&self, handle: &FileHandle) -> bool {
        handle.is_eof()
    }

    /// Read up to `buf.len()` bytes. Short at end of file. A transfer that
    /// comes up short before the end raises the handle's error flag.
    pub fn read(&mut self, handle: &mut FileHandle, buf: &mut [u8]) -> usize {
        if handle.pos >= handle.size || buf.is_empty() {
            return 0;
        }
        let want = buf.len().min((handle.size - handle.pos) as usize);
        let got = if self.cache.holds(handle.key) {
            self.cache.read(handle.pos as usize, &mut buf[..want])
        } else {
            self.stats.backing_reads += 1;
            match self.medium.read_at(handle.key.id, handle.pos, &mut buf[..want]) {
                Ok(n) => n,
                Err(err) => {
                    log::warn!("read of {} failed: {err}", handle.path);
                    handle.io_err = true;
                    0
                }
            }
        };
        if got < want {
            handle.io_err = true;
        }
        handle.pos += got as u64;
        got
    }

    /// Read exactly `buf.len()` bytes, raising the handle's error flag on a
    /// short transfer.
    pub fn read_exact_into(&mut self, handle: &mut FileHandle, buf: &mut [u8]) -> usize {
        let got = self.read(handle, buf);
        if got < buf.len() {
            handle.io_err = true;
        }
        got
    }

    /// Read one line of at most `max - 1` bytes. The newline is consumed but
    /// not returned. `None` at end of file.
    pub fn read_line(&mut self, handle: &mut FileHandle, max: usize) -> Option<String> {
        let mut buf = vec![0u8; max.saturating_sub(1)];
        if buf.is_empty() {
            return None;
        }
        let got = self.read(handle, &mut buf);
        if got == 0 {
            return None;
        }
        match buf[..got].iter().position(|&b| b == b'\n') {
            Some(idx) => {
                handle.pos -= (got - idx - 1) as u64;
                buf.truncate(idx);
            }
            None => buf.truncate(got),
        }
        Some(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Media are read-only: nothing is written. A non-empty write raises the
    /// handle's error flag.
    pub fn write(&mut self, handle: &mut FileHandle, data: &[u8]) -> usize {
        if !data.is_empty() {
            log::trace!("dropped {} byte write to {}", data.len(), handle.path);
            handle.io_err = true;
        }
        0
    }

    pub fn close(&mut self, handle: FileHandle) {
        log::trace!("closed {} at {}/{}", handle.path, handle.pos, handle.size);
    }

    pub fn read_u8(&mut self, handle: &mut FileHandle) -> u8 {
        let mut b = [0u8; 1];
        self.read_exact_into(handle, &mut b);
        b[0]
    }

    pub fn read_u16_be(&mut self, handle: &mut FileHandle) -> u16 {
        let mut b = [0u8; 2];
        self.read_exact_into(handle, &mut b);
        u16::from_be_bytes(b)
    }

    pub fn read_u32_be(&mut self, handle: &mut FileHandle) -> u32 {
        let mut b = [0u8; 4];
        self.read_exact_into(handle, &mut b);
        u32::from_be_bytes(b)
    }

    pub fn write_u8(&mut self, handle: &mut FileHandle, value: u8) -> usize {
        self.write(handle, &[value])
    }

    pub fn write_u16_be(&mut self, handle: &mut FileHandle, value: u16) -> usize {
        self.write(handle, &value.to_be_bytes())
    }

    pub fn write_u32_be(&mut self, handle: &mut FileHandle, value: u32) -> usize {
        self.write(handle, &value.to_be_bytes())
    }

    /// Resolve the directory part of `pattern` and return the first entry
    /// whose name contains the final segment. Leading and trailing `*` are
    /// ignored.
    pub fn match_glob(&mut self, pattern: &str) -> Result<String, RuntimeError> {
        let segs = path::segments(pattern);
        let Some((token, dirs)) = segs.split_last() else {
            return Err(RuntimeError::NotFound(pattern.to_string()));
        };
        self.resolve_dirs(dirs, pattern)?;

        let needle = path::dir_name(token.trim_start_matches('*').trim_end_matches('*'));
        let entries = self.medium.entries().map_err(|err| not_found(pattern, err))?;
        entries
            .into_iter()
            .find(|entry| entry.to_ascii_uppercase().contains(&needle))
            .ok_or_else(|| RuntimeError::NotFound(pattern.to_string()))
    }

    /// Unwind the cursor to the root directory.
    pub fn rewind(&mut self) {
        while self.cursor.pop().is_some() {
            if let Err(err) = self.medium.leave() {
                log::warn!("leaving directory failed: {err}");
            }
            self.stats.dir_loads += 1;
        }
    }

    fn resolve_dirs(&mut self, dirs: &[&str], path: &str) -> Result<(), RuntimeError> {
        if path::same_dir(dirs, &self.cursor) {
            return Ok(());
        }
        self.rewind();
        for dir in dirs {
            self.crawl(dir, path)?;
        }
        Ok(())
    }

    fn crawl(&mut self, token: &str, path: &str) -> Result<(), RuntimeError> {
        match token {
            "." => Ok(()),
            ".." => {
                if self.cursor.pop().is_some() {
                    self.medium.leave().map_err(|err| not_found(path, err))?;
                    self.stats.dir_loads += 1;
                }
                Ok(())
            }
            name => {
                if self.cursor.len() >= self.max_depth {
                    log::debug!("{path} is deeper than {} directories", self.max_depth);
                    return Err(RuntimeError::NotFound(path.to_string()));
                }
                let name = path::dir_name(name);
                let id = self.medium.find(&name).map_err(|err| not_found(path, err))?;
                self.medium.enter(id).map_err(|err| not_found(path, err))?;
                self.stats.dir_loads += 1;
                self.cursor.push(name);
                Ok(())
            }
        }
    }
}
