use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use super::path::{names_match, segments};
use crate::error::MediumError;

/// Identifier of a file or directory on a medium. Stable for the lifetime of
/// the medium.
pub type EntryId = u32;

/// Slow, read-only, directory-at-a-time storage.
///
/// The medium has a current directory of its own; lookups only see entries
/// of that directory. Each `enter`/`leave` is a directory load and is
/// expensive on real hardware.
pub trait Medium: Send {
    /// Look up `name` in the current directory. Names arrive upper-cased;
    /// file names carry a trailing `.` when they have no extension.
    fn find(&mut self, name: &str) -> Result<EntryId, MediumError>;

    /// Make directory `id` current.
    fn enter(&mut self, id: EntryId) -> Result<(), MediumError>;

    /// Make the parent directory current. At the root this does nothing.
    fn leave(&mut self) -> Result<(), MediumError>;

    /// Names in the current directory, without self and parent entries.
    fn entries(&mut self) -> Result<Vec<String>, MediumError>;

    fn file_size(&mut self, id: EntryId) -> Result<u64, MediumError>;

    /// Read up to `buf.len()` bytes from `offset`. Returns the number read,
    /// short at end of file.
    fn read_at(&mut self, id: EntryId, offset: u64, buf: &mut [u8]) -> Result<usize, MediumError>;
}

#[derive(Debug)]
enum Node {
    Dir {
        name: String,
        parent: usize,
        children: Vec<usize>,
    },
    File {
        name: String,
        data: Vec<u8>,
    },
}

impl Node {
    fn name(&self) -> &str {
        match self {
            Node::Dir { name, .. } | Node::File { name, .. } => name,
        }
    }
}

/// In-memory medium, mostly for tests and bundled data.
#[derive(Debug)]
pub struct MemoryMedium {
    nodes: Vec<Node>,
    cwd: usize,
}

impl Default for MemoryMedium {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryMedium {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::Dir {
                name: String::new(),
                parent: 0,
                children: Vec::new(),
            }],
            cwd: 0,
        }
    }

    pub fn with_file(mut self, path: &str, data: impl Into<Vec<u8>>) -> Self {
        self.insert_file(path, data);
        self
    }

    /// Add a file, creating missing directories. An existing file at the
    /// same path is replaced.
    pub fn insert_file(&mut self, path: &str, data: impl Into<Vec<u8>>) {
        let segs = segments(path);
        let Some((file, dirs)) = segs.split_last() else {
            return;
        };
        let mut dir = 0;
        for name in dirs {
            dir = match self.child(dir, name) {
                Some(idx) if matches!(self.nodes[idx], Node::Dir { .. }) => idx,
                _ => self.push_child(
                    dir,
                    Node::Dir {
                        name: name.to_string(),
                        parent: dir,
                        children: Vec::new(),
                    },
                ),
            };
        }
        let data = data.into();
        match self.child(dir, file) {
            Some(idx) => {
                self.nodes[idx] = Node::File {
                    name: file.to_string(),
                    data,
                }
            }
            None => {
                self.push_child(
                    dir,
                    Node::File {
                        name: file.to_string(),
                        data,
                    },
                );
            }
        }
    }

    fn push_child(&mut self, dir: usize, node: Node) -> usize {
        let idx = self.nodes.len();
        self.nodes.push(node);
        if let Node::Dir { children, .. } = &mut self.nodes[dir] {
            children.push(idx);
        }
        idx
    }

    fn children(&self, dir: usize) -> &[usize] {
        match &self.nodes[dir] {
            Node::Dir { children, .. } => children,
            Node::File { .. } => &[],
        }
    }

    fn child(&self, dir: usize, name: &str) -> Option<usize> {
        self.children(dir)
            .iter()
            .copied()
            .find(|&idx| names_match(self.nodes[idx].name(), name))
    }

    fn node(&self, id: EntryId) -> Result<&Node, MediumError> {
        self.nodes
            .get(id as usize)
            .ok_or_else(|| MediumError::NoEntry(format!("#{id}")))
    }
}

impl Medium for MemoryMedium {
    fn find(&mut self, name: &str) -> Result<EntryId, MediumError> {
        self.child(self.cwd, name)
            .map(|idx| idx as EntryId)
            .ok_or_else(|| MediumError::NoEntry(name.to_string()))
    }

    fn enter(&mut self, id: EntryId) -> Result<(), MediumError> {
        match self.node(id)? {
            Node::Dir { .. } => {
                self.cwd = id as usize;
                Ok(())
            }
            Node::File { name, .. } => Err(MediumError::NotADirectory(name.clone())),
        }
    }

    fn leave(&mut self) -> Result<(), MediumError> {
        if let Node::Dir { parent, .. } = self.nodes[self.cwd] {
            self.cwd = parent;
        }
        Ok(())
    }

    fn entries(&mut self) -> Result<Vec<String>, MediumError> {
        Ok(self
            .children(self.cwd)
            .iter()
            .map(|&idx| self.nodes[idx].name().to_string())
            .collect())
    }

    fn file_size(&mut self, id: EntryId) -> Result<u64, MediumError> {
        match self.node(id)? {
            Node::File { data, .. } => Ok(data.len() as u64),
            Node::Dir { name, .. } => Err(MediumError::NoEntry(name.clone())),
        }
    }

    fn read_at(&mut self, id: EntryId, offset: u64, buf: &mut [u8]) -> Result<usize, MediumError> {
        let Node::File { data, .. } = self.node(id)? else {
            return Err(MediumError::NoEntry(format!("#{id}")));
        };
        let start = (offset as usize).min(data.len());
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        Ok(n)
    }
}

/// A host directory presented as read-only media. Lookups ignore case.
#[derive(Debug)]
pub struct HostDirMedium {
    root: PathBuf,
    stack: Vec<PathBuf>,
    ids: Vec<PathBuf>,
    lookup: HashMap<PathBuf, EntryId>,
}

impl HostDirMedium {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, MediumError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(MediumError::NotADirectory(root.display().to_string()));
        }
        Ok(Self {
            root,
            stack: Vec::new(),
            ids: Vec::new(),
            lookup: HashMap::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn cwd(&self) -> &Path {
        self.stack.last().unwrap_or(&self.root)
    }

    fn intern(&mut self, path: PathBuf) -> EntryId {
        if let Some(&id) = self.lookup.get(&path) {
            return id;
        }
        let id = self.ids.len() as EntryId;
        self.ids.push(path.clone());
        self.lookup.insert(path, id);
        id
    }

    fn path_of(&self, id: EntryId) -> Result<&Path, MediumError> {
        self.ids
            .get(id as usize)
            .map(PathBuf::as_path)
            .ok_or_else(|| MediumError::NoEntry(format!("#{id}")))
    }

    fn sorted_names(&self) -> Result<Vec<String>, MediumError> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(self.cwd())? {
            names.push(entry?.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }
}

impl Medium for HostDirMedium {
    fn find(&mut self, name: &str) -> Result<EntryId, MediumError> {
        let names = self.sorted_names()?;
        // Prefer an exact spelling over a case-folded one.
        let found = names
            .iter()
            .find(|entry| entry.as_str() == name)
            .or_else(|| names.iter().find(|entry| names_match(entry, name)));
        let Some(entry) = found else {
            return Err(MediumError::NoEntry(name.to_string()));
        };
        let path = self.cwd().join(entry);
        Ok(self.intern(path))
    }

    fn enter(&mut self, id: EntryId) -> Result<(), MediumError> {
        let path = self.path_of(id)?.to_path_buf();
        if !path.is_dir() {
            return Err(MediumError::NotADirectory(path.display().to_string()));
        }
        self.stack.push(path);
        Ok(())
    }

    fn leave(&mut self) -> Result<(), MediumError> {
        self.stack.pop();
        Ok(())
    }

    fn entries(&mut self) -> Result<Vec<String>, MediumError> {
        self.sorted_names()
    }

    fn file_size(&mut self, id: EntryId) -> Result<u64, MediumError> {
        let meta = std::fs::metadata(self.path_of(id)?)?;
        if meta.is_dir() {
            return Err(MediumError::NoEntry(self.path_of(id)?.display().to_string()));
        }
        Ok(meta.len())
    }

    fn read_at(&mut self, id: EntryId, offset: u64, buf: &mut [u8]) -> Result<usize, MediumError> {
        let mut file = File::open(self.path_of(id)?)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut total = 0;
        while total < buf.len() {
            match file.read(&mut buf[total..])? {
                0 => break,
                n => total += n,
            }
        }
        Ok(total)
    }
}
