//! Seekable spool for uploaded file parts
//!
//! Multipart bodies arrive as a one-way stream, but the upload pipeline needs
//! to seek (to infer a missing size) and to hand a rewound stream to storage.
//! Parts are therefore buffered in memory up to a limit, then spilled to a
//! temporary file.
//!
//! # Example
//!
//! ```
//! use wave_uploadr::upload::spool::Spooler;
//! use std::io::Read;
//!
//! # fn main() -> std::io::Result<()> {
//! let mut spooler = Spooler::new(4);
//! spooler.write(b"hello ")?;
//! spooler.write(b"world")?;
//! let mut file = spooler.finish()?;
//!
//! assert!(!file.is_in_memory());
//! let mut contents = String::new();
//! file.read_to_string(&mut contents)?;
//! assert_eq!(contents, "hello world");
//! # Ok(())
//! # }
//! ```

use bytes::{Bytes, BytesMut};
use std::fs::{File, OpenOptions};
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A fully received file part, readable and seekable from the start.
///
/// Temp files backing a spilled part are removed on drop.
#[derive(Debug)]
pub struct UploadFile {
    inner: Spool,
}

#[derive(Debug)]
enum Spool {
    Memory(Cursor<Bytes>),
    Disk(TempFile),
}

impl UploadFile {
    /// Wrap an in-memory buffer
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        Self {
            inner: Spool::Memory(Cursor::new(data.into())),
        }
    }

    /// True when the part never exceeded the memory limit
    pub fn is_in_memory(&self) -> bool {
        matches!(self.inner, Spool::Memory(_))
    }

    /// The buffered bytes, for in-memory parts
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match &self.inner {
            Spool::Memory(cursor) => Some(cursor.get_ref()),
            Spool::Disk(_) => None,
        }
    }

    /// Path of the backing temp file, for spilled parts
    pub fn path(&self) -> Option<&Path> {
        match &self.inner {
            Spool::Memory(_) => None,
            Spool::Disk(temp) => Some(&temp.path),
        }
    }

    /// Read the remaining contents into memory
    pub fn into_bytes(mut self) -> io::Result<Bytes> {
        match self.inner {
            Spool::Memory(ref cursor) => {
                let start = (cursor.position() as usize).min(cursor.get_ref().len());
                Ok(cursor.get_ref().slice(start..))
            }
            Spool::Disk(ref mut temp) => {
                let mut buffer = Vec::new();
                temp.file.read_to_end(&mut buffer)?;
                Ok(Bytes::from(buffer))
            }
        }
    }
}

impl Read for UploadFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.inner {
            Spool::Memory(cursor) => cursor.read(buf),
            Spool::Disk(temp) => temp.file.read(buf),
        }
    }
}

impl Seek for UploadFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match &mut self.inner {
            Spool::Memory(cursor) => cursor.seek(pos),
            Spool::Disk(temp) => temp.file.seek(pos),
        }
    }
}

/// Incrementally builds an [`UploadFile`] from streamed chunks
#[derive(Debug)]
pub struct Spooler {
    memory_limit: usize,
    temp_dir: PathBuf,
    buffer: BytesMut,
    disk: Option<TempFile>,
}

impl Spooler {
    /// Buffer up to `memory_limit` bytes before spilling to disk
    pub fn new(memory_limit: usize) -> Self {
        Self {
            memory_limit,
            temp_dir: std::env::temp_dir(),
            buffer: BytesMut::new(),
            disk: None,
        }
    }

    /// Spill into `dir` instead of the system temp directory
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    /// True when writing `len` more bytes touches the filesystem
    pub fn needs_disk(&self, len: usize) -> bool {
        self.disk.is_some() || self.buffer.len() + len > self.memory_limit
    }

    /// Append a chunk
    pub fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        if let Some(temp) = self.disk.as_mut() {
            return temp.file.write_all(chunk);
        }

        if self.buffer.len() + chunk.len() <= self.memory_limit {
            self.buffer.extend_from_slice(chunk);
            return Ok(());
        }

        let mut temp = TempFile::create(&self.temp_dir)?;
        temp.file.write_all(&self.buffer)?;
        temp.file.write_all(chunk)?;
        self.buffer.clear();

        tracing::debug!(
            path = %temp.path.display(),
            memory_limit = self.memory_limit,
            "Spilled upload part to disk"
        );

        self.disk = Some(temp);
        Ok(())
    }

    /// Finish writing and rewind to the start
    pub fn finish(self) -> io::Result<UploadFile> {
        match self.disk {
            Some(mut temp) => {
                temp.file.flush()?;
                temp.file.seek(SeekFrom::Start(0))?;
                Ok(UploadFile {
                    inner: Spool::Disk(temp),
                })
            }
            None => Ok(UploadFile::from_bytes(self.buffer.freeze())),
        }
    }
}

#[derive(Debug)]
struct TempFile {
    path: PathBuf,
    file: File,
}

impl TempFile {
    fn create(dir: &Path) -> io::Result<Self> {
        let path = dir.join(format!("wave-{}.part", uuid::Uuid::new_v4()));
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)?;
        Ok(Self { path, file })
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to clean up spooled upload"
                );
            }
        }
    }
}
