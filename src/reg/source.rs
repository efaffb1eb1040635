// Random access over the hive bytes. Everything else in the crate reads through this.
use std::{
    fs::File,
    io::{self, Read, Seek, SeekFrom},
    path::Path,
};

use super::error::{RegError, Result};

pub trait ByteSource {
    /// Fills as much of `buf` as possible from `offset`, returning the number of bytes read.
    /// A short count means end of data.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;

    /// Total length of the underlying data.
    fn size(&mut self) -> io::Result<u64>;

    /// Reads exactly `len` bytes at `offset`, or fails with [`RegError::TruncatedRead`].
    fn read_exact_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        let got = self.read_at(offset, &mut buf)?;
        if got < len {
            return Err(RegError::TruncatedRead {
                offset,
                needed: len,
                got,
            });
        }
        Ok(buf)
    }
}

// any seekable reader works: files, cursors over in-memory images
impl<R: Read + Seek> ByteSource for R {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        self.seek(SeekFrom::Start(offset))?;

        let mut filled = 0;
        while filled < buf.len() {
            match self.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }

    fn size(&mut self) -> io::Result<u64> {
        self.seek(SeekFrom::End(0))
    }
}

// a hive file on disk; every read seeks first, so the handle is used unbuffered
#[derive(Debug)]
pub struct HiveFile {
    file: File,
}

impl HiveFile {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        Self::try_from(path.as_ref())
    }
}

impl TryFrom<&Path> for HiveFile {
    type Error = io::Error;

    fn try_from(path: &Path) -> std::result::Result<Self, Self::Error> {
        let file = File::open(path)?;

        Ok(Self { file })
    }
}

impl ByteSource for HiveFile {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read_at(offset, buf)
    }

    fn size(&mut self) -> io::Result<u64> {
        self.file.size()
    }
}
