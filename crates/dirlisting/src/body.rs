//! Response body as a queue of chunks, with tempfile spillover.
//!
//! Rendered output is appended as owned memory segments, references to
//! existing files (cache hits, raw README includes), or anonymous temp files
//! that large listings spill into so the body never has to sit in memory.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, Write};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

/// Spill files are extended until they reach this size, then a new one is started.
const SPILL_FILE_MAX: u64 = 1024 * 1024;

/// Read buffer size used when copying file-backed chunks.
const COPY_BUF_SIZE: usize = 8192;

/// One immutable piece of the response body.
#[derive(Debug)]
pub enum Chunk {
    /// In-memory segment.
    Mem(Vec<u8>),
    /// Byte range of an existing file.
    File { file: File, offset: u64, len: u64 },
    /// Anonymous temp file holding spilled output. Deleted when dropped.
    Spill { file: File, len: u64 },
}

impl Chunk {
    pub fn len(&self) -> u64 {
        match self {
            Chunk::Mem(data) => data.len() as u64,
            Chunk::File { len, .. } | Chunk::Spill { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Ordered sequence of body chunks owned by the response.
#[derive(Debug)]
pub struct ResponseBody {
    chunks: VecDeque<Chunk>,
    spill_dir: PathBuf,
}

impl Default for ResponseBody {
    fn default() -> Self {
        Self::new(std::env::temp_dir())
    }
}

impl ResponseBody {
    /// Creates an empty body that spills into temp files under `spill_dir`.
    pub fn new(spill_dir: impl Into<PathBuf>) -> Self {
        Self {
            chunks: VecDeque::new(),
            spill_dir: spill_dir.into(),
        }
    }

    /// Empty body sharing this body's spill directory.
    pub fn sibling(&self) -> Self {
        Self::new(self.spill_dir.clone())
    }

    pub fn spill_dir(&self) -> &Path {
        &self.spill_dir
    }

    /// Total queued bytes.
    pub fn len(&self) -> u64 {
        self.chunks.iter().map(Chunk::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.iter().all(Chunk::is_empty)
    }

    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.iter()
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
    }

    pub fn append_mem(&mut self, data: &[u8]) {
        if !data.is_empty() {
            self.chunks.push_back(Chunk::Mem(data.to_vec()));
        }
    }

    /// Appends an owned buffer without copying it.
    pub fn append_buffer(&mut self, data: Vec<u8>) {
        if !data.is_empty() {
            self.chunks.push_back(Chunk::Mem(data));
        }
    }

    pub fn append_file_ref(&mut self, file: File, offset: u64, len: u64) {
        if len > 0 {
            self.chunks.push_back(Chunk::File { file, offset, len });
        }
    }

    /// Opens `path` and appends its whole content as a file reference.
    pub fn append_file(&mut self, path: &Path) -> io::Result<u64> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        self.append_file_ref(file, 0, len);
        Ok(len)
    }

    /// Writes `data` to a temp file chunk instead of keeping it in memory.
    ///
    /// The last spill file is extended while it is the tail of the queue and
    /// still under the size limit.
    pub fn append_mem_to_tempfile(&mut self, data: &[u8]) -> io::Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        if let Some(Chunk::Spill { file, len }) = self.chunks.back_mut()
            && *len + data.len() as u64 <= SPILL_FILE_MAX
        {
            file.write_all_at(data, *len)?;
            *len += data.len() as u64;
            return Ok(());
        }
        let file = tempfile::tempfile_in(&self.spill_dir)?;
        file.write_all_at(data, 0)?;
        self.chunks.push_back(Chunk::Spill {
            file,
            len: data.len() as u64,
        });
        Ok(())
    }

    /// Moves all chunks of `other` to the end of this body.
    pub fn append_body(&mut self, mut other: ResponseBody) {
        self.chunks.append(&mut other.chunks);
    }

    /// Takes the queued chunks, leaving this body empty.
    pub fn take(&mut self) -> ResponseBody {
        ResponseBody {
            chunks: std::mem::take(&mut self.chunks),
            spill_dir: self.spill_dir.clone(),
        }
    }

    /// Copies the full content to `out` without consuming any chunk.
    pub fn copy_to<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<u64> {
        let mut written = 0;
        let mut buf = vec![0u8; COPY_BUF_SIZE];
        for chunk in &self.chunks {
            match chunk {
                Chunk::Mem(data) => {
                    out.write_all(data)?;
                    written += data.len() as u64;
                }
                Chunk::File { file, offset, len } => {
                    written += copy_range(file, *offset, *len, &mut buf, out)?;
                }
                Chunk::Spill { file, len } => {
                    written += copy_range(file, 0, *len, &mut buf, out)?;
                }
            }
        }
        Ok(written)
    }

    /// Reads the whole body into memory.
    pub fn to_vec(&self) -> io::Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.len() as usize);
        self.copy_to(&mut out)?;
        Ok(out)
    }
}

fn copy_range<W: Write + ?Sized>(file: &File, offset: u64, len: u64, buf: &mut [u8], out: &mut W) -> io::Result<u64> {
    let mut done = 0u64;
    while done < len {
        let want = buf.len().min((len - done) as usize);
        let read = file.read_at(&mut buf[..want], offset + done)?;
        if read == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "file chunk shorter than its recorded length",
            ));
        }
        out.write_all(&buf[..read])?;
        done += read as u64;
    }
    Ok(done)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixed_chunks_copy_in_order() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("part.txt");
        std::fs::write(&path, b"0123456789").unwrap();

        let mut body = ResponseBody::new(dir.path());
        body.append_mem(b"head|");
        body.append_file_ref(File::open(&path).unwrap(), 2, 3);
        body.append_mem_to_tempfile(b"|spill").unwrap();
        body.append_mem_to_tempfile(b"|more").unwrap();
        body.append_buffer(b"|tail".to_vec());

        assert_eq!(body.to_vec().unwrap(), b"head|234|spill|more|tail");
        assert_eq!(body.len(), 24);
        // Consecutive spills share one temp file
        assert_eq!(body.chunks().count(), 4);
    }

    #[test]
    fn test_take_and_append_body_preserve_order() {
        let mut body = ResponseBody::default();
        body.append_mem(b"a");
        let mut taken = body.take();
        assert!(body.is_empty());
        body.append_mem(b"b");
        taken.append_body(body.take());
        assert_eq!(taken.to_vec().unwrap(), b"ab");
    }

    #[test]
    fn test_empty_appends_are_ignored() {
        let mut body = ResponseBody::default();
        body.append_mem(b"");
        body.append_buffer(Vec::new());
        body.append_mem_to_tempfile(b"").unwrap();
        assert_eq!(body.chunks().count(), 0);
        assert!(body.is_empty());
    }
}
