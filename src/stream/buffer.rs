/*
 * Copyright Stalwart Labs Ltd. See the COPYING
 * file at the top-level directory of this distribution.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use super::{SharedStream, Stream, StreamError, StreamResult, Whence};

const BLOCK_SIZE: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferMode {
    /// Reads from the source in 4 KiB blocks.
    BlockRead,
    /// Collects writes into 4 KiB blocks before passing them on.
    BlockWrite,
    /// Caches everything read so far, so that earlier bytes can be
    /// revisited even when the source is not seekable.
    CacheRead,
}

/// Buffering wrapper over another stream.
pub struct BufferStream {
    source: SharedStream,
    mode: BufferMode,
    buf: Vec<u8>,
    /// Absolute source offset of `buf[0]`.
    buf_offset: u64,
    pos: u64,
    closed: bool,
}

impl BufferStream {
    pub fn new(source: SharedStream, mode: BufferMode) -> Self {
        let pos = source.tell();
        BufferStream {
            source,
            mode,
            buf: Vec::new(),
            buf_offset: pos,
            pos,
            closed: false,
        }
    }

    fn cached_end(&self) -> u64 {
        self.buf_offset + self.buf.len() as u64
    }

    /// Extends the cache until it covers `target` or the source ends.
    fn fill_cache_to(&mut self, target: u64) -> StreamResult<()> {
        let mut chunk = [0u8; BLOCK_SIZE];
        while self.cached_end() < target {
            match self.source.read(&mut chunk)? {
                0 => break,
                n => self.buf.extend_from_slice(&chunk[..n]),
            }
        }
        Ok(())
    }
}

impl Stream for BufferStream {
    fn read(&mut self, buf: &mut [u8]) -> StreamResult<usize> {
        if self.closed {
            return Err(StreamError::Closed);
        }
        match self.mode {
            BufferMode::BlockRead => {
                if self.pos < self.buf_offset || self.pos >= self.cached_end() {
                    self.source.seek(self.pos as i64, Whence::Set)?;
                    let mut block = vec![0u8; BLOCK_SIZE];
                    let n = self.source.read(&mut block)?;
                    block.truncate(n);
                    self.buf = block;
                    self.buf_offset = self.pos;
                }
                let start = (self.pos - self.buf_offset) as usize;
                let n = buf.len().min(self.buf.len() - start);
                buf[..n].copy_from_slice(&self.buf[start..start + n]);
                self.pos += n as u64;
                Ok(n)
            }
            BufferMode::CacheRead => {
                self.fill_cache_to(self.pos + buf.len() as u64)?;
                if self.pos < self.buf_offset {
                    return Err(StreamError::OutOfBounds);
                }
                let start = (self.pos - self.buf_offset) as usize;
                let n = buf.len().min(self.buf.len().saturating_sub(start));
                buf[..n].copy_from_slice(&self.buf[start..start + n]);
                self.pos += n as u64;
                Ok(n)
            }
            BufferMode::BlockWrite => Ok(0),
        }
    }

    fn write(&mut self, buf: &[u8]) -> StreamResult<usize> {
        if self.closed {
            return Err(StreamError::Closed);
        }
        match self.mode {
            BufferMode::BlockWrite => {
                self.buf.extend_from_slice(buf);
                self.pos += buf.len() as u64;
                while self.buf.len() >= BLOCK_SIZE {
                    let rest = self.buf.split_off(BLOCK_SIZE);
                    self.source.write_all(&self.buf)?;
                    self.buf = rest;
                }
                Ok(buf.len())
            }
            _ => self.source.write(buf),
        }
    }

    fn flush(&mut self) -> StreamResult<()> {
        if self.mode == BufferMode::BlockWrite && !self.buf.is_empty() {
            let buf = std::mem::take(&mut self.buf);
            self.source.write_all(&buf)?;
        }
        self.source.flush()
    }

    fn close(&mut self) -> StreamResult<()> {
        self.flush()?;
        self.closed = true;
        Ok(())
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> StreamResult<u64> {
        match self.mode {
            BufferMode::CacheRead => {
                let target = match whence {
                    Whence::Set => offset,
                    Whence::Cur => self.pos as i64 + offset,
                    Whence::End => return Err(StreamError::NotSeekable),
                };
                if target < self.buf_offset as i64 {
                    return Err(StreamError::OutOfBounds);
                }
                // A forward seek past the cache buffers the skipped bytes.
                self.fill_cache_to(target as u64)?;
                self.pos = (target as u64).min(self.cached_end());
                Ok(self.pos)
            }
            _ => {
                self.flush()?;
                self.pos = self.source.seek(offset, whence)?;
                self.buf.clear();
                self.buf_offset = self.pos;
                Ok(self.pos)
            }
        }
    }

    fn tell(&self) -> u64 {
        self.pos
    }

    fn bounds(&self) -> (u64, Option<u64>) {
        self.source.bounds()
    }

    fn eos(&mut self) -> bool {
        self.pos >= self.cached_end() && self.source.eos()
    }
}

#[cfg(test)]
mod tests {
    use crate::stream::{BufferMode, BufferStream, MemStream, SharedStream, Stream, Whence};

    #[test]
    fn cache_read_revisits_earlier_bytes() {
        let source = SharedStream::from(&b"the quick brown fox"[..]);
        let mut buffered = BufferStream::new(source, BufferMode::CacheRead);

        let mut buf = [0u8; 9];
        buffered.read(&mut buf).unwrap();
        assert_eq!(&buf, b"the quick");

        buffered.seek(4, Whence::Set).unwrap();
        let mut buf = [0u8; 5];
        buffered.read(&mut buf).unwrap();
        assert_eq!(&buf, b"quick");
    }

    #[test]
    fn block_write_flushes_on_close() {
        let sink = SharedStream::new(MemStream::new());
        let mut buffered = BufferStream::new(sink.clone(), BufferMode::BlockWrite);
        buffered.write(b"buffered ").unwrap();
        buffered.write(b"bytes").unwrap();
        assert_eq!(sink.length(), Some(0));

        buffered.close().unwrap();
        sink.reset().unwrap();
        assert_eq!(sink.read_to_end().unwrap(), b"buffered bytes");
    }
}
