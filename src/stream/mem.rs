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

use super::{resolve_seek, Stream, StreamError, StreamResult, Whence};

/// Stream over a growable byte buffer. Unbounded writes extend the
/// buffer; bounded writes are truncated at the right bound.
#[derive(Debug, Default)]
pub struct MemStream {
    data: Vec<u8>,
    pos: u64,
    bound_start: u64,
    bound_end: Option<u64>,
    closed: bool,
}

impl MemStream {
    pub fn new() -> Self {
        MemStream::default()
    }

    pub fn with_bounds(data: Vec<u8>, start: u64, end: Option<u64>) -> Self {
        MemStream {
            pos: start,
            data,
            bound_start: start,
            bound_end: end,
            closed: false,
        }
    }

    /// The buffer contents between the stream bounds.
    pub fn as_bytes(&self) -> &[u8] {
        let end = self
            .bound_end
            .map_or(self.data.len(), |end| (end as usize).min(self.data.len()));
        &self.data[(self.bound_start as usize).min(end)..end]
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    fn effective_end(&self) -> u64 {
        match self.bound_end {
            Some(end) => end.min(self.data.len() as u64),
            None => self.data.len() as u64,
        }
    }
}

impl From<Vec<u8>> for MemStream {
    fn from(data: Vec<u8>) -> Self {
        MemStream {
            pos: 0,
            data,
            bound_start: 0,
            bound_end: None,
            closed: false,
        }
    }
}

impl From<&[u8]> for MemStream {
    fn from(data: &[u8]) -> Self {
        data.to_vec().into()
    }
}

impl Stream for MemStream {
    fn read(&mut self, buf: &mut [u8]) -> StreamResult<usize> {
        if self.closed {
            return Err(StreamError::Closed);
        }
        let end = self.effective_end();
        let avail = end.saturating_sub(self.pos) as usize;
        let n = buf.len().min(avail);
        buf[..n].copy_from_slice(&self.data[self.pos as usize..self.pos as usize + n]);
        self.pos += n as u64;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> StreamResult<usize> {
        if self.closed {
            return Err(StreamError::Closed);
        }
        let n = match self.bound_end {
            Some(end) => buf.len().min(end.saturating_sub(self.pos) as usize),
            None => buf.len(),
        };
        let pos = self.pos as usize;
        if pos + n > self.data.len() {
            self.data.resize(pos + n, 0);
        }
        self.data[pos..pos + n].copy_from_slice(&buf[..n]);
        self.pos += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> StreamResult<()> {
        Ok(())
    }

    fn close(&mut self) -> StreamResult<()> {
        self.closed = true;
        Ok(())
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> StreamResult<u64> {
        let end = Some(self.effective_end());
        self.pos = resolve_seek(self.pos, offset, whence, self.bound_start, end)?;
        Ok(self.pos)
    }

    fn tell(&self) -> u64 {
        self.pos
    }

    fn bounds(&self) -> (u64, Option<u64>) {
        (self.bound_start, Some(self.effective_end()))
    }

    fn eos(&mut self) -> bool {
        self.pos >= self.effective_end()
    }
}

#[cfg(test)]
mod tests {
    use crate::stream::{SharedStream, Stream, Whence};

    use super::MemStream;

    #[test]
    fn mem_stream_read_write() {
        let mut stream = MemStream::new();
        assert_eq!(stream.write(b"hello world").unwrap(), 11);
        stream.seek(0, Whence::Set).unwrap();

        let mut buf = [0u8; 5];
        assert_eq!(stream.read(&mut buf).unwrap(), 5);
        assert_eq!(&buf, b"hello");

        stream.seek(-5, Whence::End).unwrap();
        assert_eq!(stream.read(&mut buf).unwrap(), 5);
        assert_eq!(&buf, b"world");
        assert!(stream.eos());
    }

    #[test]
    fn mem_stream_bounded_write() {
        let mut stream = MemStream::with_bounds(b"0123456789".to_vec(), 2, Some(6));
        assert_eq!(stream.write(b"abcdef").unwrap(), 4);
        assert_eq!(stream.write(b"x").unwrap(), 0);
        assert_eq!(stream.as_bytes(), b"abcd");
    }

    #[test]
    fn substream_reads_parent_range() {
        let parent = SharedStream::from(&b"0123456789"[..]);
        let sub = parent.substream(3, Some(7));
        assert_eq!(sub.length(), Some(4));

        let mut sub = sub;
        let mut buf = [0u8; 16];
        let n = sub.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"3456");
        assert!(sub.eos());

        sub.reset().unwrap();
        let n = sub.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"3456");
    }
}
