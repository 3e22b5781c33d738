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

use super::{resolve_seek, SharedStream, Stream, StreamError, StreamResult, Whence};

/// A bounded view over a parent stream, sharing its storage. Closing a
/// substream does not close the parent; the handle it owns keeps the
/// parent alive.
pub struct SubStream {
    parent: SharedStream,
    pos: u64,
    bound_start: u64,
    bound_end: Option<u64>,
    closed: bool,
}

impl SubStream {
    pub fn new(parent: SharedStream, start: u64, end: Option<u64>) -> Self {
        SubStream {
            parent,
            pos: start,
            bound_start: start,
            bound_end: end,
            closed: false,
        }
    }

    pub fn parent(&self) -> &SharedStream {
        &self.parent
    }

    fn effective_end(&self) -> Option<u64> {
        match (self.bound_end, self.parent.bounds().1) {
            (Some(end), Some(parent_end)) => Some(end.min(parent_end)),
            (Some(end), None) => Some(end),
            (None, parent_end) => parent_end,
        }
    }
}

impl Stream for SubStream {
    fn read(&mut self, buf: &mut [u8]) -> StreamResult<usize> {
        if self.closed {
            return Err(StreamError::Closed);
        }
        let max = match self.effective_end() {
            Some(end) => buf.len().min(end.saturating_sub(self.pos) as usize),
            None => buf.len(),
        };
        if max == 0 {
            return Ok(0);
        }
        self.parent.seek(self.pos as i64, Whence::Set)?;
        let n = self.parent.read(&mut buf[..max])?;
        self.pos += n as u64;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> StreamResult<usize> {
        if self.closed {
            return Err(StreamError::Closed);
        }
        let max = match self.bound_end {
            Some(end) => buf.len().min(end.saturating_sub(self.pos) as usize),
            None => buf.len(),
        };
        if max == 0 {
            return Ok(0);
        }
        self.parent.seek(self.pos as i64, Whence::Set)?;
        let n = self.parent.write(&buf[..max])?;
        self.pos += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> StreamResult<()> {
        self.parent.flush()
    }

    fn close(&mut self) -> StreamResult<()> {
        self.closed = true;
        Ok(())
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> StreamResult<u64> {
        self.pos = resolve_seek(
            self.pos,
            offset,
            whence,
            self.bound_start,
            self.effective_end(),
        )?;
        Ok(self.pos)
    }

    fn tell(&self) -> u64 {
        self.pos
    }

    fn bounds(&self) -> (u64, Option<u64>) {
        (self.bound_start, self.bound_end)
    }

    fn eos(&mut self) -> bool {
        match self.effective_end() {
            Some(end) => self.pos >= end,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::stream::{SharedStream, Stream};

    #[test]
    fn nested_substreams() {
        let parent = SharedStream::from(&b"abcdefghij"[..]);
        let outer = SharedStream::new(parent.substream(2, Some(9)));
        let mut inner = outer.substream(4, Some(8));

        let mut buf = [0u8; 8];
        let n = inner.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"efgh");
    }

    #[test]
    fn substream_write_is_truncated() {
        let parent = SharedStream::from(b"0123456789".to_vec());
        let mut sub = parent.substream(4, Some(7));
        assert_eq!(sub.write(b"abcdef").unwrap(), 3);
        assert_eq!(sub.write(b"x").unwrap(), 0);

        parent.reset().unwrap();
        assert_eq!(parent.read_to_end().unwrap(), b"0123abc789");
    }
}
