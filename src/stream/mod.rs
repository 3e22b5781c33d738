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

pub mod buffer;
pub mod file;
pub mod mem;
pub mod sub;

use std::{cell::RefCell, rc::Rc};

use thiserror::Error;

pub use self::buffer::{BufferMode, BufferStream};
pub use self::file::FileStream;
pub use self::mem::MemStream;
pub use self::sub::SubStream;

pub type StreamResult<T> = Result<T, StreamError>;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("position outside stream bounds")]
    OutOfBounds,
    #[error("stream does not support seeking")]
    NotSeekable,
    #[error("operation on a closed stream")]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Set,
    Cur,
    End,
}

/// A logical byte sequence with optional right bound.
///
/// Invariant: `bound_start <= position <= bound_end` whenever the right
/// bound is known. Reads and writes never cross the bounds; a write past
/// the right bound is truncated, a read returns `Ok(0)` at end of stream.
pub trait Stream {
    fn read(&mut self, buf: &mut [u8]) -> StreamResult<usize>;

    fn write(&mut self, buf: &[u8]) -> StreamResult<usize>;

    fn flush(&mut self) -> StreamResult<()>;

    fn close(&mut self) -> StreamResult<()>;

    /// Repositions the stream. `Whence::End` requires a known right bound
    /// or a backend that can locate the underlying end.
    fn seek(&mut self, offset: i64, whence: Whence) -> StreamResult<u64>;

    /// Current absolute position.
    fn tell(&self) -> u64;

    /// `(bound_start, bound_end)`; `None` is an open right bound.
    fn bounds(&self) -> (u64, Option<u64>);

    fn eos(&mut self) -> bool;

    /// Returns the position to `bound_start`.
    fn reset(&mut self) -> StreamResult<()> {
        let (start, _) = self.bounds();
        self.seek(start as i64, Whence::Set).map(|_| ())
    }

    fn length(&self) -> Option<u64> {
        let (start, end) = self.bounds();
        end.map(|end| end - start)
    }
}

/// Shared handle to a stream. Substreams hold one of these, which keeps
/// the parent alive for as long as any view over it exists.
#[derive(Clone)]
pub struct SharedStream(Rc<RefCell<dyn Stream>>);

impl SharedStream {
    pub fn new(stream: impl Stream + 'static) -> Self {
        SharedStream(Rc::new(RefCell::new(stream)))
    }

    /// Opens a bounded view over this stream. The view's bounds must be
    /// contained in the current bounds; the position starts at `start`.
    pub fn substream(&self, start: u64, end: Option<u64>) -> SubStream {
        SubStream::new(self.clone(), start, end)
    }

    pub fn read(&self, buf: &mut [u8]) -> StreamResult<usize> {
        self.0.borrow_mut().read(buf)
    }

    pub fn write(&self, buf: &[u8]) -> StreamResult<usize> {
        self.0.borrow_mut().write(buf)
    }

    pub fn write_all(&self, mut buf: &[u8]) -> StreamResult<()> {
        while !buf.is_empty() {
            match self.0.borrow_mut().write(buf)? {
                0 => return Err(StreamError::OutOfBounds),
                n => buf = &buf[n..],
            }
        }
        Ok(())
    }

    pub fn flush(&self) -> StreamResult<()> {
        self.0.borrow_mut().flush()
    }

    pub fn seek(&self, offset: i64, whence: Whence) -> StreamResult<u64> {
        self.0.borrow_mut().seek(offset, whence)
    }

    pub fn tell(&self) -> u64 {
        self.0.borrow().tell()
    }

    pub fn bounds(&self) -> (u64, Option<u64>) {
        self.0.borrow().bounds()
    }

    pub fn length(&self) -> Option<u64> {
        self.0.borrow().length()
    }

    pub fn eos(&self) -> bool {
        self.0.borrow_mut().eos()
    }

    pub fn reset(&self) -> StreamResult<()> {
        self.0.borrow_mut().reset()
    }

    /// Reads from the current position to the right bound or end of
    /// stream, whichever comes first.
    pub fn read_to_end(&self) -> StreamResult<Vec<u8>> {
        let mut result = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            match self.read(&mut chunk)? {
                0 => break,
                n => result.extend_from_slice(&chunk[..n]),
            }
        }
        Ok(result)
    }
}

impl std::fmt::Debug for SharedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (start, end) = self.bounds();
        f.debug_struct("SharedStream")
            .field("pos", &self.tell())
            .field("bound_start", &start)
            .field("bound_end", &end)
            .finish()
    }
}

impl From<Vec<u8>> for SharedStream {
    fn from(data: Vec<u8>) -> Self {
        SharedStream::new(MemStream::from(data))
    }
}

impl From<&[u8]> for SharedStream {
    fn from(data: &[u8]) -> Self {
        SharedStream::new(MemStream::from(data))
    }
}

pub(crate) fn resolve_seek(
    pos: u64,
    offset: i64,
    whence: Whence,
    start: u64,
    end: Option<u64>,
) -> StreamResult<u64> {
    let base = match whence {
        Whence::Set => 0,
        Whence::Cur => pos as i64,
        Whence::End => match end {
            Some(end) => end as i64,
            None => return Err(StreamError::NotSeekable),
        },
    };
    let target = base.checked_add(offset).ok_or(StreamError::OutOfBounds)?;
    if target < start as i64 || matches!(end, Some(end) if target > end as i64) {
        Err(StreamError::OutOfBounds)
    } else {
        Ok(target as u64)
    }
}
