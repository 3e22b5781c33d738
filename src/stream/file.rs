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

use std::{
    fs::File,
    io::{Read, Seek, SeekFrom, Write},
    path::Path,
};

use super::{resolve_seek, Stream, StreamError, StreamResult, Whence};

/// File-backed stream.
pub struct FileStream {
    file: File,
    pos: u64,
    bound_start: u64,
    bound_end: Option<u64>,
    closed: bool,
}

impl FileStream {
    pub fn open(path: impl AsRef<Path>) -> StreamResult<Self> {
        Ok(FileStream::from(File::open(path)?))
    }

    pub fn create(path: impl AsRef<Path>) -> StreamResult<Self> {
        Ok(FileStream::from(File::create(path)?))
    }

    fn file_end(&mut self) -> StreamResult<u64> {
        let end = self.file.seek(SeekFrom::End(0))?;
        self.file.seek(SeekFrom::Start(self.pos))?;
        Ok(match self.bound_end {
            Some(bound) => bound.min(end),
            None => end,
        })
    }
}

impl From<File> for FileStream {
    fn from(file: File) -> Self {
        FileStream {
            file,
            pos: 0,
            bound_start: 0,
            bound_end: None,
            closed: false,
        }
    }
}

impl Stream for FileStream {
    fn read(&mut self, buf: &mut [u8]) -> StreamResult<usize> {
        if self.closed {
            return Err(StreamError::Closed);
        }
        let max = match self.bound_end {
            Some(end) => buf.len().min(end.saturating_sub(self.pos) as usize),
            None => buf.len(),
        };
        self.file.seek(SeekFrom::Start(self.pos))?;
        let n = self.file.read(&mut buf[..max])?;
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
        self.file.seek(SeekFrom::Start(self.pos))?;
        let n = self.file.write(&buf[..max])?;
        self.pos += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> StreamResult<()> {
        self.file.flush()?;
        Ok(())
    }

    fn close(&mut self) -> StreamResult<()> {
        self.file.flush()?;
        self.closed = true;
        Ok(())
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> StreamResult<u64> {
        let end = match self.bound_end {
            Some(end) => Some(end),
            None => Some(self.file_end()?),
        };
        self.pos = resolve_seek(self.pos, offset, whence, self.bound_start, end)?;
        Ok(self.pos)
    }

    fn tell(&self) -> u64 {
        self.pos
    }

    fn bounds(&self) -> (u64, Option<u64>) {
        (self.bound_start, self.bound_end)
    }

    fn eos(&mut self) -> bool {
        self.file_end().map_or(true, |end| self.pos >= end)
    }
}
