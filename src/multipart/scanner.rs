//! Bounded-memory scanner over a byte reader.
//!
//! The scanner keeps an explicit window of at most one chunk plus a lookback
//! margin. When a delimiter search misses, everything but the last
//! `delimiter + 6` bytes is dropped (or handed to the caller) before the next
//! chunk is read, so a delimiter split across two reads is still found.
//! Positions are absolute offsets into the underlying stream.

use std::io::{self, Read};

/// Size of each read from the underlying stream.
pub const CHUNK_SIZE: usize = 8 * 1024;

/// Extra bytes retained past the delimiter length on a missed search.
const LOOKBACK_SLACK: usize = 6;

pub struct Scanner<R> {
    reader: R,
    window: Vec<u8>,
    /// Absolute stream offset of `window[0]`.
    window_start: u64,
    /// Read position inside `window`.
    cursor: usize,
    eof: bool,
}

impl<R: Read> Scanner<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            window: Vec::with_capacity(CHUNK_SIZE),
            window_start: 0,
            cursor: 0,
            eof: false,
        }
    }

    /// Absolute offset of the next unread byte.
    pub fn position(&self) -> u64 {
        self.window_start + self.cursor as u64
    }

    /// Read exactly `n` bytes. `Ok(None)` if the stream ends first.
    pub fn read_exact_bytes(&mut self, n: usize) -> io::Result<Option<Vec<u8>>> {
        if !self.fill(n)? {
            return Ok(None);
        }
        let out = self.window[self.cursor..self.cursor + n].to_vec();
        self.cursor += n;
        Ok(Some(out))
    }

    /// Skip `n` already-buffered bytes.
    pub fn advance(&mut self, n: usize) {
        self.cursor = (self.cursor + n).min(self.window.len());
    }

    /// Read one line terminated by CRLF, without the terminator.
    ///
    /// `Ok(None)` when the stream ends first or the line exceeds `max_len`.
    pub fn read_line(&mut self, max_len: usize) -> io::Result<Option<Vec<u8>>> {
        let mut searched = 0;
        loop {
            let pending = &self.window[self.cursor..];
            if let Some(pos) = find(&pending[searched..], b"\r\n") {
                let end = searched + pos;
                let line = pending[..end].to_vec();
                self.cursor += end + 2;
                return Ok(Some(line));
            }
            if pending.len() > max_len + 2 {
                return Ok(None);
            }
            searched = pending.len().saturating_sub(1);
            if !self.read_chunk()? {
                return Ok(None);
            }
        }
    }

    /// Advance to the next occurrence of `delimiter`.
    ///
    /// On success the cursor sits on the first byte of the delimiter and its
    /// absolute offset is returned. Bytes skipped over are appended to
    /// `collect` when given. `Ok(None)` means the stream ended first; the
    /// cursor is then at the end of the stream.
    pub fn find_delimiter(&mut self, delimiter: &[u8], mut collect: Option<&mut Vec<u8>>) -> io::Result<Option<u64>> {
        let lookback = delimiter.len() + LOOKBACK_SLACK;
        loop {
            let pending = &self.window[self.cursor..];
            if let Some(pos) = find(pending, delimiter) {
                if let Some(out) = collect.as_deref_mut() {
                    out.extend_from_slice(&pending[..pos]);
                }
                self.cursor += pos;
                return Ok(Some(self.position()));
            }

            // Roll back to the lookback margin before pulling the next chunk.
            let keep_from = self.window.len().saturating_sub(lookback).max(self.cursor);
            if let Some(out) = collect.as_deref_mut() {
                out.extend_from_slice(&self.window[self.cursor..keep_from]);
            }
            self.cursor = keep_from;

            if !self.read_chunk()? {
                if let Some(out) = collect.as_deref_mut() {
                    out.extend_from_slice(&self.window[self.cursor..]);
                }
                self.cursor = self.window.len();
                return Ok(None);
            }
        }
    }

    /// Make sure at least `n` unread bytes are buffered.
    fn fill(&mut self, n: usize) -> io::Result<bool> {
        while self.window.len() - self.cursor < n {
            if !self.read_chunk()? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Drop consumed bytes and append one chunk. `false` once the reader
    /// stops making progress.
    fn read_chunk(&mut self) -> io::Result<bool> {
        if self.eof {
            return Ok(false);
        }
        if self.cursor > 0 {
            self.window.drain(..self.cursor);
            self.window_start += self.cursor as u64;
            self.cursor = 0;
        }

        let old_len = self.window.len();
        self.window.resize(old_len + CHUNK_SIZE, 0);
        let n = loop {
            match self.reader.read(&mut self.window[old_len..]) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.window.truncate(old_len);
                    return Err(e);
                }
            }
        };
        self.window.truncate(old_len + n);
        if n == 0 {
            self.eof = true;
            return Ok(false);
        }
        Ok(true)
    }

    /// Bytes currently held in memory.
    #[cfg(test)]
    fn buffered(&self) -> usize {
        self.window.len()
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
