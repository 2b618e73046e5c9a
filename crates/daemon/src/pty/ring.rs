// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fixed-capacity byte ring for PTY scrollback.
//!
//! One allocation per session; appends overwrite the oldest bytes once the
//! ring is full, so a reattaching viewer always gets the newest window of
//! output.

/// Bounded FIFO of output bytes.
pub struct OutputRing {
    buf: Vec<u8>,
    head: usize,
    len: usize,
}

impl OutputRing {
    pub fn new(capacity: usize) -> Self {
        Self { buf: vec![0; capacity.max(1)], head: 0, len: 0 }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append bytes, overwriting the oldest once capacity is exceeded.
    pub fn push(&mut self, data: &[u8]) {
        let cap = self.buf.len();
        // Only the tail of an oversized chunk can survive.
        let data = if data.len() > cap { &data[data.len() - cap..] } else { data };

        let write_at = (self.head + self.len) % cap;
        let first = (cap - write_at).min(data.len());
        self.buf[write_at..write_at + first].copy_from_slice(&data[..first]);
        let rest = &data[first..];
        self.buf[..rest.len()].copy_from_slice(rest);

        if self.len + data.len() > cap {
            let overwritten = self.len + data.len() - cap;
            self.head = (self.head + overwritten) % cap;
            self.len = cap;
        } else {
            self.len += data.len();
        }
    }

    /// Copy the retained bytes out in emission order.
    pub fn snapshot(&self) -> Vec<u8> {
        let cap = self.buf.len();
        let mut out = Vec::with_capacity(self.len);
        let first = (cap - self.head).min(self.len);
        out.extend_from_slice(&self.buf[self.head..self.head + first]);
        out.extend_from_slice(&self.buf[..self.len - first]);
        out
    }
}

#[cfg(test)]
#[path = "ring_tests.rs"]
mod tests;
