// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded capture of plugin output streams.

use tokio::io::{AsyncRead, AsyncReadExt};

/// Keeps the last `limit` bytes written to it.
#[derive(Debug)]
pub(crate) struct TailBuffer {
    buf: Vec<u8>,
    limit: usize,
    dropped: u64,
}

impl TailBuffer {
    pub(crate) fn new(limit: usize) -> Self {
        Self { buf: Vec::new(), limit, dropped: 0 }
    }

    pub(crate) fn extend(&mut self, bytes: &[u8]) {
        if bytes.len() >= self.limit {
            self.dropped += (self.buf.len() + bytes.len() - self.limit) as u64;
            self.buf.clear();
            self.buf.extend_from_slice(&bytes[bytes.len() - self.limit..]);
            return;
        }
        self.buf.extend_from_slice(bytes);
        if self.buf.len() > self.limit {
            let excess = self.buf.len() - self.limit;
            self.buf.drain(..excess);
            self.dropped += excess as u64;
        }
    }

    /// Bytes discarded from the front so far.
    pub(crate) fn dropped(&self) -> u64 {
        self.dropped
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub(crate) fn into_string(self) -> String {
        String::from_utf8_lossy(&self.buf).into_owned()
    }
}

/// Drain `reader` to EOF, keeping at most the last `limit` bytes.
pub(crate) async fn read_tail<R>(mut reader: R, limit: usize) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut tail = TailBuffer::new(limit);
    let mut chunk = vec![0u8; 8 * 1024];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        tail.extend(&chunk[..n]);
    }
    Ok(tail.into_bytes())
}
