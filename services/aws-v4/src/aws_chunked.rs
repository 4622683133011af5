// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! The `aws-chunked` content encoding.
//!
//! ```text
//! <hex size>;chunk-signature=<signature>\r\n
//! <payload>\r\n
//! ...
//! 0;chunk-signature=<signature>\r\n
//! \r\n
//! ```

use crate::chunk_signer::ChunkSigner;
use crate::constants::{CHUNK_SIGNATURE_PARAM, CRLF, SIGNATURE_HEX_LEN};
use log::trace;
use std::fmt::{self, Debug, Formatter};
use std::io;
use std::io::Read;
use std::io::Write;
use streamsign_core::{ContentStream, Error};

/// Length of a whole `aws-chunked` body carrying `decoded_len` bytes.
///
/// Counts every data chunk plus the zero length terminal chunk. This is
/// the value of `Content-Length` on the wire.
pub fn aws_chunked_content_length(decoded_len: u64, chunk_size: u64) -> u64 {
    debug_assert!(chunk_size > 0, "chunk size must be positive");

    let full = decoded_len / chunk_size;
    let remainder = decoded_len % chunk_size;

    let mut total = full * framed_chunk_len(chunk_size);
    if remainder > 0 {
        total += framed_chunk_len(remainder);
    }
    total + framed_chunk_len(0)
}

fn framed_chunk_len(payload_len: u64) -> u64 {
    hex_len(payload_len)
        + CHUNK_SIGNATURE_PARAM.len() as u64
        + SIGNATURE_HEX_LEN
        + CRLF.len() as u64
        + payload_len
        + CRLF.len() as u64
}

fn hex_len(mut n: u64) -> u64 {
    let mut len = 1;
    while n >= 16 {
        n /= 16;
        len += 1;
    }
    len
}

/// AwsChunkedStream frames a body into signed chunks while it is read.
///
/// Chunk boundaries are decided here, from `chunk_size` and the declared
/// length, never by the size of the caller's read buffer. One framed chunk
/// is buffered at a time and handed out through a cursor, so the produced
/// bytes are the same whatever read sizes the transport uses.
///
/// The underlying stream must yield exactly `decoded_len` bytes. A short
/// body fails with [`io::ErrorKind::UnexpectedEof`], a longer one with
/// [`io::ErrorKind::InvalidData`]. Both carry a protocol violation error,
/// and no bytes of the unfinished chunk are ever emitted.
pub struct AwsChunkedStream {
    inner: Box<dyn ContentStream>,
    signer: ChunkSigner,
    chunk_size: usize,
    /// Payload bytes not yet pulled from `inner`.
    remaining: u64,

    payload: Vec<u8>,
    filled: usize,
    frame: Vec<u8>,
    pos: usize,
    chunks: u64,
    finished: bool,
    failed: Option<(io::ErrorKind, String)>,
}

impl AwsChunkedStream {
    /// Wrap `inner`, which must hold exactly `decoded_len` bytes.
    pub fn new(
        inner: Box<dyn ContentStream>,
        signer: ChunkSigner,
        chunk_size: usize,
        decoded_len: u64,
    ) -> Self {
        debug_assert!(chunk_size > 0, "chunk size must be positive");

        Self {
            inner,
            signer,
            chunk_size,
            remaining: decoded_len,

            payload: Vec::new(),
            filled: 0,
            frame: Vec::new(),
            pos: 0,
            chunks: 0,
            finished: false,
            failed: None,
        }
    }

    fn next_frame(&mut self) -> io::Result<()> {
        if self.remaining == 0 {
            return self.final_frame();
        }

        let want = self.remaining.min(self.chunk_size as u64) as usize;
        if self.payload.len() != want {
            self.payload.resize(want, 0);
        }

        // A partially filled payload survives errors like `Interrupted`,
        // the next read resumes where this one stopped.
        while self.filled < want {
            match self.inner.read(&mut self.payload[self.filled..want]) {
                Ok(0) => {
                    return Err(self.violation(
                        io::ErrorKind::UnexpectedEof,
                        format!(
                            "body ended early: chunk {} got {} of {} bytes",
                            self.chunks, self.filled, want
                        ),
                    ))
                }
                Ok(n) => self.filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        let signature = self.signer.sign_chunk(&self.payload[..want])?;
        self.frame.clear();
        write!(
            self.frame,
            "{:x}{CHUNK_SIGNATURE_PARAM}{signature}{CRLF}",
            want
        )?;
        self.frame.extend_from_slice(&self.payload[..want]);
        self.frame.extend_from_slice(CRLF.as_bytes());
        self.pos = 0;

        trace!("framed chunk {} with {} payload bytes", self.chunks, want);
        self.chunks += 1;
        self.remaining -= want as u64;
        self.filled = 0;
        Ok(())
    }

    fn final_frame(&mut self) -> io::Result<()> {
        let mut probe = [0; 1];
        loop {
            match self.inner.read(&mut probe) {
                Ok(0) => break,
                Ok(_) => {
                    return Err(self.violation(
                        io::ErrorKind::InvalidData,
                        "body is longer than its declared length".to_string(),
                    ))
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        let signature = self.signer.sign_final()?;
        self.frame.clear();
        write!(
            self.frame,
            "0{CHUNK_SIGNATURE_PARAM}{signature}{CRLF}{CRLF}"
        )?;
        self.pos = 0;

        trace!("framed terminal chunk after {} data chunks", self.chunks);
        self.finished = true;
        Ok(())
    }

    fn violation(&mut self, kind: io::ErrorKind, message: String) -> io::Error {
        self.failed = Some((kind, message.clone()));
        io::Error::new(kind, Error::protocol_violation(message))
    }
}

impl Read for AwsChunkedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            if let Some((kind, message)) = &self.failed {
                return Err(io::Error::new(
                    *kind,
                    Error::protocol_violation(message.clone()),
                ));
            }

            if self.pos < self.frame.len() {
                let n = buf.len().min(self.frame.len() - self.pos);
                buf[..n].copy_from_slice(&self.frame[self.pos..self.pos + n]);
                self.pos += n;
                return Ok(n);
            }

            if self.finished {
                return Ok(0);
            }
            self.next_frame()?;
        }
    }
}

impl Debug for AwsChunkedStream {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsChunkedStream")
            .field("chunk_size", &self.chunk_size)
            .field("remaining", &self.remaining)
            .field("chunks", &self.chunks)
            .field("state", &self.signer.state())
            .field("finished", &self.finished)
            .finish()
    }
}
