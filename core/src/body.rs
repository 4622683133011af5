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

//! Request bodies as seen by signers.
//!
//! A signer may need to look at the body twice: once to hash it or to
//! count its length, and once more when the transport sends it. The
//! [`ContentStream`] trait exposes this read-ahead capability through a
//! mark/reset pair, so the probe never disturbs the bytes that are
//! eventually transmitted.

use std::fmt::Debug;
use std::fmt::Formatter;
use std::io;
use std::io::Cursor;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;

use bytes::Bytes;

/// ContentStream is a readable request body with optional read-ahead support.
pub trait ContentStream: Read + Send {
    /// Whether [`ContentStream::mark`] and [`ContentStream::reset`] are supported.
    fn mark_supported(&self) -> bool {
        false
    }

    /// Remember the current position.
    ///
    /// At most `read_limit` bytes may be read before calling
    /// [`ContentStream::reset`]. Implementations may forget the mark once
    /// more bytes are consumed.
    fn mark(&mut self, read_limit: u64) -> io::Result<()> {
        let _ = read_limit;
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "mark is not supported by this stream",
        ))
    }

    /// Go back to the position remembered by the last [`ContentStream::mark`].
    fn reset(&mut self) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "reset is not supported by this stream",
        ))
    }

    /// Exact number of bytes left in this stream, if known without reading.
    fn size_hint(&self) -> Option<u64> {
        None
    }

    /// Whether every byte of this stream is zero.
    ///
    /// Such bodies are determined by their size alone, which lets signers
    /// reuse a digest computed for the same size.
    fn zero_filled(&self) -> bool {
        false
    }
}

impl<S: ContentStream + ?Sized> ContentStream for Box<S> {
    fn mark_supported(&self) -> bool {
        (**self).mark_supported()
    }

    fn mark(&mut self, read_limit: u64) -> io::Result<()> {
        (**self).mark(read_limit)
    }

    fn reset(&mut self) -> io::Result<()> {
        (**self).reset()
    }

    fn size_hint(&self) -> Option<u64> {
        (**self).size_hint()
    }

    fn zero_filled(&self) -> bool {
        (**self).zero_filled()
    }
}

/// SeekableStream turns any `Read + Seek` source into a [`ContentStream`].
///
/// Marks are kept as stream positions, so `read_limit` is ignored.
#[derive(Debug)]
pub struct SeekableStream<R> {
    inner: R,
    pos: u64,
    len: u64,
    mark: Option<u64>,
}

impl<R: Read + Seek> SeekableStream<R> {
    /// Wrap a seekable source, starting at its current position.
    pub fn new(mut inner: R) -> io::Result<Self> {
        let pos = inner.stream_position()?;
        let len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(pos))?;

        Ok(Self {
            inner,
            pos,
            len,
            mark: None,
        })
    }

    /// Consume the stream, returning the inner source.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl SeekableStream<Cursor<Bytes>> {
    /// Build a stream over in-memory content.
    pub fn from_bytes(content: Bytes) -> Self {
        Self {
            len: content.len() as u64,
            inner: Cursor::new(content),
            pos: 0,
            mark: None,
        }
    }
}

impl<R: Read> Read for SeekableStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl<R: Read + Seek + Send> ContentStream for SeekableStream<R> {
    fn mark_supported(&self) -> bool {
        true
    }

    fn mark(&mut self, _: u64) -> io::Result<()> {
        self.mark = Some(self.pos);
        Ok(())
    }

    fn reset(&mut self) -> io::Result<()> {
        let Some(mark) = self.mark else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "reset called without mark",
            ));
        };
        self.inner.seek(SeekFrom::Start(mark))?;
        self.pos = mark;
        Ok(())
    }

    fn size_hint(&self) -> Option<u64> {
        Some(self.len.saturating_sub(self.pos))
    }
}

/// BufferedStream adds bounded mark/reset to a forward-only reader.
///
/// Bytes read after [`ContentStream::mark`] are kept in memory so that
/// [`ContentStream::reset`] can replay them. Once more than `read_limit`
/// bytes have been read past the mark, the buffer is dropped and `reset`
/// fails.
pub struct BufferedStream<R> {
    inner: R,
    buf: Vec<u8>,
    /// Next byte of `buf` to hand out.
    replay: usize,
    limit: u64,
    state: MarkState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarkState {
    Unmarked,
    Marked,
    Invalidated,
}

impl<R: Read> BufferedStream<R> {
    /// Wrap a forward-only reader.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::new(),
            replay: 0,
            limit: 0,
            state: MarkState::Unmarked,
        }
    }
}

impl<R> Debug for BufferedStream<R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferedStream")
            .field("buffered", &self.buf.len())
            .field("replay", &self.replay)
            .field("limit", &self.limit)
            .field("state", &self.state)
            .finish()
    }
}

impl<R: Read> Read for BufferedStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.replay < self.buf.len() {
            let n = buf.len().min(self.buf.len() - self.replay);
            buf[..n].copy_from_slice(&self.buf[self.replay..self.replay + n]);
            self.replay += n;
            return Ok(n);
        }

        let n = self.inner.read(buf)?;
        match self.state {
            MarkState::Marked if (self.buf.len() + n) as u64 <= self.limit => {
                self.buf.extend_from_slice(&buf[..n]);
                self.replay = self.buf.len();
            }
            MarkState::Marked => {
                // Read past the limit, the mark is gone for good.
                self.state = MarkState::Invalidated;
                self.buf = Vec::new();
                self.replay = 0;
            }
            MarkState::Unmarked | MarkState::Invalidated => {
                if !self.buf.is_empty() {
                    self.buf.clear();
                    self.replay = 0;
                }
            }
        }
        Ok(n)
    }
}

impl<R: Read + Send> ContentStream for BufferedStream<R> {
    fn mark_supported(&self) -> bool {
        true
    }

    fn mark(&mut self, read_limit: u64) -> io::Result<()> {
        // Bytes not yet replayed stay readable after the new mark.
        self.buf.drain(..self.replay);
        self.replay = 0;
        self.limit = read_limit;
        self.state = MarkState::Marked;

        if self.buf.len() as u64 > read_limit {
            self.state = MarkState::Invalidated;
        }
        Ok(())
    }

    fn reset(&mut self) -> io::Result<()> {
        match self.state {
            MarkState::Marked => {
                self.replay = 0;
                Ok(())
            }
            MarkState::Unmarked => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "reset called without mark",
            )),
            MarkState::Invalidated => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("mark invalidated: more than {} bytes read", self.limit),
            )),
        }
    }
}

/// ZeroStream is a synthetic body of `len` zero bytes.
///
/// This is the payload used for load generation: its content depends on
/// nothing but its size.
#[derive(Debug, Clone)]
pub struct ZeroStream {
    len: u64,
    pos: u64,
    mark: u64,
}

impl ZeroStream {
    /// Create a zero-filled stream of `len` bytes.
    pub fn new(len: u64) -> Self {
        Self {
            len,
            pos: 0,
            mark: 0,
        }
    }
}

impl Read for ZeroStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = (self.len - self.pos).min(buf.len() as u64) as usize;
        buf[..n].fill(0);
        self.pos += n as u64;
        Ok(n)
    }
}

impl ContentStream for ZeroStream {
    fn mark_supported(&self) -> bool {
        true
    }

    fn mark(&mut self, _: u64) -> io::Result<()> {
        self.mark = self.pos;
        Ok(())
    }

    fn reset(&mut self) -> io::Result<()> {
        self.pos = self.mark;
        Ok(())
    }

    fn size_hint(&self) -> Option<u64> {
        Some(self.len - self.pos)
    }

    fn zero_filled(&self) -> bool {
        true
    }
}

/// SigningBody is the body handed to a signer together with the request.
pub enum SigningBody {
    /// Content already in memory.
    Bytes(Bytes),
    /// Content read from a stream during transmission.
    Stream(Box<dyn ContentStream>),
}

impl SigningBody {
    /// An empty body.
    pub fn empty() -> Self {
        SigningBody::Bytes(Bytes::new())
    }

    /// Build a body from a stream.
    pub fn from_stream(stream: impl ContentStream + 'static) -> Self {
        SigningBody::Stream(Box::new(stream))
    }

    /// Exact body length, if known without reading.
    pub fn size_hint(&self) -> Option<u64> {
        match self {
            SigningBody::Bytes(bs) => Some(bs.len() as u64),
            SigningBody::Stream(s) => s.size_hint(),
        }
    }

    /// Turn this body into a stream.
    pub fn into_stream(self) -> Box<dyn ContentStream> {
        match self {
            SigningBody::Bytes(bs) => Box::new(SeekableStream::from_bytes(bs)),
            SigningBody::Stream(s) => s,
        }
    }
}

impl Debug for SigningBody {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SigningBody::Bytes(bs) => write!(f, "SigningBody::Bytes({} bytes)", bs.len()),
            SigningBody::Stream(s) => write!(f, "SigningBody::Stream({:?})", s.size_hint()),
        }
    }
}

impl From<Bytes> for SigningBody {
    fn from(value: Bytes) -> Self {
        SigningBody::Bytes(value)
    }
}

impl From<&'static str> for SigningBody {
    fn from(value: &'static str) -> Self {
        SigningBody::Bytes(Bytes::from_static(value.as_bytes()))
    }
}

impl From<Vec<u8>> for SigningBody {
    fn from(value: Vec<u8>) -> Self {
        SigningBody::Bytes(Bytes::from(value))
    }
}

/// SignedBody is the body to transmit after signing.
pub enum SignedBody {
    /// The original in-memory content.
    Bytes(Bytes),
    /// The original stream, positioned at the start of its content.
    Stream(Box<dyn ContentStream>),
    /// The body re-framed by the signer, e.g. into signed chunks.
    Framed(Box<dyn Read + Send>),
}

impl SignedBody {
    /// Whether the signer replaced the original body.
    pub fn is_framed(&self) -> bool {
        matches!(self, SignedBody::Framed(_))
    }

    /// Turn this body into a single reader for the transport.
    pub fn into_reader(self) -> Box<dyn Read + Send> {
        match self {
            SignedBody::Bytes(bs) => Box::new(Cursor::new(bs)),
            SignedBody::Stream(s) => Box::new(s),
            SignedBody::Framed(r) => r,
        }
    }
}

impl Debug for SignedBody {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SignedBody::Bytes(bs) => write!(f, "SignedBody::Bytes({} bytes)", bs.len()),
            SignedBody::Stream(s) => write!(f, "SignedBody::Stream({:?})", s.size_hint()),
            SignedBody::Framed(_) => f.write_str("SignedBody::Framed"),
        }
    }
}

impl From<SigningBody> for SignedBody {
    fn from(value: SigningBody) -> Self {
        match value {
            SigningBody::Bytes(bs) => SignedBody::Bytes(bs),
            SigningBody::Stream(s) => SignedBody::Stream(s),
        }
    }
}
