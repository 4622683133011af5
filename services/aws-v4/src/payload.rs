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

use crate::aws_chunked::{aws_chunked_content_length, AwsChunkedStream};
use crate::chunk_signer::ChunkSigner;
use crate::constants::{
    AWS_CHUNKED, DEFAULT_CHUNK_SIZE, DEFAULT_READ_LIMIT, STREAMING_AWS4_HMAC_SHA256_PAYLOAD,
    X_AMZ_CONTENT_SHA_256, X_AMZ_DECODED_CONTENT_LENGTH,
};
use crate::DigestCache;
use http::{header, HeaderValue, Method};
use log::debug;
use std::fmt::Debug;
use std::io;
use std::sync::Arc;
use streamsign_core::hash::{hex_sha256, sha256_reader};
use streamsign_core::{
    ContentStream, Error, Result, SignedBody, SigningBody, SigningRequest,
};

/// The value signed as the payload hash of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentHash {
    /// The body is covered by this header value, usually its hex SHA-256.
    Digest(String),
    /// The body is sent as signed chunks carrying `decoded_content_length` bytes.
    Streaming {
        /// Length of the body before framing.
        decoded_content_length: u64,
    },
}

impl ContentHash {
    /// Value of the `x-amz-content-sha256` header.
    pub fn header_value(&self) -> &str {
        match self {
            ContentHash::Digest(v) => v,
            ContentHash::Streaming { .. } => STREAMING_AWS4_HMAC_SHA256_PAYLOAD,
        }
    }
}

/// SignPayload decides how a request body is covered by its signature.
///
/// [`crate::RequestSigner`] calls [`SignPayload::compute_content_hash`]
/// before building the canonical request, and [`SignPayload::frame_body`]
/// after signing when the hash is [`ContentHash::Streaming`].
pub trait SignPayload: Debug + Send + Sync + Unpin + 'static {
    /// Decide the payload hash and add the headers it depends on.
    ///
    /// The body may be read, but must be handed back positioned at the
    /// start of its content.
    fn compute_content_hash(
        &self,
        req: &mut SigningRequest,
        body: &mut SigningBody,
    ) -> Result<ContentHash>;

    /// Wrap the body into its signed chunked form.
    fn frame_body(
        &self,
        body: SigningBody,
        decoded_content_length: u64,
        signer: ChunkSigner,
    ) -> Result<SignedBody>;
}

/// ContentHashResolver is the default [`SignPayload`].
///
/// - `PUT` and `POST` bodies are sent `aws-chunked` when chunked encoding
///   is enabled.
/// - Every other request, or any request once chunked encoding is off,
///   signs the SHA-256 of the whole body. Streams are hashed through a
///   mark/reset pass, zero-filled ones come from the digest cache.
/// - A caller set `x-amz-content-sha256` is kept as is.
#[derive(Debug, Clone)]
pub struct ContentHashResolver {
    chunked_encoding: bool,
    chunk_size: u64,
    read_limit: u64,
    digest_cache: Option<Arc<DigestCache>>,
}

impl Default for ContentHashResolver {
    fn default() -> Self {
        Self {
            chunked_encoding: true,
            chunk_size: DEFAULT_CHUNK_SIZE,
            read_limit: DEFAULT_READ_LIMIT,
            digest_cache: None,
        }
    }
}

impl ContentHashResolver {
    /// Create a resolver with default settings and no digest cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable chunked encoding of write requests.
    pub fn with_chunked_encoding(mut self, enabled: bool) -> Self {
        self.chunked_encoding = enabled;
        self
    }

    /// Set the payload size of every data chunk but the last.
    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Set how many bytes may be read ahead to probe or hash a stream.
    pub fn with_read_limit(mut self, read_limit: u64) -> Self {
        self.read_limit = read_limit;
        self
    }

    /// Share a digest cache for zero-filled bodies.
    pub fn with_digest_cache(mut self, cache: Arc<DigestCache>) -> Self {
        self.digest_cache = Some(cache);
        self
    }

    fn is_write(method: &Method) -> bool {
        method == Method::PUT || method == Method::POST
    }

    /// Length of the body, from `Content-Length`, the body itself, or a
    /// read-ahead pass as the last resort.
    fn decoded_content_length(&self, req: &SigningRequest, body: &mut SigningBody) -> Result<u64> {
        if let Some(len) = req.content_length()? {
            return Ok(len);
        }

        match body {
            SigningBody::Bytes(bs) => Ok(bs.len() as u64),
            SigningBody::Stream(s) => probe_content_length(s.as_mut(), self.read_limit),
        }
    }

    fn hash_body(&self, req: &SigningRequest, body: &mut SigningBody) -> Result<String> {
        let stream = match body {
            SigningBody::Bytes(bs) => return Ok(hex_sha256(&bs[..])),
            SigningBody::Stream(s) => s,
        };

        if let Some(cache) = self.digest_cache.as_ref().filter(|_| stream.zero_filled()) {
            let size = match req.content_length()? {
                Some(len) => len,
                None => probe_content_length(stream.as_mut(), self.read_limit)?,
            };
            return cache.get_or_compute_hex(size);
        }

        if !stream.mark_supported() {
            return Err(Error::config_invalid(
                "body must support mark and reset to be hashed before sending",
            ));
        }
        stream.mark(self.read_limit).map_err(mark_error)?;
        let (digest, size) = sha256_reader(stream.as_mut())?;
        stream.reset().map_err(mark_error)?;
        debug!("hashed {size} bytes of streamed body");

        Ok(hex::encode(digest))
    }
}

impl SignPayload for ContentHashResolver {
    fn compute_content_hash(
        &self,
        req: &mut SigningRequest,
        body: &mut SigningBody,
    ) -> Result<ContentHash> {
        if self.chunk_size == 0 {
            return Err(Error::config_invalid("chunk size must be positive"));
        }
        if usize::try_from(self.chunk_size).is_err() {
            return Err(Error::config_invalid(format!(
                "chunk size {} does not fit in memory",
                self.chunk_size
            )));
        }

        if let Some(v) = req.headers.get(X_AMZ_CONTENT_SHA_256) {
            let v = v.to_str()?;
            if v != STREAMING_AWS4_HMAC_SHA256_PAYLOAD {
                debug!("using caller provided payload hash: {v}");
                return Ok(ContentHash::Digest(v.to_string()));
            }
        }

        if !(self.chunked_encoding && Self::is_write(&req.method)) {
            let digest = self.hash_body(req, body)?;
            debug!("signing whole body with payload hash: {digest}");
            return Ok(ContentHash::Digest(digest));
        }

        let decoded_len = self.decoded_content_length(req, body)?;
        let framed_len = aws_chunked_content_length(decoded_len, self.chunk_size);
        debug!(
            "signing body as aws-chunked: {decoded_len} bytes in chunks of {}, {framed_len} bytes framed",
            self.chunk_size
        );

        req.headers.insert(
            X_AMZ_DECODED_CONTENT_LENGTH,
            HeaderValue::from(decoded_len),
        );
        req.headers
            .insert(header::CONTENT_LENGTH, HeaderValue::from(framed_len));
        let encoding = match req.headers.get(header::CONTENT_ENCODING) {
            Some(v) if !v.is_empty() => {
                let v = v.to_str()?;
                if v.split(',').any(|e| e.trim() == AWS_CHUNKED) {
                    HeaderValue::from_str(v)?
                } else {
                    HeaderValue::from_str(&format!("{AWS_CHUNKED},{v}"))?
                }
            }
            _ => HeaderValue::from_static(AWS_CHUNKED),
        };
        req.headers.insert(header::CONTENT_ENCODING, encoding);

        Ok(ContentHash::Streaming {
            decoded_content_length: decoded_len,
        })
    }

    fn frame_body(
        &self,
        body: SigningBody,
        decoded_content_length: u64,
        signer: ChunkSigner,
    ) -> Result<SignedBody> {
        // Checked by compute_content_hash already.
        let chunk_size = usize::try_from(self.chunk_size)
            .map_err(|_| Error::config_invalid("chunk size does not fit in memory"))?;

        Ok(SignedBody::Framed(Box::new(AwsChunkedStream::new(
            body.into_stream(),
            signer,
            chunk_size,
            decoded_content_length,
        ))))
    }
}

/// Count the bytes left in `stream` without consuming them.
///
/// Streams that know their length answer directly. Others are read
/// through once under a mark of `read_limit` bytes and reset; a stream that
/// can't mark, or holds more than `read_limit` bytes, is a config error.
pub fn probe_content_length(stream: &mut dyn ContentStream, read_limit: u64) -> Result<u64> {
    if let Some(len) = stream.size_hint() {
        return Ok(len);
    }
    if !stream.mark_supported() {
        return Err(Error::config_invalid(
            "body of unknown length must support mark and reset",
        ));
    }

    stream.mark(read_limit).map_err(mark_error)?;
    let len = io::copy(
        &mut io::Read::take(&mut *stream, read_limit.saturating_add(1)),
        &mut io::sink(),
    )?;
    if len > read_limit {
        return Err(Error::config_invalid(format!(
            "body of unknown length exceeds the read limit of {read_limit} bytes"
        )));
    }
    stream.reset().map_err(mark_error)?;

    debug!("probed body length: {len} bytes");
    Ok(len)
}

fn mark_error(err: io::Error) -> Error {
    Error::config_invalid("body could not be rewound after reading ahead").with_source(err)
}
