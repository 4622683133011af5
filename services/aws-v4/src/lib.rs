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

//! AWS SigV4 signing with streaming `aws-chunked` payloads.
//!
//! This crate signs S3 requests for load generation. Writes are sent as
//! chains of signed chunks, framed while the body is read, so bodies never
//! have to be buffered or hashed upfront.
//!
//! ## Example
//!
//! ```no_run
//! use streamsign_aws_v4::{RequestSigner, StaticCredentialProvider};
//! use streamsign_core::{Context, Result, Signer, SigningBody, ZeroStream};
//! use std::io::Read;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let signer = Signer::new(
//!         Context::new(),
//!         StaticCredentialProvider::new("access_key_id", "secret_access_key"),
//!         RequestSigner::new("s3", "us-east-1"),
//!     );
//!
//!     let (mut parts, _) = http::Request::put("http://127.0.0.1:9000/bucket/object")
//!         .body(())
//!         .unwrap()
//!         .into_parts();
//!     let body = signer
//!         .sign(&mut parts, SigningBody::from_stream(ZeroStream::new(1024 * 1024)))
//!         .await?;
//!
//!     let mut framed = Vec::new();
//!     body.into_reader().read_to_end(&mut framed)?;
//!     Ok(())
//! }
//! ```

mod constants;

mod config;
pub use config::Config;

mod credential;
pub use credential::Credential;

mod provide_credential;
pub use provide_credential::*;

mod signing_key;
pub use signing_key::{derive_signing_key, SigningKey, SigningScope};

mod digest_cache;
pub use digest_cache::{zero_filled_digest, DigestCache};

mod chunk_signer;
pub use chunk_signer::{ChunkSigner, ChunkState};

mod aws_chunked;
pub use aws_chunked::{aws_chunked_content_length, AwsChunkedStream};

mod payload;
pub use payload::{probe_content_length, ContentHash, ContentHashResolver, SignPayload};

mod sign_request;
pub use sign_request::RequestSigner;

pub use constants::{
    DEFAULT_CHUNK_SIZE, DEFAULT_READ_LIMIT, STREAMING_AWS4_HMAC_SHA256_PAYLOAD, UNSIGNED_PAYLOAD,
    X_AMZ_CONTENT_SHA_256, X_AMZ_DECODED_CONTENT_LENGTH,
};
