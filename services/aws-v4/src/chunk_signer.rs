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

use crate::constants::AWS4_HMAC_SHA256_PAYLOAD;
use crate::signing_key::{SigningKey, SigningScope};
use std::fmt::Write;
use streamsign_core::hash::{hex_hmac_sha256, hex_sha256, EMPTY_STRING_SHA256};
use streamsign_core::time::{format_iso8601, DateTime};
use streamsign_core::{Error, Result};

/// Where a [`ChunkSigner`] is in its chunk sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    /// Holding the seed signature, no chunk signed yet.
    Seeded,
    /// `n` data chunks have been signed.
    Chunk(u64),
    /// The terminal chunk has been signed, nothing more may follow.
    Done,
}

/// ChunkSigner computes the chained signatures of an `aws-chunked` body.
///
/// Every chunk signature covers the previous one, starting from the seed
/// signature of the request headers:
///
/// ```text
/// AWS4-HMAC-SHA256-PAYLOAD
/// <timestamp>
/// <scope>
/// <previous signature>
/// <sha256 of the empty string>
/// <sha256 of the chunk payload>
/// ```
///
/// A signer belongs to exactly one request. It can't be cloned, and once
/// the terminal chunk is signed it refuses any further use. Retrying a
/// request means signing it again from scratch.
#[derive(Debug)]
pub struct ChunkSigner {
    signing_key: SigningKey,
    timestamp: String,
    scope: String,
    previous: String,
    state: ChunkState,
}

impl ChunkSigner {
    /// Create a signer chained to `seed_signature`.
    pub fn new(
        signing_key: SigningKey,
        time: DateTime,
        scope: &SigningScope,
        seed_signature: String,
    ) -> Self {
        Self {
            signing_key,
            timestamp: format_iso8601(time),
            scope: scope.to_string(),
            previous: seed_signature,
            state: ChunkState::Seeded,
        }
    }

    /// Current state.
    pub fn state(&self) -> ChunkState {
        self.state
    }

    /// The last signature produced, or the seed if no chunk was signed yet.
    pub fn previous_signature(&self) -> &str {
        &self.previous
    }

    /// Sign the next data chunk.
    ///
    /// Data chunks are never empty, the empty chunk is reserved for
    /// [`ChunkSigner::sign_final`].
    pub fn sign_chunk(&mut self, payload: &[u8]) -> Result<String> {
        let signed = match self.state {
            ChunkState::Seeded => 0,
            ChunkState::Chunk(n) => n,
            ChunkState::Done => {
                return Err(Error::protocol_violation(
                    "chunk signed after the terminal chunk",
                ))
            }
        };
        if payload.is_empty() {
            return Err(Error::protocol_violation(
                "data chunk must not be empty, use the terminal chunk instead",
            ));
        }

        let signature = self.sign(&hex_sha256(payload))?;
        self.state = ChunkState::Chunk(signed + 1);
        Ok(signature)
    }

    /// Sign the zero length terminal chunk.
    pub fn sign_final(&mut self) -> Result<String> {
        if self.state == ChunkState::Done {
            return Err(Error::protocol_violation(
                "terminal chunk has already been signed",
            ));
        }

        let signature = self.sign(EMPTY_STRING_SHA256)?;
        self.state = ChunkState::Done;
        Ok(signature)
    }

    fn sign(&mut self, payload_hash: &str) -> Result<String> {
        let mut string_to_sign = String::with_capacity(256);
        writeln!(string_to_sign, "{AWS4_HMAC_SHA256_PAYLOAD}")?;
        writeln!(string_to_sign, "{}", self.timestamp)?;
        writeln!(string_to_sign, "{}", self.scope)?;
        writeln!(string_to_sign, "{}", self.previous)?;
        writeln!(string_to_sign, "{EMPTY_STRING_SHA256}")?;
        write!(string_to_sign, "{payload_hash}")?;

        let signature = hex_hmac_sha256(self.signing_key.as_bytes(), string_to_sign.as_bytes());
        self.previous.clone_from(&signature);
        Ok(signature)
    }
}
