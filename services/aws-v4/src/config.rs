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

use crate::constants::*;
use std::fmt::{Debug, Formatter};
use streamsign_core::utils::Redact;
use streamsign_core::Context;

/// Config for the AWS SigV4 signer.
#[derive(Clone)]
pub struct Config {
    /// Region of the signing scope, e.g. `us-east-1`.
    pub region: Option<String>,
    /// Service of the signing scope, `s3` by default.
    pub service: String,
    /// Access key id.
    pub access_key_id: Option<String>,
    /// Secret access key.
    pub secret_access_key: Option<String>,
    /// Session token for temporary credentials.
    pub session_token: Option<String>,

    /// Send `PUT` and `POST` bodies as signed chunks, `true` by default.
    pub chunked_encoding: bool,
    /// Payload size of each chunk, 128 KiB by default.
    pub chunk_size: u64,
    /// Max bytes read ahead to probe or hash a body, 64 MiB by default.
    pub read_limit: u64,
    /// Max number of sizes kept by the digest cache.
    ///
    /// `None` keeps every size, `Some(0)` disables the cache.
    pub digest_cache_capacity: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            region: None,
            service: DEFAULT_SERVICE.to_string(),
            access_key_id: None,
            secret_access_key: None,
            session_token: None,

            chunked_encoding: true,
            chunk_size: DEFAULT_CHUNK_SIZE,
            read_limit: DEFAULT_READ_LIMIT,
            digest_cache_capacity: None,
        }
    }
}

impl Debug for Config {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("region", &self.region)
            .field("service", &self.service)
            .field("access_key_id", &Redact::from(&self.access_key_id))
            .field("secret_access_key", &Redact::from(&self.secret_access_key))
            .field("session_token", &Redact::from(&self.session_token))
            .field("chunked_encoding", &self.chunked_encoding)
            .field("chunk_size", &self.chunk_size)
            .field("read_limit", &self.read_limit)
            .field("digest_cache_capacity", &self.digest_cache_capacity)
            .finish()
    }
}

impl Config {
    /// Load config from environment variables, other fields keep their defaults.
    pub fn from_env(ctx: &Context) -> Self {
        Self::default().with_env(ctx)
    }

    /// Fill the fields that are still unset from environment variables.
    pub fn with_env(mut self, ctx: &Context) -> Self {
        if self.region.is_none() {
            self.region = ctx
                .env_var(AWS_REGION)
                .or_else(|| ctx.env_var(AWS_DEFAULT_REGION));
        }
        if self.access_key_id.is_none() {
            self.access_key_id = ctx.env_var(AWS_ACCESS_KEY_ID);
        }
        if self.secret_access_key.is_none() {
            self.secret_access_key = ctx.env_var(AWS_SECRET_ACCESS_KEY);
        }
        if self.session_token.is_none() {
            self.session_token = ctx.env_var(AWS_SESSION_TOKEN);
        }
        self
    }
}
