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

use crate::constants::AWS4_REQUEST;
use std::fmt::{self, Debug, Display, Formatter};
use streamsign_core::hash::hmac_sha256;
use streamsign_core::time::{format_date, DateTime};
use streamsign_core::{Error, Result};

/// SigningScope limits where and until when a derived key is valid.
///
/// Displayed as `20130524/us-east-1/s3/aws4_request`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningScope {
    date: String,
    region: String,
    service: String,
}

impl SigningScope {
    /// Build the scope for a request signed at `time`.
    pub fn new(time: DateTime, region: &str, service: &str) -> Result<Self> {
        if region.is_empty() {
            return Err(Error::config_invalid("region is required for signing"));
        }
        if service.is_empty() {
            return Err(Error::config_invalid("service is required for signing"));
        }

        Ok(Self {
            date: format_date(time),
            region: region.to_string(),
            service: service.to_string(),
        })
    }

    /// Date part of the scope, in `YYYYMMDD`.
    pub fn date(&self) -> &str {
        &self.date
    }

    /// Region part of the scope.
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Service part of the scope.
    pub fn service(&self) -> &str {
        &self.service
    }
}

impl Display for SigningScope {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.date, self.region, self.service, AWS4_REQUEST
        )
    }
}

/// SigningKey is the key derived for one request.
///
/// It is moved into the chunk signer of the request it was derived for,
/// and never handed to another request.
pub struct SigningKey(Vec<u8>);

impl SigningKey {
    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Debug for SigningKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("SigningKey(***)")
    }
}

/// Derive the signing key for `scope` from a secret access key.
///
/// ```text
/// kDate    = HMAC("AWS4" + secret, date)
/// kRegion  = HMAC(kDate, region)
/// kService = HMAC(kRegion, service)
/// kSigning = HMAC(kService, "aws4_request")
/// ```
pub fn derive_signing_key(secret: &str, scope: &SigningScope) -> Result<SigningKey> {
    if secret.is_empty() {
        return Err(Error::credential_invalid("secret access key is empty"));
    }

    let secret = format!("AWS4{secret}");
    let sign_date = hmac_sha256(secret.as_bytes(), scope.date.as_bytes());
    let sign_region = hmac_sha256(&sign_date, scope.region.as_bytes());
    let sign_service = hmac_sha256(&sign_region, scope.service.as_bytes());
    let sign_request = hmac_sha256(&sign_service, AWS4_REQUEST.as_bytes());

    Ok(SigningKey(sign_request))
}
