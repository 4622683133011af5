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

use crate::chunk_signer::ChunkSigner;
use crate::constants::{
    AWS4_HMAC_SHA256, AWS_QUERY_ENCODE_SET, AWS_URI_ENCODE_SET, X_AMZ_CONTENT_SHA_256,
    X_AMZ_DATE, X_AMZ_SECURITY_TOKEN,
};
use crate::payload::{ContentHash, ContentHashResolver, SignPayload};
use crate::signing_key::{derive_signing_key, SigningScope};
use crate::{Config, Credential, DigestCache};
use http::request::Parts;
use http::{header, HeaderValue};
use log::debug;
use percent_encoding::{percent_decode_str, utf8_percent_encode};
use std::fmt::Write;
use std::sync::Arc;
use streamsign_core::hash::{hex_hmac_sha256, hex_sha256};
use streamsign_core::time::{format_iso8601, now, DateTime};
use streamsign_core::utils::RedactHeaders;
use streamsign_core::{
    Context, Error, Result, SignRequest, SignedBody, SigningBody, SigningRequest,
};

/// RequestSigner that implement AWS SigV4 with streaming payloads.
///
/// - [Signature Version 4 signing process](https://docs.aws.amazon.com/general/latest/gr/signature-version-4.html)
/// - [Signature calculations for chunked uploads](https://docs.aws.amazon.com/AmazonS3/latest/API/sigv4-streaming.html)
///
/// How the body is covered by the signature is up to `P`, see [`SignPayload`].
#[derive(Debug)]
pub struct RequestSigner<P: SignPayload = ContentHashResolver> {
    service: String,
    region: String,
    payload: P,

    time: Option<DateTime>,
}

impl RequestSigner {
    /// Create a new builder for AWS V4 signer with default settings.
    pub fn new(service: &str, region: &str) -> Self {
        Self::from_config(&Config {
            service: service.to_string(),
            region: Some(region.to_string()),
            ..Default::default()
        })
    }

    /// Create a signer from config.
    ///
    /// Credentials in config are ignored here, see
    /// [`crate::StaticCredentialProvider::from_config`].
    pub fn from_config(config: &Config) -> Self {
        let mut payload = ContentHashResolver::new()
            .with_chunked_encoding(config.chunked_encoding)
            .with_chunk_size(config.chunk_size)
            .with_read_limit(config.read_limit);
        match config.digest_cache_capacity {
            Some(0) => {}
            Some(capacity) => {
                payload = payload
                    .with_digest_cache(Arc::new(DigestCache::new().with_capacity(capacity)))
            }
            None => payload = payload.with_digest_cache(Arc::new(DigestCache::new())),
        }

        Self {
            service: config.service.clone(),
            region: config.region.clone().unwrap_or_default(),
            payload,

            time: None,
        }
    }

    /// Enable or disable chunked encoding of `PUT` and `POST` bodies.
    pub fn with_chunked_encoding(mut self, enabled: bool) -> Self {
        self.payload = self.payload.with_chunked_encoding(enabled);
        self
    }

    /// Set the payload size of each chunk.
    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.payload = self.payload.with_chunk_size(chunk_size);
        self
    }

    /// Set how many bytes may be read ahead to probe or hash a body.
    pub fn with_read_limit(mut self, read_limit: u64) -> Self {
        self.payload = self.payload.with_read_limit(read_limit);
        self
    }

    /// Use a digest cache shared with other signers.
    pub fn with_digest_cache(mut self, cache: Arc<DigestCache>) -> Self {
        self.payload = self.payload.with_digest_cache(cache);
        self
    }
}

impl<P: SignPayload> RequestSigner<P> {
    /// Replace how request bodies are covered by the signature.
    pub fn with_payload<Q: SignPayload>(self, payload: Q) -> RequestSigner<Q> {
        RequestSigner {
            service: self.service,
            region: self.region,
            payload,
            time: self.time,
        }
    }

    /// Specify the signing time.
    ///
    /// # Note
    ///
    /// We should always take current time to sign requests.
    /// Only use this function for testing.
    pub fn with_time(mut self, time: DateTime) -> Self {
        self.time = Some(time);
        self
    }
}

impl<P: SignPayload> SignRequest for RequestSigner<P> {
    type Credential = Credential;

    fn sign_request(
        &self,
        _: &Context,
        req: &mut Parts,
        mut body: SigningBody,
        credential: Option<&Self::Credential>,
    ) -> Result<SignedBody> {
        let Some(cred) = credential else {
            return Err(Error::credential_invalid(
                "credential is required, refuse to send unsigned request",
            ));
        };
        if cred.access_key_id.is_empty() {
            return Err(Error::credential_invalid("access key id is empty"));
        }

        let now = self.time.unwrap_or_else(now);
        // Scope: "20220313/<region>/<service>/aws4_request"
        let scope = SigningScope::new(now, &self.region, &self.service)?;
        debug!("calculated scope: {scope}");
        let signing_key = derive_signing_key(&cred.secret_access_key, &scope)?;

        let mut signed_req = SigningRequest::build(req)?;
        let content_hash = self
            .payload
            .compute_content_hash(&mut signed_req, &mut body)?;

        // canonicalize context
        canonicalize_header(&mut signed_req, cred, now, &content_hash)?;
        canonicalize_query(&mut signed_req);

        // build canonical request and string to sign.
        let creq = canonical_request_string(&signed_req)?;
        let encoded_req = hex_sha256(creq.as_bytes());

        // StringToSign:
        //
        // AWS4-HMAC-SHA256
        // 20220313T072004Z
        // 20220313/<region>/<service>/aws4_request
        // <hashed_canonical_request>
        let string_to_sign = {
            let mut f = String::new();
            writeln!(f, "{AWS4_HMAC_SHA256}")?;
            writeln!(f, "{}", format_iso8601(now))?;
            writeln!(f, "{scope}")?;
            write!(f, "{encoded_req}")?;
            f
        };
        debug!("calculated string to sign: {string_to_sign}");

        let signature = hex_hmac_sha256(signing_key.as_bytes(), string_to_sign.as_bytes());

        let mut authorization = HeaderValue::from_str(&format!(
            "{AWS4_HMAC_SHA256} Credential={}/{scope}, SignedHeaders={}, Signature={signature}",
            cred.access_key_id,
            signed_req.header_name_to_vec_sorted().join(";"),
        ))?;
        authorization.set_sensitive(true);
        signed_req
            .headers
            .insert(header::AUTHORIZATION, authorization);
        debug!("signed headers: {:?}", RedactHeaders(&signed_req.headers));

        // Apply to the request.
        signed_req.apply(req)?;

        match content_hash {
            ContentHash::Digest(_) => Ok(body.into()),
            ContentHash::Streaming {
                decoded_content_length,
            } => {
                // The header signature seeds the chunk chain.
                let signer = ChunkSigner::new(signing_key, now, &scope, signature);
                self.payload
                    .frame_body(body, decoded_content_length, signer)
            }
        }
    }
}

fn canonical_request_string(ctx: &SigningRequest) -> Result<String> {
    // 256 is specially chosen to avoid reallocation for most requests.
    let mut f = String::with_capacity(256);

    // Insert method
    writeln!(f, "{}", ctx.method)?;
    // Insert encoded path
    let path = percent_decode_str(&ctx.path)
        .decode_utf8()
        .map_err(|e| Error::request_invalid("path is not valid utf-8").with_source(e))?;
    writeln!(f, "{}", utf8_percent_encode(&path, &AWS_URI_ENCODE_SET))?;
    // Insert query
    writeln!(
        f,
        "{}",
        ctx.query
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&")
    )?;
    // Insert signed headers
    let signed_headers = ctx.header_name_to_vec_sorted();
    for header in signed_headers.iter() {
        let values = ctx
            .headers
            .get_all(*header)
            .iter()
            .map(|v| v.to_str())
            .collect::<std::result::Result<Vec<_>, _>>()?;
        writeln!(f, "{}:{}", header, values.join(","))?;
    }
    writeln!(f)?;
    writeln!(f, "{}", signed_headers.join(";"))?;

    let payload_hash = ctx
        .headers
        .get(X_AMZ_CONTENT_SHA_256)
        .ok_or_else(|| Error::unexpected("payload hash header must be set before signing"))?;
    write!(f, "{}", payload_hash.to_str()?)?;

    Ok(f)
}

fn canonicalize_header(
    ctx: &mut SigningRequest,
    cred: &Credential,
    now: DateTime,
    content_hash: &ContentHash,
) -> Result<()> {
    // Header names and values need to be normalized according to Step 4 of https://docs.aws.amazon.com/general/latest/gr/sigv4-create-canonical-request.html
    for (_, value) in ctx.headers.iter_mut() {
        SigningRequest::header_value_normalize(value)
    }

    // Insert HOST header if not present.
    ctx.header_host_or_authority()?;

    // The date must match the scope, a caller provided one is replaced.
    ctx.headers
        .insert(X_AMZ_DATE, HeaderValue::try_from(format_iso8601(now))?);

    ctx.headers.insert(
        X_AMZ_CONTENT_SHA_256,
        HeaderValue::from_str(content_hash.header_value())?,
    );

    // Insert X_AMZ_SECURITY_TOKEN header if security token exists.
    if let Some(token) = &cred.session_token {
        let mut value = HeaderValue::from_str(token)?;
        // Set token value sensitive to valid leaking.
        value.set_sensitive(true);

        ctx.headers.insert(X_AMZ_SECURITY_TOKEN, value);
    }

    Ok(())
}

fn canonicalize_query(ctx: &mut SigningRequest) {
    // Return if query is empty.
    if ctx.query.is_empty() {
        return;
    }

    // Sort by param name
    ctx.query.sort();

    ctx.query = ctx
        .query
        .iter()
        .map(|(k, v)| {
            (
                utf8_percent_encode(k, &AWS_QUERY_ENCODE_SET).to_string(),
                utf8_percent_encode(v, &AWS_QUERY_ENCODE_SET).to_string(),
            )
        })
        .collect();
}
