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

use crate::{Context, Result, SignedBody, SigningBody};
use std::fmt::Debug;

/// SigningCredential is the trait used by signer as the signing credential.
pub trait SigningCredential: Clone + Debug + Send + Sync + Unpin + 'static {
    /// Check if the credential is valid.
    fn is_valid(&self) -> bool;
}

impl<T: SigningCredential> SigningCredential for Option<T> {
    fn is_valid(&self) -> bool {
        let Some(cred) = self else {
            return false;
        };

        cred.is_valid()
    }
}

/// ProvideCredential is the trait used by signer to load the credential.
///
/// Service may require different credential to sign the request, for
/// example, AWS require access key and secret key.
#[async_trait::async_trait]
pub trait ProvideCredential: Debug + Send + Sync + Unpin + 'static {
    /// Credential returned by this loader.
    type Credential: Send + Sync + Unpin + 'static;

    /// Load signing credential from current env.
    async fn provide_credential(&self, ctx: &Context) -> Result<Option<Self::Credential>>;
}

/// SignRequest is the trait used by signer to sign the request.
///
/// Signing is synchronous: the request is signed on the caller's thread,
/// and any body transformation happens lazily while the returned body is
/// read.
pub trait SignRequest: Debug + Send + Sync + Unpin + 'static {
    /// Credential used by this builder.
    type Credential: Send + Sync + Unpin + 'static;

    /// Sign the request in place and return the body to transmit.
    ///
    /// ## Body
    ///
    /// The body may be read ahead (to hash it or to probe its length) and
    /// is always handed back positioned at the start of its content. A
    /// signer may also replace it, for example by a stream of signed chunks.
    ///
    /// ## Credential
    ///
    /// Implementations must fail when `credential` is `None`: a request
    /// is never sent without authentication.
    fn sign_request(
        &self,
        ctx: &Context,
        req: &mut http::request::Parts,
        body: SigningBody,
        credential: Option<&Self::Credential>,
    ) -> Result<SignedBody>;
}
