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

//! Core components for signing object storage requests.
//!
//! This crate provides the foundational types and traits shared by the
//! streamsign signers. Service crates such as `streamsign-aws-v4` build on
//! them to implement a concrete signing protocol.
//!
//! ## Overview
//!
//! - **Context**: where credential and config loaders read their environment from
//! - **Traits**: credential loading ([`ProvideCredential`]) and request signing ([`SignRequest`])
//! - **Bodies**: [`ContentStream`] for bodies that can be read ahead, and
//!   [`SigningBody`] / [`SignedBody`] for what goes in and out of a signer
//! - **Signer**: the orchestrator that ties a credential provider to a request signer
//!
//! ## Example
//!
//! ```no_run
//! use streamsign_core::{Context, ProvideCredential, Result, SignRequest, SignedBody};
//! use streamsign_core::{Signer, SigningBody, SigningCredential, ZeroStream};
//! use async_trait::async_trait;
//! use http::request::Parts;
//!
//! #[derive(Clone, Debug)]
//! struct MyCredential {
//!     key: String,
//! }
//!
//! impl SigningCredential for MyCredential {
//!     fn is_valid(&self) -> bool {
//!         !self.key.is_empty()
//!     }
//! }
//!
//! #[derive(Debug)]
//! struct MyLoader;
//!
//! #[async_trait]
//! impl ProvideCredential for MyLoader {
//!     type Credential = MyCredential;
//!
//!     async fn provide_credential(&self, _: &Context) -> Result<Option<Self::Credential>> {
//!         Ok(Some(MyCredential {
//!             key: "my-key".to_string(),
//!         }))
//!     }
//! }
//!
//! #[derive(Debug)]
//! struct MyBuilder;
//!
//! impl SignRequest for MyBuilder {
//!     type Credential = MyCredential;
//!
//!     fn sign_request(
//!         &self,
//!         _ctx: &Context,
//!         _req: &mut Parts,
//!         body: SigningBody,
//!         _cred: Option<&Self::Credential>,
//!     ) -> Result<SignedBody> {
//!         Ok(body.into())
//!     }
//! }
//!
//! # async fn example() -> Result<()> {
//! let signer = Signer::new(Context::new(), MyLoader, MyBuilder);
//!
//! let mut parts = http::Request::put("http://127.0.0.1:9000/bucket/object")
//!     .body(())
//!     .unwrap()
//!     .into_parts()
//!     .0;
//! let body = signer
//!     .sign(&mut parts, SigningBody::from_stream(ZeroStream::new(1024)))
//!     .await?;
//! let _reader = body.into_reader();
//! # Ok(())
//! # }
//! ```

// Make sure all our public APIs have docs.
#![warn(missing_docs)]

pub mod hash;
pub mod time;
pub mod utils;

mod error;
pub use error::{Error, ErrorKind, Result};

mod context;
pub use context::{Context, Env, NoopEnv, OsEnv, StaticEnv};

mod api;
pub use api::{ProvideCredential, SignRequest, SigningCredential};
mod body;
pub use body::{
    BufferedStream, ContentStream, SeekableStream, SignedBody, SigningBody, ZeroStream,
};
mod request;
pub use request::SigningRequest;
mod signer;
pub use signer::Signer;
