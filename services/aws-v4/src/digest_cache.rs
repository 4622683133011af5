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

//! Size keyed digest cache for synthetic payloads.
//!
//! A load generator sends the same zero-filled body sizes over and over.
//! Their digest only depends on the size, so it is computed once per size
//! and shared by every request.

use log::{debug, warn};
use once_cell::sync::OnceCell;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt::{self, Debug, Formatter};
use std::sync::{Arc, Mutex};
use streamsign_core::hash::Sha256Digest;
use streamsign_core::Result;

type DigestLoader = dyn Fn(u64) -> Result<Sha256Digest> + Send + Sync;

/// Compute the SHA-256 digest of `size` zero bytes.
pub fn zero_filled_digest(size: u64) -> Sha256Digest {
    const BLOCK: [u8; 8192] = [0; 8192];

    let mut h = Sha256::new();
    let mut remaining = size;
    while remaining > 0 {
        let n = remaining.min(BLOCK.len() as u64) as usize;
        h.update(&BLOCK[..n]);
        remaining -= n as u64;
    }
    h.finalize().into()
}

/// DigestCache maps a payload size to the digest of that payload.
///
/// Concurrent lookups of the same missing size run the loader once: every
/// key owns a [`OnceCell`], and callers racing on it wait for the winner.
/// A failed load is forgotten, so the next caller tries again.
///
/// With a capacity set, sizes seen after the cache is full are computed on
/// every call and never stored.
pub struct DigestCache {
    loader: Box<DigestLoader>,
    capacity: Option<usize>,
    entries: Mutex<HashMap<u64, Arc<OnceCell<Sha256Digest>>>>,
}

impl DigestCache {
    /// Create an unbounded cache of zero-filled payload digests.
    pub fn new() -> Self {
        Self::with_loader(|size| Ok(zero_filled_digest(size)))
    }

    /// Create an unbounded cache backed by a custom loader.
    ///
    /// The loader must be a pure function of the size.
    pub fn with_loader(loader: impl Fn(u64) -> Result<Sha256Digest> + Send + Sync + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            capacity: None,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Limit the number of sizes kept by this cache.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Get the digest for `size`, computing it on first use.
    pub fn get_or_compute(&self, size: u64) -> Result<Sha256Digest> {
        let cell = {
            let mut entries = self.entries.lock().expect("lock poisoned");
            match entries.get(&size) {
                Some(cell) => Some(cell.clone()),
                None if self.capacity.is_some_and(|cap| entries.len() >= cap) => None,
                None => Some(entries.entry(size).or_default().clone()),
            }
        };

        let Some(cell) = cell else {
            warn!("digest cache is full, computing digest for size {size} without caching");
            return (self.loader)(size);
        };

        let res = cell
            .get_or_try_init(|| {
                debug!("digest cache miss for size {size}");
                (self.loader)(size)
            })
            .copied();
        if res.is_err() {
            // Drop the empty cell so a failed size does not hold a slot.
            let mut entries = self.entries.lock().expect("lock poisoned");
            if entries
                .get(&size)
                .is_some_and(|c| Arc::ptr_eq(c, &cell) && c.get().is_none())
            {
                entries.remove(&size);
            }
        }
        res
    }

    /// Same as [`DigestCache::get_or_compute`], hex encoded.
    pub fn get_or_compute_hex(&self, size: u64) -> Result<String> {
        self.get_or_compute(size).map(hex::encode)
    }

    /// Number of sizes with a computed digest.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .expect("lock poisoned")
            .values()
            .filter(|cell| cell.get().is_some())
            .count()
    }

    /// Whether no digest has been computed yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DigestCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for DigestCache {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("DigestCache")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}
