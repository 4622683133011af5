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

//! Utility functions and types.

use std::fmt::Debug;
use std::fmt::Formatter;

use http::HeaderMap;

/// Redacts a secret so it can be printed in logs.
///
/// - Empty input prints `EMPTY`.
/// - Input shorter than 12 chars is replaced by `***`.
/// - Longer input keeps its first and last three chars so different
///   secrets can still be told apart.
pub struct Redact<'a>(&'a str);

impl<'a> From<&'a str> for Redact<'a> {
    fn from(value: &'a str) -> Self {
        Redact(value)
    }
}

impl<'a> From<&'a String> for Redact<'a> {
    fn from(value: &'a String) -> Self {
        Redact(value.as_str())
    }
}

impl<'a> From<&'a Option<String>> for Redact<'a> {
    fn from(value: &'a Option<String>) -> Self {
        Redact(value.as_deref().unwrap_or_default())
    }
}

impl Debug for Redact<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = self.0;
        match s.len() {
            0 => f.write_str("EMPTY"),
            n if n < 12 || !s.is_char_boundary(3) || !s.is_char_boundary(n - 3) => {
                f.write_str("***")
            }
            n => write!(f, "{}***{}", &s[..3], &s[n - 3..]),
        }
    }
}

/// Debug view of a header map that hides sensitive values.
///
/// Values flagged by [`http::HeaderValue::set_sensitive`] are printed
/// through [`Redact`], so signed requests can be logged safely.
pub struct RedactHeaders<'a>(pub &'a HeaderMap);

impl Debug for RedactHeaders<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut m = f.debug_map();
        for (k, v) in self.0 {
            let sensitive = v.is_sensitive();
            let v = v.to_str().unwrap_or("<binary>");
            if sensitive {
                m.entry(&k.as_str(), &Redact(v));
            } else {
                m.entry(&k.as_str(), &v);
            }
        }
        m.finish()
    }
}
