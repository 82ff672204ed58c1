// Copyright 2025 The drover authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Secure handling of privilege-elevation secrets.
//!
//! An [`ElevationSecret`] wraps the password fed to `sudo -S` on the remote
//! host. The secret is zeroized on drop, never appears in `Debug` output,
//! and each clone is zeroized independently.

use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroizing;

use crate::error::{Error, Result};

/// A privilege-elevation secret with automatic memory clearing.
#[derive(Clone)]
pub struct ElevationSecret {
    inner: SecretString,
}

impl ElevationSecret {
    /// Create a new secret. Empty secrets are rejected.
    pub fn new(secret: String) -> Result<Self> {
        if secret.is_empty() {
            return Err(Error::config("elevation secret cannot be empty"));
        }
        Ok(Self {
            inner: SecretString::new(secret.into_boxed_str()),
        })
    }

    /// The secret bytes. Use immediately; do not store.
    pub fn as_bytes(&self) -> &[u8] {
        self.inner.expose_secret().as_bytes()
    }

    /// The secret followed by a newline, ready to be written to the remote
    /// process's stdin. The returned buffer is zeroized when dropped.
    pub fn with_newline(&self) -> Zeroizing<Vec<u8>> {
        let mut bytes = self.inner.expose_secret().as_bytes().to_vec();
        bytes.push(b'\n');
        Zeroizing::new(bytes)
    }
}

impl fmt::Debug for ElevationSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElevationSecret")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}
