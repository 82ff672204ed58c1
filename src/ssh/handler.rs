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

//! russh client handler with host identity verification.

use russh::client::Handler;

use crate::error::{Error, Result};

/// How the server key presented by a hop is verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostVerification {
    /// Accept any server key.
    Off,
    /// Check the server key against the default known-hosts file.
    KnownHosts,
}

/// Per-hop handler for the russh client protocol machinery.
#[derive(Debug, Clone)]
pub struct SessionHandler {
    hostname: String,
    port: u16,
    verification: HostVerification,
}

impl SessionHandler {
    pub fn new(hostname: String, port: u16, verification: HostVerification) -> Self {
        Self {
            hostname,
            port,
            verification,
        }
    }
}

impl Handler for SessionHandler {
    type Error = Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh::keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        match self.verification {
            HostVerification::Off => Ok(true),
            HostVerification::KnownHosts => {
                let known =
                    russh::keys::check_known_hosts(&self.hostname, self.port, server_public_key)
                        .map_err(|e| {
                            Error::host_identity(format!(
                                "known-hosts check failed for {}:{}: {e}",
                                self.hostname, self.port
                            ))
                        })?;
                if known {
                    Ok(true)
                } else {
                    Err(Error::host_identity(format!(
                        "server key for {}:{} not found in known hosts",
                        self.hostname, self.port
                    )))
                }
            }
        }
    }
}
