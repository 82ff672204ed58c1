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

//! Error taxonomy for the remote execution engine.
//!
//! Errors fall into four families with different propagation rules:
//!
//! - [`Error::Config`]: malformed target chain or missing elevation secret.
//!   Fatal, surfaced immediately, never retried.
//! - [`Error::Connect`]: per-hop connection failures, classified as network,
//!   authentication, or host-identity failures.
//! - [`Error::Timeout`]: login or command deadline expiry.
//! - [`Error::RemoteCommand`]: non-zero remote exit under strict execution.
//!
//! Connection, timeout, and remote-command errors abort only the task for the
//! target they occurred on; the dispatcher catches them at the task boundary.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Classification of a connection failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectKind {
    /// Generic network failure (dial, DNS, tunnel, transport).
    Network,
    /// The remote host rejected our credentials.
    Auth,
    /// The server key did not pass host identity verification.
    HostIdentity,
}

impl fmt::Display for ConnectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectKind::Network => write!(f, "network"),
            ConnectKind::Auth => write!(f, "authentication"),
            ConnectKind::HostIdentity => write!(f, "host identity"),
        }
    }
}

/// Which deadline expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    /// Establishing one hop of the connection chain took too long.
    Login,
    /// A remote command did not finish within its deadline.
    Command,
}

impl fmt::Display for TimeoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeoutKind::Login => write!(f, "login"),
            TimeoutKind::Command => write!(f, "command"),
        }
    }
}

/// Errors produced by the remote execution engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid target configuration. Fatal; no retry.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A hop of the connection chain could not be established.
    #[error("{kind} failure: {message}")]
    Connect { kind: ConnectKind, message: String },

    /// A login or command deadline expired.
    #[error("{kind} timed out after {limit:?}")]
    Timeout { kind: TimeoutKind, limit: Duration },

    /// A remote command exited non-zero under strict execution.
    #[error("remote command exited with status {exit_code}: {stderr}")]
    RemoteCommand { exit_code: u32, stderr: String },

    /// Local I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Connect {
            kind: ConnectKind::Network,
            message: message.into(),
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Connect {
            kind: ConnectKind::Auth,
            message: message.into(),
        }
    }

    pub fn host_identity(message: impl Into<String>) -> Self {
        Self::Connect {
            kind: ConnectKind::HostIdentity,
            message: message.into(),
        }
    }

    pub fn login_timeout(limit: Duration) -> Self {
        Self::Timeout {
            kind: TimeoutKind::Login,
            limit,
        }
    }

    pub fn command_timeout(limit: Duration) -> Self {
        Self::Timeout {
            kind: TimeoutKind::Command,
            limit,
        }
    }

    /// Whether this error is fatal to the whole run rather than one target.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Config(_))
    }
}

// Transport-level failures surfacing out of russh that we did not already
// classify at the call site count as generic network failures.
impl From<russh::Error> for Error {
    fn from(err: russh::Error) -> Self {
        Error::network(err.to_string())
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
