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

//! Connection establishment across a chain of hops.
//!
//! A [`Connection`] owns one session per hop, built left to right: the
//! first hop is dialed directly, every later hop is tunneled through the
//! previous one. Teardown closes sessions in reverse order, last opened
//! first, on every path, including when a middle hop fails to open.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::ssh::{HostVerification, Session};
use crate::target::{HostSpec, RemoteTarget};

/// One closable hop of a connection chain.
///
/// [`Session`] is the production implementation; tests substitute hops
/// that record their close order.
#[async_trait]
pub trait Hop: Send + Sync {
    async fn close(&self) -> Result<()>;
}

#[async_trait]
impl Hop for Session {
    async fn close(&self) -> Result<()> {
        Session::close(self).await
    }
}

/// Opens one hop, either directly or through the previous hop.
///
/// The seam that lets chain establishment run against test doubles; the
/// production implementation is [`SessionDialer`].
#[async_trait]
trait HopDialer: Send + Sync {
    type Hop: Hop;

    async fn dial(&self, previous: Option<&Self::Hop>, spec: &HostSpec) -> Result<Self::Hop>;
}

struct SessionDialer {
    verification: HostVerification,
}

#[async_trait]
impl HopDialer for SessionDialer {
    type Hop = Session;

    async fn dial(&self, previous: Option<&Session>, spec: &HostSpec) -> Result<Session> {
        match previous {
            Some(previous) => previous.dial_through(spec, self.verification).await,
            None => Session::dial(spec, self.verification).await,
        }
    }
}

/// An established chain of sessions, jump hosts first, end host last.
///
/// The caller runs commands only on the end session but owns the whole
/// chain and must [`close`](Connection::close) it when done.
#[derive(Debug)]
pub struct Connection<H: Hop = Session> {
    hops: Vec<H>,
}

impl Connection<Session> {
    /// Open the full chain for a target.
    ///
    /// Each hop dial is bounded by the target's `login_timeout`. On any
    /// failure the hops opened so far are closed in reverse order before
    /// the error surfaces.
    pub async fn establish(target: &RemoteTarget) -> Result<Self> {
        let dialer = SessionDialer {
            verification: if target.verify_host_identity {
                HostVerification::KnownHosts
            } else {
                HostVerification::Off
            },
        };
        establish_with(&dialer, target).await
    }

    /// The end-host session commands run on.
    pub fn end_session(&self) -> &Session {
        // establish() always opens at least the end host.
        self.hops.last().expect("established connection has hops")
    }
}

impl<H: Hop> Connection<H> {
    #[cfg(test)]
    pub(crate) fn from_hops(hops: Vec<H>) -> Self {
        Self { hops }
    }

    /// Number of open hops.
    pub fn hop_count(&self) -> usize {
        self.hops.len()
    }

    /// Close all hops in reverse order.
    ///
    /// A hop that fails to close does not stop the remaining hops from
    /// being closed; the first failure is returned afterwards.
    pub async fn close(mut self) -> Result<()> {
        let mut first_err: Option<Error> = None;
        while let Some(hop) = self.hops.pop() {
            if let Err(err) = hop.close().await {
                warn!(error = %err, "failed to close hop");
                first_err.get_or_insert(err);
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Dial every hop of the target in order, unwinding the hops opened so
/// far in reverse when a dial fails or exceeds `login_timeout`.
async fn establish_with<D: HopDialer>(
    dialer: &D,
    target: &RemoteTarget,
) -> Result<Connection<D::Hop>> {
    let mut hops: Vec<D::Hop> = Vec::with_capacity(target.hop_count());

    for spec in target.hops() {
        let dialed =
            tokio::time::timeout(target.login_timeout, dialer.dial(hops.last(), spec)).await;

        let hop = match dialed {
            Ok(Ok(hop)) => hop,
            Ok(Err(err)) => {
                unwind(hops).await;
                return Err(err);
            }
            Err(_) => {
                unwind(hops).await;
                return Err(Error::login_timeout(target.login_timeout));
            }
        };

        debug!(hop = %spec, "hop established");
        hops.push(hop);
    }

    Ok(Connection { hops })
}

/// Reverse-order teardown of a partially opened chain. Close failures are
/// logged, not surfaced; the establish error is the one that matters.
async fn unwind<H: Hop>(hops: Vec<H>) {
    if let Err(err) = (Connection { hops }).close().await {
        debug!(error = %err, "error while unwinding partially opened chain");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Debug)]
    struct RecordingHop {
        name: String,
        closed: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    #[async_trait]
    impl Hop for RecordingHop {
        async fn close(&self) -> Result<()> {
            self.closed.lock().unwrap().push(self.name.clone());
            if self.fail {
                Err(Error::network("close failed"))
            } else {
                Ok(())
            }
        }
    }

    /// Hands out recording hops, refusing to dial one named host.
    struct RecordingDialer {
        closed: Arc<Mutex<Vec<String>>>,
        refuse: Option<String>,
    }

    #[async_trait]
    impl HopDialer for RecordingDialer {
        type Hop = RecordingHop;

        async fn dial(
            &self,
            _previous: Option<&RecordingHop>,
            spec: &HostSpec,
        ) -> Result<RecordingHop> {
            if self.refuse.as_deref() == Some(spec.host.as_str()) {
                return Err(Error::network("dial refused"));
            }
            Ok(RecordingHop {
                name: spec.host.clone(),
                closed: Arc::clone(&self.closed),
                fail: false,
            })
        }
    }

    /// Never finishes a dial; drives the login-timeout path.
    struct StalledDialer;

    #[async_trait]
    impl HopDialer for StalledDialer {
        type Hop = RecordingHop;

        async fn dial(
            &self,
            _previous: Option<&RecordingHop>,
            _spec: &HostSpec,
        ) -> Result<RecordingHop> {
            std::future::pending().await
        }
    }

    fn host(name: &str) -> HostSpec {
        HostSpec {
            host: name.to_string(),
            port: 22,
            username: None,
            secret: None,
        }
    }

    fn target(jumps: &[&str], end: &str) -> RemoteTarget {
        RemoteTarget {
            end_host: host(end),
            jump_hosts: jumps.iter().map(|j| host(j)).collect(),
            elevate: false,
            elevate_secret: None,
            command_timeout: Duration::from_secs(10),
            login_timeout: Duration::from_secs(5),
            verify_host_identity: false,
        }
    }

    fn recording_chain(
        closed: &Arc<Mutex<Vec<String>>>,
        names: &[&str],
    ) -> Connection<RecordingHop> {
        Connection::from_hops(
            names
                .iter()
                .map(|&name| RecordingHop {
                    name: name.to_string(),
                    closed: Arc::clone(closed),
                    fail: false,
                })
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_close_reverse_order() {
        let closed = Arc::new(Mutex::new(Vec::new()));
        let conn = recording_chain(&closed, &["h1", "h2", "h3"]);
        conn.close().await.unwrap();
        assert_eq!(*closed.lock().unwrap(), ["h3", "h2", "h1"]);
    }

    #[tokio::test]
    async fn test_close_continues_past_failure() {
        let closed = Arc::new(Mutex::new(Vec::new()));
        let conn = Connection::from_hops(vec![
            RecordingHop {
                name: "h1".to_string(),
                closed: Arc::clone(&closed),
                fail: false,
            },
            RecordingHop {
                name: "h2".to_string(),
                closed: Arc::clone(&closed),
                fail: true,
            },
            RecordingHop {
                name: "h3".to_string(),
                closed: Arc::clone(&closed),
                fail: false,
            },
        ]);
        let result = conn.close().await;
        assert!(result.is_err());
        assert_eq!(*closed.lock().unwrap(), ["h3", "h2", "h1"]);
    }

    #[tokio::test]
    async fn test_establish_opens_all_hops_in_order() {
        let closed = Arc::new(Mutex::new(Vec::new()));
        let dialer = RecordingDialer {
            closed: Arc::clone(&closed),
            refuse: None,
        };
        let conn = establish_with(&dialer, &target(&["j1", "j2"], "end"))
            .await
            .unwrap();
        assert_eq!(conn.hop_count(), 3);
        conn.close().await.unwrap();
        assert_eq!(*closed.lock().unwrap(), ["end", "j2", "j1"]);
    }

    #[tokio::test]
    async fn test_mid_chain_dial_failure_unwinds_opened_hops() {
        let closed = Arc::new(Mutex::new(Vec::new()));
        let dialer = RecordingDialer {
            closed: Arc::clone(&closed),
            refuse: Some("j2".to_string()),
        };
        let err = establish_with(&dialer, &target(&["j1", "j2"], "end"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Connect { .. }));
        // Only the hop that actually opened gets closed.
        assert_eq!(*closed.lock().unwrap(), ["j1"]);
    }

    #[tokio::test]
    async fn test_end_host_dial_failure_unwinds_in_reverse() {
        let closed = Arc::new(Mutex::new(Vec::new()));
        let dialer = RecordingDialer {
            closed: Arc::clone(&closed),
            refuse: Some("end".to_string()),
        };
        let err = establish_with(&dialer, &target(&["j1", "j2"], "end"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Connect { .. }));
        assert_eq!(*closed.lock().unwrap(), ["j2", "j1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_dial_is_a_login_timeout() {
        let err = establish_with(&StalledDialer, &target(&[], "end"))
            .await
            .unwrap_err();
        match err {
            Error::Timeout { kind, limit } => {
                assert_eq!(kind, crate::error::TimeoutKind::Login);
                assert_eq!(limit, Duration::from_secs(5));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
