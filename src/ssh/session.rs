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

//! One authenticated SSH hop.
//!
//! A [`Session`] is either dialed directly ([`Session::dial`]) or opened
//! through an already established session via a direct-tcpip channel
//! ([`Session::dial_through`]). Commands always run on the last session of
//! a chain; intermediate sessions only carry tunnels.

use std::sync::Arc;

use russh::client::{Config, Handle};
use tracing::debug;
use zeroize::Zeroizing;

use crate::error::{Error, Result};
use crate::runner::CommandOutput;
use crate::ssh::handler::{HostVerification, SessionHandler};
use crate::target::HostSpec;

/// An authenticated SSH connection to a single hop.
pub struct Session {
    handle: Handle<SessionHandler>,
    host: String,
    port: u16,
}

impl Session {
    /// Dial a hop directly over TCP and authenticate.
    pub async fn dial(spec: &HostSpec, verification: HostVerification) -> Result<Self> {
        let config = Arc::new(Config::default());
        let handler = SessionHandler::new(spec.host.clone(), spec.port, verification);

        debug!(host = %spec.host, port = spec.port, "dialing");
        let mut handle =
            russh::client::connect(config, (spec.host.as_str(), spec.port), handler).await?;

        authenticate(&mut handle, spec).await?;
        Ok(Self {
            handle,
            host: spec.host.clone(),
            port: spec.port,
        })
    }

    /// Open a hop tunneled through this session and authenticate.
    ///
    /// The tunnel is a direct-tcpip channel; the SSH transport for the new
    /// hop runs over the channel's byte stream.
    pub async fn dial_through(
        &self,
        spec: &HostSpec,
        verification: HostVerification,
    ) -> Result<Session> {
        debug!(
            via_host = %self.host,
            via_port = self.port,
            host = %spec.host,
            port = spec.port,
            "opening tunneled hop"
        );
        let channel = self
            .handle
            .channel_open_direct_tcpip(spec.host.clone(), u32::from(spec.port), "127.0.0.1", 0)
            .await?;
        let stream = channel.into_stream();

        let config = Arc::new(Config::default());
        let handler = SessionHandler::new(spec.host.clone(), spec.port, verification);
        let mut handle = russh::client::connect_stream(config, stream, handler).await?;

        authenticate(&mut handle, spec).await?;
        Ok(Session {
            handle,
            host: spec.host.clone(),
            port: spec.port,
        })
    }

    /// Execute a command on this hop, optionally feeding `stdin` to the
    /// remote process, and collect stdout, stderr, and the exit status.
    pub async fn exec(
        &self,
        command: &str,
        stdin: Option<Zeroizing<Vec<u8>>>,
    ) -> Result<CommandOutput> {
        let mut channel = self.handle.channel_open_session().await?;
        channel.exec(true, command).await?;

        if let Some(input) = stdin {
            channel.data(&input[..]).await?;
            channel.eof().await?;
        }

        let mut stdout: Vec<u8> = Vec::new();
        let mut stderr: Vec<u8> = Vec::new();
        let mut exit_code: Option<u32> = None;

        while let Some(msg) = channel.wait().await {
            match msg {
                russh::ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
                russh::ChannelMsg::ExtendedData { ref data, ext } => {
                    if ext == 1 {
                        stderr.extend_from_slice(data);
                    }
                }
                // The exit status can arrive before the last data message,
                // so keep draining until the channel closes.
                russh::ChannelMsg::ExitStatus { exit_status } => exit_code = Some(exit_status),
                _ => {}
            }
        }

        match exit_code {
            Some(exit_code) => Ok(CommandOutput {
                exit_code,
                stdout,
                stderr,
            }),
            None => Err(Error::network(format!(
                "channel to {}:{} closed without reporting an exit status",
                self.host, self.port
            ))),
        }
    }

    /// Disconnect this hop.
    pub async fn close(&self) -> Result<()> {
        debug!(host = %self.host, port = self.port, "closing session");
        self.handle
            .disconnect(russh::Disconnect::ByApplication, "", "")
            .await?;
        Ok(())
    }

    /// The hop this session is connected to, for log context.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Authenticate a freshly connected handle: password when the hop carries a
/// secret, SSH agent otherwise.
async fn authenticate(handle: &mut Handle<SessionHandler>, spec: &HostSpec) -> Result<()> {
    let username = spec.effective_user();

    match &spec.secret {
        Some(secret) => {
            let auth = handle
                .authenticate_password(&username, secret.as_str())
                .await?;
            if !auth.success() {
                return Err(Error::auth(format!(
                    "password rejected for {}@{}:{}",
                    username, spec.host, spec.port
                )));
            }
        }
        None => {
            let mut agent = russh::keys::agent::client::AgentClient::connect_env()
                .await
                .map_err(|e| Error::auth(format!("cannot reach SSH agent: {e}")))?;
            let identities = agent
                .request_identities()
                .await
                .map_err(|e| Error::auth(format!("cannot list SSH agent identities: {e}")))?;
            if identities.is_empty() {
                return Err(Error::auth("SSH agent holds no identities"));
            }

            let mut authenticated = false;
            for identity in identities {
                let result = handle
                    .authenticate_publickey_with(
                        &username,
                        identity,
                        handle.best_supported_rsa_hash().await?.flatten(),
                        &mut agent,
                    )
                    .await;
                if let Ok(auth) = result {
                    if auth.success() {
                        authenticated = true;
                        break;
                    }
                }
            }
            if !authenticated {
                return Err(Error::auth(format!(
                    "no agent identity accepted for {}@{}:{}",
                    username, spec.host, spec.port
                )));
            }
        }
    }

    Ok(())
}
