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

//! Command execution on an established end-host session.
//!
//! Two execution modes: [`Runner::run`] fails on a non-zero remote exit,
//! [`Runner::run_logged`] records the failure and returns the output
//! regardless. [`Runner::read_lines`] fetches a remote file's lines,
//! treating a non-zero exit as "file absent" rather than an error.

use std::borrow::Cow;
use std::time::Duration;

use tracing::error;
use zeroize::Zeroizing;

use crate::elevate::ElevationSecret;
use crate::error::{Error, Result};
use crate::ssh::Session;
use crate::target::RemoteTarget;

/// Collected output of one remote command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// The unix exit status (`$?` in a shell).
    pub exit_code: u32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn stdout_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    pub fn stderr_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }
}

/// Join command arguments into a single command line.
pub fn command_line<S: AsRef<str>>(args: &[S]) -> String {
    args.iter()
        .map(|a| a.as_ref())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Wrap a command for privilege elevation.
///
/// `sudo -S` reads the secret from stdin; the empty `-p` prompt keeps the
/// password prompt out of stderr.
pub fn wrap_elevated(command: &str) -> String {
    format!("sudo -S -p '' {command}")
}

/// Runs commands on the end-host session of an established connection,
/// applying the target's elevation settings and command deadline.
pub struct Runner<'a> {
    session: &'a Session,
    elevate: bool,
    elevate_secret: Option<&'a ElevationSecret>,
    command_timeout: Duration,
}

impl<'a> Runner<'a> {
    pub fn new(session: &'a Session, target: &'a RemoteTarget) -> Self {
        Self {
            session,
            elevate: target.elevate,
            elevate_secret: target.elevate_secret.as_ref(),
            command_timeout: target.command_timeout,
        }
    }

    /// Run a command; a non-zero exit is an [`Error::RemoteCommand`].
    pub async fn run(&self, command: &str) -> Result<CommandOutput> {
        check_exit(self.execute(command).await?)
    }

    /// Run a command; a non-zero exit is logged with the command, exit
    /// code, and stderr, and the output is returned either way.
    pub async fn run_logged(&self, command: &str) -> Result<CommandOutput> {
        let output = self.execute(command).await?;
        if output.exit_code != 0 {
            error!(
                command,
                exit_code = output.exit_code,
                stderr = %output.stderr_lossy(),
                "remote command failed"
            );
        }
        Ok(output)
    }

    /// Read a remote file as lines. `Ok(None)` when the remote read exits
    /// non-zero (file absent); errors are reserved for transport failures.
    pub async fn read_lines(&self, path: &str) -> Result<Option<Vec<String>>> {
        let output = self.execute(&format!("cat {path}")).await?;
        if output.exit_code != 0 {
            return Ok(None);
        }
        Ok(Some(split_lines(&output.stdout)))
    }

    /// Build the final command line, apply elevation, and execute under
    /// the command deadline. On expiry the pending channel is dropped.
    async fn execute(&self, command: &str) -> Result<CommandOutput> {
        let (command_line, stdin): (String, Option<Zeroizing<Vec<u8>>>) = if self.elevate {
            (
                wrap_elevated(command),
                self.elevate_secret.map(ElevationSecret::with_newline),
            )
        } else {
            (command.to_string(), None)
        };

        match tokio::time::timeout(self.command_timeout, self.session.exec(&command_line, stdin))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(Error::command_timeout(self.command_timeout)),
        }
    }
}

fn check_exit(output: CommandOutput) -> Result<CommandOutput> {
    if output.exit_code != 0 {
        return Err(Error::RemoteCommand {
            exit_code: output.exit_code,
            stderr: output.stderr_lossy().into_owned(),
        });
    }
    Ok(output)
}

fn split_lines(stdout: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(str::to_string)
        .collect()
}
