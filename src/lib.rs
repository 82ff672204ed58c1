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

//! Parallel remote command execution over SSH with jump-host chains.
//!
//! Targets are parsed from `scheme://[user[:secret]@]host[:port]` URIs by
//! [`target::resolve_targets`], connected through optional jump-host
//! chains by [`chain::Connection`], and fanned out across a bounded
//! worker pool by [`dispatch::Dispatcher`].

pub mod backoff;
pub mod chain;
pub mod cli;
pub mod dispatch;
pub mod elevate;
pub mod error;
pub mod logging;
pub mod runner;
pub mod ssh;
pub mod target;

pub use backoff::Backoff;
pub use chain::Connection;
pub use cli::Cli;
pub use dispatch::{ChainConnector, Dispatcher, ExecutionResult, RunCommand};
pub use error::{Error, Result};
pub use runner::{CommandOutput, Runner};
pub use target::{resolve_targets, HostSpec, RemoteTarget, ResolveOptions};
