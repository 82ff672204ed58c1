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

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use drover::cli::Cli;
use drover::dispatch::{ChainConnector, Dispatcher, ExecutionResult, RunCommand};
use drover::logging::init_logging;
use drover::runner::command_line;
use drover::target::resolve_targets;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let targets = resolve_targets(&cli.remotes, &cli.resolve_options())
        .context("failed to resolve remote targets")?;
    let target_count = targets.len();

    let command = command_line(&cli.command_args);
    let mut dispatcher = Dispatcher::new(ChainConnector).max_tasks(cli.max_tasks);
    if let Some(parallel) = cli.parallel {
        dispatcher = dispatcher.workers(parallel);
    }

    let results = dispatcher
        .dispatch(targets, Arc::new(RunCommand::new(command)))
        .await;

    let mut failed = target_count - results.len();
    for result in &results {
        print_result(result);
        if result.output.exit_code != 0 {
            failed += 1;
        }
    }

    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

/// Print one target's output with a host prefix on every line.
fn print_result(result: &ExecutionResult) {
    let host = &result.target.end_host.host;
    for line in result.output.stdout_lossy().lines() {
        println!("[{host}] {line}");
    }
    for line in result.output.stderr_lossy().lines() {
        eprintln!("[{host}] {line}");
    }
}
