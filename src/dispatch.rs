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

//! Fan-out of tasks across a fleet of targets.
//!
//! The [`Dispatcher`] pushes all targets onto a shared FIFO queue and
//! starts a fixed set of workers. Each worker pulls targets and spawns
//! them into its own in-flight batch; once `max_tasks` are running it
//! awaits the whole batch before pulling more. One task is one target:
//! establish the connection chain, run the task, close the chain in
//! reverse order on every exit path.
//!
//! Per-target failures (connection, timeout, remote command) are caught
//! at the task boundary, logged with target context, and excluded from
//! the result list; sibling tasks and the remaining queue are unaffected.
//! The dispatcher waits for every task unconditionally; nothing is
//! silently dropped.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::chain::Connection;
use crate::error::Result;
use crate::runner::{CommandOutput, Runner};
use crate::target::RemoteTarget;

/// Opens connection chains for the dispatcher.
///
/// The production implementation is [`ChainConnector`]; tests substitute
/// connectors that hand out chains without touching the network.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, target: &RemoteTarget) -> Result<Connection>;
}

/// Connects by establishing the target's full hop chain.
pub struct ChainConnector;

#[async_trait]
impl Connector for ChainConnector {
    async fn connect(&self, target: &RemoteTarget) -> Result<Connection> {
        Connection::establish(target).await
    }
}

/// One unit of work to run per target over an established connection.
#[async_trait]
pub trait Task: Send + Sync + 'static {
    type Output: Send + 'static;

    async fn run(&self, target: &RemoteTarget, connection: &Connection)
        -> Result<Self::Output>;

    /// Short description of the task, used as log context when it fails.
    fn describe(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}

/// The output of running a command on one target.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub target: RemoteTarget,
    pub output: CommandOutput,
}

/// The standard task: run one command on the end host, logging a
/// non-zero exit instead of failing on it.
pub struct RunCommand {
    command: String,
}

impl RunCommand {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl Task for RunCommand {
    type Output = ExecutionResult;

    async fn run(
        &self,
        target: &RemoteTarget,
        connection: &Connection,
    ) -> Result<ExecutionResult> {
        let runner = Runner::new(connection.end_session(), target);
        let output = runner.run_logged(&self.command).await?;
        Ok(ExecutionResult {
            target: target.clone(),
            output,
        })
    }

    fn describe(&self) -> String {
        self.command.clone()
    }
}

/// Bounded worker pool over a shared target queue.
pub struct Dispatcher<C: Connector> {
    connector: Arc<C>,
    workers: Option<usize>,
    max_tasks: usize,
}

impl<C: Connector> Dispatcher<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector: Arc::new(connector),
            workers: None,
            max_tasks: 1,
        }
    }

    /// Worker count. Defaults to the available CPU cores, capped at the
    /// number of targets.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Per-worker concurrency limit (head-of-line batching).
    pub fn max_tasks(mut self, max_tasks: usize) -> Self {
        self.max_tasks = max_tasks.max(1);
        self
    }

    /// Run `task` against every target. Returns the outputs of the tasks
    /// that completed without error, in completion order.
    pub async fn dispatch<T: Task>(
        &self,
        targets: Vec<RemoteTarget>,
        task: Arc<T>,
    ) -> Vec<T::Output> {
        if targets.is_empty() {
            return Vec::new();
        }

        let worker_count = effective_workers(self.workers, targets.len());
        debug!(
            targets = targets.len(),
            workers = worker_count,
            max_tasks = self.max_tasks,
            "dispatching"
        );

        let queue = Arc::new(Mutex::new(VecDeque::from(targets)));
        let workers = (0..worker_count).map(|worker_id| {
            run_worker(
                worker_id,
                Arc::clone(&self.connector),
                Arc::clone(&queue),
                Arc::clone(&task),
                self.max_tasks,
            )
        });

        join_all(workers).await.into_iter().flatten().collect()
    }
}

/// Requested worker count, or the available CPU cores, capped at the
/// number of targets and never zero.
fn effective_workers(requested: Option<usize>, target_count: usize) -> usize {
    let workers = requested.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(1)
    });
    workers.min(target_count).max(1)
}

async fn run_worker<C: Connector, T: Task>(
    worker_id: usize,
    connector: Arc<C>,
    queue: Arc<Mutex<VecDeque<RemoteTarget>>>,
    task: Arc<T>,
    max_tasks: usize,
) -> Vec<T::Output> {
    let mut results = Vec::new();
    let mut in_flight: JoinSet<Option<T::Output>> = JoinSet::new();

    loop {
        // Atomic pull-or-empty; the queue is the only state shared
        // across workers.
        let target = queue.lock().await.pop_front();
        let Some(target) = target else { break };

        debug!(worker = worker_id, target = %target, "pulled target");
        let connector = Arc::clone(&connector);
        let task = Arc::clone(&task);
        in_flight.spawn(async move { run_target(connector, target, task).await });

        if in_flight.len() >= max_tasks {
            drain(worker_id, &mut in_flight, &mut results).await;
        }
    }

    drain(worker_id, &mut in_flight, &mut results).await;
    results
}

/// Await the worker's whole in-flight batch. A panicking task is a
/// programming fault: logged as an error and dropped, like a classified
/// failure, so the batch still completes.
async fn drain<R: 'static>(worker_id: usize, in_flight: &mut JoinSet<Option<R>>, results: &mut Vec<R>) {
    while let Some(joined) = in_flight.join_next().await {
        match joined {
            Ok(Some(output)) => results.push(output),
            Ok(None) => {}
            Err(err) => error!(worker = worker_id, error = %err, "task aborted unexpectedly"),
        }
    }
}

/// One complete task: connect, run, close. The connection is closed in
/// reverse hop order whether the task succeeded or failed; a classified
/// error is logged here and turns into `None`.
async fn run_target<C: Connector, T: Task>(
    connector: Arc<C>,
    target: RemoteTarget,
    task: Arc<T>,
) -> Option<T::Output> {
    let label = target.to_string();

    let connection = match connector.connect(&target).await {
        Ok(connection) => connection,
        Err(err) => {
            error!(target = %label, task = %task.describe(), error = %err, "connection failed");
            return None;
        }
    };

    let result = task.run(&target, &connection).await;

    if let Err(err) = connection.close().await {
        warn!(target = %label, error = %err, "failed to close connection");
    }

    match result {
        Ok(output) => Some(output),
        Err(err) => {
            error!(target = %label, task = %task.describe(), error = %err, "task failed");
            None
        }
    }
}
