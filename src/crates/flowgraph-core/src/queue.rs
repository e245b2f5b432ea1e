//! Fire-and-forget run queue
//!
//! An unbounded single-producer/single-consumer channel feeding one worker
//! task that executes jobs back to back. Producers are the editor or an
//! automation layer, both low-rate, so backpressure is intentionally absent.
//!
//! Cancelling a job's token does not remove it from the queue; the worker
//! still dequeues it and the run ends immediately at its first gate.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::model::GraphData;
use crate::service::{ExecutionService, RunParams, RunResult};

/// One queued run
#[derive(Debug)]
pub struct ExecutionJob {
    /// Graph to execute
    pub graph: GraphData,
    /// Run parameters, including the job's own cancellation token
    pub params: RunParams,
    /// Optional completion notification
    pub result_tx: Option<oneshot::Sender<RunResult>>,
}

impl ExecutionJob {
    /// Create a job with default parameters and no completion channel
    pub fn new(graph: GraphData) -> Self {
        Self {
            graph,
            params: RunParams::default(),
            result_tx: None,
        }
    }

    /// Attach a completion channel; returns the receiving half
    pub fn with_result_channel(mut self) -> (Self, oneshot::Receiver<RunResult>) {
        let (tx, rx) = oneshot::channel();
        self.result_tx = Some(tx);
        (self, rx)
    }
}

/// Producer handle to the background worker
pub struct BackgroundQueue {
    tx: mpsc::UnboundedSender<ExecutionJob>,
    worker: JoinHandle<()>,
}

impl BackgroundQueue {
    /// Start the worker over the given service
    pub fn start(service: Arc<ExecutionService>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<ExecutionJob>();
        let worker = tokio::spawn(async move {
            info!("background execution worker started");
            while let Some(job) = rx.recv().await {
                debug!(nodes = job.graph.nodes.len(), "worker picked up job");
                let result = service.execute(&job.graph, job.params).await;
                if let Some(result_tx) = job.result_tx {
                    let _ = result_tx.send(result);
                }
            }
            info!("background execution worker stopped");
        });
        Self { tx, worker }
    }

    /// Enqueue a job; never blocks
    ///
    /// Returns the job back when the worker has already shut down.
    pub fn enqueue(&self, job: ExecutionJob) -> std::result::Result<(), ExecutionJob> {
        self.tx.send(job).map_err(|rejected| rejected.0)
    }

    /// Close the queue and wait for queued jobs to finish
    pub async fn shutdown(self) {
        drop(self.tx);
        let _ = self.worker.await;
    }
}
