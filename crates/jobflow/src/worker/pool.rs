use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, error, info, warn};

use crate::broadcast::RunProgressBroadcaster;
use crate::error::WorkerError;
use crate::graph::{BroadcastProgress, NoopProgress, ProgressReporter};
use crate::worker::job::{RunInput, RunReport, RunRequest};
use crate::workflows::Workflows;

const RECV_TIMEOUT: Duration = Duration::from_millis(100);

pub struct WorkerPool {
    run_sender: Sender<RunRequest>,
    report_receiver: Receiver<RunReport>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    pub fn new(workflows: Arc<Workflows>, worker_count: usize) -> Result<Self, WorkerError> {
        Self::with_progress(workflows, worker_count, None)
    }

    /// Creates a pool whose runs also publish progress on `progress`.
    pub fn with_progress(
        workflows: Arc<Workflows>,
        worker_count: usize,
        progress: Option<RunProgressBroadcaster>,
    ) -> Result<Self, WorkerError> {
        if worker_count == 0 {
            return Err(WorkerError::SpawnFailed(
                "worker count must be at least 1".to_string(),
            ));
        }
        let (run_sender, run_receiver) = bounded::<RunRequest>(worker_count * 2);
        let (report_sender, report_receiver) = bounded::<RunReport>(worker_count * 2);
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(worker_count);

        for worker_id in 0..worker_count {
            let run_rx = run_receiver.clone();
            let report_tx = report_sender.clone();
            let shutdown_flag = Arc::clone(&shutdown);
            let worker_workflows = Arc::clone(&workflows);
            let worker_progress = progress.clone();

            let handle = thread::Builder::new()
                .name(format!("jobflow-worker-{}", worker_id))
                .spawn(move || {
                    run_worker(
                        worker_id,
                        run_rx,
                        report_tx,
                        shutdown_flag,
                        worker_workflows,
                        worker_progress,
                    );
                })
                .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;

            workers.push(handle);
        }

        info!("Started {} workers", worker_count);

        Ok(Self {
            run_sender,
            report_receiver,
            workers,
            shutdown,
        })
    }

    /// Queues a run. Blocks while the queue is full.
    pub fn submit(&self, request: RunRequest) -> Result<(), WorkerError> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(WorkerError::ChannelClosed);
        }

        self.run_sender
            .send(request)
            .map_err(|_| WorkerError::ChannelClosed)
    }

    pub fn try_recv_report(&self) -> Option<RunReport> {
        self.report_receiver.try_recv().ok()
    }

    pub fn recv_report(&self) -> Option<RunReport> {
        self.report_receiver.recv().ok()
    }

    /// A handle on the report channel for a dedicated collector thread.
    pub fn reports(&self) -> Receiver<RunReport> {
        self.report_receiver.clone()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Asks workers to stop after their current run. Queued runs are dropped.
    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Closes the queue and joins every worker. Without a prior
    /// [`shutdown`](Self::shutdown), queued runs are drained first.
    pub fn wait(self) {
        drop(self.run_sender);

        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All workers have stopped");
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

fn run_worker(
    worker_id: usize,
    run_receiver: Receiver<RunRequest>,
    report_sender: Sender<RunReport>,
    shutdown: Arc<AtomicBool>,
    workflows: Arc<Workflows>,
    progress: Option<RunProgressBroadcaster>,
) {
    debug!("Worker {} started", worker_id);

    loop {
        if shutdown.load(Ordering::Relaxed) {
            debug!("Worker {} received shutdown signal", worker_id);
            break;
        }

        match run_receiver.recv_timeout(RECV_TIMEOUT) {
            Ok(request) => {
                debug!(
                    "Worker {} running {} for job {}",
                    worker_id,
                    request.kind(),
                    request.job_id
                );

                let report = match progress {
                    Some(ref broadcaster) => {
                        let tracker = broadcaster.start_run(
                            &request.run_id,
                            &request.job_id,
                            request.kind().as_str(),
                        );
                        execute(&workflows, request, &BroadcastProgress::new(tracker))
                    }
                    None => execute(&workflows, request, &NoopProgress),
                };

                if let Err(e) = report_sender.send(report) {
                    error!("Worker {} failed to send report: {}", worker_id, e);
                    break;
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                continue;
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                debug!("Worker {} run channel disconnected", worker_id);
                break;
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}

/// Runs one request to completion on the matching graph.
fn execute(
    workflows: &Workflows,
    request: RunRequest,
    progress: &dyn ProgressReporter,
) -> RunReport {
    let run_id = request.run_id.clone();
    let outcome = match request.input.clone() {
        RunInput::Preparation(state) => workflows
            .preparation
            .invoke(&run_id, state, progress)
            .map(|s| RunReport::from_preparation(&run_id, &s)),
        RunInput::Retry(state) => workflows
            .retry
            .invoke(&run_id, state, progress)
            .map(|s| RunReport::from_retry(&run_id, &s)),
        RunInput::Application(state) => workflows
            .application
            .invoke(&run_id, state, progress)
            .map(|s| RunReport::from_application(&run_id, &s)),
    };

    outcome.unwrap_or_else(|e| {
        warn!("Run {} for job {} aborted: {}", run_id, request.job_id, e);
        RunReport::aborted(&request, e.to_string())
    })
}
