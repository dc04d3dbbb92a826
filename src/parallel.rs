//! Parallel MCTS sampling.
//!
//! The coordinator hands MCTS sub-searches to a pool of worker threads. A
//! finished sub-search returns its samples and its under-explored nodes;
//! the nodes go into a [`CandidateList`] and are searched further by later
//! tasks, spreading the work over all phases of the game.
//!
//! All communication is message passing over crossbeam channels:
//!
//! ```text
//! coordinator --assign--> workers       (bounded, one slot per worker)
//! coordinator --quit----> workers
//! workers ----gather----> coordinator   (reports of finished tasks)
//! workers ----events----> coordinator   (failures, termination acks)
//! ```

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, never, select, unbounded, Receiver, Sender};
use log::{debug, info, warn};

use crate::candidates::CandidateList;
use crate::constants::{SAMPLE_THRESHOLD, TIME_BUDGET_MS, WORKERS};
use crate::error::HexError;
use crate::features::Sample;
use crate::mcts::{Mcts, MctsConfig, MctsNode, MctsNodeValue};
use crate::patterns::{Catalogue, PatternEvaluator};

#[derive(Clone, Debug, PartialEq)]
pub struct CoordinatorConfig {
    pub workers: usize,
    /// Wall-clock budget of one sub-search.
    pub time_budget: Duration,
    /// Visits a node needs to be sampled rather than queued as a candidate.
    pub sample_threshold: u32,
    /// Stop assigning new work after this many tasks.
    pub max_tasks: Option<usize>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            workers: WORKERS,
            time_budget: Duration::from_millis(TIME_BUDGET_MS),
            sample_threshold: SAMPLE_THRESHOLD,
            max_tasks: None,
        }
    }
}

struct Task {
    id: usize,
    search: Mcts,
}

/// What a worker sends back for each finished task.
pub struct WorkerReport {
    pub worker: usize,
    pub task: usize,
    pub iterations: u64,
    /// Root statistics of the finished sub-search.
    pub root: MctsNodeValue,
    /// Nodes in the finished sub-tree.
    pub nodes: usize,
    pub samples: Vec<Sample>,
    pub candidates: Vec<MctsNode>,
}

pub enum WorkerEvent {
    Failed { worker: usize, error: HexError },
    Terminated { worker: usize },
}

/// A finished sub-search, without its tree.
#[derive(Clone, Debug)]
pub struct FinishedTask {
    pub worker: usize,
    pub task: usize,
    pub iterations: u64,
    pub root: MctsNodeValue,
    pub nodes: usize,
}

/// Everything a run produced.
#[derive(Clone, Debug, Default)]
pub struct RunSummary {
    pub tasks_assigned: usize,
    pub tasks_finished: usize,
    pub iterations: u64,
    pub samples: Vec<Sample>,
    pub finished: Vec<FinishedTask>,
    /// Whether the run ended on an external stop signal.
    pub stopped: bool,
    /// Candidates left unexplored.
    pub remaining: usize,
}

impl RunSummary {
    fn absorb(&mut self, report: WorkerReport) -> Vec<MctsNode> {
        self.tasks_finished += 1;
        self.iterations += report.iterations;
        self.samples.extend(report.samples);
        self.finished.push(FinishedTask {
            worker: report.worker,
            task: report.task,
            iterations: report.iterations,
            root: report.root,
            nodes: report.nodes,
        });
        report.candidates
    }
}

pub struct Coordinator {
    config: CoordinatorConfig,
    catalogue: Arc<Catalogue>,
}

impl Coordinator {
    pub fn new(config: CoordinatorConfig, catalogue: Arc<Catalogue>) -> Self {
        Self { config, catalogue }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Run `initial` and then its continuations until the candidates run
    /// out, `max_tasks` is reached or `stop` fires. Work in progress is
    /// always finished and kept.
    pub fn run(&self, initial: Mcts, stop: Receiver<()>) -> Result<RunSummary, HexError> {
        let workers = self.config.workers.max(1);
        let mcts_config = initial.config().clone();
        let board_size = initial.root().value.board.size();

        let (assign_tx, assign_rx) = bounded::<Task>(workers);
        let (quit_tx, quit_rx) = bounded::<()>(workers);
        let (gather_tx, gather_rx) = unbounded::<WorkerReport>();
        let (event_tx, event_rx) = unbounded::<WorkerEvent>();

        let handles: Vec<JoinHandle<()>> = (0..workers)
            .map(|id| {
                let channels = WorkerChannels {
                    assign: assign_rx.clone(),
                    quit: quit_rx.clone(),
                    gather: gather_tx.clone(),
                    events: event_tx.clone(),
                };
                let catalogue = Arc::clone(&self.catalogue);
                let budget = self.config.time_budget;
                let threshold = self.config.sample_threshold;
                thread::spawn(move || worker_loop(id, budget, threshold, catalogue, channels))
            })
            .collect();
        drop((gather_tx, event_tx));

        info!(
            "sampling on {board_size}x{board_size} with {workers} workers, {:?} per task",
            self.config.time_budget
        );

        let mut summary = RunSummary::default();
        let mut candidates = CandidateList::new(board_size);
        let idle = never::<()>();
        let mut stop_open = true;

        // The queue has a free slot for every worker, so this never blocks.
        assign_tx
            .send(Task { id: 0, search: initial })
            .map_err(|_| HexError::WorkersGone)?;
        summary.tasks_assigned = 1;

        let outcome = 'run: loop {
            let stop_rx = if stop_open { &stop } else { &idle };
            select! {
                recv(stop_rx) -> msg => match msg {
                    Ok(()) => {
                        if !summary.stopped {
                            info!("stop requested, finishing {} running tasks",
                                summary.tasks_assigned - summary.tasks_finished);
                        }
                        summary.stopped = true;
                    }
                    // Nobody can stop us any more.
                    Err(_) => stop_open = false,
                },
                recv(gather_rx) -> msg => {
                    let Ok(report) = msg else {
                        break 'run Err(HexError::WorkersGone);
                    };
                    debug!(
                        "worker {} finished task {}: {} iterations, {} samples, {} candidates",
                        report.worker, report.task, report.iterations,
                        report.samples.len(), report.candidates.len()
                    );
                    candidates.add(summary.absorb(report));
                    if !summary.stopped {
                        self.fill_slots(&assign_tx, &mut candidates, &mut summary, &mcts_config, workers);
                    }
                    debug!("candidates:\n{candidates}");
                },
                recv(event_rx) -> msg => match msg {
                    Ok(WorkerEvent::Failed { worker, error }) => {
                        warn!("worker {worker} failed: {error}");
                        break 'run Err(HexError::WorkerFailed { worker, reason: error.to_string() });
                    }
                    Ok(WorkerEvent::Terminated { worker }) => {
                        break 'run Err(HexError::WorkerFailed { worker, reason: "terminated early".into() });
                    }
                    Err(_) => break 'run Err(HexError::WorkersGone),
                },
            }

            let all_done = summary.tasks_assigned == summary.tasks_finished;
            let limit_hit = self.config.max_tasks.is_some_and(|m| summary.tasks_assigned >= m);
            if all_done && (candidates.is_empty() || summary.stopped || limit_hit) {
                break 'run Ok(());
            }
        };

        // Unstarted work is dropped before the workers are told to quit.
        while assign_rx.try_recv().is_ok() {}
        shut_down(workers, &quit_tx, &event_rx, handles);

        summary.remaining = candidates.len();
        outcome?;
        info!(
            "finished {} tasks, {} iterations, {} samples, {} candidates left",
            summary.tasks_finished,
            summary.iterations,
            summary.samples.len(),
            summary.remaining
        );
        Ok(summary)
    }

    /// Queue candidates while the assignment channel has free slots.
    fn fill_slots(
        &self,
        assign: &Sender<Task>,
        candidates: &mut CandidateList,
        summary: &mut RunSummary,
        mcts_config: &MctsConfig,
        workers: usize,
    ) {
        while assign.len() < workers {
            if self.config.max_tasks.is_some_and(|m| summary.tasks_assigned >= m) {
                break;
            }
            let Some(node) = candidates.next_candidate() else {
                break;
            };
            let task = Task {
                id: summary.tasks_assigned,
                search: Mcts::from_node(node, mcts_config.clone()),
            };
            if assign.try_send(task).is_err() {
                break;
            }
            summary.tasks_assigned += 1;
        }
    }
}

/// Tell every worker to quit and wait until each has acknowledged.
fn shut_down(workers: usize, quit: &Sender<()>, events: &Receiver<WorkerEvent>, handles: Vec<JoinHandle<()>>) {
    for _ in 0..workers {
        // Capacity equals the worker count.
        let _ = quit.try_send(());
    }
    let mut acknowledged = 0;
    while acknowledged < workers {
        match events.recv() {
            Ok(WorkerEvent::Terminated { worker }) => {
                debug!("worker {worker} terminated");
                acknowledged += 1;
            }
            Ok(WorkerEvent::Failed { worker, error }) => warn!("worker {worker} failed while stopping: {error}"),
            Err(_) => break,
        }
    }
    for handle in handles {
        if handle.join().is_err() {
            warn!("a worker thread panicked");
        }
    }
}

struct WorkerChannels {
    assign: Receiver<Task>,
    quit: Receiver<()>,
    gather: Sender<WorkerReport>,
    events: Sender<WorkerEvent>,
}

fn worker_loop(id: usize, budget: Duration, threshold: u32, catalogue: Arc<Catalogue>, channels: WorkerChannels) {
    let mut evaluator = PatternEvaluator::spawn(catalogue);
    'work: loop {
        select! {
            recv(channels.assign) -> task => {
                let Ok(task) = task else { break 'work };
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    run_task(id, task, budget, threshold, &mut evaluator)
                }));
                match outcome {
                    Ok(Ok(report)) => {
                        if channels.gather.send(report).is_err() {
                            break 'work;
                        }
                    }
                    Ok(Err(error)) => {
                        let _ = channels.events.send(WorkerEvent::Failed { worker: id, error });
                    }
                    // The evaluator may hold an unanswered request; take no more work.
                    Err(payload) => {
                        let error = HexError::Panicked(panic_message(payload.as_ref()));
                        let _ = channels.events.send(WorkerEvent::Failed { worker: id, error });
                        break 'work;
                    }
                }
            },
            recv(channels.quit) -> _ => break 'work,
        }
    }
    evaluator.shutdown();
    let _ = channels.events.send(WorkerEvent::Terminated { worker: id });
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        text.to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn run_task(
    worker: usize,
    mut task: Task,
    budget: Duration,
    threshold: u32,
    evaluator: &mut PatternEvaluator,
) -> Result<WorkerReport, HexError> {
    debug!("worker {worker} starts task {} from\n{}", task.id, task.search.root().value.board);
    let iterations = task.search.run_for(budget);
    let harvest = task.search.harvest(threshold, evaluator)?;
    let root = task.search.root();
    Ok(WorkerReport {
        worker,
        task: task.id,
        iterations,
        root: root.value.clone(),
        nodes: root.size(),
        samples: harvest.samples,
        candidates: harvest.candidates,
    })
}
