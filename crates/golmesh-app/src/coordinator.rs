//! Authoritative run state for the broker and the distributed turn loop.
//!
//! The coordinator owns the committed world, the turn counter and the alive
//! count behind one mutex. A single blocking turn loop per run publishes each
//! generation atomically; control operations only flip flags under the same
//! lock and wake the loop through a condvar.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

use golmesh_core::{
    PartitionError, RowRange, SliceError, SliceRequest, Turn, World, assemble, plan_partitions,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::workers::{SliceWorker, WorkerCallError, WorkerPool};

/// Lifecycle of the broker's single run slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running,
    Paused,
    Ended,
    Quitting,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Ended => "ended",
            Self::Quitting => "quitting",
        };
        f.write_str(label)
    }
}

/// Why a turn loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Completed,
    Ended,
    Quit,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Completed => "completed",
            Self::Ended => "ended",
            Self::Quit => "quit",
        };
        f.write_str(label)
    }
}

/// Coordinator tunables.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Workers to terminate on quit when no run has recorded a count.
    pub default_workers: usize,
    /// Bound on each worker's terminate acknowledgement.
    pub terminate_timeout: Duration,
    /// Upper bound on dispatch threads per run. Partitions beyond it queue for a thread.
    pub max_dispatch_threads: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            default_workers: 4,
            terminate_timeout: Duration::from_millis(400),
            max_dispatch_threads: 64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartRequest {
    pub world: World,
    pub turns: u64,
    pub workers: usize,
}

/// Final generation of a run and why it stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub world: Arc<World>,
    pub turn: Turn,
    pub alive: usize,
    pub reason: StopReason,
}

/// Committed state at the moment End or Quit was serviced. `world` is absent
/// when no run has ever started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub world: Option<Arc<World>>,
    pub turn: Turn,
    pub alive: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliveReport {
    pub alive: usize,
    pub turn: Turn,
}

/// Last committed world; `world` is absent before the first run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldReport {
    pub world: Option<Arc<World>>,
    pub turn: Turn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseOutcome {
    /// Turn that executes once the loop is running again.
    pub next_turn: Turn,
    pub paused: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub state: RunState,
    pub turn: Turn,
    pub alive: usize,
    pub budget: u64,
    pub workers: usize,
    pub width: Option<usize>,
    pub height: Option<usize>,
    pub last_error: Option<String>,
}

/// Errors returned by coordinator operations.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("invalid run configuration: {0}")]
    Partition(#[from] PartitionError),
    #[error("a run is still active ({state}); end it before starting another")]
    Busy { state: RunState },
    #[error("cannot {operation} while {state}")]
    InvalidTransition {
        operation: &'static str,
        state: RunState,
    },
    #[error("no run has been started")]
    NotStarted,
    #[error("broker is shutting down")]
    ShuttingDown,
    #[error("failed to connect workers: {0}")]
    Connect(#[source] WorkerCallError),
    #[error("worker {partition} is unreachable: {source}")]
    Unreachable {
        partition: usize,
        #[source]
        source: WorkerCallError,
    },
    #[error("worker {partition} failed on turn {turn}: {source}")]
    Worker {
        partition: usize,
        turn: Turn,
        #[source]
        source: WorkerCallError,
    },
    #[error("worker {partition} returned rows {actual} on turn {turn}, expected {expected}")]
    WrongRows {
        partition: usize,
        turn: Turn,
        expected: RowRange,
        actual: RowRange,
    },
    #[error("failed to merge slices for turn {turn}: {source}")]
    Assemble {
        turn: Turn,
        #[source]
        source: SliceError,
    },
    #[error("failed to build dispatch pool: {0}")]
    Dispatch(String),
    #[error("failed to lock coordinator state")]
    Lock,
}

#[derive(Debug)]
struct RunControl {
    state: RunState,
    world: Option<Arc<World>>,
    turn: Turn,
    alive: usize,
    budget: u64,
    workers: usize,
    end_requested: bool,
    quit_requested: bool,
    loop_active: bool,
    quit_complete: bool,
    last_error: Option<String>,
}

impl RunControl {
    fn new() -> Self {
        Self {
            state: RunState::Idle,
            world: None,
            turn: Turn::zero(),
            alive: 0,
            budget: 0,
            workers: 0,
            end_requested: false,
            quit_requested: false,
            loop_active: false,
            quit_complete: false,
            last_error: None,
        }
    }

    fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            world: self.world.clone(),
            turn: self.turn,
            alive: self.alive,
        }
    }
}

/// Drives runs across a [`WorkerPool`] and answers control queries.
pub struct Coordinator {
    control: Mutex<RunControl>,
    changed: Condvar,
    pool: Arc<dyn WorkerPool>,
    config: CoordinatorConfig,
}

impl fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coordinator")
            .field("control", &self.control)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Coordinator {
    pub fn new(pool: Arc<dyn WorkerPool>, config: CoordinatorConfig) -> Self {
        Self {
            control: Mutex::new(RunControl::new()),
            changed: Condvar::new(),
            pool,
            config,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, RunControl>, CoordinatorError> {
        self.control.lock().map_err(|_| CoordinatorError::Lock)
    }

    fn wait<'a>(
        &self,
        guard: MutexGuard<'a, RunControl>,
    ) -> Result<MutexGuard<'a, RunControl>, CoordinatorError> {
        self.changed.wait(guard).map_err(|_| CoordinatorError::Lock)
    }

    /// Run `request.turns` generations and block until the loop stops.
    pub fn start(&self, request: StartRequest) -> Result<RunOutcome, CoordinatorError> {
        let StartRequest {
            world,
            turns,
            workers,
        } = request;
        let plan = plan_partitions(world.height(), workers)?;
        let (width, height) = (world.width(), world.height());

        {
            let mut control = self.lock()?;
            if control.state == RunState::Quitting {
                return Err(CoordinatorError::ShuttingDown);
            }
            if control.loop_active
                || matches!(control.state, RunState::Running | RunState::Paused)
            {
                warn!(state = %control.state, "start rejected; run still active");
                return Err(CoordinatorError::Busy {
                    state: control.state,
                });
            }
            control.alive = world.alive_count();
            control.world = Some(Arc::new(world));
            control.turn = Turn::zero();
            control.budget = turns;
            control.workers = workers;
            control.end_requested = false;
            control.loop_active = true;
            control.last_error = None;
            control.state = RunState::Running;
            self.changed.notify_all();
        }
        info!(width, height, turns, workers, "run started");

        let result = self
            .connect_workers(workers)
            .and_then(|handles| self.run_turns(&handles, &plan));
        self.finish_run(result)
    }

    fn connect_workers(&self, count: usize) -> Result<Vec<Box<dyn SliceWorker>>, CoordinatorError> {
        let handles = self
            .pool
            .connect(count)
            .map_err(CoordinatorError::Connect)?;
        for (partition, worker) in handles.iter().enumerate() {
            worker.probe().map_err(|source| {
                error!(partition, endpoint = worker.endpoint(), %source, "worker unreachable");
                CoordinatorError::Unreachable { partition, source }
            })?;
        }
        debug!(workers = handles.len(), "workers connected");
        Ok(handles)
    }

    fn run_turns(
        &self,
        workers: &[Box<dyn SliceWorker>],
        plan: &[RowRange],
    ) -> Result<StopReason, CoordinatorError> {
        // One dispatch thread per partition, up to the configured bound.
        let threads = workers
            .len()
            .min(self.config.max_dispatch_threads)
            .max(1);
        let dispatch = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|index| format!("golmesh-dispatch-{index}"))
            .build()
            .map_err(|err| CoordinatorError::Dispatch(err.to_string()))?;

        loop {
            let (world, turn) = {
                let mut control = self.lock()?;
                loop {
                    if control.quit_requested {
                        return Ok(StopReason::Quit);
                    }
                    if control.end_requested {
                        control.end_requested = false;
                        return Ok(StopReason::Ended);
                    }
                    if control.turn.0 >= control.budget {
                        return Ok(StopReason::Completed);
                    }
                    if control.state != RunState::Paused {
                        break;
                    }
                    debug!(turn = control.turn.0, "turn loop paused");
                    control = self.wait(control)?;
                }
                let world = control.world.clone().ok_or(CoordinatorError::NotStarted)?;
                (world, control.turn.next())
            };

            let (next, alive) = dispatch.install(|| Self::advance(workers, plan, &world, turn))?;

            let mut control = self.lock()?;
            control.world = Some(Arc::new(next));
            control.alive = alive;
            control.turn = turn;
            self.changed.notify_all();
            debug!(turn = turn.0, alive, "turn committed");
        }
    }

    fn advance(
        workers: &[Box<dyn SliceWorker>],
        plan: &[RowRange],
        world: &Arc<World>,
        turn: Turn,
    ) -> Result<(World, usize), CoordinatorError> {
        let slices = plan
            .par_iter()
            .zip(workers.par_iter())
            .enumerate()
            .map(|(partition, (rows, worker))| {
                let request = SliceRequest::new(turn, *rows, Arc::clone(world));
                let slice = worker.compute_slice(&request).map_err(|source| {
                    error!(
                        partition,
                        endpoint = worker.endpoint(),
                        turn = turn.0,
                        %rows,
                        %source,
                        "worker call failed"
                    );
                    CoordinatorError::Worker {
                        partition,
                        turn,
                        source,
                    }
                })?;
                if slice.rows != *rows {
                    return Err(CoordinatorError::WrongRows {
                        partition,
                        turn,
                        expected: *rows,
                        actual: slice.rows,
                    });
                }
                Ok(slice)
            })
            .collect::<Result<Vec<_>, _>>()?;
        assemble(world.width(), world.height(), slices)
            .map_err(|source| CoordinatorError::Assemble { turn, source })
    }

    fn finish_run(
        &self,
        result: Result<StopReason, CoordinatorError>,
    ) -> Result<RunOutcome, CoordinatorError> {
        let mut control = self.lock()?;
        control.loop_active = false;
        if control.state != RunState::Quitting {
            control.state = RunState::Ended;
        }
        if let Err(err) = &result {
            control.last_error = Some(err.to_string());
        }
        let (turn, alive) = (control.turn, control.alive);
        let world = control.world.clone();
        self.changed.notify_all();
        drop(control);

        match result {
            Ok(reason) => {
                info!(turn = turn.0, alive, %reason, "run finished");
                Ok(RunOutcome {
                    world: world.ok_or(CoordinatorError::NotStarted)?,
                    turn,
                    alive,
                    reason,
                })
            }
            Err(err) => {
                error!(turn = turn.0, %err, "run aborted");
                Err(err)
            }
        }
    }

    /// Toggle between Running and Paused.
    pub fn pause_or_resume(&self) -> Result<PauseOutcome, CoordinatorError> {
        let mut control = self.lock()?;
        let paused = match control.state {
            RunState::Running => {
                control.state = RunState::Paused;
                true
            }
            RunState::Paused => {
                control.state = RunState::Running;
                self.changed.notify_all();
                false
            }
            state => {
                warn!(%state, "pause rejected");
                return Err(CoordinatorError::InvalidTransition {
                    operation: "pause or resume",
                    state,
                });
            }
        };
        let next_turn = control.turn.next();
        info!(paused, next_turn = next_turn.0, "pause toggled");
        Ok(PauseOutcome { next_turn, paused })
    }

    /// Stop the active run after its in-flight generation. A no-op outside a run.
    pub fn end(&self) -> Result<RunSnapshot, CoordinatorError> {
        let mut control = self.lock()?;
        let snapshot = control.snapshot();
        if matches!(control.state, RunState::Running | RunState::Paused) {
            control.end_requested = true;
            control.state = RunState::Ended;
            self.changed.notify_all();
            info!(turn = snapshot.turn.0, alive = snapshot.alive, "end requested");
        } else {
            debug!(state = %control.state, "end requested with no active run");
        }
        Ok(snapshot)
    }

    /// Alive count of the last committed generation; zero before the first run.
    pub fn alive(&self) -> Result<AliveReport, CoordinatorError> {
        let control = self.lock()?;
        Ok(AliveReport {
            alive: control.alive,
            turn: control.turn,
        })
    }

    pub fn world(&self) -> Result<WorldReport, CoordinatorError> {
        let control = self.lock()?;
        Ok(WorldReport {
            world: control.world.clone(),
            turn: control.turn,
        })
    }

    pub fn status(&self) -> Result<StatusReport, CoordinatorError> {
        let control = self.lock()?;
        Ok(StatusReport {
            state: control.state,
            turn: control.turn,
            alive: control.alive,
            budget: control.budget,
            workers: control.workers,
            width: control.world.as_ref().map(|world| world.width()),
            height: control.world.as_ref().map(|world| world.height()),
            last_error: control.last_error.clone(),
        })
    }

    /// Drain the turn loop, terminate every worker and return the final state.
    pub fn quit(&self) -> Result<RunSnapshot, CoordinatorError> {
        let mut control = self.lock()?;
        if control.state == RunState::Quitting {
            while !control.quit_complete {
                control = self.wait(control)?;
            }
            return Ok(control.snapshot());
        }

        control.state = RunState::Quitting;
        control.quit_requested = true;
        self.changed.notify_all();
        info!(turn = control.turn.0, "quit requested");

        while control.loop_active {
            control = self.wait(control)?;
        }
        let snapshot = control.snapshot();
        let workers = if control.workers > 0 {
            control.workers
        } else {
            self.config.default_workers
        };
        drop(control);

        self.terminate_workers(workers);

        let mut control = self.lock()?;
        control.quit_complete = true;
        self.changed.notify_all();
        info!(turn = snapshot.turn.0, alive = snapshot.alive, "broker quit");
        Ok(snapshot)
    }

    fn terminate_workers(&self, count: usize) {
        let handles = match self.pool.connect(count) {
            Ok(handles) => handles,
            Err(err) => {
                warn!(%err, workers = count, "could not reach workers to terminate them");
                return;
            }
        };
        let timeout = self.config.terminate_timeout;
        handles
            .par_iter()
            .enumerate()
            .for_each(|(partition, worker)| match worker.terminate(timeout) {
                Ok(()) => info!(partition, endpoint = worker.endpoint(), "worker terminated"),
                Err(err) => warn!(
                    partition,
                    endpoint = worker.endpoint(),
                    %err,
                    "worker terminate failed"
                ),
            });
    }
}
