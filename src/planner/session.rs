//! One cancellable optimization attempt
//!
//! The optimizer runs on the calling thread while a watchdog thread polls
//! the elapsed time. On expiry the watchdog requests a cooperative stop;
//! it is always shut down and joined before the result is inspected.
//!
//! The time budget is advisory: an optimizer that never checks its cancel
//! flag runs to completion.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info};

use crate::common::{
    ErrorCategory, JointConfiguration, Optimizer, PlanningError, PlanningResult, TrajectoryMatrix,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Succeeded | SessionState::Failed | SessionState::Cancelled)
    }
}

/// What the optimizer starts from; exactly one per session
#[derive(Debug, Clone, PartialEq)]
pub enum OptimizerInput {
    Seed(TrajectoryMatrix),
    Endpoints {
        start: JointConfiguration,
        goal: JointConfiguration,
    },
}

pub struct CancellablePlanningSession {
    optimizer: Arc<dyn Optimizer>,
    poll_interval: Duration,
    state: Mutex<SessionState>,
    cancel_requested: AtomicBool,
}

impl CancellablePlanningSession {
    pub fn new(optimizer: Arc<dyn Optimizer>, poll_interval: Duration) -> Self {
        CancellablePlanningSession {
            optimizer,
            poll_interval,
            state: Mutex::new(SessionState::Idle),
            cancel_requested: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }

    /// Run the optimizer under the watchdog. A session runs once.
    pub fn run(&self, input: &OptimizerInput, budget: Duration) -> PlanningResult<TrajectoryMatrix> {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if *state != SessionState::Idle {
                return Err(PlanningError::SessionReused);
            }
            *state = SessionState::Running;
        }

        let started = Instant::now();
        let result = thread::scope(|scope| {
            let (stop_tx, stop_rx) = mpsc::channel::<()>();
            let watchdog = scope.spawn(move || self.watch(started, budget, stop_rx));

            let result = match input {
                OptimizerInput::Seed(seed) => self.optimizer.solve_seeded(seed),
                OptimizerInput::Endpoints { start, goal } => self.optimizer.solve(start, goal),
            };

            drop(stop_tx);
            if watchdog.join().is_err() {
                error!("planning watchdog panicked");
            }
            result
        });
        let elapsed = started.elapsed();

        let (next, outcome) = match result {
            Ok(parameters) => {
                if self.cancel_requested() {
                    info!(?elapsed, "accepting best-effort result after cancellation");
                }
                (SessionState::Succeeded, Ok(parameters))
            }
            Err(e) if self.cancel_requested() => {
                debug!(error = %e, "optimizer stopped after cancellation");
                (SessionState::Cancelled, Err(PlanningError::Cancelled { elapsed }))
            }
            Err(e) if e.category() == ErrorCategory::Optimization => (SessionState::Failed, Err(e)),
            Err(e) => (SessionState::Failed, Err(PlanningError::OptimizationFailed(e.to_string()))),
        };

        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = next;
        outcome
    }

    /// Request a cooperative stop.
    ///
    /// A no-op success unless the session is running; otherwise false when
    /// the optimizer could not take the request.
    pub fn cancel(&self) -> bool {
        match self.state() {
            SessionState::Running => self.request_stop(),
            _ => true,
        }
    }

    fn request_stop(&self) -> bool {
        self.cancel_requested.store(true, Ordering::SeqCst);
        let acknowledged = self.optimizer.cancel();
        if !acknowledged {
            error!("failed to interrupt the optimizer");
        }
        acknowledged
    }

    fn watch(&self, started: Instant, budget: Duration, stop: Receiver<()>) {
        loop {
            match stop.recv_timeout(self.poll_interval) {
                Err(RecvTimeoutError::Timeout) => {
                    if started.elapsed() > budget {
                        error!(?budget, "exceeded allowed planning time, terminating");
                        self.request_stop();
                        return;
                    }
                }
                // sender dropped: the optimizer has returned
                Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
            }
        }
    }
}
