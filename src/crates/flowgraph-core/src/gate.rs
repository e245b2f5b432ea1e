//! Pause / resume / single-step checkpoint
//!
//! The gate is checked exactly once before each trigger dispatch and before
//! each initiator dispatch. While `Paused` every dispatch parks at the gate;
//! `step_once` lets exactly one waiter through and drops back to `Paused`,
//! which is what drives step-through debugging in an editor.
//!
//! `wait` observes the run's cancellation token, so a paused run still
//! unwinds promptly when cancelled.

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::{EngineError, Result};

/// Gate state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// Dispatches pass freely
    Running,
    /// Dispatches park at the gate
    Paused,
    /// The next dispatch passes, then the gate pauses again
    Stepping,
}

/// Shared execution checkpoint
#[derive(Debug)]
pub struct ExecutionGate {
    state: watch::Sender<GateState>,
}

impl Default for ExecutionGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionGate {
    /// Create a gate in the `Running` state
    pub fn new() -> Self {
        let (state, _) = watch::channel(GateState::Running);
        Self { state }
    }

    /// Current state
    pub fn state(&self) -> GateState {
        *self.state.borrow()
    }

    /// Open the gate
    pub fn run(&self) {
        self.state.send_replace(GateState::Running);
    }

    /// Park subsequent dispatches
    pub fn pause(&self) {
        self.state.send_replace(GateState::Paused);
    }

    /// Let exactly one dispatch through, then pause again
    pub fn step_once(&self) {
        self.state.send_replace(GateState::Stepping);
    }

    /// Alias of [`run`](Self::run), matching debugger vocabulary
    pub fn resume(&self) {
        self.run();
    }

    /// Block until the gate permits a dispatch
    ///
    /// Returns [`EngineError::Cancelled`] immediately once the token trips,
    /// whether parked or not. In `Stepping`, the consuming transition back to
    /// `Paused` is atomic, so concurrent waiters release one at a time.
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<()> {
        let mut rx = self.state.subscribe();
        loop {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }

            let mut passed = false;
            self.state.send_if_modified(|state| match *state {
                GateState::Running => {
                    passed = true;
                    false
                }
                GateState::Stepping => {
                    passed = true;
                    *state = GateState::Paused;
                    true
                }
                GateState::Paused => false,
            });
            if passed {
                return Ok(());
            }

            tokio::select! {
                changed = rx.changed() => {
                    if changed.is_err() {
                        // Sender dropped; nothing will ever open the gate.
                        return Err(EngineError::Cancelled);
                    }
                }
                _ = cancel.cancelled() => return Err(EngineError::Cancelled),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_running_gate_passes_immediately() {
        let gate = ExecutionGate::new();
        let cancel = CancellationToken::new();
        gate.wait(&cancel).await.unwrap();
        assert_eq!(gate.state(), GateState::Running);
    }

    #[tokio::test]
    async fn test_paused_gate_blocks_until_resume() {
        let gate = Arc::new(ExecutionGate::new());
        gate.pause();

        let cancel = CancellationToken::new();
        let waiter = {
            let gate = gate.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { gate.wait(&cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        gate.resume();
        waiter.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_step_once_releases_single_waiter() {
        let gate = Arc::new(ExecutionGate::new());
        gate.pause();

        let cancel = CancellationToken::new();
        let first = {
            let (gate, cancel) = (gate.clone(), cancel.clone());
            tokio::spawn(async move { gate.wait(&cancel).await })
        };
        let second = {
            let (gate, cancel) = (gate.clone(), cancel.clone());
            tokio::spawn(async move { gate.wait(&cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        gate.step_once();
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Exactly one waiter got through; the gate is paused again.
        assert_eq!(gate.state(), GateState::Paused);
        let finished = first.is_finished() as usize + second.is_finished() as usize;
        assert_eq!(finished, 1);

        gate.resume();
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_wait_returns_cancelled() {
        let gate = ExecutionGate::new();
        gate.pause();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = gate.wait(&cancel).await.unwrap_err();
        assert!(matches!(err, EngineError::Cancelled));
    }

    #[tokio::test]
    async fn test_cancel_releases_parked_waiter() {
        let gate = Arc::new(ExecutionGate::new());
        gate.pause();

        let cancel = CancellationToken::new();
        let waiter = {
            let (gate, cancel) = (gate.clone(), cancel.clone());
            tokio::spawn(async move { gate.wait(&cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        cancel.cancel();
        assert!(matches!(
            waiter.await.unwrap().unwrap_err(),
            EngineError::Cancelled
        ));
    }
}
