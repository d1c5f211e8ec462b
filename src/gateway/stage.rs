use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Where a single dispatch currently is.
///
/// `Idle -> Admitting -> Assembling -> Dispatching -> Validating -> Committing -> Done`,
/// exiting to `Rejected` from `Admitting` or to `Failed` from any later stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStage {
    Idle,
    Admitting,
    Assembling,
    Dispatching,
    Validating,
    Committing,
    Done,
    Rejected,
    Failed,
}

impl DispatchStage {
    /// Terminal stages end the dispatch.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DispatchStage::Done | DispatchStage::Rejected | DispatchStage::Failed
        )
    }

    /// Whether moving from `self` to `next` follows the dispatch state machine.
    pub fn can_advance_to(&self, next: DispatchStage) -> bool {
        use DispatchStage::*;
        match (self, next) {
            (Idle, Admitting) => true,
            (Admitting, Assembling) | (Admitting, Rejected) => true,
            (Assembling, Dispatching) => true,
            (Dispatching, Validating) => true,
            (Validating, Committing) => true,
            (Committing, Done) => true,
            (from, Failed) => !from.is_terminal() && *from != Idle,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchStage::Idle => "idle",
            DispatchStage::Admitting => "admitting",
            DispatchStage::Assembling => "assembling",
            DispatchStage::Dispatching => "dispatching",
            DispatchStage::Validating => "validating",
            DispatchStage::Committing => "committing",
            DispatchStage::Done => "done",
            DispatchStage::Rejected => "rejected",
            DispatchStage::Failed => "failed",
        }
    }
}

impl fmt::Display for DispatchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-dispatch bookkeeping: current stage, units and elapsed time.
#[derive(Debug)]
pub(crate) struct DispatchTrace {
    pub(crate) dispatch_id: String,
    pub(crate) stage: DispatchStage,
    pub(crate) estimated_units: u64,
    pub(crate) charged_units: u64,
    started: Instant,
}

impl DispatchTrace {
    pub(crate) fn start(dispatch_id: String) -> Self {
        Self {
            dispatch_id,
            stage: DispatchStage::Idle,
            estimated_units: 0,
            charged_units: 0,
            started: Instant::now(),
        }
    }

    pub(crate) fn advance(&mut self, next: DispatchStage) {
        if !self.stage.can_advance_to(next) {
            tracing::warn!(
                dispatch_id = %self.dispatch_id,
                from = self.stage.as_str(),
                to = next.as_str(),
                "unexpected dispatch stage transition"
            );
        }
        tracing::debug!(
            dispatch_id = %self.dispatch_id,
            from = self.stage.as_str(),
            to = next.as_str(),
            "dispatch stage"
        );
        self.stage = next;
    }

    pub(crate) fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}
