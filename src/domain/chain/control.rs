//! Step outcomes and the sequencing rules applied to them

use std::ops::Range;

use serde::Serialize;
use serde_json::Value;

use super::entity::{ChainId, StepId};
use crate::domain::execution::StepTelemetry;

/// What the runner does after a step succeeds
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Control {
    /// Advance to the next step
    Continue,

    /// Run the targets in order as a side trip, then advance
    #[serde(rename_all = "camelCase")]
    Goto { target_step_ids: Vec<StepId> },

    /// Run another chain as a child run, then advance
    #[serde(rename_all = "camelCase")]
    RunChain { chain_id: ChainId },

    /// Finish the run successfully
    Stop,

    /// Mark the next `count` steps as skipped and advance past them
    Skip { count: usize },
}

/// Successful result of executing one step
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub output: Value,
    pub control: Control,
    pub telemetry: Option<StepTelemetry>,
}

impl StepOutcome {
    pub fn new(output: Value) -> Self {
        Self {
            output,
            control: Control::Continue,
            telemetry: None,
        }
    }

    pub fn with_control(mut self, control: Control) -> Self {
        self.control = control;
        self
    }

    pub fn with_telemetry(mut self, telemetry: StepTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }
}

/// Where the cursor goes next within a sequence of `len` steps
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    /// Run the step at this position (== len means the sequence is done)
    To(usize),

    /// Mark `skipped` as skipped, then continue at `next`
    Skip { skipped: Range<usize>, next: usize },

    /// Stop the run
    Halt,
}

/// Pure sequencing function: the position after `cursor` given its control.
///
/// Side trips (`Goto`, `RunChain`) are resolved by the runner before
/// advancing, so they advance like `Continue`.
pub fn next_cursor(cursor: usize, control: &Control, len: usize) -> Advance {
    match control {
        Control::Continue | Control::Goto { .. } | Control::RunChain { .. } => {
            Advance::To((cursor + 1).min(len))
        }
        Control::Stop => Advance::Halt,
        Control::Skip { count } => {
            let start = (cursor + 1).min(len);
            let end = start.saturating_add(*count).min(len);
            Advance::Skip {
                skipped: start..end,
                next: end,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn step_id(id: &str) -> StepId {
        StepId::new(id).unwrap()
    }

    #[test]
    fn test_continue_advances_by_one() {
        assert_eq!(next_cursor(0, &Control::Continue, 3), Advance::To(1));
        assert_eq!(next_cursor(2, &Control::Continue, 3), Advance::To(3));
    }

    #[test]
    fn test_goto_resumes_after_the_condition() {
        let control = Control::Goto {
            target_step_ids: vec![step_id("x")],
        };
        assert_eq!(next_cursor(1, &control, 5), Advance::To(2));
    }

    #[test]
    fn test_stop_halts() {
        assert_eq!(next_cursor(0, &Control::Stop, 3), Advance::Halt);
    }

    #[test]
    fn test_skip_marks_following_steps() {
        assert_eq!(
            next_cursor(1, &Control::Skip { count: 2 }, 6),
            Advance::Skip {
                skipped: 2..4,
                next: 4
            }
        );
    }

    #[test]
    fn test_skip_is_clamped_to_sequence_end() {
        assert_eq!(
            next_cursor(3, &Control::Skip { count: 10 }, 5),
            Advance::Skip {
                skipped: 4..5,
                next: 5
            }
        );
        assert_eq!(
            next_cursor(4, &Control::Skip { count: 1 }, 5),
            Advance::Skip {
                skipped: 5..5,
                next: 5
            }
        );
    }

    #[test]
    fn test_control_serialization() {
        let control = Control::Goto {
            target_step_ids: vec![step_id("a"), step_id("b")],
        };
        assert_eq!(
            serde_json::to_value(&control).unwrap(),
            json!({"action": "goto", "targetStepIds": ["a", "b"]})
        );
        assert_eq!(
            serde_json::to_value(Control::Skip { count: 2 }).unwrap(),
            json!({"action": "skip", "count": 2})
        );
    }
}
