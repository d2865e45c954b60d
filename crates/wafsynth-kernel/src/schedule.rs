//! Sequential Throttling Scheduler.
//!
//! The provisioning platform runs creations in parallel unless told
//! otherwise. A `ThrottleChain` serializes rate-limited creations by making
//! each one depend on its predecessor; `ThrottleRun` models how the platform
//! then walks that chain.

use crate::error::{Result, SynthError};
use crate::synth::UnitSpec;
use serde::Serialize;
use std::fmt;

/// A linear chain of rate-limited creation operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThrottleChain {
    pub name: String,
    pub ops: Vec<String>,
    /// Delay each link inserts before releasing its successor.
    pub interval_secs: u64,
}

impl ThrottleChain {
    pub fn new<I, S>(name: &str, ops: I, interval_secs: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.to_string(),
            ops: ops.into_iter().map(Into::into).collect(),
            interval_secs,
        }
    }

    /// `(op, predecessor)` pairs, in chain order.
    pub fn links(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.ops.iter().enumerate().map(|(i, op)| {
            let prev = i.checked_sub(1).map(|p| self.ops[p].as_str());
            (op.as_str(), prev)
        })
    }

    /// Add each operation's predecessor to its unit's `depends_on`.
    pub fn apply(&self, fragment: &str, units: &mut [UnitSpec]) -> Result<()> {
        for (op, prev) in self.links() {
            let unit = units
                .iter_mut()
                .find(|u| u.id == op)
                .ok_or_else(|| SynthError::DanglingReference {
                    fragment: fragment.to_string(),
                    unit: self.name.clone(),
                    target: op.to_string(),
                })?;
            if let Some(prev) = prev
                && !unit.depends_on.iter().any(|d| d == prev)
            {
                unit.depends_on.push(prev.to_string());
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OpState {
    Pending,
    Scheduled,
    Completed,
    Failed,
}

impl fmt::Display for OpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OpState::Pending => "pending",
            OpState::Scheduled => "scheduled",
            OpState::Completed => "completed",
            OpState::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    #[error("unknown operation `{0}`")]
    UnknownOperation(String),

    #[error("`{op}` cannot be scheduled: predecessor `{predecessor}` is {state}")]
    PredecessorIncomplete {
        op: String,
        predecessor: String,
        state: OpState,
    },

    #[error("`{op}` is {state}, expected {expected}")]
    InvalidTransition {
        op: String,
        state: OpState,
        expected: OpState,
    },
}

/// Execution state of one chain.
///
/// `Pending -> Scheduled -> Completed`, strictly in order. A failure leaves
/// every later operation pending for good.
#[derive(Debug, Clone)]
pub struct ThrottleRun {
    ops: Vec<(String, OpState)>,
}

impl ThrottleRun {
    pub fn new(chain: &ThrottleChain) -> Self {
        Self {
            ops: chain
                .ops
                .iter()
                .map(|op| (op.clone(), OpState::Pending))
                .collect(),
        }
    }

    fn index(&self, op: &str) -> std::result::Result<usize, ScheduleError> {
        self.ops
            .iter()
            .position(|(id, _)| id == op)
            .ok_or_else(|| ScheduleError::UnknownOperation(op.to_string()))
    }

    pub fn state(&self, op: &str) -> Option<OpState> {
        self.ops.iter().find(|(id, _)| id == op).map(|(_, s)| *s)
    }

    pub fn states(&self) -> &[(String, OpState)] {
        &self.ops
    }

    /// Move `op` to `Scheduled`. Its predecessor must be `Completed`.
    pub fn schedule(&mut self, op: &str) -> std::result::Result<(), ScheduleError> {
        let i = self.index(op)?;
        if let Some(prev) = i.checked_sub(1) {
            let (prev_id, prev_state) = &self.ops[prev];
            if *prev_state != OpState::Completed {
                return Err(ScheduleError::PredecessorIncomplete {
                    op: op.to_string(),
                    predecessor: prev_id.clone(),
                    state: *prev_state,
                });
            }
        }
        self.transition(i, OpState::Pending, OpState::Scheduled)
    }

    pub fn complete(&mut self, op: &str) -> std::result::Result<(), ScheduleError> {
        let i = self.index(op)?;
        self.transition(i, OpState::Scheduled, OpState::Completed)
    }

    pub fn fail(&mut self, op: &str) -> std::result::Result<(), ScheduleError> {
        let i = self.index(op)?;
        self.transition(i, OpState::Scheduled, OpState::Failed)
    }

    fn transition(
        &mut self,
        i: usize,
        expected: OpState,
        next: OpState,
    ) -> std::result::Result<(), ScheduleError> {
        let (id, state) = &mut self.ops[i];
        if *state != expected {
            return Err(ScheduleError::InvalidTransition {
                op: id.clone(),
                state: *state,
                expected,
            });
        }
        *state = next;
        Ok(())
    }

    /// Schedule the next ready operation, if any.
    ///
    /// Returns `None` while an operation is in flight, after a failure, or
    /// when the chain is done.
    pub fn schedule_next(&mut self) -> Option<String> {
        let i = self.ops.iter().position(|(_, s)| *s != OpState::Completed)?;
        if self.ops[i].1 != OpState::Pending {
            return None;
        }
        self.ops[i].1 = OpState::Scheduled;
        Some(self.ops[i].0.clone())
    }

    pub fn is_finished(&self) -> bool {
        self.ops.iter().all(|(_, s)| *s == OpState::Completed)
    }

    pub fn is_blocked(&self) -> bool {
        self.ops.iter().any(|(_, s)| *s == OpState::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> ThrottleChain {
        ThrottleChain::new("ipset-timers", ["T1", "T2", "T3"], 2)
    }

    #[test]
    fn apply_links_each_op_to_its_predecessor() {
        let mut units = vec![
            UnitSpec::new("T1", "Timer"),
            UnitSpec::new("T2", "Timer").after("Other"),
            UnitSpec::new("T3", "Timer").after("T2"),
        ];
        chain().apply("webacl", &mut units).unwrap();
        assert!(units[0].depends_on.is_empty());
        assert_eq!(units[1].depends_on, vec!["Other".to_string(), "T1".to_string()]);
        assert_eq!(units[2].depends_on, vec!["T2".to_string()]);
    }

    #[test]
    fn apply_rejects_missing_units() {
        let mut units = vec![UnitSpec::new("T1", "Timer")];
        let err = chain().apply("webacl", &mut units).unwrap_err();
        assert_eq!(err.class(), "dangling_reference");
    }

    #[test]
    fn run_is_strictly_sequential() {
        let mut run = ThrottleRun::new(&chain());
        assert_eq!(run.schedule_next().as_deref(), Some("T1"));
        assert_eq!(run.schedule_next(), None);
        assert!(matches!(
            run.schedule("T2"),
            Err(ScheduleError::PredecessorIncomplete { .. })
        ));
        run.complete("T1").unwrap();
        assert_eq!(run.schedule_next().as_deref(), Some("T2"));
        run.complete("T2").unwrap();
        run.schedule("T3").unwrap();
        run.complete("T3").unwrap();
        assert!(run.is_finished());
        assert_eq!(run.schedule_next(), None);
    }

    #[test]
    fn failure_leaves_later_ops_pending() {
        let mut run = ThrottleRun::new(&chain());
        run.schedule_next();
        run.complete("T1").unwrap();
        run.schedule_next();
        run.fail("T2").unwrap();
        assert!(run.is_blocked());
        assert_eq!(run.schedule_next(), None);
        assert_eq!(run.state("T3"), Some(OpState::Pending));
        assert!(run.schedule("T3").is_err());
        assert!(matches!(
            run.complete("T2"),
            Err(ScheduleError::InvalidTransition { .. })
        ));
    }
}
