use std::time::Duration;

use crate::retry::RetryBudget;

use super::WorkflowState;

/// What exhausting a step's budget means for the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The job moves to `Failed`.
    Fatal,
    /// Logged; the job continues with the next step.
    BestEffort,
}

/// Page reset used before an attempt (`prepare`) or between failed
/// attempts after the retry delay (`recovery`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    None,
    /// Reload the editor, let it settle and accept any confirmation dialog.
    ReloadAndDismiss,
}

/// Declared behaviour of one transition, keyed by its target state.
#[derive(Debug, Clone, Copy)]
pub struct StepSpec {
    pub target: WorkflowState,
    pub budget: RetryBudget,
    pub severity: Severity,
    /// Runs at the start of every attempt, inside the budget.
    pub prepare: Recovery,
    pub recovery: Recovery,
    /// Pause once before the first attempt.
    pub settle: Duration,
}

const fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

/// Sign-in: each attempt opens a fresh session.
pub const LOGIN: StepSpec = StepSpec {
    target: WorkflowState::Authenticated,
    budget: RetryBudget::new(2, Duration::ZERO),
    severity: Severity::Fatal,
    prepare: Recovery::None,
    recovery: Recovery::None,
    settle: Duration::ZERO,
};

/// Editor transitions after sign-in, in execution order.
pub const EDITOR_STEPS: [StepSpec; 8] = [
    StepSpec {
        target: WorkflowState::EditMode,
        budget: RetryBudget::new(10, secs(3)),
        severity: Severity::Fatal,
        prepare: Recovery::None,
        recovery: Recovery::None,
        settle: secs(3),
    },
    StepSpec {
        target: WorkflowState::LayerDeleted,
        budget: RetryBudget::new(10, secs(5)),
        severity: Severity::BestEffort,
        prepare: Recovery::None,
        recovery: Recovery::None,
        settle: secs(5),
    },
    StepSpec {
        target: WorkflowState::LayerRenamed,
        budget: RetryBudget::new(10, secs(3)),
        severity: Severity::Fatal,
        prepare: Recovery::ReloadAndDismiss,
        recovery: Recovery::None,
        settle: Duration::ZERO,
    },
    StepSpec {
        target: WorkflowState::FileImported,
        budget: RetryBudget::new(10, secs(3)),
        severity: Severity::Fatal,
        prepare: Recovery::None,
        recovery: Recovery::ReloadAndDismiss,
        settle: secs(3),
    },
    StepSpec {
        target: WorkflowState::ColumnsConfigured,
        budget: RetryBudget::new(10, secs(3)),
        severity: Severity::Fatal,
        prepare: Recovery::None,
        recovery: Recovery::None,
        settle: secs(3),
    },
    StepSpec {
        target: WorkflowState::ImportFinalized,
        budget: RetryBudget::new(10, secs(3)),
        severity: Severity::Fatal,
        prepare: Recovery::None,
        recovery: Recovery::None,
        settle: Duration::ZERO,
    },
    StepSpec {
        target: WorkflowState::Styled,
        budget: RetryBudget::new(10, secs(3)),
        severity: Severity::BestEffort,
        prepare: Recovery::None,
        recovery: Recovery::None,
        settle: secs(10),
    },
    StepSpec {
        target: WorkflowState::Verified,
        budget: RetryBudget::once(),
        severity: Severity::BestEffort,
        prepare: Recovery::None,
        recovery: Recovery::None,
        settle: secs(3),
    },
];

/// The editor needs this long after a reload before it responds.
pub const RELOAD_SETTLE: Duration = secs(20);
