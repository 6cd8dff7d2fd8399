use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of one layer-update job in its linear sequence.
///
/// `Failed` is reachable from any non-terminal state; everything else only
/// moves forward via [`WorkflowState::next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Init,
    Authenticated,
    EditMode,
    LayerDeleted,
    LayerRenamed,
    FileImported,
    ColumnsConfigured,
    ImportFinalized,
    Styled,
    Verified,
    Failed,
}

impl WorkflowState {
    pub const SEQUENCE: [WorkflowState; 10] = [
        WorkflowState::Init,
        WorkflowState::Authenticated,
        WorkflowState::EditMode,
        WorkflowState::LayerDeleted,
        WorkflowState::LayerRenamed,
        WorkflowState::FileImported,
        WorkflowState::ColumnsConfigured,
        WorkflowState::ImportFinalized,
        WorkflowState::Styled,
        WorkflowState::Verified,
    ];

    /// Successor on the happy path; `None` for terminal states.
    pub fn next(self) -> Option<WorkflowState> {
        let i = Self::SEQUENCE.iter().position(|s| *s == self)?;
        Self::SEQUENCE.get(i + 1).copied()
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, WorkflowState::Verified | WorkflowState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowState::Init => "init",
            WorkflowState::Authenticated => "authenticated",
            WorkflowState::EditMode => "edit_mode",
            WorkflowState::LayerDeleted => "layer_deleted",
            WorkflowState::LayerRenamed => "layer_renamed",
            WorkflowState::FileImported => "file_imported",
            WorkflowState::ColumnsConfigured => "columns_configured",
            WorkflowState::ImportFinalized => "import_finalized",
            WorkflowState::Styled => "styled",
            WorkflowState::Verified => "verified",
            WorkflowState::Failed => "failed",
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
