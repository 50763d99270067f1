/// Verdicts and failure classification
use crate::config::types::VerifyError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Class of the first failing check
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    SourceNotFound,
    SourceUnreadable,
    EmptySource,
    CompileError,
    MemberNotFound,
    InstantiationError,
    InvocationError,
    OutputMismatch,
    StructuralPatternMissing,
    /// Engine fault a step could not classify
    Internal,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FailureKind::SourceNotFound => "source_not_found",
            FailureKind::SourceUnreadable => "source_unreadable",
            FailureKind::EmptySource => "empty_source",
            FailureKind::CompileError => "compile_error",
            FailureKind::MemberNotFound => "member_not_found",
            FailureKind::InstantiationError => "instantiation_error",
            FailureKind::InvocationError => "invocation_error",
            FailureKind::OutputMismatch => "output_mismatch",
            FailureKind::StructuralPatternMissing => "structural_pattern_missing",
            FailureKind::Internal => "internal",
        };
        f.write_str(text)
    }
}

/// Result of one scenario run. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    scenario_name: String,
    passed: bool,
    messages: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    failure: Option<FailureKind>,
}

impl Verdict {
    pub fn passed(scenario_name: impl Into<String>, messages: Vec<String>) -> Self {
        Self {
            scenario_name: scenario_name.into(),
            passed: true,
            messages,
            failure: None,
        }
    }

    pub fn failed(
        scenario_name: impl Into<String>,
        messages: Vec<String>,
        failure: Option<FailureKind>,
    ) -> Self {
        Self {
            scenario_name: scenario_name.into(),
            passed: false,
            messages,
            failure,
        }
    }

    pub fn scenario_name(&self) -> &str {
        &self.scenario_name
    }

    pub fn is_passed(&self) -> bool {
        self.passed
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn failure(&self) -> Option<FailureKind> {
        self.failure
    }

    /// Messages joined by newlines, as shown to the learner
    pub fn render(&self) -> String {
        self.messages.join("\n")
    }
}

/// Maps engine errors onto the learner-facing failure classes
pub struct VerdictClassifier;

impl VerdictClassifier {
    pub fn classify(err: &VerifyError) -> FailureKind {
        match err {
            VerifyError::SourceNotFound(_) => FailureKind::SourceNotFound,
            VerifyError::SourceUnreadable { .. } => FailureKind::SourceUnreadable,
            VerifyError::EmptySource(_) => FailureKind::EmptySource,
            // A unit that builds but cannot be loaded never produced a usable artifact
            VerifyError::Compile { .. } | VerifyError::BuildTimeout { .. } | VerifyError::Load(_) => {
                FailureKind::CompileError
            }
            VerifyError::MemberNotFound(_) => FailureKind::MemberNotFound,
            VerifyError::Instantiation(_) => FailureKind::InstantiationError,
            VerifyError::Invocation { .. } => FailureKind::InvocationError,
            VerifyError::OutputMismatch { .. } => FailureKind::OutputMismatch,
            VerifyError::StructuralPatternMissing(_) => FailureKind::StructuralPatternMissing,
            VerifyError::Io(_)
            | VerifyError::Config(_)
            | VerifyError::Process(_)
            | VerifyError::Protocol(_) => FailureKind::Internal,
        }
    }
}
