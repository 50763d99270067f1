//! Verification pipelines
//!
//! A pipeline is an ordered list of steps run against one shared context.
//! The first step that returns `false` stops the run; the verdict carries
//! every message appended by the steps that ran, in order.

pub mod scenarios;
pub mod steps;

use crate::config::types::{Result, VerifyError};
use crate::core::types::{HostContext, MemberHandle, ObjectRef, SourceUnit, Value};
use crate::exec::builder::{Builder, CompiledUnit};
use crate::exec::invoker::Invoker;
use crate::observability::audit::{self, AuditEvent, AuditEventType, CorrelationIds};
use crate::utils::output::panic_message;
use crate::verdict::verdict::{FailureKind, Verdict, VerdictClassifier};
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Where a step sits relative to the build
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StepPhase {
    Source,
    /// Rewrites the source text; only valid before the build step
    Transform,
    Build,
    Probe,
    Inspect,
}

/// One named check
pub trait Step: Send + Sync {
    fn name(&self) -> &str;

    fn phase(&self) -> StepPhase {
        StepPhase::Probe
    }

    /// Perform the check, append at least one message, report the outcome.
    fn run(&self, ctx: &mut VerificationContext<'_>) -> bool;
}

/// State shared by the steps of one pipeline run
pub struct VerificationContext<'a> {
    source_path: PathBuf,
    type_name: String,
    host: Option<Arc<dyn HostContext>>,
    builder: &'a Builder,
    invoker: &'a Invoker,
    correlation: CorrelationIds,
    /// Source exactly as read, before any transform
    raw_source: Option<SourceUnit>,
    source: Option<SourceUnit>,
    unit: Option<CompiledUnit>,
    members: HashMap<String, MemberHandle>,
    instances: HashMap<String, ObjectRef>,
    outputs: HashMap<String, String>,
    values: HashMap<String, Value>,
    messages: Vec<String>,
    failure: Option<FailureKind>,
}

impl<'a> VerificationContext<'a> {
    pub fn new(
        source_path: &Path,
        type_name: &str,
        builder: &'a Builder,
        invoker: &'a Invoker,
    ) -> Self {
        Self {
            source_path: source_path.to_path_buf(),
            type_name: type_name.to_string(),
            host: None,
            builder,
            invoker,
            correlation: CorrelationIds::new(""),
            raw_source: None,
            source: None,
            unit: None,
            members: HashMap::new(),
            instances: HashMap::new(),
            outputs: HashMap::new(),
            values: HashMap::new(),
            messages: Vec::new(),
            failure: None,
        }
    }

    pub fn with_host(mut self, host: Option<Arc<dyn HostContext>>) -> Self {
        self.host = host;
        self
    }

    pub fn with_correlation(mut self, correlation: CorrelationIds) -> Self {
        self.correlation = correlation;
        self
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn host(&self) -> Option<&Arc<dyn HostContext>> {
        self.host.as_ref()
    }

    pub fn builder(&self) -> &'a Builder {
        self.builder
    }

    pub fn invoker(&self) -> &'a Invoker {
        self.invoker
    }

    pub fn correlation(&self) -> &CorrelationIds {
        &self.correlation
    }

    pub fn raw_source(&self) -> Option<&SourceUnit> {
        self.raw_source.as_ref()
    }

    pub fn source(&self) -> Option<&SourceUnit> {
        self.source.as_ref()
    }

    /// Record the source as read from disk.
    pub fn set_raw_source(&mut self, source: SourceUnit) {
        self.correlation.source_sha256 = source.fingerprint();
        self.raw_source = Some(source.clone());
        self.source = Some(source);
    }

    /// Replace the current source, leaving the raw source untouched.
    pub fn replace_source(&mut self, source: SourceUnit) {
        self.source = Some(source);
    }

    pub fn unit(&self) -> Option<&CompiledUnit> {
        self.unit.as_ref()
    }

    pub fn unit_mut(&mut self) -> Option<&mut CompiledUnit> {
        self.unit.as_mut()
    }

    /// Install a freshly built unit. Handles and objects from a previous unit are dropped.
    pub fn set_unit(&mut self, unit: CompiledUnit) {
        self.members.clear();
        self.instances.clear();
        self.unit = Some(unit);
    }

    pub fn member(&self, role: &str) -> Option<&MemberHandle> {
        self.members.get(role)
    }

    pub fn bind_member(&mut self, role: &str, handle: MemberHandle) {
        self.members.insert(role.to_string(), handle);
    }

    pub fn instance(&self, role: &str) -> Option<&ObjectRef> {
        self.instances.get(role)
    }

    pub fn bind_instance(&mut self, role: &str, obj: ObjectRef) {
        self.instances.insert(role.to_string(), obj);
    }

    pub fn output(&self, role: &str) -> Option<&str> {
        self.outputs.get(role).map(String::as_str)
    }

    pub fn record_output(&mut self, role: &str, text: String) {
        self.outputs.insert(role.to_string(), text);
    }

    pub fn value(&self, role: &str) -> Option<&Value> {
        self.values.get(role)
    }

    pub fn record_value(&mut self, role: &str, value: Value) {
        self.values.insert(role.to_string(), value);
    }

    /// Append a diagnostic message. Messages are never removed or reordered.
    pub fn note(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    /// Record the failure class of `err`; the first recorded class wins.
    pub fn fail(&mut self, err: &VerifyError) {
        self.mark_failure(VerdictClassifier::classify(err));
    }

    pub fn mark_failure(&mut self, kind: FailureKind) {
        if self.failure.is_none() {
            self.failure = Some(kind);
        }
    }

    pub fn failure(&self) -> Option<FailureKind> {
        self.failure
    }
}

/// Named, ordered list of steps
pub struct Pipeline {
    name: String,
    steps: Vec<Box<dyn Step>>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("steps", &self.step_names())
            .finish()
    }
}

impl Pipeline {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append a step.
    pub fn step(mut self, step: impl Step + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    /// Insert a step at `index`. Transform steps must land before the build step.
    pub fn insert_at(&mut self, index: usize, step: Box<dyn Step>) -> Result<()> {
        if index > self.steps.len() {
            return Err(VerifyError::Config(format!(
                "cannot insert {} at {} in a pipeline of {} steps",
                step.name(),
                index,
                self.steps.len()
            )));
        }
        if step.phase() == StepPhase::Transform {
            if let Some(build_at) = self.build_index() {
                if index > build_at {
                    return Err(VerifyError::Config(format!(
                        "transform {} must run before the build step",
                        step.name()
                    )));
                }
            }
        }
        self.steps.insert(index, step);
        Ok(())
    }

    /// Check that every transform precedes the first build step.
    pub fn validate(&self) -> Result<()> {
        let Some(build_at) = self.build_index() else {
            return Ok(());
        };
        match self
            .steps
            .iter()
            .skip(build_at)
            .find(|s| s.phase() == StepPhase::Transform)
        {
            Some(step) => Err(VerifyError::Config(format!(
                "transform {} runs after the build step in {}",
                step.name(),
                self.name
            ))),
            None => Ok(()),
        }
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    fn build_index(&self) -> Option<usize> {
        self.steps.iter().position(|s| s.phase() == StepPhase::Build)
    }

    /// Run the steps in order, stopping at the first failure.
    pub fn run(&self, mut ctx: VerificationContext<'_>) -> Verdict {
        let started = Instant::now();
        let correlation = ctx.correlation().clone();
        audit::emit(AuditEvent::new(AuditEventType::ScenarioStart, &correlation));
        log::info!(
            "scenario {} started for {} ({})",
            self.name,
            ctx.source_path().display(),
            correlation.request_id
        );

        let mut passed = true;
        for step in &self.steps {
            let step_started = Instant::now();
            let ok = match panic::catch_unwind(AssertUnwindSafe(|| step.run(&mut ctx))) {
                Ok(ok) => ok,
                Err(payload) => {
                    log::error!(
                        "step {} panicked: {}",
                        step.name(),
                        panic_message(payload.as_ref())
                    );
                    ctx.note(format!("{} aborted: internal error", step.name()));
                    ctx.mark_failure(FailureKind::Internal);
                    false
                }
            };
            log::debug!("step {} -> {}", step.name(), ok);
            audit::emit(
                AuditEvent::new(AuditEventType::StepOutcome, ctx.correlation())
                    .with_step(step.name())
                    .with_passed(ok)
                    .with_elapsed_ms(step_started.elapsed().as_millis() as u64),
            );
            if !ok {
                passed = false;
                ctx.mark_failure(FailureKind::Internal);
                break;
            }
        }

        let verdict = if passed {
            Verdict::passed(self.name.clone(), ctx.messages)
        } else {
            Verdict::failed(self.name.clone(), ctx.messages, ctx.failure)
        };
        audit::emit(
            AuditEvent::new(AuditEventType::ScenarioEnd, &ctx.correlation)
                .with_passed(verdict.is_passed())
                .with_failure(verdict.failure())
                .with_elapsed_ms(started.elapsed().as_millis() as u64),
        );
        log::info!(
            "scenario {} {} ({})",
            self.name,
            if verdict.is_passed() { "passed" } else { "failed" },
            correlation.request_id
        );
        verdict
    }
}
