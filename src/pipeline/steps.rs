/// Shared step library
///
/// Every step records its own outcome as messages on the context and turns
/// engine errors into a `false` result; nothing is propagated past `run`.
use crate::config::types::VerifyError;
use crate::core::types::{MemberKind, ParamType, SourceUnit, Value};
use crate::observability::audit::{self, AuditEvent, AuditEventType};
use crate::pipeline::{Step, StepPhase, VerificationContext};
use crate::verdict::verdict::FailureKind;
use regex::RegexBuilder;
use std::time::Instant;

/// Argument recipe, resolved against the context at call time
#[derive(Debug, Clone)]
pub enum Arg {
    Value(Value),
    /// The caller-supplied host context, or null when none was given
    Host,
    /// An object created by an earlier step
    Instance(String),
}

impl Arg {
    fn resolve(&self, ctx: &VerificationContext<'_>) -> Option<Value> {
        match self {
            Arg::Value(value) => Some(value.clone()),
            Arg::Host => Some(
                ctx.host()
                    .map(|host| Value::Host(host.clone()))
                    .unwrap_or(Value::Null),
            ),
            Arg::Instance(role) => ctx.instance(role).cloned().map(Value::Object),
        }
    }
}

impl From<Value> for Arg {
    fn from(value: Value) -> Self {
        Arg::Value(value)
    }
}

fn resolve_args(args: &[Arg], ctx: &VerificationContext<'_>) -> Result<Vec<Value>, String> {
    args.iter()
        .map(|arg| {
            arg.resolve(ctx).ok_or_else(|| match arg {
                Arg::Instance(role) => format!("no instance bound as {}", role),
                _ => "unresolvable argument".to_string(),
            })
        })
        .collect()
}

/// Reads the submission from disk.
#[derive(Debug, Default)]
pub struct ReadSource;

impl Step for ReadSource {
    fn name(&self) -> &str {
        "read-source"
    }

    fn phase(&self) -> StepPhase {
        StepPhase::Source
    }

    fn run(&self, ctx: &mut VerificationContext<'_>) -> bool {
        match SourceUnit::read(ctx.source_path(), ctx.type_name()) {
            Ok(source) => {
                ctx.set_raw_source(source);
                ctx.note("source ok");
                true
            }
            Err(err @ VerifyError::EmptySource(_)) => {
                ctx.note("empty source");
                ctx.fail(&err);
                false
            }
            Err(err) => {
                ctx.note("source not ok");
                ctx.note(err.to_string());
                ctx.fail(&err);
                false
            }
        }
    }
}

/// Deterministic text substitution on the current source.
#[derive(Debug)]
pub struct ReplaceText {
    from: String,
    to: String,
    label: String,
}

impl ReplaceText {
    pub fn new(from: &str, to: &str) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            label: "replace".to_string(),
        }
    }

    pub fn labelled(mut self, label: &str) -> Self {
        self.label = label.to_string();
        self
    }
}

impl Step for ReplaceText {
    fn name(&self) -> &str {
        &self.label
    }

    fn phase(&self) -> StepPhase {
        StepPhase::Transform
    }

    fn run(&self, ctx: &mut VerificationContext<'_>) -> bool {
        let Some(source) = ctx.source() else {
            ctx.note(format!("{} not ok", self.label));
            ctx.mark_failure(FailureKind::Internal);
            return false;
        };
        match source.with_text(source.text().replace(&self.from, &self.to)) {
            Ok(replaced) => {
                ctx.replace_source(replaced);
                ctx.note(format!("{} ok", self.label));
                true
            }
            Err(err) => {
                ctx.note(format!("{} not ok", self.label));
                ctx.note(err.to_string());
                ctx.fail(&err);
                false
            }
        }
    }
}

/// Builds and loads the current source.
#[derive(Debug, Default)]
pub struct Compile;

impl Step for Compile {
    fn name(&self) -> &str {
        "compile"
    }

    fn phase(&self) -> StepPhase {
        StepPhase::Build
    }

    fn run(&self, ctx: &mut VerificationContext<'_>) -> bool {
        let Some(source) = ctx.source().cloned() else {
            ctx.note("compile not ok");
            ctx.note("no source to compile");
            ctx.mark_failure(FailureKind::Internal);
            return false;
        };
        let started = Instant::now();
        match ctx.builder().build(&source) {
            Ok(unit) => {
                audit::emit(
                    AuditEvent::new(AuditEventType::BuildFinished, ctx.correlation())
                        .with_unit_id(unit.id())
                        .with_passed(true)
                        .with_elapsed_ms(started.elapsed().as_millis() as u64),
                );
                ctx.set_unit(unit);
                ctx.note("compile ok");
                true
            }
            Err(err) => {
                audit::emit(
                    AuditEvent::new(AuditEventType::BuildFinished, ctx.correlation())
                        .with_passed(false)
                        .with_elapsed_ms(started.elapsed().as_millis() as u64),
                );
                ctx.note("compile not ok");
                match &err {
                    VerifyError::Compile { diagnostics, .. } if !diagnostics.is_empty() => {
                        ctx.note(diagnostics.clone())
                    }
                    other => ctx.note(other.to_string()),
                }
                ctx.fail(&err);
                false
            }
        }
    }
}

/// Resolves a constructor or method and binds it to a role.
#[derive(Debug)]
pub struct ResolveMember {
    role: String,
    kind: MemberKind,
    name: String,
    params: Vec<ParamType>,
    ok_message: String,
    fail_message: String,
}

impl ResolveMember {
    pub fn method(role: &str, name: &str, params: Vec<ParamType>) -> Self {
        Self {
            role: role.to_string(),
            kind: MemberKind::Method,
            name: name.to_string(),
            params,
            ok_message: format!("{} ok", name),
            fail_message: format!("{} not found", name),
        }
    }

    pub fn constructor(role: &str, params: Vec<ParamType>) -> Self {
        Self {
            role: role.to_string(),
            kind: MemberKind::Constructor,
            name: "<init>".to_string(),
            params,
            ok_message: "constructor ok".to_string(),
            fail_message: "constructor not found".to_string(),
        }
    }

    pub fn with_messages(mut self, ok: &str, fail: &str) -> Self {
        self.ok_message = ok.to_string();
        self.fail_message = fail.to_string();
        self
    }
}

impl Step for ResolveMember {
    fn name(&self) -> &str {
        &self.role
    }

    fn run(&self, ctx: &mut VerificationContext<'_>) -> bool {
        let resolved = match ctx.unit_mut() {
            Some(unit) => unit.resolve(self.kind, &self.name, &self.params),
            None => Err(VerifyError::Load("nothing has been compiled".to_string())),
        };
        match resolved {
            Ok(handle) => {
                ctx.bind_member(&self.role, handle);
                ctx.note(self.ok_message.clone());
                true
            }
            Err(err) => {
                ctx.note(self.fail_message.clone());
                if !matches!(err, VerifyError::MemberNotFound(_)) {
                    ctx.note(err.to_string());
                }
                ctx.fail(&err);
                false
            }
        }
    }
}

/// Resolves a constructor and creates an instance bound to a role.
#[derive(Debug)]
pub struct Instantiate {
    role: String,
    params: Vec<ParamType>,
    args: Vec<Arg>,
    ok_message: String,
    fail_message: String,
}

impl Instantiate {
    pub fn new(role: &str, params: Vec<ParamType>, args: Vec<Arg>) -> Self {
        Self {
            role: role.to_string(),
            params,
            args,
            ok_message: "instance ok".to_string(),
            fail_message: "instance not found".to_string(),
        }
    }

    pub fn with_messages(mut self, ok: &str, fail: &str) -> Self {
        self.ok_message = ok.to_string();
        self.fail_message = fail.to_string();
        self
    }
}

impl Step for Instantiate {
    fn name(&self) -> &str {
        &self.role
    }

    fn run(&self, ctx: &mut VerificationContext<'_>) -> bool {
        let args = match resolve_args(&self.args, ctx) {
            Ok(args) => args,
            Err(reason) => {
                ctx.note(self.fail_message.clone());
                ctx.note(reason);
                ctx.mark_failure(FailureKind::Internal);
                return false;
            }
        };
        let invoker = ctx.invoker();
        let created = match ctx.unit_mut() {
            Some(unit) => {
                let type_name = unit.type_name().to_string();
                unit.resolve(MemberKind::Constructor, &type_name, &self.params)
                    .and_then(|ctor| invoker.construct(unit, &ctor, &args))
            }
            None => Err(VerifyError::Load("nothing has been compiled".to_string())),
        };
        match created {
            Ok((obj, _captured)) => {
                ctx.bind_instance(&self.role, obj);
                ctx.note(self.ok_message.clone());
                true
            }
            Err(err) => {
                ctx.note(self.fail_message.clone());
                ctx.note(err.to_string());
                ctx.fail(&err);
                false
            }
        }
    }
}

/// Invokes a bound member and records its captured text and return value.
#[derive(Debug)]
pub struct InvokeAndCapture {
    member: String,
    receiver: Option<String>,
    args: Vec<Arg>,
    output_role: String,
    value_role: Option<String>,
    expect_value: bool,
    ok_message: String,
    fail_message: String,
}

impl InvokeAndCapture {
    /// Captured text is stored under `output_role`.
    pub fn new(member: &str, args: Vec<Arg>, output_role: &str) -> Self {
        Self {
            member: member.to_string(),
            receiver: None,
            args,
            output_role: output_role.to_string(),
            value_role: None,
            expect_value: false,
            ok_message: format!("{} ok", output_role),
            fail_message: format!("{} not ok", output_role),
        }
    }

    pub fn on_instance(mut self, role: &str) -> Self {
        self.receiver = Some(role.to_string());
        self
    }

    /// Keep the return value under `role`; null or void fails the step.
    pub fn expecting_value(mut self, role: &str) -> Self {
        self.value_role = Some(role.to_string());
        self.expect_value = true;
        self
    }

    pub fn with_messages(mut self, ok: &str, fail: &str) -> Self {
        self.ok_message = ok.to_string();
        self.fail_message = fail.to_string();
        self
    }

    fn failed(&self, ctx: &mut VerificationContext<'_>, err: &VerifyError) -> bool {
        ctx.note(self.fail_message.clone());
        ctx.note(err.to_string());
        ctx.fail(err);
        false
    }
}

impl Step for InvokeAndCapture {
    fn name(&self) -> &str {
        &self.output_role
    }

    fn run(&self, ctx: &mut VerificationContext<'_>) -> bool {
        let Some(handle) = ctx.member(&self.member).cloned() else {
            let err = VerifyError::MemberNotFound(format!("no member bound as {}", self.member));
            return self.failed(ctx, &err);
        };
        let receiver = match &self.receiver {
            Some(role) => match ctx.instance(role).cloned() {
                Some(obj) => Some(obj),
                None => {
                    let err = VerifyError::Instantiation(format!("no instance bound as {}", role));
                    return self.failed(ctx, &err);
                }
            },
            None => None,
        };
        let args = match resolve_args(&self.args, ctx) {
            Ok(args) => args,
            Err(reason) => return self.failed(ctx, &VerifyError::Config(reason)),
        };

        let invoker = ctx.invoker();
        let outcome = match ctx.unit_mut() {
            Some(unit) => invoker.invoke(unit, &handle, receiver.as_ref(), &args),
            None => Err(VerifyError::Load("nothing has been compiled".to_string())),
        };
        match outcome {
            Ok(invocation) => {
                if self.expect_value && matches!(invocation.value, Value::Null | Value::Unit) {
                    ctx.note(self.fail_message.clone());
                    ctx.mark_failure(FailureKind::InvocationError);
                    return false;
                }
                ctx.record_output(&self.output_role, invocation.captured);
                if let Some(role) = &self.value_role {
                    ctx.record_value(role, invocation.value);
                }
                ctx.note(self.ok_message.clone());
                true
            }
            Err(err) => self.failed(ctx, &err),
        }
    }
}

/// Checks that captured text contains an expected fragment.
#[derive(Debug)]
pub struct MatchOutput {
    output_role: String,
    expected: String,
    label: String,
}

impl MatchOutput {
    pub fn new(label: &str, output_role: &str, expected: &str) -> Self {
        Self {
            output_role: output_role.to_string(),
            expected: expected.to_string(),
            label: label.to_string(),
        }
    }
}

impl Step for MatchOutput {
    fn name(&self) -> &str {
        &self.label
    }

    fn phase(&self) -> StepPhase {
        StepPhase::Inspect
    }

    fn run(&self, ctx: &mut VerificationContext<'_>) -> bool {
        let actual = ctx.output(&self.output_role).unwrap_or_default().to_string();
        if actual.contains(&self.expected) {
            ctx.note(format!("{} ok", self.label));
            true
        } else {
            ctx.note(format!("{} wrong: {}", self.label, actual.trim_end()));
            ctx.fail(&VerifyError::OutputMismatch {
                expected: self.expected.clone(),
                actual,
            });
            false
        }
    }
}

/// Requires a regular expression to match the raw source text.
#[derive(Debug)]
pub struct MatchSourcePattern {
    label: String,
    pattern: String,
}

impl MatchSourcePattern {
    /// `.` matches newlines in `pattern`.
    pub fn new(label: &str, pattern: &str) -> Self {
        Self {
            label: label.to_string(),
            pattern: pattern.to_string(),
        }
    }
}

impl Step for MatchSourcePattern {
    fn name(&self) -> &str {
        &self.label
    }

    fn phase(&self) -> StepPhase {
        StepPhase::Inspect
    }

    fn run(&self, ctx: &mut VerificationContext<'_>) -> bool {
        let regex = match RegexBuilder::new(&self.pattern).dot_matches_new_line(true).build() {
            Ok(regex) => regex,
            Err(e) => {
                ctx.note(format!("{} not ok", self.label));
                ctx.note(format!("invalid pattern: {}", e));
                ctx.mark_failure(FailureKind::Internal);
                return false;
            }
        };
        let found = ctx
            .raw_source()
            .map(|source| regex.is_match(source.text()))
            .unwrap_or(false);
        if found {
            ctx.note(format!("{} ok", self.label));
            true
        } else {
            ctx.note(format!("{} not ok", self.label));
            ctx.fail(&VerifyError::StructuralPatternMissing(self.pattern.clone()));
            false
        }
    }
}

/// Instantiates with fixed arguments and checks rounded numeric results of
/// parameterless query methods.
#[derive(Debug)]
pub struct ProducerContract {
    label: String,
    ctor_params: Vec<ParamType>,
    ctor_args: Vec<Value>,
    expectations: Vec<(String, i64)>,
}

impl ProducerContract {
    pub fn new(label: &str, ctor_params: Vec<ParamType>, ctor_args: Vec<Value>) -> Self {
        Self {
            label: label.to_string(),
            ctor_params,
            ctor_args,
            expectations: Vec::new(),
        }
    }

    pub fn expect(mut self, method: &str, rounded: i64) -> Self {
        self.expectations.push((method.to_string(), rounded));
        self
    }

    fn not_ok(&self, ctx: &mut VerificationContext<'_>, reason: String, err: &VerifyError) -> bool {
        ctx.note(format!("{} not ok", self.label));
        ctx.note(reason);
        ctx.fail(err);
        false
    }
}

/// Round half up, as `Math.round` does.
fn round_half_up(x: f64) -> i64 {
    (x + 0.5).floor() as i64
}

impl Step for ProducerContract {
    fn name(&self) -> &str {
        &self.label
    }

    fn run(&self, ctx: &mut VerificationContext<'_>) -> bool {
        let invoker = ctx.invoker();
        let Some(unit) = ctx.unit_mut() else {
            let err = VerifyError::Load("nothing has been compiled".to_string());
            return self.not_ok(ctx, err.to_string(), &err);
        };

        let type_name = unit.type_name().to_string();
        let created = unit
            .resolve(MemberKind::Constructor, &type_name, &self.ctor_params)
            .and_then(|ctor| invoker.construct(unit, &ctor, &self.ctor_args));
        let obj = match created {
            Ok((obj, _)) => obj,
            Err(err) => return self.not_ok(ctx, err.to_string(), &err),
        };

        let mut observed = Vec::with_capacity(self.expectations.len());
        for (method, _) in &self.expectations {
            let result = unit
                .resolve(MemberKind::Method, method, &[])
                .and_then(|handle| invoker.invoke(unit, &handle, Some(&obj), &[]));
            match result {
                Ok(invocation) => match invocation.value.as_f64() {
                    Some(x) if x.is_finite() => observed.push(round_half_up(x)),
                    _ => {
                        let err = VerifyError::OutputMismatch {
                            expected: "number".to_string(),
                            actual: invocation.value.type_label().to_string(),
                        };
                        let reason = format!(
                            "{} returned {}",
                            method,
                            invocation.value.type_label()
                        );
                        return self.not_ok(ctx, reason, &err);
                    }
                },
                Err(err) => return self.not_ok(ctx, err.to_string(), &err),
            }
        }

        let wrong: Vec<String> = self
            .expectations
            .iter()
            .zip(&observed)
            .filter(|((_, expected), actual)| expected != *actual)
            .map(|((method, expected), actual)| {
                format!("{}={} (expected {})", method, actual, expected)
            })
            .collect();
        if wrong.is_empty() {
            ctx.note(format!("{} ok", self.label));
            true
        } else {
            let err = VerifyError::OutputMismatch {
                expected: format!("{:?}", self.expectations),
                actual: format!("{:?}", observed),
            };
            self.not_ok(ctx, format!("wrong values: {}", wrong.join(", ")), &err)
        }
    }
}

/// Hands a recorded value to the caller's host context.
#[derive(Debug)]
pub struct DeliverToHost {
    value_role: String,
    label: String,
}

impl DeliverToHost {
    pub fn new(label: &str, value_role: &str) -> Self {
        Self {
            value_role: value_role.to_string(),
            label: label.to_string(),
        }
    }
}

impl Step for DeliverToHost {
    fn name(&self) -> &str {
        &self.label
    }

    fn run(&self, ctx: &mut VerificationContext<'_>) -> bool {
        let Some(value) = ctx.value(&self.value_role).cloned() else {
            ctx.note(format!("{} not delivered", self.label));
            ctx.mark_failure(FailureKind::Internal);
            return false;
        };
        let Some(host) = ctx.host().cloned() else {
            ctx.note(format!("{} kept: no host context", self.label));
            return true;
        };
        match host.accept(value) {
            Ok(()) => {
                ctx.note(format!("{} delivered", self.label));
                true
            }
            Err(reason) => {
                ctx.note(format!("{} rejected", self.label));
                ctx.note(reason);
                ctx.mark_failure(FailureKind::InvocationError);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_half_up() {
        assert_eq!(round_half_up(2199.5), 2200);
        assert_eq!(round_half_up(2200.49), 2200);
        assert_eq!(round_half_up(239.999), 240);
        assert_eq!(round_half_up(-0.5), 0);
    }

    #[test]
    fn test_step_phases() {
        assert_eq!(ReadSource.phase(), StepPhase::Source);
        assert_eq!(ReplaceText::new("10", "yuppie").phase(), StepPhase::Transform);
        assert_eq!(Compile.phase(), StepPhase::Build);
        assert_eq!(
            MatchSourcePattern::new("try-catch", "try.+catch").phase(),
            StepPhase::Inspect
        );
    }

    #[test]
    fn test_default_member_messages() {
        let step = ResolveMember::method("primary", "calculateArea", vec![]);
        assert_eq!(step.ok_message, "calculateArea ok");
        assert_eq!(step.fail_message, "calculateArea not found");
        let step = step.with_messages("method1 ok", "method1 not ok");
        assert_eq!(step.fail_message, "method1 not ok");
    }
}
