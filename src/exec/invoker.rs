/// Invoker: calls resolved members with output capture
use crate::config::types::{InvocationFailure, Result, VerifyError};
use crate::core::types::{MemberHandle, MemberKind, ObjectRef, Value};
use crate::exec::builder::CompiledUnit;
use crate::utils::output::{CaptureSink, OutputCapture, OutputIntegrity};

/// Return value plus everything the call wrote
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub value: Value,
    pub captured: String,
    pub integrity: OutputIntegrity,
}

#[derive(Debug, Clone, Copy)]
pub struct Invoker {
    output_limit: usize,
    redirect_process_stdout: bool,
}

impl Invoker {
    pub fn new(output_limit: usize) -> Self {
        Self {
            output_limit,
            redirect_process_stdout: false,
        }
    }

    /// Also redirect fd 1 around each call, for in-process code that prints directly.
    pub fn with_process_stdout(mut self, enabled: bool) -> Self {
        self.redirect_process_stdout = enabled;
        self
    }

    pub fn invoke(
        &self,
        unit: &mut CompiledUnit,
        handle: &MemberHandle,
        receiver: Option<&ObjectRef>,
        args: &[Value],
    ) -> Result<Invocation> {
        if handle.unit_id() != unit.id() {
            return Err(VerifyError::invocation(
                InvocationFailure::StaleHandle,
                format!("{} belongs to a discarded unit", handle.signature()),
            ));
        }
        if let Some(obj) = receiver {
            if obj.unit_id() != unit.id() {
                return Err(VerifyError::invocation(
                    InvocationFailure::StaleHandle,
                    format!("receiver {}#{} belongs to a discarded unit", obj.class(), obj.id()),
                ));
            }
        }
        if args.len() != handle.params().len() {
            return Err(VerifyError::invocation(
                InvocationFailure::Arity,
                format!(
                    "{} expects {} argument(s), got {}",
                    handle.signature(),
                    handle.params().len(),
                    args.len()
                ),
            ));
        }

        let mut sink = CaptureSink::new(self.output_limit);
        let (value, process_text, process_integrity) = if self.redirect_process_stdout {
            let captured = OutputCapture::stdout(self.output_limit)
                .capture(|| unit.module_mut().invoke(handle, receiver, args, &mut sink))?;
            let value = match captured.outcome {
                Ok(result) => result?,
                Err(panic) => {
                    return Err(VerifyError::invocation(InvocationFailure::TargetFailed, panic))
                }
            };
            (value, captured.text, captured.integrity)
        } else {
            let value = unit.module_mut().invoke(handle, receiver, args, &mut sink)?;
            (value, String::new(), OutputIntegrity::Complete)
        };

        let integrity = if sink.is_truncated() {
            OutputIntegrity::Truncated
        } else {
            process_integrity
        };
        let mut captured = sink.text();
        captured.push_str(&process_text);
        log::debug!(
            "invoked {} -> {:?} ({} bytes captured)",
            handle.signature(),
            value,
            captured.len()
        );
        Ok(Invocation {
            value,
            captured,
            integrity,
        })
    }

    /// Run a constructor and return the new object.
    pub fn construct(
        &self,
        unit: &mut CompiledUnit,
        handle: &MemberHandle,
        args: &[Value],
    ) -> Result<(ObjectRef, String)> {
        if handle.kind() != MemberKind::Constructor {
            return Err(VerifyError::Instantiation(format!(
                "{} is not a constructor",
                handle.signature()
            )));
        }
        let invocation = self.invoke(unit, handle, None, args).map_err(|e| match e {
            VerifyError::Invocation {
                failure: InvocationFailure::TargetFailed,
                detail,
            } => VerifyError::Instantiation(detail),
            other => other,
        })?;
        match invocation.value {
            Value::Object(obj) => Ok((obj, invocation.captured)),
            other => Err(VerifyError::Instantiation(format!(
                "constructor produced {}",
                other.type_label()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::EngineConfig;
    use crate::core::native::NativeModule;
    use crate::core::types::{ParamType, SourceUnit};
    use crate::exec::builder::Builder;
    use crate::judge::adapter::ToolLimits;
    use crate::judge::languages::native::NativeToolchain;
    use crate::safety::workspace::WorkspaceManager;
    use std::io::Write;
    use std::sync::Arc;

    struct Tally(i64);

    fn build(root: &std::path::Path) -> CompiledUnit {
        let toolchain = NativeToolchain::new().register("Tally", |_| {
            Ok(NativeModule::new("Tally")
                .constructor(vec![], |_| Ok(Tally(0)))
                .method("add", vec![ParamType::Int, ParamType::Sink], |t: &mut Tally, args, out| {
                    if let Value::Int(n) = args[0] {
                        t.0 += n;
                    }
                    write!(out, "total {}", t.0).map_err(|e| e.to_string())?;
                    Ok(Value::Int(t.0))
                })
                .static_method("fail", vec![], |_, _| Err("deliberate".to_string()))
                .static_method("announce", vec![ParamType::Sink], |_, out| {
                    write!(out, "via sink;").map_err(|e| e.to_string())?;
                    let mut stdout = std::io::stdout();
                    stdout
                        .write_all(b"Die Summe ist: 7\n")
                        .and_then(|_| stdout.flush())
                        .map_err(|e| e.to_string())?;
                    Ok(Value::Unit)
                })
                .static_method("die", vec![], |_, _| panic!("x")))
        });
        let builder = Builder::new(
            WorkspaceManager::new(root.to_path_buf()).unwrap(),
            Arc::new(toolchain),
            ToolLimits::from(&EngineConfig::default()),
        );
        let source = SourceUnit::new("Tally.src", "class Tally {}", "Tally").unwrap();
        builder.build(&source).unwrap()
    }

    fn temp_root() -> std::path::PathBuf {
        std::env::temp_dir().join(format!("dojobox_invoker_{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_invoke_captures_sink_text() {
        let root = temp_root();
        let mut unit = build(&root);
        let invoker = Invoker::new(1024);
        let ctor = unit.resolve(MemberKind::Constructor, "Tally", &[]).unwrap();
        let add = unit
            .resolve(MemberKind::Method, "add", &[ParamType::Int, ParamType::Sink])
            .unwrap();

        let (obj, _) = invoker.construct(&mut unit, &ctor, &[]).unwrap();
        let result = invoker
            .invoke(&mut unit, &add, Some(&obj), &[Value::Int(7), Value::Sink])
            .unwrap();
        assert_eq!(result.value, Value::Int(7));
        assert_eq!(result.captured, "total 7");
        assert_eq!(result.integrity, OutputIntegrity::Complete);
        drop(unit);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn test_arity_checked_before_call() {
        let root = temp_root();
        let mut unit = build(&root);
        let add = unit
            .resolve(MemberKind::Method, "add", &[ParamType::Int, ParamType::Sink])
            .unwrap();
        let err = Invoker::new(1024)
            .invoke(&mut unit, &add, None, &[Value::Int(1)])
            .unwrap_err();
        assert!(matches!(
            err,
            VerifyError::Invocation {
                failure: InvocationFailure::Arity,
                ..
            }
        ));
        drop(unit);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn test_handle_from_discarded_unit_is_stale() {
        let root = temp_root();
        let mut first = build(&root);
        let fail = first.resolve(MemberKind::Method, "fail", &[]).unwrap();
        drop(first);

        let mut second = build(&root);
        let err = Invoker::new(1024)
            .invoke(&mut second, &fail, None, &[])
            .unwrap_err();
        assert!(matches!(
            err,
            VerifyError::Invocation {
                failure: InvocationFailure::StaleHandle,
                ..
            }
        ));
        drop(second);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn test_target_failure_is_classified() {
        let root = temp_root();
        let mut unit = build(&root);
        let fail = unit.resolve(MemberKind::Method, "fail", &[]).unwrap();
        let err = Invoker::new(1024)
            .invoke(&mut unit, &fail, None, &[])
            .unwrap_err();
        assert!(matches!(
            err,
            VerifyError::Invocation {
                failure: InvocationFailure::TargetFailed,
                ..
            }
        ));
        drop(unit);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn test_construct_rejects_methods() {
        let root = temp_root();
        let mut unit = build(&root);
        let fail = unit.resolve(MemberKind::Method, "fail", &[]).unwrap();
        let err = Invoker::new(1024).construct(&mut unit, &fail, &[]).unwrap_err();
        assert!(matches!(err, VerifyError::Instantiation(_)));
        drop(unit);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn test_process_stdout_is_captured_and_restored() {
        let root = temp_root();
        let mut unit = build(&root);
        let invoker = Invoker::new(1024).with_process_stdout(true);
        let announce = unit
            .resolve(MemberKind::Method, "announce", &[ParamType::Sink])
            .unwrap();
        let die = unit.resolve(MemberKind::Method, "die", &[]).unwrap();
        let fail = unit.resolve(MemberKind::Method, "fail", &[]).unwrap();

        let first = invoker
            .invoke(&mut unit, &announce, None, &[Value::Sink])
            .unwrap();
        assert!(first.captured.starts_with("via sink;"));
        assert!(first.captured.contains("Die Summe ist: 7\n"));

        let err = invoker.invoke(&mut unit, &die, None, &[]).unwrap_err();
        assert!(matches!(
            err,
            VerifyError::Invocation {
                failure: InvocationFailure::TargetFailed,
                ..
            }
        ));

        // fd 1 is back in place once the call returns
        let _ = invoker.invoke(&mut unit, &fail, None, &[]).unwrap_err();
        std::io::stdout().write_all(b"between calls\n").unwrap();
        let second = invoker
            .invoke(&mut unit, &announce, None, &[Value::Sink])
            .unwrap();
        assert!(!second.captured.contains("between calls"));
        assert!(second.captured.contains("Die Summe ist: 7\n"));

        let truncated = Invoker::new(4)
            .with_process_stdout(true)
            .invoke(&mut unit, &announce, None, &[Value::Sink])
            .unwrap();
        assert_eq!(truncated.integrity, OutputIntegrity::Truncated);
        assert!(!truncated.captured.contains("Die Summe ist: 7"));
        drop(unit);
        let _ = std::fs::remove_dir_all(&root);
    }
}
