/// In-process compiled modules
///
/// A `NativeModule` is a table of typed closures registered under a type name.
/// It is what the native toolchain "loads" for a submission, and what tests use
/// to stand in for a JVM class.
use crate::config::types::{InvocationFailure, Result, VerifyError};
use crate::core::module::CompiledModule;
use crate::core::types::{signature, MemberHandle, MemberKind, ObjectRef, ParamType, Value};
use crate::utils::output::panic_message;
use std::any::Any;
use std::io::Write;
use std::panic::{self, AssertUnwindSafe};

type Outcome<T> = std::result::Result<T, String>;
type ConstructorFn = Box<dyn Fn(&[Value]) -> Outcome<Box<dyn Any + Send>> + Send>;
/// `None` when the receiver is not the type the method was registered on.
type MethodFn =
    Box<dyn Fn(&mut (dyn Any + Send), &[Value], &mut dyn Write) -> Option<Outcome<Value>> + Send>;
type StaticFn = Box<dyn Fn(&[Value], &mut dyn Write) -> Outcome<Value> + Send>;

enum Body {
    Constructor(ConstructorFn),
    Method(MethodFn),
    Static(StaticFn),
}

struct NativeMember {
    kind: MemberKind,
    name: String,
    params: Vec<ParamType>,
    body: Body,
}

/// Member table plus the objects created through it
pub struct NativeModule {
    type_name: String,
    unit_id: String,
    members: Vec<NativeMember>,
    objects: Vec<Box<dyn Any + Send>>,
}

impl NativeModule {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            unit_id: String::new(),
            members: Vec::new(),
            objects: Vec::new(),
        }
    }

    /// Bind the module to the compiled unit that loaded it.
    pub fn with_unit_id(mut self, unit_id: impl Into<String>) -> Self {
        self.unit_id = unit_id.into();
        self
    }

    /// Register a constructor producing a `T`.
    pub fn constructor<T, F>(mut self, params: Vec<ParamType>, f: F) -> Self
    where
        T: Any + Send,
        F: Fn(&[Value]) -> Outcome<T> + Send + 'static,
    {
        let name = self.type_name.clone();
        self.members.push(NativeMember {
            kind: MemberKind::Constructor,
            name,
            params,
            body: Body::Constructor(Box::new(move |args| {
                f(args).map(|obj| Box::new(obj) as Box<dyn Any + Send>)
            })),
        });
        self
    }

    /// Register an instance method on objects of type `T`.
    pub fn method<T, F>(mut self, name: &str, params: Vec<ParamType>, f: F) -> Self
    where
        T: Any + Send,
        F: Fn(&mut T, &[Value], &mut dyn Write) -> Outcome<Value> + Send + 'static,
    {
        self.members.push(NativeMember {
            kind: MemberKind::Method,
            name: name.to_string(),
            params,
            body: Body::Method(Box::new(move |receiver, args, out| {
                receiver
                    .downcast_mut::<T>()
                    .map(|target| f(target, args, out))
            })),
        });
        self
    }

    /// Register a method that needs no receiver.
    pub fn static_method<F>(mut self, name: &str, params: Vec<ParamType>, f: F) -> Self
    where
        F: Fn(&[Value], &mut dyn Write) -> Outcome<Value> + Send + 'static,
    {
        self.members.push(NativeMember {
            kind: MemberKind::Method,
            name: name.to_string(),
            params,
            body: Body::Static(Box::new(f)),
        });
        self
    }

    /// Number of objects created so far
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    fn check_args(member: &NativeMember, args: &[Value]) -> Result<()> {
        if args.len() != member.params.len() {
            return Err(VerifyError::invocation(
                InvocationFailure::Arity,
                format!(
                    "{} expects {} argument(s), got {}",
                    signature(&member.name, &member.params),
                    member.params.len(),
                    args.len()
                ),
            ));
        }
        for (index, (arg, param)) in args.iter().zip(&member.params).enumerate() {
            if !arg.fits(param) {
                return Err(VerifyError::invocation(
                    InvocationFailure::ArgumentType,
                    format!(
                        "argument {} is {} but {} expects {}",
                        index,
                        arg.type_label(),
                        member.name,
                        param
                    ),
                ));
            }
        }
        Ok(())
    }
}

impl CompiledModule for NativeModule {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn unit_id(&self) -> &str {
        &self.unit_id
    }

    fn resolve(
        &mut self,
        kind: MemberKind,
        name: &str,
        params: &[ParamType],
    ) -> Result<MemberHandle> {
        let slot = self.members.iter().position(|m| {
            m.kind == kind
                && m.params.as_slice() == params
                && (kind == MemberKind::Constructor || m.name == name)
        });
        match slot {
            Some(slot) => {
                let member = &self.members[slot];
                Ok(MemberHandle::new(
                    self.unit_id.clone(),
                    slot,
                    kind,
                    member.name.clone(),
                    member.params.clone(),
                ))
            }
            None => Err(VerifyError::MemberNotFound(format!(
                "{} {} on {}",
                kind.as_str(),
                signature(name, params),
                self.type_name
            ))),
        }
    }

    fn invoke(
        &mut self,
        handle: &MemberHandle,
        receiver: Option<&ObjectRef>,
        args: &[Value],
        sink: &mut dyn Write,
    ) -> Result<Value> {
        if handle.unit_id() != self.unit_id {
            return Err(VerifyError::invocation(
                InvocationFailure::StaleHandle,
                format!("{} was resolved on another unit", handle.signature()),
            ));
        }
        let Some(member) = self.members.get(handle.slot()) else {
            return Err(VerifyError::invocation(
                InvocationFailure::StaleHandle,
                format!("no member in slot {}", handle.slot()),
            ));
        };
        Self::check_args(member, args)?;

        match &member.body {
            Body::Constructor(ctor) => {
                let created = panic::catch_unwind(AssertUnwindSafe(|| ctor(args)))
                    .map_err(|payload| panic_message(payload.as_ref()))
                    .and_then(|outcome| outcome)
                    .map_err(VerifyError::Instantiation)?;
                let id = self.objects.len() as u64;
                self.objects.push(created);
                Ok(Value::Object(ObjectRef::new(
                    self.unit_id.clone(),
                    id,
                    self.type_name.clone(),
                )))
            }
            Body::Method(method) => {
                let Some(receiver) = receiver else {
                    return Err(VerifyError::invocation(
                        InvocationFailure::Unreachable,
                        format!("{} needs a receiver", handle.signature()),
                    ));
                };
                if receiver.unit_id() != self.unit_id {
                    return Err(VerifyError::invocation(
                        InvocationFailure::StaleHandle,
                        format!("receiver {}#{} belongs to another unit", receiver.class(), receiver.id()),
                    ));
                }
                let Some(target) = self.objects.get_mut(receiver.id() as usize) else {
                    return Err(VerifyError::invocation(
                        InvocationFailure::Unreachable,
                        format!("no object #{}", receiver.id()),
                    ));
                };
                let called = panic::catch_unwind(AssertUnwindSafe(|| {
                    method(target.as_mut(), args, sink)
                }));
                match called {
                    Ok(Some(Ok(value))) => Ok(value),
                    Ok(Some(Err(msg))) => {
                        Err(VerifyError::invocation(InvocationFailure::TargetFailed, msg))
                    }
                    Ok(None) => Err(VerifyError::invocation(
                        InvocationFailure::ArgumentType,
                        format!("receiver is not a valid {} instance", receiver.class()),
                    )),
                    Err(payload) => Err(VerifyError::invocation(
                        InvocationFailure::TargetFailed,
                        panic_message(payload.as_ref()),
                    )),
                }
            }
            Body::Static(f) => panic::catch_unwind(AssertUnwindSafe(|| f(args, sink)))
                .map_err(|payload| panic_message(payload.as_ref()))
                .and_then(|outcome| outcome)
                .map_err(|msg| VerifyError::invocation(InvocationFailure::TargetFailed, msg)),
        }
    }
}
