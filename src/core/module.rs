use crate::config::types::Result;
use crate::core::types::{MemberHandle, MemberKind, ObjectRef, ParamType, Value};
use std::io::Write;

/// Capability interface over a loaded compiled unit.
///
/// The rest of the engine depends only on this trait; backends decide how
/// members are found and called (in-process closures, a probe subprocess).
pub trait CompiledModule: Send {
    /// Type the module was loaded for.
    fn type_name(&self) -> &str;

    /// Identity of the compiled unit; stamped on every handle and object it hands out.
    fn unit_id(&self) -> &str;

    /// Resolve a member by exact name and ordered parameter types.
    ///
    /// A missing member is `VerifyError::MemberNotFound`.
    fn resolve(&mut self, kind: MemberKind, name: &str, params: &[ParamType])
        -> Result<MemberHandle>;

    /// Call a resolved member. Arity has already been checked by the caller.
    ///
    /// Any text the member writes, through a `Value::Sink` argument or its own
    /// output channel, is forwarded to `sink`.
    fn invoke(
        &mut self,
        handle: &MemberHandle,
        receiver: Option<&ObjectRef>,
        args: &[Value],
        sink: &mut dyn Write,
    ) -> Result<Value>;
}
