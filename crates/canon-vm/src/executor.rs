//! The code-execution collaborator

use crate::context::{CallContext, CallOutcome};
use bytes::Bytes;
use canon_storage::StateWriter;

/// Executes code against a state snapshot
pub trait CodeExecutor: Send + Sync {
    /// Run `code` in the context of `ctx.address`
    fn call(&self, ctx: &CallContext, code: &Bytes, state: &mut dyn StateWriter) -> CallOutcome;

    /// Run `init_code`; on success `output` holds the runtime code to deploy
    fn create(
        &self,
        ctx: &CallContext,
        init_code: &Bytes,
        state: &mut dyn StateWriter,
    ) -> CallOutcome;
}

/// Executor for nodes without an interpreter: calls succeed with empty
/// output and creations deploy the init code verbatim. Neither consumes gas.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullExecutor;

impl CodeExecutor for NullExecutor {
    fn call(&self, ctx: &CallContext, _code: &Bytes, _state: &mut dyn StateWriter) -> CallOutcome {
        CallOutcome::success(Bytes::new(), ctx.gas)
    }

    fn create(
        &self,
        ctx: &CallContext,
        init_code: &Bytes,
        _state: &mut dyn StateWriter,
    ) -> CallOutcome {
        CallOutcome::success(init_code.clone(), ctx.gas)
    }
}

type ProgramFn = dyn Fn(&CallContext, &Bytes, &mut dyn StateWriter) -> CallOutcome + Send + Sync;

/// Executor backed by a host closure; creations run the same closure with
/// the init code
pub struct FnExecutor {
    program: Box<ProgramFn>,
}

impl FnExecutor {
    /// Wrap a closure
    pub fn new<F>(program: F) -> Self
    where
        F: Fn(&CallContext, &Bytes, &mut dyn StateWriter) -> CallOutcome + Send + Sync + 'static,
    {
        Self {
            program: Box::new(program),
        }
    }
}

impl std::fmt::Debug for FnExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FnExecutor")
    }
}

impl CodeExecutor for FnExecutor {
    fn call(&self, ctx: &CallContext, code: &Bytes, state: &mut dyn StateWriter) -> CallOutcome {
        (self.program)(ctx, code, state)
    }

    fn create(
        &self,
        ctx: &CallContext,
        init_code: &Bytes,
        state: &mut dyn StateWriter,
    ) -> CallOutcome {
        (self.program)(ctx, init_code, state)
    }
}
