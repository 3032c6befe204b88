//! Executable values.
//!
//! A [`Function`] wraps a main [`Proto`] and runs it with a compact
//! tree-walking evaluator. Each call gets a fresh global environment holding
//! the builtins; there are no metatables or coroutines.

mod builtins;
mod interp;
mod value;

pub use interp::Runtime;
pub use value::{
    Callable, Closure, Native, NativeFn, Table, TableRef, Value, number_to_string, str_to_number,
};

use crate::bytecode::{self, LoadError};
use crate::proto::Proto;
use std::io::Write;
use std::sync::Arc;

/// Calls nested deeper than this fail with [`RuntimeError::StackOverflow`].
///
/// The interpreter recurses on the native stack, so this is what bounds its
/// stack use. A few hundred kilobytes per level is possible in debug builds;
/// run deep recursion on a thread with a large stack.
pub const MAX_CALL_DEPTH: usize = 200;

/// Error raised while running a function.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    /// An error with its `chunk:line:` position attached.
    #[error("{0}")]
    Error(String),

    /// Raised by a builtin or table operation without a position. The runtime
    /// positions it before it leaves a call.
    #[error("{0}")]
    Unlocated(String),

    #[error("stack overflow")]
    StackOverflow,
}

impl RuntimeError {
    pub fn new(message: impl Into<String>) -> Self {
        RuntimeError::Unlocated(message.into())
    }

    pub fn message(&self) -> String {
        self.to_string()
    }
}

/// A loaded, callable chunk.
#[derive(Debug, Clone)]
pub struct Function {
    proto: Arc<Proto>,
}

impl Function {
    pub fn new(proto: Proto) -> Self {
        Self {
            proto: Arc::new(proto),
        }
    }

    /// Load a binary dump.
    pub fn load(bytes: &[u8]) -> Result<Self, LoadError> {
        bytecode::decode(bytes).map(Function::new)
    }

    pub fn proto(&self) -> &Proto {
        &self.proto
    }

    /// Binary dump of the main prototype.
    pub fn dump(&self) -> Result<Vec<u8>, LoadError> {
        bytecode::encode(&self.proto)
    }

    /// Call with `print` writing to stdout.
    pub fn call(&self, args: Vec<Value>) -> Result<Vec<Value>, RuntimeError> {
        let mut out = std::io::stdout().lock();
        self.call_with_output(args, &mut out)
    }

    /// Call with `print` writing to `out`.
    pub fn call_with_output(
        &self,
        args: Vec<Value>,
        out: &mut dyn Write,
    ) -> Result<Vec<Value>, RuntimeError> {
        let proto = Arc::clone(&self.proto);
        let mut runtime = Runtime::new(&proto.source, out);
        runtime.run_main(&proto, args)
    }
}
