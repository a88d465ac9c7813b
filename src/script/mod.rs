//! Sandboxed interpreter for server-supplied code.
//!
//! Scripts are a small expression language: `let` bindings, assignments to
//! variables and member paths, JSON literals, arithmetic, comparisons and
//! calls to host builtins. The interpreter can only touch the [`Scope`] it is
//! given and whatever the [`Host`] exposes, so a fully trusted peer is still
//! confined to the channel's own capabilities.

pub mod ast;
mod eval;
pub mod parse;
mod scope;

use serde_json::Value;

pub use ast::Program;
pub use eval::{Host, MAX_VALUE_DEPTH};
pub use parse::{MAX_DEPTH, parse};
pub use scope::Scope;

use eval::Interpreter;

/// Error raised while parsing or running a script.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScriptError {
    #[error("syntax error on line {line}: {message}")]
    Syntax { line: usize, message: String },
    #[error("`{0}` is not defined")]
    Undefined(String),
    #[error("`{0}` is not a function")]
    UnknownFunction(String),
    #[error("`{name}` expects {expected} argument(s), got {got}")]
    Arity { name: String, expected: &'static str, got: usize },
    #[error("type error: {0}")]
    Type(String),
}

/// Run `program` in a throwaway unit attached to `scope`.
///
/// `let` bindings live only as long as the unit; assignments to other names
/// write through to `scope`. The unit is detached before this returns, on
/// success and on failure alike.
///
/// # Errors
///
/// Returns the first [`ScriptError`] raised by the program.
pub fn execute(program: &Program, scope: &mut Scope, host: &mut dyn Host) -> Result<Value, ScriptError> {
    let mut unit = scope.attach();
    let (scope, locals) = unit.parts();
    let result = Interpreter { scope, locals: Some(locals), host }.run(program);
    result
}

/// Run `program` directly in `scope`; `let` bindings persist there.
///
/// # Errors
///
/// Returns the first [`ScriptError`] raised by the program.
pub fn evaluate(program: &Program, scope: &mut Scope, host: &mut dyn Host) -> Result<Value, ScriptError> {
    Interpreter { scope, locals: None, host }.run(program)
}

/// Check a builtin's argument count against `min..=max`.
///
/// # Errors
///
/// Returns [`ScriptError::Arity`] when `args` is outside the range.
pub fn check_arity(name: &str, args: &[Value], min: usize, max: usize, expected: &'static str) -> Result<(), ScriptError> {
    if (min..=max).contains(&args.len()) {
        Ok(())
    } else {
        Err(ScriptError::Arity { name: name.to_owned(), expected, got: args.len() })
    }
}

/// String form of a value as scripts see it: strings bare, everything else JSON.
#[must_use]
pub fn to_text(value: &Value) -> String {
    eval::text(value)
}

/// Script truthiness: `null`, `false`, `0` and `""` are false.
#[must_use]
pub fn is_truthy(value: &Value) -> bool {
    eval::truthy(value)
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
