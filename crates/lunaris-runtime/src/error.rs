//! Runtime error types
//!
//! Errors fall into four families:
//! - [`ScriptError`]: raised by script code or by operators on bad operands.
//!   The only family an in-script handler (`pcall`/`xpcall`) can recover from.
//! - [`ContractViolation`]: the host broke a rule of the embedding contract
//!   (resuming a dead coroutine, yielding from the main coroutine, ...).
//! - `Internal`: malformed bytecode or a broken processor invariant.
//! - `Terminated`: the host cancelled execution through a token.

use crate::api::conversion::ConversionError;
use crate::bytecode::{SourceLocation, ValidationError};
use crate::value::Value;
use std::fmt;
use thiserror::Error;

/// Result alias used across the runtime
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Top-level runtime error
#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    /// Script-level error, catchable by in-script handlers
    #[error(transparent)]
    Script(#[from] ScriptError),

    /// Host contract violation, never catchable in-script
    #[error(transparent)]
    Contract(#[from] ContractViolation),

    /// Malformed bytecode or broken processor invariant
    #[error("internal error: {0}")]
    Internal(String),

    /// Cooperative cancellation requested by the host
    #[error("script execution terminated by host request")]
    Terminated,
}

impl RuntimeError {
    pub fn internal(msg: impl Into<String>) -> Self {
        RuntimeError::Internal(msg.into())
    }

    /// Whether an in-script error handler may intercept this error
    pub fn is_catchable(&self) -> bool {
        matches!(self, RuntimeError::Script(_))
    }

    pub fn as_script(&self) -> Option<&ScriptError> {
        match self {
            RuntimeError::Script(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_contract(&self) -> Option<&ContractViolation> {
        match self {
            RuntimeError::Contract(e) => Some(e),
            _ => None,
        }
    }
}

impl From<Vec<ValidationError>> for RuntimeError {
    fn from(errors: Vec<ValidationError>) -> Self {
        let listing: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        RuntimeError::Internal(format!("invalid bytecode: {}", listing.join("; ")))
    }
}

impl From<ConversionError> for RuntimeError {
    fn from(err: ConversionError) -> Self {
        RuntimeError::Contract(ContractViolation::Conversion(err))
    }
}

impl From<ConversionError> for ScriptError {
    fn from(err: ConversionError) -> Self {
        ScriptError::new(ScriptErrorKind::Conversion, err.to_string())
    }
}

/// Host contract violations
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ContractViolation {
    #[error("cannot resume dead coroutine")]
    ResumeDead,

    #[error("cannot resume non-suspended coroutine")]
    ResumeNotSuspended,

    #[error("cannot resume a force-suspended coroutine with arguments")]
    ForceSuspendedWithArgs,

    #[error("attempt to yield from the main coroutine")]
    YieldFromMain,

    #[error("attempt to yield across a native call boundary")]
    CannotYield,

    #[error("processor entered from a thread other than the one it is bound to")]
    CrossThread,

    #[error("runtime is already executing; call back into scripts through the execution context")]
    Reentrancy,

    #[error(transparent)]
    Conversion(#[from] ConversionError),
}

/// Classification of a script-level error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptErrorKind {
    /// Arithmetic on non-coercible operands
    Arithmetic,
    /// Ordering comparison between incompatible operands
    Comparison,
    /// Concatenation of a non-string operand
    Concat,
    /// Length of a value without one, or a non-numeric `__len` result
    Length,
    /// Indexing a non-indexable value, nil/NaN table keys, missing fields
    Index,
    /// `__index` / `__newindex` chain longer than the hop limit
    LoopInIndex,
    /// Calling a non-callable value
    Call,
    /// Argument validation failure in a native function
    BadArgument,
    /// Call depth or native nesting limit exceeded
    StackOverflow,
    /// Raised explicitly by script code (`error`)
    User,
    /// Value conversion failure inside a native function
    Conversion,
}

/// A catchable script-level error
///
/// The message is kept undecorated; [`ScriptError::decorated_message`] prefixes
/// the source location once the processor attached one.
#[derive(Debug, Clone)]
pub struct ScriptError {
    kind: ScriptErrorKind,
    message: String,
    payload: Option<Value>,
    location: Option<SourceLocation>,
    traceback: Vec<String>,
    /// Set once a handler replaced the message; no further decoration
    frozen: bool,
}

impl ScriptError {
    pub fn new(kind: ScriptErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            payload: None,
            location: None,
            traceback: Vec::new(),
            frozen: false,
        }
    }

    /// Error raised by script code with an arbitrary error object
    pub fn user(payload: Value) -> Self {
        let message = match &payload {
            Value::String(s) => s.to_string(),
            other => match other.cast_to_string() {
                Some(s) => s.to_string(),
                None => format!("(error object is a {} value)", other.type_name()),
            },
        };
        let mut err = Self::new(ScriptErrorKind::User, message);
        if !matches!(payload, Value::String(_)) {
            err.payload = Some(payload);
        }
        err
    }

    pub fn arithmetic(symbol: &str, left: &Value, right: &Value) -> Self {
        let bad = if left.cast_to_number().is_none() {
            left
        } else {
            right
        };
        Self::new(
            ScriptErrorKind::Arithmetic,
            format!(
                "attempt to perform arithmetic on a {} value ({} {} {})",
                bad.type_name(),
                left.type_name(),
                symbol,
                right.type_name()
            ),
        )
    }

    /// Unary minus on a non-numeric operand
    pub fn negate(operand: &Value) -> Self {
        Self::new(
            ScriptErrorKind::Arithmetic,
            format!("attempt to perform arithmetic on a {} value", operand.type_name()),
        )
    }

    pub fn comparison(left: &Value, right: &Value) -> Self {
        let (l, r) = (left.type_name(), right.type_name());
        let message = if l == r {
            format!("attempt to compare two {} values", l)
        } else {
            format!("attempt to compare {} with {}", l, r)
        };
        Self::new(ScriptErrorKind::Comparison, message)
    }

    pub fn concat(operand: &Value) -> Self {
        Self::new(
            ScriptErrorKind::Concat,
            format!("attempt to concatenate a {} value", operand.type_name()),
        )
    }

    pub fn length(operand: &Value) -> Self {
        Self::new(
            ScriptErrorKind::Length,
            format!("attempt to get length of a {} value", operand.type_name()),
        )
    }

    pub fn length_not_number() -> Self {
        Self::new(ScriptErrorKind::Length, "length is not a number")
    }

    pub fn index(operand: &Value) -> Self {
        Self::new(
            ScriptErrorKind::Index,
            format!("attempt to index a {} value", operand.type_name()),
        )
    }

    pub fn loop_in_index(write: bool) -> Self {
        Self::new(
            ScriptErrorKind::LoopInIndex,
            if write { "loop in newindex" } else { "loop in index" },
        )
    }

    pub fn call(callee: &Value) -> Self {
        Self::new(
            ScriptErrorKind::Call,
            format!("attempt to call a {} value", callee.type_name()),
        )
    }

    pub fn bad_argument(arg_index: usize, func_name: &str, msg: impl fmt::Display) -> Self {
        Self::new(
            ScriptErrorKind::BadArgument,
            format!("bad argument #{} to '{}' ({})", arg_index, func_name, msg),
        )
    }

    pub fn stack_overflow() -> Self {
        Self::new(ScriptErrorKind::StackOverflow, "stack overflow")
    }

    pub fn kind(&self) -> ScriptErrorKind {
        self.kind
    }

    /// Message without location prefix
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn location(&self) -> Option<&SourceLocation> {
        self.location.as_ref()
    }

    pub fn traceback(&self) -> &[String] {
        &self.traceback
    }

    /// Attach a source location unless one is already present.
    ///
    /// Errors carrying a non-string error object are never decorated.
    pub fn with_location(mut self, location: Option<SourceLocation>) -> Self {
        if self.location.is_none() && self.payload.is_none() && !self.frozen {
            self.location = location;
        }
        self
    }

    /// Never decorate this error with a source location
    pub fn without_location(mut self) -> Self {
        self.frozen = true;
        self
    }

    pub(crate) fn has_traceback(&self) -> bool {
        !self.traceback.is_empty()
    }

    pub(crate) fn set_traceback(&mut self, traceback: Vec<String>) {
        self.traceback = traceback;
    }

    /// `chunk:line: message`, or the bare message without a location
    pub fn decorated_message(&self) -> String {
        match &self.location {
            Some(loc) => format!("{}:{}: {}", loc.chunk, loc.line, self.message),
            None => self.message.clone(),
        }
    }

    /// The value an in-script handler receives
    pub fn error_value(&self) -> Value {
        match &self.payload {
            Some(v) => v.clone(),
            None => Value::from(self.decorated_message()),
        }
    }

    /// Replace the propagating error object (pre-unwind decorators)
    pub(crate) fn replace_value(&mut self, value: Value) {
        self.frozen = true;
        if let Some(s) = value.cast_to_string() {
            self.message = s.to_string();
            self.location = None;
            self.payload = None;
        } else {
            self.payload = Some(value);
        }
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.decorated_message())
    }
}

impl std::error::Error for ScriptError {}
