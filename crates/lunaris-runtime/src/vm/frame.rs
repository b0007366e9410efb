//! Call frame implementation for function calls

use crate::api::native::NativeFunctionRef;
use crate::closure::{ClosureRef, ValueCell};
use crate::error::{RuntimeResult, ScriptError};
use crate::value::Value;
use bitflags::bitflags;

bitflags! {
    /// Per-frame call flags
    pub struct FrameFlags: u8 {
        /// Called with method syntax; the receiver is the first argument
        const METHOD_CALL = 0b0001;
        /// Replaced the caller's frame
        const TAIL_CALL = 0b0010;
        /// Outermost frame of one execution loop; returning from it leaves the loop
        const ENTRY_POINT = 0b0100;
        /// Native frame kept alive while its tail call runs; the call's
        /// result completes this frame
        const AWAITING = 0b1000;
    }
}

/// Typed post-processing of a metamethod call's result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostReturn {
    /// First value of the result
    Scalar,
    /// Truthiness of the result
    ToBool,
    /// Negated truthiness (`a <= b` computed as `not (b < a)`)
    NegateBool,
    /// `__len` result, which must be a number
    Length,
    /// Result is dropped (`__newindex`)
    Discard,
}

impl PostReturn {
    /// `None` means nothing is pushed
    pub fn apply(self, value: Value) -> RuntimeResult<Option<Value>> {
        Ok(match self {
            PostReturn::Scalar => Some(value.to_storable()),
            PostReturn::ToBool => Some(Value::Boolean(value.cast_to_bool())),
            PostReturn::NegateBool => Some(Value::Boolean(!value.cast_to_bool())),
            PostReturn::Length => match value.to_scalar().cast_to_number() {
                Some(n) => Some(Value::Number(n.floor())),
                None => return Err(ScriptError::length_not_number().into()),
            },
            PostReturn::Discard => None,
        })
    }
}

/// What happens to a frame's result before it reaches the caller
#[derive(Debug, Clone)]
pub enum Continuation {
    /// Pass the result to a native function; its result replaces it
    Native(NativeFunctionRef),
    Post(PostReturn),
}

/// Optional per-call hooks
#[derive(Debug, Clone, Default)]
pub struct Handlers {
    pub continuation: Option<Continuation>,
    pub error_handler: Option<NativeFunctionRef>,
    pub before_unwind: Option<Value>,
}

impl Handlers {
    pub fn post(post: PostReturn) -> Self {
        Self {
            continuation: Some(Continuation::Post(post)),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.continuation.is_none() && self.error_handler.is_none() && self.before_unwind.is_none()
    }
}

/// Call frame for function calls
///
/// Each call, script or native, creates a new frame that tracks:
/// - Where the callee's temporaries start on the value stack (`base_pointer`)
/// - Where to continue in the caller (`return_address`)
/// - The frame's local cells, allocated by `BeginFn`
///
/// ## Stack Layout Example
///
/// ```text
/// Value stack with two frames (main called "add"):
///
/// [tmp][tmp] | [tmp]
///  ^           ^
///  main base   add base
/// ```
///
/// Locals live in cells owned by the frame rather than on the value stack, so
/// closures can capture them.
#[derive(Debug)]
pub struct CallFrame {
    pub base_pointer: usize,
    /// Absent for native frames
    pub closure: Option<ClosureRef>,
    /// Native function running in this frame
    pub native: Option<NativeFunctionRef>,
    pub return_address: usize,
    pub locals: Vec<ValueCell>,
    /// Arguments waiting for the `Args` instruction
    pub pending_args: Vec<Value>,
    pub handlers: Handlers,
    pub flags: FrameFlags,
}

impl CallFrame {
    pub fn new(
        base_pointer: usize,
        return_address: usize,
        flags: FrameFlags,
        handlers: Handlers,
    ) -> Self {
        Self {
            base_pointer,
            closure: None,
            native: None,
            return_address,
            locals: Vec::new(),
            pending_args: Vec::new(),
            handlers,
            flags,
        }
    }

    pub fn is_entry_point(&self) -> bool {
        self.flags.contains(FrameFlags::ENTRY_POINT)
    }

    pub fn error_handler(&self) -> Option<&NativeFunctionRef> {
        self.handlers.error_handler.as_ref()
    }

    /// Function name for tracebacks
    pub fn function_name(&self) -> &str {
        match (&self.closure, &self.native) {
            (Some(c), _) => c.display_name(),
            (None, Some(n)) => n.name(),
            (None, None) => "?",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScriptErrorKind;

    #[test]
    fn test_post_return_length_requires_number() {
        assert_eq!(
            PostReturn::Length.apply(Value::from("3")).unwrap(),
            Some(Value::from(3.0))
        );
        let err = PostReturn::Length.apply(Value::from(true)).unwrap_err();
        assert_eq!(err.as_script().map(|e| e.kind()), Some(ScriptErrorKind::Length));
    }

    #[test]
    fn test_post_return_bools() {
        assert_eq!(
            PostReturn::NegateBool.apply(Value::Nil).unwrap(),
            Some(Value::Boolean(true))
        );
        assert_eq!(
            PostReturn::ToBool.apply(Value::from(0.0)).unwrap(),
            Some(Value::Boolean(true))
        );
        assert_eq!(PostReturn::Discard.apply(Value::from(1.0)).unwrap(), None);
    }

    #[test]
    fn test_scalar_reduces_tuple() {
        let t = Value::tuple(vec![Value::from(1.0), Value::from(2.0)]);
        assert_eq!(PostReturn::Scalar.apply(t).unwrap(), Some(Value::from(1.0)));
    }
}
