//! Coroutines
//!
//! Every coroutine owns a [`Processor`]; resuming one runs that processor's
//! outermost loop until the body returns, yields or is force-suspended by the
//! auto-yield budget. The runtime's main coroutine is the same type in the
//! `Main` state: it can be entered, never yielded out of.
//!
//! ```text
//!  NotStarted ──resume──► Running ──return/error──► Dead
//!                           │  ▲
//!                   yield   │  │ resume(args)
//!                           ▼  │
//!                         Suspended
//!
//!  Running ──auto-yield──► ForceSuspended ──resume()──► Running
//! ```

use crate::api::native::NativeFunctionRef;
use crate::error::{ContractViolation, RuntimeResult, ScriptError};
use crate::shared::RuntimeShared;
use crate::value::Value;
use crate::vm::{LoopExit, Processor};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoroutineState {
    /// The runtime's own coroutine; never suspends
    Main,
    NotStarted,
    /// Yielded by script request
    Suspended,
    /// Suspended by the auto-yield budget; resumed without arguments
    ForceSuspended,
    Running,
    Dead,
}

impl CoroutineState {
    pub fn is_suspended(self) -> bool {
        matches!(
            self,
            CoroutineState::NotStarted | CoroutineState::Suspended | CoroutineState::ForceSuspended
        )
    }
}

/// What a coroutine runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoroutineKind {
    /// Script function, may yield
    Script,
    /// Host callback run to completion on first resume
    NativeCallback,
}

pub struct Coroutine {
    state: Cell<CoroutineState>,
    kind: CoroutineKind,
    processor: RefCell<Processor>,
    entry: Value,
    ref_id: u64,
}

/// Shared handle to a [`Coroutine`]
#[derive(Clone)]
pub struct CoroutineRef(Rc<Coroutine>);

impl CoroutineRef {
    pub(crate) fn main(shared: &Rc<RuntimeShared>) -> Self {
        Self::build(shared, CoroutineState::Main, CoroutineKind::Script, Value::Nil, false)
    }

    /// New coroutine over a script function (or any callable value)
    pub fn new(shared: &Rc<RuntimeShared>, function: Value) -> Self {
        Self::build(shared, CoroutineState::NotStarted, CoroutineKind::Script, function, true)
    }

    /// New coroutine that runs a host callback
    pub fn from_native(shared: &Rc<RuntimeShared>, callback: NativeFunctionRef) -> Self {
        Self::build(
            shared,
            CoroutineState::NotStarted,
            CoroutineKind::NativeCallback,
            Value::NativeFunction(callback),
            true,
        )
    }

    fn build(
        shared: &Rc<RuntimeShared>,
        state: CoroutineState,
        kind: CoroutineKind,
        entry: Value,
        can_yield: bool,
    ) -> Self {
        CoroutineRef(Rc::new(Coroutine {
            state: Cell::new(state),
            kind,
            processor: RefCell::new(Processor::new(Rc::clone(shared), can_yield)),
            entry,
            ref_id: shared.ids().next_id(),
        }))
    }

    pub fn state(&self) -> CoroutineState {
        self.0.state.get()
    }

    pub fn kind(&self) -> CoroutineKind {
        self.0.kind
    }

    pub fn is_main(&self) -> bool {
        self.state() == CoroutineState::Main
    }

    pub fn ref_id(&self) -> u64 {
        self.0.ref_id
    }

    pub fn ptr_eq(&self, other: &CoroutineRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Override the auto-yield budget (`None` or zero disables it)
    pub fn set_auto_yield(&self, budget: Option<u64>) -> RuntimeResult<()> {
        let mut processor = self
            .0
            .processor
            .try_borrow_mut()
            .map_err(|_| ContractViolation::ResumeNotSuspended)?;
        processor.set_auto_yield(budget);
        Ok(())
    }

    /// Deepest call-frame stack this coroutine has reached (0 while running)
    pub fn peak_frame_depth(&self) -> usize {
        self.0
            .processor
            .try_borrow()
            .map_or(0, |p| p.peak_frame_depth())
    }

    pub(crate) fn processor(&self) -> &RefCell<Processor> {
        &self.0.processor
    }

    /// Resume until the coroutine returns, yields or is force-suspended
    ///
    /// Returns the yielded or returned value; a force-suspension returns
    /// Void. Check [`CoroutineRef::state`] to tell the cases apart.
    ///
    /// Resuming while `max_native_nesting` coroutines are already in flight
    /// raises a catchable stack overflow.
    pub fn resume(&self, args: Vec<Value>) -> RuntimeResult<Value> {
        let previous = self.state();
        match previous {
            CoroutineState::Dead => return Err(ContractViolation::ResumeDead.into()),
            CoroutineState::Running | CoroutineState::Main => {
                return Err(ContractViolation::ResumeNotSuspended.into())
            }
            CoroutineState::ForceSuspended if !args.is_empty() => {
                return Err(ContractViolation::ForceSuspendedWithArgs.into())
            }
            _ => {}
        }

        let mut processor = self
            .0
            .processor
            .try_borrow_mut()
            .map_err(|_| ContractViolation::ResumeNotSuspended)?;
        let shared = Rc::clone(processor.shared());
        if shared.coroutine_depth() >= shared.config().max_native_nesting {
            return Err(ScriptError::stack_overflow().into());
        }

        shared.push_coroutine(self.clone());
        self.0.state.set(CoroutineState::Running);
        debug!(coroutine = self.ref_id(), from = ?previous, "resuming coroutine");

        let result = match (self.0.kind, previous) {
            (CoroutineKind::NativeCallback, _) => processor
                .call(self.0.entry.clone(), args)
                .map(LoopExit::Returned),
            (CoroutineKind::Script, CoroutineState::NotStarted) => {
                processor.start(self.0.entry.clone(), args)
            }
            (CoroutineKind::Script, CoroutineState::Suspended) => {
                processor.resume_yielded(Value::tuple(args))
            }
            (CoroutineKind::Script, _) => processor.resume_forced(),
        };

        shared.pop_coroutine();
        drop(processor);

        let (state, result) = match result {
            Ok(LoopExit::Returned(value)) => (CoroutineState::Dead, Ok(value)),
            Ok(LoopExit::Yielded(value)) => (CoroutineState::Suspended, Ok(value)),
            Ok(LoopExit::ForceYielded) => (CoroutineState::ForceSuspended, Ok(Value::Void)),
            Err(err) => (CoroutineState::Dead, Err(err)),
        };
        debug!(coroutine = self.ref_id(), to = ?state, "coroutine stopped");
        self.0.state.set(state);
        result
    }
}

impl fmt::Debug for CoroutineRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoroutineRef")
            .field("id", &self.ref_id())
            .field("state", &self.state())
            .field("kind", &self.kind())
            .finish()
    }
}
