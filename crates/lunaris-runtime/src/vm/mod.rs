//! Stack-based bytecode processor
//!
//! One [`Processor`] per coroutine. Each owns a value stack and a call-frame
//! stack; all processors of a runtime share one [`RuntimeShared`].
//!
//! The per-instruction step returns a [`StepOutcome`] and the driver loop
//! matches on it:
//!
//! ```text
//!   Continue ──► poll cancellation / auto-yield ──► step()
//!   TailCall ──► exec_call() in place of the finished native
//!   Yield    ──► leave the loop (coroutine suspends)
//!   Return   ──► leave the loop (entry frame returned)
//! ```
//!
//! Native functions re-enter the processor through [`Processor::call`],
//! which runs a nested loop above the current frames. Nested loops can never
//! yield.

mod call;
mod dispatch;
mod frame;
mod index;
mod ops;
mod unwind;

pub use frame::{CallFrame, Continuation, FrameFlags, Handlers, PostReturn};

use crate::api::native::TailCallRequest;
use crate::bytecode::{ByteCode, SourceLocation};
use crate::error::{ContractViolation, RuntimeError, RuntimeResult, ScriptError};
use crate::shared::RuntimeShared;
use crate::value::Value;
use std::rc::Rc;
use std::thread::{self, ThreadId};
use tracing::debug;

/// Result of one dispatch step
#[derive(Debug)]
pub(crate) enum StepOutcome {
    Continue,
    /// Call `request` in place of a finished native frame (or continuation)
    TailCall {
        request: TailCallRequest,
        flags: FrameFlags,
        return_address: usize,
    },
    Yield(Value),
    ForceYield,
    Return(Value),
}

/// How an execution loop ended
#[derive(Debug)]
pub(crate) enum LoopExit {
    Returned(Value),
    Yielded(Value),
    ForceYielded,
}

/// A metamethod (or other hook) call an operation still has to make
#[derive(Debug)]
pub(crate) struct PendingCall {
    pub function: Value,
    pub args: Vec<Value>,
    pub then: PostReturn,
}

/// Either a final value or the call that produces it
#[derive(Debug)]
pub(crate) enum Resolved {
    Value(Value),
    Call(PendingCall),
}

impl Resolved {
    fn call(function: Value, args: Vec<Value>, then: PostReturn) -> Self {
        Resolved::Call(PendingCall {
            function,
            args,
            then,
        })
    }
}

/// Bytecode processor state
pub struct Processor {
    shared: Rc<RuntimeShared>,
    stack: Vec<Value>,
    frames: Vec<CallFrame>,
    ip: usize,
    code: Option<Rc<ByteCode>>,
    /// Number of execution loops currently running on this processor
    nesting: usize,
    /// False for the main processor
    can_yield: bool,
    owner: Option<ThreadId>,
    auto_yield: Option<u64>,
    executed: u64,
    /// Native frame that yielded; completed by the resume value
    yielded_frame: Option<CallFrame>,
    peak_frames: usize,
}

impl Processor {
    pub fn new(shared: Rc<RuntimeShared>, can_yield: bool) -> Self {
        let capacity = shared.config().stack_capacity;
        let auto_yield = if can_yield {
            shared.config().auto_yield
        } else {
            None
        };
        Self {
            shared,
            stack: Vec::with_capacity(capacity),
            frames: Vec::new(),
            ip: 0,
            code: None,
            nesting: 0,
            can_yield,
            owner: None,
            auto_yield,
            executed: 0,
            yielded_frame: None,
            peak_frames: 0,
        }
    }

    pub fn shared(&self) -> &Rc<RuntimeShared> {
        &self.shared
    }

    pub fn frame_depth(&self) -> usize {
        self.frames.len()
    }

    /// Deepest frame stack seen so far
    pub fn peak_frame_depth(&self) -> usize {
        self.peak_frames
    }

    pub fn stack_len(&self) -> usize {
        self.stack.len()
    }

    /// Instruction budget between forced suspensions (zero disables)
    pub fn set_auto_yield(&mut self, budget: Option<u64>) {
        self.auto_yield = budget.filter(|&n| n > 0);
        self.executed = 0;
    }

    /// Whether a native function running now may yield
    pub fn is_yieldable(&self) -> bool {
        self.can_yield && self.nesting == 1
    }

    /// Location of the instruction being executed
    pub fn current_location(&self) -> Option<SourceLocation> {
        self.code.as_ref()?.location(self.ip.checked_sub(1)?)
    }

    fn check_thread(&mut self) -> RuntimeResult<()> {
        let current = thread::current().id();
        match self.owner {
            Some(owner) if owner != current => Err(ContractViolation::CrossThread.into()),
            Some(_) => Ok(()),
            None => {
                self.owner = Some(current);
                Ok(())
            }
        }
    }

    // ========================================================================
    // Entry points
    // ========================================================================

    /// Call `function` and run to completion in a nested loop
    pub(crate) fn call(&mut self, function: Value, args: Vec<Value>) -> RuntimeResult<Value> {
        self.check_thread()?;
        if self.nesting >= self.shared.config().max_native_nesting {
            return Err(ScriptError::stack_overflow().into());
        }

        let saved_ip = self.ip;
        let saved_code = self.code.clone();
        let floor = self.frames.len();
        let stack_floor = self.stack.len();

        self.nesting += 1;
        let first = self.exec_call(function, args, FrameFlags::ENTRY_POINT, saved_ip, Handlers::default());
        let result = self.run(first, floor);
        self.nesting -= 1;

        self.ip = saved_ip;
        self.code = saved_code;

        match result {
            Ok(LoopExit::Returned(value)) => Ok(value),
            Ok(LoopExit::Yielded(_)) | Ok(LoopExit::ForceYielded) => {
                self.frames.truncate(floor);
                self.stack.truncate(stack_floor);
                Err(ContractViolation::CannotYield.into())
            }
            Err(err) => {
                self.frames.truncate(floor);
                self.stack.truncate(stack_floor);
                Err(err)
            }
        }
    }

    /// First resume of a coroutine: call `function` as the outermost frame
    pub(crate) fn start(&mut self, function: Value, args: Vec<Value>) -> RuntimeResult<LoopExit> {
        self.check_thread()?;
        self.enter_outermost();
        let first = self.exec_call(function, args, FrameFlags::ENTRY_POINT, 0, Handlers::default());
        self.leave_outermost(first)
    }

    /// Resume after a yield; `value` becomes the yielding call's result
    pub(crate) fn resume_yielded(&mut self, value: Value) -> RuntimeResult<LoopExit> {
        self.check_thread()?;
        let Some(frame) = self.yielded_frame.take() else {
            return Err(RuntimeError::internal("resume without a pending yield"));
        };
        self.enter_outermost();
        let first = self.finish_frame(frame, value);
        self.leave_outermost(first)
    }

    /// Resume after an auto-yield
    pub(crate) fn resume_forced(&mut self) -> RuntimeResult<LoopExit> {
        self.check_thread()?;
        self.enter_outermost();
        self.leave_outermost(Ok(StepOutcome::Continue))
    }

    fn enter_outermost(&mut self) {
        self.nesting = 1;
        self.executed = 0;
    }

    fn leave_outermost(&mut self, first: RuntimeResult<StepOutcome>) -> RuntimeResult<LoopExit> {
        let result = self.run(first, 0);
        self.nesting = 0;
        if result.is_err() {
            self.frames.clear();
            self.stack.clear();
            self.yielded_frame = None;
        }
        result
    }

    // ========================================================================
    // Driver loop
    // ========================================================================

    fn run(&mut self, first: RuntimeResult<StepOutcome>, floor: usize) -> RuntimeResult<LoopExit> {
        let mut next = first;
        loop {
            let outcome = match next {
                Ok(outcome) => outcome,
                Err(err) => self.unwind(err, floor)?,
            };

            next = match outcome {
                StepOutcome::Continue => {
                    if self.shared.cancellation().is_cancelled() {
                        Err(RuntimeError::Terminated)
                    } else if self.auto_yield_due() {
                        Ok(StepOutcome::ForceYield)
                    } else {
                        self.step()
                    }
                }
                StepOutcome::TailCall {
                    request,
                    flags,
                    return_address,
                } => self.exec_tail_request(request, flags, return_address),
                StepOutcome::Yield(value) => {
                    if !self.can_yield {
                        self.yielded_frame = None;
                        Err(ContractViolation::YieldFromMain.into())
                    } else if self.nesting > 1 {
                        self.yielded_frame = None;
                        Err(ContractViolation::CannotYield.into())
                    } else {
                        return Ok(LoopExit::Yielded(value));
                    }
                }
                StepOutcome::ForceYield => {
                    debug!(ip = self.ip, "auto-yield budget exhausted");
                    return Ok(LoopExit::ForceYielded);
                }
                StepOutcome::Return(value) => return Ok(LoopExit::Returned(value)),
            };
        }
    }

    fn auto_yield_due(&mut self) -> bool {
        if self.nesting != 1 || !self.can_yield {
            return false;
        }
        let Some(budget) = self.auto_yield else {
            return false;
        };
        self.executed += 1;
        if self.executed > budget {
            self.executed = 0;
            true
        } else {
            false
        }
    }

    // ========================================================================
    // Stack helpers
    // ========================================================================

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> RuntimeResult<Value> {
        self.stack
            .pop()
            .ok_or_else(|| RuntimeError::internal("value stack underflow"))
    }

    fn pop_n(&mut self, count: usize) -> RuntimeResult<Vec<Value>> {
        let start = self
            .stack
            .len()
            .checked_sub(count)
            .ok_or_else(|| RuntimeError::internal("value stack underflow"))?;
        Ok(self.stack.split_off(start))
    }

    fn peek(&self, offset: usize) -> RuntimeResult<&Value> {
        self.stack
            .len()
            .checked_sub(offset + 1)
            .and_then(|i| self.stack.get(i))
            .ok_or_else(|| RuntimeError::internal("value stack underflow"))
    }

    fn top_frame(&self) -> RuntimeResult<&CallFrame> {
        self.frames
            .last()
            .ok_or_else(|| RuntimeError::internal("no active call frame"))
    }

    fn top_frame_mut(&mut self) -> RuntimeResult<&mut CallFrame> {
        self.frames
            .last_mut()
            .ok_or_else(|| RuntimeError::internal("no active call frame"))
    }

    /// Push a resolved value or start the call that produces it
    fn push_resolved(&mut self, resolved: Resolved) -> RuntimeResult<StepOutcome> {
        match resolved {
            Resolved::Value(value) => {
                self.push(value);
                Ok(StepOutcome::Continue)
            }
            Resolved::Call(pending) => self.call_pending(pending),
        }
    }

    /// Finish a resolved operation with a nested call (native callers)
    pub(crate) fn complete(&mut self, resolved: Resolved) -> RuntimeResult<Value> {
        match resolved {
            Resolved::Value(value) => Ok(value),
            Resolved::Call(pending) => {
                let result = self.call(pending.function, pending.args)?;
                Ok(pending.then.apply(result)?.unwrap_or(Value::Void))
            }
        }
    }
}

impl std::fmt::Debug for Processor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Processor")
            .field("ip", &self.ip)
            .field("frames", &self.frames.len())
            .field("stack", &self.stack.len())
            .field("nesting", &self.nesting)
            .field("can_yield", &self.can_yield)
            .finish()
    }
}
