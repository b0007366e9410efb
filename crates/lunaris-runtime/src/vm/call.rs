//! Frame entry and exit
//!
//! Every call, script or native, goes through [`Processor::exec_call`];
//! every result goes back through [`Processor::finish_frame`] and
//! [`Processor::deliver`].

use super::{CallFrame, Continuation, FrameFlags, Handlers, PendingCall, Processor, StepOutcome};
use crate::api::arguments::{flatten_args, CallbackArguments};
use crate::api::context::ExecutionContext;
use crate::api::native::{NativeFunctionRef, NativeOutcome, TailCallRequest};
use crate::closure::ClosureRef;
use crate::error::{RuntimeError, RuntimeResult, ScriptError};
use crate::metamethod::{self, Operator};
use crate::value::Value;
use std::rc::Rc;
use tracing::trace;

/// Longest chain of `__call` handlers followed for one call
const MAX_CALL_HOPS: usize = 10;

impl Processor {
    /// Enter `function`, resolving `__call` for non-callable values
    pub(super) fn exec_call(
        &mut self,
        function: Value,
        args: Vec<Value>,
        flags: FrameFlags,
        return_address: usize,
        handlers: Handlers,
    ) -> RuntimeResult<StepOutcome> {
        let mut function = function.to_scalar();
        let mut args = flatten_args(args);
        let mut hops = 0;

        loop {
            match function {
                Value::Function(closure) => {
                    return self.enter_closure(closure, args, flags, return_address, handlers)
                }
                Value::NativeFunction(native) => {
                    return self.invoke_native(native, args, flags, return_address, handlers)
                }
                callee => {
                    hops += 1;
                    let handler = if hops <= MAX_CALL_HOPS {
                        metamethod::lookup(&callee, Operator::Call, &self.shared)
                    } else {
                        None
                    };
                    let Some(handler) = handler else {
                        let err = ScriptError::call(&callee).into();
                        return self.fail_call(err, flags, return_address, handlers);
                    };
                    args.insert(0, callee);
                    function = handler;
                }
            }
        }
    }

    /// Tail call requested by a native function or a native continuation
    pub(super) fn exec_tail_request(
        &mut self,
        request: TailCallRequest,
        flags: FrameFlags,
        return_address: usize,
    ) -> RuntimeResult<StepOutcome> {
        trace!(function = request.function.type_name(), "native tail call");
        let handlers = Handlers {
            continuation: request.continuation.map(Continuation::Native),
            error_handler: request.error_handler,
            before_unwind: request.before_unwind,
        };
        self.exec_call(request.function, request.args, flags, return_address, handlers)
    }

    /// Start a metamethod call; its post-processed result lands on the stack
    pub(super) fn call_pending(&mut self, pending: PendingCall) -> RuntimeResult<StepOutcome> {
        self.exec_call(
            pending.function,
            pending.args,
            FrameFlags::empty(),
            self.ip,
            Handlers::post(pending.then),
        )
    }

    fn check_depth(&self) -> RuntimeResult<()> {
        if self.frames.len() >= self.shared.config().max_call_depth {
            return Err(ScriptError::stack_overflow().into());
        }
        Ok(())
    }

    fn push_frame(&mut self, frame: CallFrame) {
        self.frames.push(frame);
        self.peak_frames = self.peak_frames.max(self.frames.len());
    }

    fn enter_closure(
        &mut self,
        closure: ClosureRef,
        args: Vec<Value>,
        flags: FrameFlags,
        return_address: usize,
        handlers: Handlers,
    ) -> RuntimeResult<StepOutcome> {
        if let Err(err) = self.check_depth() {
            return self.fail_call(err, flags, return_address, handlers);
        }
        let mut frame = CallFrame::new(self.stack.len(), return_address, flags, handlers);
        frame.pending_args = args;
        self.ip = closure.entry_point();
        self.code = Some(Rc::clone(closure.code()));
        frame.closure = Some(closure);
        self.push_frame(frame);
        Ok(StepOutcome::Continue)
    }

    fn invoke_native(
        &mut self,
        native: NativeFunctionRef,
        args: Vec<Value>,
        flags: FrameFlags,
        return_address: usize,
        handlers: Handlers,
    ) -> RuntimeResult<StepOutcome> {
        if let Err(err) = self.check_depth() {
            return self.fail_call(err, flags, return_address, handlers);
        }
        let mut frame = CallFrame::new(self.stack.len(), return_address, flags, handlers);
        frame.native = Some(native.clone());
        self.push_frame(frame);

        let arguments = CallbackArguments::new(args, flags.contains(FrameFlags::METHOD_CALL));
        let location = self.current_location();
        let outcome = {
            let mut ctx = ExecutionContext::new(self, location);
            native.invoke(&mut ctx, &arguments)
        };
        // On error the frame stays for unwinding so its handlers apply
        let outcome = outcome?;

        let Some(frame) = self.frames.pop() else {
            return Err(RuntimeError::internal("native frame lost"));
        };
        match outcome {
            NativeOutcome::Return(value) => self.finish_frame(frame, value),
            NativeOutcome::Yield(value) => {
                self.yielded_frame = Some(frame);
                Ok(StepOutcome::Yield(value))
            }
            NativeOutcome::TailCall(request) => Ok(self.tail_from_native(frame, request)),
        }
    }

    fn tail_from_native(&mut self, mut frame: CallFrame, request: TailCallRequest) -> StepOutcome {
        if frame.handlers.is_empty() {
            // Nothing left to do in this frame: the callee takes its place
            let flags = (frame.flags & FrameFlags::ENTRY_POINT) | FrameFlags::TAIL_CALL;
            return StepOutcome::TailCall {
                request,
                flags,
                return_address: frame.return_address,
            };
        }
        let return_address = frame.return_address;
        frame.flags |= FrameFlags::AWAITING;
        self.frames.push(frame);
        StepOutcome::TailCall {
            request,
            flags: FrameFlags::empty(),
            return_address,
        }
    }

    /// A call failed before its frame existed
    ///
    /// The handlers of the failed call still apply, as if its frame had
    /// raised the error.
    fn fail_call(
        &mut self,
        err: RuntimeError,
        flags: FrameFlags,
        return_address: usize,
        handlers: Handlers,
    ) -> RuntimeResult<StepOutcome> {
        let Some(handler) = handlers.error_handler else {
            return Err(err);
        };
        let mut script = match err {
            RuntimeError::Script(script) => script,
            other => return Err(other),
        };
        if let Some(decorator) = handlers.before_unwind {
            script = self.decorate(decorator, script);
        }
        let value = self.call(Value::NativeFunction(handler), vec![script.error_value()])?;
        self.deliver(flags, return_address, Some(value))
    }

    /// Apply a popped frame's continuation to its result
    pub(super) fn finish_frame(&mut self, frame: CallFrame, value: Value) -> RuntimeResult<StepOutcome> {
        let CallFrame {
            flags,
            return_address,
            handlers,
            ..
        } = frame;
        match handlers.continuation {
            None => self.deliver(flags, return_address, Some(value)),
            Some(Continuation::Post(post)) => {
                let value = post.apply(value)?;
                self.deliver(flags, return_address, value)
            }
            Some(Continuation::Native(continuation)) => Ok(StepOutcome::TailCall {
                request: TailCallRequest::new(Value::NativeFunction(continuation), vec![value]),
                flags: flags & FrameFlags::ENTRY_POINT,
                return_address,
            }),
        }
    }

    /// Hand a result to whoever waits for it
    pub(super) fn deliver(
        &mut self,
        flags: FrameFlags,
        return_address: usize,
        value: Option<Value>,
    ) -> RuntimeResult<StepOutcome> {
        if flags.contains(FrameFlags::ENTRY_POINT) {
            return Ok(StepOutcome::Return(value.unwrap_or(Value::Void)));
        }
        if self
            .frames
            .last()
            .is_some_and(|f| f.flags.contains(FrameFlags::AWAITING))
        {
            let Some(parent) = self.frames.pop() else {
                return Err(RuntimeError::internal("awaiting frame lost"));
            };
            return self.finish_frame(parent, value.unwrap_or(Value::Void));
        }
        if let Some(value) = value {
            self.push(value);
        }
        self.ip = return_address;
        if let Some(code) = self
            .frames
            .last()
            .and_then(|f| f.closure.as_ref())
            .map(|c| Rc::clone(c.code()))
        {
            self.code = Some(code);
        }
        Ok(StepOutcome::Continue)
    }

    /// Whether the call about to run can reuse the caller's frame
    pub(super) fn can_tail_call(&self) -> bool {
        let Some(code) = &self.code else {
            return false;
        };
        let returns_next = code
            .instructions
            .get(self.ip)
            .is_some_and(|i| i.op == crate::bytecode::OpCode::Ret && i.num_val == 1);
        returns_next
            && self.frames.last().is_some_and(|f| {
                f.closure.is_some()
                    && f.handlers.is_empty()
                    && !f.flags.contains(FrameFlags::AWAITING)
            })
    }
}
