//! `coroutine` namespace

use super::{install, multiple, LibFn};
use crate::api::arguments::CallbackArguments;
use crate::api::context::ExecutionContext;
use crate::api::native::NativeOutcome;
use crate::coroutine::{CoroutineRef, CoroutineState};
use crate::error::{ContractViolation, RuntimeError, RuntimeResult, ScriptError};
use crate::shared::RuntimeShared;
use crate::table::TableRef;
use crate::value::{DataType, Value};
use std::rc::Rc;

const FUNCTIONS: &[(&str, LibFn)] = &[
    ("create", create),
    ("isyieldable", isyieldable),
    ("resume", resume),
    ("running", running),
    ("status", status),
    ("wrap", wrap),
    ("yield", yield_values),
];

pub fn register(shared: &Rc<RuntimeShared>, namespace: &TableRef) {
    install(shared, namespace, FUNCTIONS);
}

fn coroutine_arg(args: &CallbackArguments, func_name: &str) -> Result<CoroutineRef, ScriptError> {
    match args.get(0).to_scalar() {
        Value::Coroutine(co) => Ok(co),
        other => Err(ScriptError::bad_argument(
            1,
            func_name,
            format!("coroutine expected, got {}", other.type_name()),
        )),
    }
}

/// Resume failures a script sees as `false, message` instead of an error
fn is_resume_refusal(err: &RuntimeError) -> bool {
    matches!(
        err,
        RuntimeError::Contract(
            ContractViolation::ResumeDead
                | ContractViolation::ResumeNotSuspended
                | ContractViolation::ForceSuspendedWithArgs
        )
    )
}

fn create(ctx: &mut ExecutionContext<'_>, args: &CallbackArguments) -> RuntimeResult<NativeOutcome> {
    let function = args.as_type(0, "create", DataType::Function, false)?;
    Ok(Value::Coroutine(ctx.create_coroutine(function)).into())
}

fn isyieldable(ctx: &mut ExecutionContext<'_>, _args: &CallbackArguments) -> RuntimeResult<NativeOutcome> {
    Ok(Value::Boolean(ctx.is_yieldable()).into())
}

/// `coroutine.resume(co, ...)`: `true, values...` or `false, message`
fn resume(ctx: &mut ExecutionContext<'_>, args: &CallbackArguments) -> RuntimeResult<NativeOutcome> {
    let co = coroutine_arg(args, "resume")?;
    match ctx.resume(&co, args.rest(1)) {
        Ok(value) => multiple(vec![Value::Boolean(true), value]),
        Err(RuntimeError::Script(err)) => multiple(vec![Value::Boolean(false), err.error_value()]),
        Err(err) if is_resume_refusal(&err) => {
            multiple(vec![Value::Boolean(false), Value::from(err.to_string())])
        }
        Err(err) => Err(err),
    }
}

/// `coroutine.running()`: the running coroutine and whether it is the main one
fn running(ctx: &mut ExecutionContext<'_>, _args: &CallbackArguments) -> RuntimeResult<NativeOutcome> {
    match ctx.current_coroutine() {
        Some(co) => {
            let is_main = co.is_main();
            multiple(vec![Value::Coroutine(co), Value::Boolean(is_main)])
        }
        None => Ok(Value::Nil.into()),
    }
}

fn status(ctx: &mut ExecutionContext<'_>, args: &CallbackArguments) -> RuntimeResult<NativeOutcome> {
    let co = coroutine_arg(args, "status")?;
    let is_current = ctx.current_coroutine().is_some_and(|current| current.ptr_eq(&co));
    let name = match co.state() {
        CoroutineState::Running | CoroutineState::Main if is_current => "running",
        CoroutineState::Running | CoroutineState::Main => "normal",
        CoroutineState::Dead => "dead",
        _ => "suspended",
    };
    Ok(Value::from(name).into())
}

/// `coroutine.wrap(f)`: a function that resumes a new coroutine and
/// rethrows its errors
fn wrap(ctx: &mut ExecutionContext<'_>, args: &CallbackArguments) -> RuntimeResult<NativeOutcome> {
    let function = args.as_type(0, "wrap", DataType::Function, false)?;
    let co = ctx.create_coroutine(function);
    let wrapper = ctx.native("wrap", move |ctx, args| match ctx.resume(&co, args.to_vec()) {
        Ok(value) => Ok(value.into()),
        Err(err) if is_resume_refusal(&err) => {
            Err(ScriptError::user(Value::from(err.to_string())).into())
        }
        Err(err) => Err(err),
    });
    Ok(Value::NativeFunction(wrapper).into())
}

fn yield_values(_ctx: &mut ExecutionContext<'_>, args: &CallbackArguments) -> RuntimeResult<NativeOutcome> {
    Ok(NativeOutcome::Yield(Value::tuple(args.to_vec())))
}

#[cfg(test)]
mod tests {
    use crate::api::Runtime;
    use crate::coroutine::CoroutineState;
    use crate::value::Value;
    use pretty_assertions::assert_eq;

    fn library(runtime: &Runtime, name: &str) -> Value {
        runtime
            .globals()
            .get_str("coroutine")
            .as_table()
            .map(|t| t.get_str(name))
            .unwrap_or(Value::Nil)
    }

    #[test]
    fn test_native_coroutine_runs_to_completion() {
        let runtime = Runtime::new();
        let body = runtime.native("body", |_, args| Ok(Value::from(args.count() as f64).into()));
        let co = runtime.create_native_coroutine(body);
        let out = runtime.resume(&co, vec![Value::from(1.0), Value::from(2.0)]).unwrap();
        assert_eq!(out, Value::from(2.0));
        assert_eq!(co.state(), CoroutineState::Dead);
    }

    #[test]
    fn test_resume_dead_reports_false() {
        let runtime = Runtime::new();
        let body = runtime.native("body", |_, _| Ok(Value::Nil.into()));
        let co = runtime.create_native_coroutine(body);
        runtime.resume(&co, vec![]).unwrap();

        let resume = library(&runtime, "resume");
        let out = runtime
            .call_function(&resume, vec![Value::Coroutine(co)])
            .unwrap()
            .into_values();
        assert_eq!(
            out,
            vec![Value::Boolean(false), Value::from("cannot resume dead coroutine")]
        );
    }

    #[test]
    fn test_status_of_new_and_main() {
        let runtime = Runtime::new();
        let status = library(&runtime, "status");
        let body = runtime.native("body", |_, _| Ok(Value::Nil.into()));
        let co = runtime.create_native_coroutine(body);
        assert_eq!(
            runtime.call_function(&status, vec![Value::Coroutine(co)]).unwrap(),
            Value::from("suspended")
        );
        let main = runtime.main_coroutine().clone();
        assert_eq!(
            runtime.call_function(&status, vec![Value::Coroutine(main)]).unwrap(),
            Value::from("running")
        );
    }

    #[test]
    fn test_running_on_main() {
        let runtime = Runtime::new();
        let running = library(&runtime, "running");
        let out = runtime.call_function(&running, vec![]).unwrap().into_values();
        assert_eq!(out.len(), 2);
        assert_eq!(out[1], Value::Boolean(true));
    }

    #[test]
    fn test_yield_from_main_is_refused() {
        let runtime = Runtime::new();
        let yield_fn = library(&runtime, "yield");
        let err = runtime.call_function(&yield_fn, vec![Value::from(1.0)]).unwrap_err();
        assert!(err.as_contract().is_some());
        assert!(!err.is_catchable());
    }
}
