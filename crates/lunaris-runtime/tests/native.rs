//! Host integration: native functions, callbacks into scripts, user data

mod common;

use common::*;
use lunaris_runtime::api::native::{NativeFunctionBuilder, TailCallRequest};
use lunaris_runtime::bytecode::{Instruction, OpCode};
use lunaris_runtime::metamethod::Operator;
use lunaris_runtime::value::{missing_field, UserData, UserDataDescriptor};
use lunaris_runtime::{Runtime, RuntimeConfig, RuntimeError, ScriptErrorKind, Value};
use pretty_assertions::assert_eq;
use std::rc::Rc;

#[test]
fn test_builder_function_callable_from_script() {
    let runtime = Runtime::new();
    let clamp = NativeFunctionBuilder::new("clamp")
        .with_description("Clamp a number into [lo, hi]")
        .with_arity(3)
        .with_implementation(|_, args| {
            let n = args.as_number(0, "clamp")?;
            let lo = args.as_number(1, "clamp")?;
            let hi = args.as_number(2, "clamp")?;
            Ok(Value::from(n.max(lo).min(hi)).into())
        })
        .build(runtime.shared().ids())
        .unwrap();
    assert_eq!(clamp.description(), Some("Clamp a number into [lo, hi]"));
    runtime.register(Some("math"), clamp).unwrap();

    let result = run(&runtime, |b| {
        b.begin_fn(0);
        load_field(b, "math", "clamp");
        b.literal(15.0);
        b.literal(0.0);
        b.literal(10.0);
        b.call(3);
        b.ret(1);
    });
    assert_number(result, 10.0);
}

#[test]
fn test_builder_requires_implementation() {
    let runtime = Runtime::new();
    let err = NativeFunctionBuilder::new("empty")
        .build(runtime.shared().ids())
        .unwrap_err();
    assert_eq!(err.to_string(), "native function 'empty' missing implementation");
}

#[test]
fn test_native_calls_back_into_script() {
    // apply(function(x) return x + 1 end, 41)
    let runtime = Runtime::new();
    let apply = runtime.native("apply", |ctx, args| {
        let f = args.get(0);
        let out = ctx.call(f, args.rest(1))?;
        Ok(out.into())
    });
    runtime.set_global("apply", Value::NativeFunction(apply));

    let result = run(&runtime, |b| {
        b.begin_fn(0);
        b.load(global("apply"));
        let f = closure_placeholder(b, "inc");
        b.literal(41.0);
        b.call(2);
        b.ret(1);

        let entry = b.begin_fn(1);
        b.patch(f, entry);
        b.args(vec![local(0, "x")]);
        b.load(local(0, "x"));
        b.literal(1.0);
        b.op(OpCode::Add);
        b.ret(1);
    });
    assert_number(result, 42.0);
}

#[test]
fn test_tail_call_request_with_continuation() {
    let runtime = Runtime::new();
    let wrap = runtime.native("wrap", |_, args| {
        let n = args.as_number(0, "wrap")?;
        Ok(Value::from(format!("[{}]", n)).into())
    });
    let via = runtime.native("via_tostring", move |_, args| {
        let tostring = Value::NativeFunction(wrap.clone());
        Ok(TailCallRequest::new(tostring, args.to_vec()).into())
    });
    runtime.set_global("via", Value::NativeFunction(via));
    let out = runtime.call_global("via", vec![Value::from(3.0)]).unwrap();
    assert_eq!(out, Value::from("[3]"));
}

#[test]
fn test_native_recursion_limit() {
    let config = RuntimeConfig {
        max_native_nesting: 16,
        ..RuntimeConfig::default()
    };
    let runtime = Runtime::with_config(&config);
    let recurse = runtime.native("recurse", |ctx, _| {
        let me = ctx.globals().get_str("recurse");
        Ok(ctx.call(me, vec![])?.into())
    });
    runtime.set_global("recurse", Value::NativeFunction(recurse));
    let err = runtime.call_global("recurse", vec![]).unwrap_err();
    assert_eq!(err.as_script().map(|e| e.kind()), Some(ScriptErrorKind::StackOverflow));
}

#[test]
fn test_reentrant_host_call_is_refused() {
    let runtime = Rc::new(Runtime::new());
    let inner = Rc::clone(&runtime);
    let reenter = runtime.native("reenter", move |_, _| {
        let out = inner.call_global("print", vec![])?;
        Ok(out.into())
    });
    runtime.set_global("reenter", Value::NativeFunction(reenter));
    let err = runtime.call_global("reenter", vec![]).unwrap_err();
    assert!(err.as_contract().is_some());
}

#[test]
fn test_method_call_view_skips_receiver() {
    let runtime = Runtime::new();
    let obj = runtime.new_table();
    obj.set_str(
        "describe",
        runtime
            .native("describe", |_, args| {
                let rest = args.skip_self();
                Ok(Value::from(format!(
                    "{} {}",
                    args.is_method_call(),
                    rest.count()
                ))
                .into())
            })
            .into(),
    );
    runtime.set_global("obj", Value::Table(obj));

    // obj:describe("x")
    let result = run(&runtime, |b| {
        b.begin_fn(0);
        b.load(global("obj"));
        b.op_n(OpCode::Copy, 0);
        b.index_n("describe");
        b.emit(Instruction::new(OpCode::Swap).with_num2(1));
        b.literal("x");
        b.op_n(OpCode::ThisCall, 2);
        b.ret(1);
    });
    assert_eq!(result.unwrap(), Value::from("true 1"));
}

struct Point {
    add: Value,
}

impl UserDataDescriptor for Point {
    fn type_name(&self) -> &str {
        "Point"
    }

    fn index(&self, object: &UserData, key: &Value) -> Result<Value, RuntimeError> {
        let Some(p) = object.downcast::<(f64, f64)>() else {
            return Err(missing_field(self.type_name(), key));
        };
        match key.as_str() {
            Some("x") => Ok(Value::from(p.0)),
            Some("y") => Ok(Value::from(p.1)),
            _ => Err(missing_field(self.type_name(), key)),
        }
    }

    fn meta_method(&self, _object: &UserData, op: Operator) -> Option<Value> {
        match op {
            Operator::Add => Some(self.add.clone()),
            _ => None,
        }
    }
}

fn point_runtime() -> Runtime {
    let runtime = Runtime::new();
    let add = runtime.native("point_add", |_, args| {
        let a = args.as_opaque::<(f64, f64)>(0, "point_add", false)?;
        let b = args.as_opaque::<(f64, f64)>(1, "point_add", false)?;
        let (Some(a), Some(b)) = (a, b) else {
            return Ok(Value::Nil.into());
        };
        Ok(Value::from(a.0 + b.0 + a.1 + b.1).into())
    });
    let descriptor: Rc<dyn UserDataDescriptor> = Rc::new(Point {
        add: Value::NativeFunction(add),
    });
    let p = runtime.new_userdata(Rc::clone(&descriptor), (1.0_f64, 2.0_f64));
    let q = runtime.new_userdata(descriptor, (10.0_f64, 20.0_f64));
    runtime.set_global("p", p);
    runtime.set_global("q", q);
    runtime
}

#[test]
fn test_userdata_field_access() {
    let runtime = point_runtime();
    let result = run(&runtime, |b| {
        b.begin_fn(0);
        load_field(b, "q", "y");
        b.ret(1);
    });
    assert_number(result, 20.0);
}

#[test]
fn test_userdata_missing_field() {
    let runtime = point_runtime();
    let result = run(&runtime, |b| {
        b.begin_fn(0);
        load_field(b, "p", "z");
        b.ret(1);
    });
    let err = result.unwrap_err();
    assert_eq!(err.as_script().map(|e| e.kind()), Some(ScriptErrorKind::Index));
    assert!(err.to_string().contains("userdata<Point>"), "{}", err);
}

#[test]
fn test_userdata_operator_from_descriptor() {
    let runtime = point_runtime();
    let result = run(&runtime, |b| {
        b.begin_fn(0);
        b.load(global("p"));
        b.load(global("q"));
        b.op(OpCode::Add);
        b.ret(1);
    });
    assert_number(result, 33.0);
}

#[test]
fn test_userdata_type_mismatch_in_argument() {
    let runtime = point_runtime();
    let check = runtime.native("check", |_, args| {
        args.as_opaque::<String>(0, "check", false)?;
        Ok(Value::Nil.into())
    });
    let p = runtime.globals().get_str("p");
    let err = runtime
        .call_function(&Value::NativeFunction(check), vec![p])
        .unwrap_err();
    assert!(err.to_string().contains("bad argument #1 to 'check'"), "{}", err);
}
