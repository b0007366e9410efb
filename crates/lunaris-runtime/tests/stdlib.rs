//! Core library functions driven from bytecode

mod common;

use common::*;
use lunaris_runtime::bytecode::OpCode;
use lunaris_runtime::{Runtime, Value};
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::cell::RefCell;
use std::rc::Rc;

#[test]
fn test_unpack_spreads_into_call_arguments() {
    // select('#', unpack(t))
    let runtime = Runtime::new();
    runtime.set_global("t", vec![1.0, 2.0, 3.0]);
    let result = run(&runtime, |b| {
        b.begin_fn(0);
        b.load(global("select"));
        b.literal("#");
        b.load(global("unpack"));
        b.load(global("t"));
        b.call(1);
        b.call(2);
        b.ret(1);
    });
    assert_number(result, 3.0);
}

#[test]
fn test_only_last_argument_is_spread() {
    // select('#', unpack(t), 0)
    let runtime = Runtime::new();
    runtime.set_global("t", vec![1.0, 2.0, 3.0]);
    let result = run(&runtime, |b| {
        b.begin_fn(0);
        b.load(global("select"));
        b.literal("#");
        b.load(global("unpack"));
        b.load(global("t"));
        b.call(1);
        b.op(OpCode::Scalar);
        b.literal(0.0);
        b.call(3);
        b.ret(1);
    });
    assert_number(result, 2.0);
}

#[test]
fn test_ipairs_stops_at_first_nil() {
    let runtime = Runtime::new();
    let t = runtime.new_table();
    {
        let mut raw = t.borrow_mut();
        raw.set_int(1, Value::from(1.0));
        raw.set_int(2, Value::from(2.0));
        raw.set_int(4, Value::from(4.0));
    }
    runtime.set_global("t", Value::Table(t));

    let result = run(&runtime, |b| {
        b.begin_fn(1);
        b.literal(0.0);
        b.store_pop(local(0, "n"));
        b.load(global("ipairs"));
        b.load(global("t"));
        b.call(1);
        b.op(OpCode::IterPrep);
        let top = b.here();
        for _ in 0..3 {
            b.op_n(OpCode::Copy, 2);
        }
        b.call(2);
        b.op_n(OpCode::Copy, 0);
        let done = b.jump(OpCode::JNil);
        b.op(OpCode::IterUpd);
        b.load(local(0, "n"));
        b.literal(1.0);
        b.op(OpCode::Add);
        b.store_pop(local(0, "n"));
        b.op_n(OpCode::Jump, top);
        b.patch_jump(done);
        b.op_n(OpCode::Pop, 4);
        b.load(local(0, "n"));
        b.ret(1);
    });
    assert_number(result, 2.0);
}

#[rstest]
#[case(Value::Nil, "nil")]
#[case(Value::Boolean(false), "false")]
#[case(Value::from(3.0), "3")]
#[case(Value::from(0.5), "0.5")]
#[case(Value::from("s"), "s")]
fn test_tostring_of_scalars(#[case] input: Value, #[case] expected: &str) {
    let runtime = Runtime::new();
    let out = runtime.call_global("tostring", vec![input]).unwrap();
    assert_eq!(out, Value::from(expected));
}

#[test]
fn test_print_joins_arguments_with_tabs() {
    let runtime = Runtime::new();
    let lines = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&lines);
    runtime.set_print_hook(move |line| sink.borrow_mut().push(line.to_string()));
    run(&runtime, |b| {
        b.begin_fn(0);
        call_global(b, "print", &[Value::from("a"), Value::from(1.0), Value::Nil]);
        b.ret(0);
    })
    .unwrap();
    assert_eq!(*lines.borrow(), vec!["a\t1\tnil".to_string()]);
}

#[test]
fn test_table_library_from_script() {
    // local t = {}; table.insert(t, "b"); table.insert(t, 1, "a"); return table.concat(t, ",")
    let runtime = Runtime::new();
    let result = run(&runtime, |b| {
        b.begin_fn(1);
        b.op(OpCode::NewTable);
        b.store_pop(local(0, "t"));

        load_field(b, "table", "insert");
        b.load(local(0, "t"));
        b.literal("b");
        b.call(2);
        b.op_n(OpCode::Pop, 1);

        load_field(b, "table", "insert");
        b.load(local(0, "t"));
        b.literal(1.0);
        b.literal("a");
        b.call(3);
        b.op_n(OpCode::Pop, 1);

        load_field(b, "table", "concat");
        b.load(local(0, "t"));
        b.literal(",");
        b.call(2);
        b.ret(1);
    });
    assert_eq!(result.unwrap(), Value::from("a,b"));
}

#[test]
fn test_setmetatable_returns_its_table() {
    let runtime = Runtime::new();
    let t = runtime.new_table();
    let meta = runtime.new_table();
    let out = runtime
        .call_global("setmetatable", vec![Value::Table(t.clone()), Value::Table(meta.clone())])
        .unwrap();
    assert!(out.as_table().is_some_and(|r| r.ptr_eq(&t)));
    assert!(t.metatable().is_some_and(|m| m.ptr_eq(&meta)));
}

#[test]
fn test_rawequal_ignores_eq_metamethod() {
    let runtime = Runtime::new();
    let meta = runtime.new_table();
    meta.set_str(
        "__eq",
        runtime.native("eq", |_, _| Ok(Value::Boolean(true).into())).into(),
    );
    let a = runtime.new_table();
    let b = runtime.new_table();
    a.set_metatable(Some(meta.clone()));
    b.set_metatable(Some(meta));
    let out = runtime
        .call_global("rawequal", vec![Value::Table(a), Value::Table(b)])
        .unwrap();
    assert_eq!(out, Value::Boolean(false));
}

#[test]
fn test_globals_table_refers_to_itself() {
    let runtime = Runtime::new();
    let g = runtime.globals().get_str("_G");
    assert!(g.as_table().is_some_and(|t| t.ptr_eq(&runtime.globals())));
}
