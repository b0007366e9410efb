//! Processor behaviour: calls, closures, loops, tail calls and operators

mod common;

use common::*;
use lunaris_runtime::bytecode::{Instruction, OpCode};
use lunaris_runtime::symbol::SymbolRef;
use lunaris_runtime::{Runtime, RuntimeConfig, ScriptErrorKind, Value};
use pretty_assertions::assert_eq;
use rstest::rstest;

#[test]
fn test_arithmetic_through_globals() {
    let runtime = Runtime::new();
    let result = run(&runtime, |b| {
        b.begin_fn(0);
        b.literal(2.0);
        b.literal(3.0);
        b.op(OpCode::Mul);
        b.store_pop(global("x"));
        b.load(global("x"));
        b.literal(1.0);
        b.op(OpCode::Add);
        b.ret(1);
    });
    assert_number(result, 7.0);
    assert_eq!(runtime.globals().get_str("x"), Value::from(6.0));
}

#[rstest]
#[case(OpCode::Sub, 7.0, 2.0, 5.0)]
#[case(OpCode::Div, 7.0, 2.0, 3.5)]
#[case(OpCode::Mod, -7.0, 3.0, 2.0)]
#[case(OpCode::Pow, 2.0, 8.0, 256.0)]
fn test_binary_operators(#[case] op: OpCode, #[case] a: f64, #[case] b: f64, #[case] expected: f64) {
    let runtime = Runtime::new();
    let result = run(&runtime, |bc| {
        bc.begin_fn(0);
        bc.literal(a);
        bc.literal(b);
        bc.op(op);
        bc.ret(1);
    });
    assert_number(result, expected);
}

#[test]
fn test_numeric_strings_coerce_in_arithmetic() {
    let runtime = Runtime::new();
    let result = run(&runtime, |b| {
        b.begin_fn(0);
        b.literal("10");
        b.literal(5.0);
        b.op(OpCode::Add);
        b.ret(1);
    });
    assert_number(result, 15.0);
}

#[test]
fn test_arithmetic_on_table_fails_with_location() {
    let runtime = Runtime::new();
    let result = run(&runtime, |b| {
        b.begin_fn(0);
        b.set_source(4, 9);
        b.op(OpCode::NewTable);
        b.literal(1.0);
        b.op(OpCode::Add);
        b.ret(1);
    });
    let err = result.unwrap_err();
    let script = err.as_script().unwrap();
    assert_eq!(script.kind(), ScriptErrorKind::Arithmetic);
    assert_eq!(
        script.decorated_message(),
        "test:4: attempt to perform arithmetic on a table value (table + number)"
    );
}

#[test]
fn test_closure_with_arguments() {
    let runtime = Runtime::new();
    let result = run(&runtime, |b| {
        b.begin_fn(1);
        let add = closure_placeholder(b, "add");
        b.store_pop(local(0, "add"));
        b.load(local(0, "add"));
        b.literal(2.0);
        b.literal(3.0);
        b.call(2);
        b.ret(1);

        let entry = b.begin_fn(2);
        b.patch(add, entry);
        b.args(vec![local(0, "a"), local(1, "b")]);
        b.load(local(0, "a"));
        b.load(local(1, "b"));
        b.op(OpCode::Add);
        b.ret(1);
    });
    assert_number(result, 5.0);
}

#[test]
fn test_missing_arguments_are_nil() {
    let runtime = Runtime::new();
    let result = run(&runtime, |b| {
        b.begin_fn(0);
        let f = closure_placeholder(b, "second");
        b.literal(1.0);
        b.call(1);
        b.ret(1);

        let entry = b.begin_fn(2);
        b.patch(f, entry);
        b.args(vec![local(0, "a"), local(1, "b")]);
        b.load(local(1, "b"));
        b.ret(1);
    });
    assert!(result.unwrap().is_nil());
}

#[test]
fn test_varargs_are_a_tuple() {
    let runtime = Runtime::new();
    let result = run(&runtime, |b| {
        b.begin_fn(0);
        let f = closure_placeholder(b, "count");
        b.literal(1.0);
        b.literal(2.0);
        b.literal(3.0);
        b.call(3);
        b.ret(1);

        let entry = b.begin_fn(1);
        b.patch(f, entry);
        b.args(vec![local(0, "...")]);
        b.load(global("select"));
        b.literal("#");
        b.load(local(0, "..."));
        b.call(2);
        b.ret(1);
    });
    assert_number(result, 3.0);
}

#[test]
fn test_upvalue_shared_between_closures() {
    // local n = 0; local function inc() n = n + 1 end; inc(); inc(); return n
    let runtime = Runtime::new();
    let result = run(&runtime, |b| {
        b.begin_fn(2);
        b.literal(0.0);
        b.store_pop(local(0, "n"));
        let inc = b.closure(usize::MAX, vec![SymbolRef::root_env(), local(0, "n")], "inc");
        b.store_pop(local(1, "inc"));
        for _ in 0..2 {
            b.load(local(1, "inc"));
            b.call(0);
            b.op_n(OpCode::Pop, 1);
        }
        b.load(local(0, "n"));
        b.ret(1);

        let entry = b.begin_fn(0);
        b.patch(inc, entry);
        let n = SymbolRef::upvalue(1, "n");
        b.load(n.clone());
        b.literal(1.0);
        b.op(OpCode::Add);
        b.store_pop(n);
        b.ret(0);
    });
    assert_number(result, 2.0);
}

#[test]
fn test_numeric_for_loop() {
    let runtime = Runtime::new();
    let result = run(&runtime, |b| {
        b.begin_fn(1);
        b.literal(0.0);
        b.store_pop(local(0, "sum"));
        let jfor = for_prologue(b, 1.0, 10.0, 1.0);
        b.load(local(0, "sum"));
        b.op_n(OpCode::Copy, 3);
        b.op(OpCode::Add);
        b.store_pop(local(0, "sum"));
        for_epilogue(b, jfor);
        b.load(local(0, "sum"));
        b.ret(1);
    });
    assert_number(result, 55.0);
}

#[test]
fn test_for_limit_must_be_a_number() {
    let runtime = Runtime::new();
    let result = run(&runtime, |b| {
        b.begin_fn(0);
        b.literal(1.0);
        b.op_n(OpCode::ToNum, 0);
        b.literal(true);
        b.op_n(OpCode::ToNum, 1);
        b.ret(0);
    });
    assert_script_error(result, "'for' limit must be a number");
}

#[test]
fn test_generic_for_over_pairs() {
    // local n = 0; for _, v in pairs(t) do n = n + v end; return n
    let runtime = Runtime::new();
    let t = runtime.new_table();
    t.set_str("a", Value::from(1.0));
    t.set_str("b", Value::from(2.0));
    t.borrow_mut().set_int(1, Value::from(4.0));
    runtime.set_global("t", Value::Table(t));

    let result = run(&runtime, |b| {
        b.begin_fn(2);
        b.literal(0.0);
        b.store_pop(local(0, "n"));
        b.load(global("pairs"));
        b.load(global("t"));
        b.call(1);
        b.op(OpCode::IterPrep);

        // [f, s, var] -> [f, s, var, f(s, var)]
        let top = b.here();
        for _ in 0..3 {
            b.op_n(OpCode::Copy, 2);
        }
        b.call(2);
        b.op_n(OpCode::Copy, 0);
        let done = b.jump(OpCode::JNil);
        b.emit(
            Instruction::new(OpCode::Store)
                .with_symbol(local(1, "v"))
                .with_num2(1),
        );
        b.op(OpCode::IterUpd);
        b.load(local(0, "n"));
        b.load(local(1, "v"));
        b.op(OpCode::Add);
        b.store_pop(local(0, "n"));
        b.op_n(OpCode::Jump, top);

        b.patch_jump(done);
        b.op_n(OpCode::Pop, 4);
        b.load(local(0, "n"));
        b.ret(1);
    });
    assert_number(result, 7.0);
}

#[test]
fn test_tail_calls_run_in_constant_frames() {
    // local function f(n) if n == 0 then return "done" end return f(n - 1) end
    let runtime = Runtime::new();
    let result = run(&runtime, |b| {
        b.begin_fn(0);
        let f = closure_placeholder(b, "count_down");
        b.store_pop(global("count_down"));
        b.load(global("count_down"));
        b.literal(1_000_000.0);
        b.call(1);
        b.ret(1);

        let entry = b.begin_fn(1);
        b.patch(f, entry);
        b.args(vec![local(0, "n")]);
        b.load(local(0, "n"));
        b.literal(0.0);
        b.op(OpCode::Eq);
        let recurse = b.jump(OpCode::Jf);
        b.literal("done");
        b.ret(1);
        b.patch_jump(recurse);
        b.load(global("count_down"));
        b.load(local(0, "n"));
        b.literal(1.0);
        b.op(OpCode::Sub);
        b.call(1);
        b.ret(1);
    });
    assert_eq!(result.unwrap(), Value::from("done"));
    assert!(runtime.main_coroutine().peak_frame_depth() <= 2);
}

#[test]
fn test_deep_recursion_overflows() {
    // local function f() return 1 + f() end
    let config = RuntimeConfig {
        max_call_depth: 50,
        ..RuntimeConfig::default()
    };
    let runtime = Runtime::with_config(&config);
    let result = run(&runtime, |b| {
        b.begin_fn(0);
        let f = closure_placeholder(b, "f");
        b.store_pop(global("f"));
        b.load(global("f"));
        b.call(0);
        b.ret(1);

        let entry = b.begin_fn(0);
        b.patch(f, entry);
        b.literal(1.0);
        b.load(global("f"));
        b.call(0);
        b.op(OpCode::Add);
        b.ret(1);
    });
    let err = result.unwrap_err();
    assert_eq!(err.as_script().map(|e| e.kind()), Some(ScriptErrorKind::StackOverflow));
    // The processor is usable again
    assert_number(run(&runtime, |b| {
        b.begin_fn(0);
        b.literal(1.0);
        b.ret(1);
    }), 1.0);
}

#[test]
fn test_calling_nil_fails() {
    let runtime = Runtime::new();
    let result = run(&runtime, |b| {
        b.begin_fn(0);
        b.load(global("missing"));
        b.call(0);
        b.ret(1);
    });
    assert_script_error(result, "attempt to call a nil value");
}

#[test]
fn test_short_circuit_jumps() {
    // return nil or "fallback"
    let runtime = Runtime::new();
    let result = run(&runtime, |b| {
        b.begin_fn(0);
        b.literal(Value::Nil);
        let skip = b.jump(OpCode::JtOrPop);
        b.literal("fallback");
        b.patch_jump(skip);
        b.ret(1);
    });
    assert_eq!(result.unwrap(), Value::from("fallback"));
}

#[test]
fn test_table_constructor_with_tuple_tail() {
    // return #{ 10, unpack(t) }
    let runtime = Runtime::new();
    runtime.set_global("t", vec![1.0, 2.0, 3.0]);
    let result = run(&runtime, |b| {
        b.begin_fn(0);
        b.op(OpCode::NewTable);
        b.literal(10.0);
        b.op_n(OpCode::TblInitI, 1);
        b.load(global("unpack"));
        b.load(global("t"));
        b.call(1);
        b.emit(
            Instruction::new(OpCode::TblInitI)
                .with_num(2)
                .with_num2(1),
        );
        b.op(OpCode::Len);
        b.ret(1);
    });
    assert_number(result, 4.0);
}

#[test]
fn test_string_concat_and_compare() {
    let runtime = Runtime::new();
    let result = run(&runtime, |b| {
        b.begin_fn(0);
        b.literal("ab");
        b.literal(1.0);
        b.op(OpCode::Concat);
        b.literal("ab2");
        b.op(OpCode::Less);
        b.ret(1);
    });
    assert_eq!(result.unwrap(), Value::Boolean(true));
}

#[test]
fn test_comparing_mixed_types_fails() {
    let runtime = Runtime::new();
    let result = run(&runtime, |b| {
        b.begin_fn(0);
        b.literal(1.0);
        b.literal("1");
        b.op(OpCode::Less);
        b.ret(1);
    });
    assert_script_error(result, "attempt to compare number with string");
}

#[test]
fn test_invalid_bytecode_is_rejected_on_load() {
    let runtime = Runtime::new();
    let code = assemble(|b| {
        b.begin_fn(0);
        b.op_n(OpCode::Jump, 99);
    });
    assert!(runtime.load(code).is_err());
}
