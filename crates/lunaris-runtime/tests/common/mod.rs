//! Shared test utilities
//!
//! Tests drive the runtime with hand-assembled chunks. These helpers keep the
//! assembly short: globals resolve through the chunk's `_ENV` upvalue, and
//! nested functions capture that upvalue as their own upvalue 0.

#![allow(dead_code)]

use lunaris_runtime::bytecode::{ByteCode, ByteCodeBuilder, OpCode};
use lunaris_runtime::symbol::SymbolRef;
use lunaris_runtime::{Runtime, RuntimeError, RuntimeResult, Value};

use pretty_assertions::assert_eq;

/// Global variable as seen from the root function or any nested function
/// that captured `_ENV` first
pub fn global(name: &str) -> SymbolRef {
    SymbolRef::global(name, SymbolRef::root_env())
}

pub fn local(index: usize, name: &str) -> SymbolRef {
    SymbolRef::local(index, name)
}

/// Assemble a chunk
pub fn assemble(build: impl FnOnce(&mut ByteCodeBuilder)) -> ByteCode {
    let mut b = ByteCodeBuilder::new("test");
    build(&mut b);
    b.build()
}

/// Load and call a chunk on the main coroutine
pub fn run(runtime: &Runtime, build: impl FnOnce(&mut ByteCodeBuilder)) -> RuntimeResult<Value> {
    let chunk = runtime.load(assemble(build))?;
    runtime.call_function(&chunk, vec![])
}

/// Emit `Closure` for a function whose body is emitted later; returns the
/// instruction to patch with [`ByteCodeBuilder::patch`]
pub fn closure_placeholder(b: &mut ByteCodeBuilder, name: &str) -> usize {
    b.closure(usize::MAX, vec![SymbolRef::root_env()], name)
}

/// `global.field` pushed on the stack
pub fn load_field(b: &mut ByteCodeBuilder, table: &str, field: &str) {
    b.load(global(table));
    b.index_n(field);
}

/// `f(args...)` where `f` is a global and every argument a literal
pub fn call_global(b: &mut ByteCodeBuilder, name: &str, args: &[Value]) {
    b.load(global(name));
    for arg in args {
        b.literal(arg.clone());
    }
    b.call(args.len());
}

/// Emit a numeric `for` prologue over literal bounds; returns the `JFor` index
pub fn for_prologue(b: &mut ByteCodeBuilder, start: f64, limit: f64, step: f64) -> usize {
    for (operand, value) in [start, limit, step].into_iter().enumerate() {
        b.literal(value);
        b.op_n(OpCode::ToNum, operand);
    }
    b.jump(OpCode::JFor)
}

/// Close a `for` loop opened by [`for_prologue`]
pub fn for_epilogue(b: &mut ByteCodeBuilder, jfor: usize) {
    b.op(OpCode::Incr);
    b.op_n(OpCode::Jump, jfor);
    b.patch_jump(jfor);
    b.op_n(OpCode::Pop, 3);
}

pub fn assert_number(result: RuntimeResult<Value>, expected: f64) {
    match result {
        Ok(Value::Number(n)) => assert_eq!(n, expected, "Expected {}, got {}", expected, n),
        other => panic!("Expected Number({}), got {:?}", expected, other),
    }
}

/// Assert a script error whose undecorated message is `expected`
pub fn assert_script_error(result: RuntimeResult<Value>, expected: &str) {
    match result {
        Err(RuntimeError::Script(err)) => assert_eq!(err.message(), expected),
        other => panic!("Expected script error {:?}, got {:?}", expected, other),
    }
}

pub fn values(value: Value) -> Vec<Value> {
    value.into_values()
}
