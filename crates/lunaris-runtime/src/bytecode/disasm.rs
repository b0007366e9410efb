//! Bytecode disassembler
//!
//! Converts a chunk back to a human-readable listing. Used for debugging and
//! snapshot tests.

use super::{ByteCode, Instruction, OpCode};
use crate::value::Value;
use std::fmt::Write;

/// Disassemble a chunk
///
/// # Format
/// ```text
/// === chunk ===
/// 0000  BEGINFN    1
/// 0001  LITERAL    "hello"
/// 0002  STORE      local x@0 0 0
/// 0003  RET        1        ; line 3
/// ```
pub fn disassemble(code: &ByteCode) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "=== {} ===", code.name);
    for (offset, instruction) in code.instructions.iter().enumerate() {
        let _ = writeln!(output, "{}", disassemble_instruction(offset, instruction));
    }
    output
}

fn disassemble_instruction(offset: usize, instruction: &Instruction) -> String {
    let operands = operands(instruction);
    let mut line = if operands.is_empty() {
        format!("{:04}  {}", offset, instruction.op.mnemonic())
    } else {
        format!("{:04}  {:<10} {}", offset, instruction.op.mnemonic(), operands)
    };
    if let Some(span) = instruction.source {
        let _ = write!(line, "  ; line {}", span.line);
    }
    line
}

fn operands(i: &Instruction) -> String {
    match i.op {
        OpCode::Nop
        | OpCode::NewTable
        | OpCode::TblInitN
        | OpCode::Index
        | OpCode::IndexL
        | OpCode::Scalar
        | OpCode::ToBool
        | OpCode::IterPrep
        | OpCode::IterUpd
        | OpCode::Incr
        | OpCode::Concat
        | OpCode::Add
        | OpCode::Sub
        | OpCode::Mul
        | OpCode::Div
        | OpCode::Mod
        | OpCode::Pow
        | OpCode::Neg
        | OpCode::Not
        | OpCode::Len
        | OpCode::Eq
        | OpCode::Less
        | OpCode::LessEq
        | OpCode::Invalid => String::new(),

        OpCode::Pop
        | OpCode::Copy
        | OpCode::MkTuple
        | OpCode::BeginFn
        | OpCode::Ret
        | OpCode::ToNum
        | OpCode::Jump
        | OpCode::Jf
        | OpCode::JNil
        | OpCode::JtOrPop
        | OpCode::JfOrPop
        | OpCode::JFor => i.num_val.to_string(),

        OpCode::Call | OpCode::ThisCall => match &i.name {
            Some(name) => format!("{} {}", i.num_val, name),
            None => i.num_val.to_string(),
        },

        OpCode::Swap | OpCode::Clean | OpCode::TblInitI | OpCode::IndexSet | OpCode::IndexSetL => {
            format!("{} {}", i.num_val, i.num_val2)
        }

        OpCode::Literal | OpCode::IndexN => i.value.as_ref().map(format_value).unwrap_or_default(),

        OpCode::IndexSetN => format!(
            "{} {} {}",
            i.value.as_ref().map(format_value).unwrap_or_default(),
            i.num_val,
            i.num_val2
        ),

        OpCode::Load => i.symbol.as_ref().map(|s| s.to_string()).unwrap_or_default(),

        OpCode::Store => format!(
            "{} {} {}",
            i.symbol.as_ref().map(|s| s.to_string()).unwrap_or_default(),
            i.num_val,
            i.num_val2
        ),

        OpCode::Args => format_symbols(i),

        OpCode::Closure => format!(
            "{} @{} [{}]",
            i.name.as_deref().unwrap_or("?"),
            i.num_val,
            format_symbols(i)
        ),
    }
}

fn format_symbols(i: &Instruction) -> String {
    i.symbols
        .as_deref()
        .unwrap_or(&[])
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => format!("{:?}", s),
        other => other.to_string(),
    }
}
