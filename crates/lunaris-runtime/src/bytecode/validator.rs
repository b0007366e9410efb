//! Bytecode validator: static checks before a chunk is loaded
//!
//! Performs three checks per instruction:
//! 1. **Operands**: every opcode carries the inline operands it needs
//! 2. **Targets**: jump targets and closure entry points are within bounds,
//!    and entry points land on a `BeginFn`
//! 3. **Shape**: `Ret` returns 0 or 1 values, no `Invalid` opcode is present
//!
//! All problems are collected; the loader rejects the chunk on any of them.

use crate::bytecode::{ByteCode, Instruction, OpCode};
use crate::symbol::SymbolRef;
use thiserror::Error;

// ============================================================================
// Public API
// ============================================================================

/// A validation error at instruction index `offset`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("instruction {offset}: {kind}")]
pub struct ValidationError {
    pub offset: usize,
    pub kind: ValidationErrorKind,
}

/// Kinds of problems the validator detects
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationErrorKind {
    #[error("chunk is empty")]
    Empty,

    #[error("chunk does not start with BEGINFN")]
    MissingEntry,

    #[error("{op} is missing its {operand} operand")]
    MissingOperand {
        op: &'static str,
        operand: &'static str,
    },

    #[error("jump target {target} is out of bounds (len={len})")]
    JumpOutOfBounds { target: usize, len: usize },

    #[error("closure entry point {target} is not a BEGINFN")]
    BadEntryPoint { target: usize },

    #[error("RET with {count} values (expected 0 or 1)")]
    BadReturnCount { count: usize },

    #[error("closure captures a global symbol")]
    GlobalCapture,

    #[error("invalid opcode")]
    InvalidOpcode,
}

/// Validate `code`, collecting every problem found
pub fn validate(code: &ByteCode) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if code.is_empty() {
        errors.push(ValidationError {
            offset: 0,
            kind: ValidationErrorKind::Empty,
        });
        return Err(errors);
    }
    if code.instructions[0].op != OpCode::BeginFn {
        errors.push(ValidationError {
            offset: 0,
            kind: ValidationErrorKind::MissingEntry,
        });
    }

    for (offset, instruction) in code.instructions.iter().enumerate() {
        if let Err(kind) = check_instruction(code, instruction) {
            errors.push(ValidationError { offset, kind });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

// ============================================================================
// Checks
// ============================================================================

fn check_instruction(code: &ByteCode, i: &Instruction) -> Result<(), ValidationErrorKind> {
    let missing = |operand: &'static str| ValidationErrorKind::MissingOperand {
        op: i.op.mnemonic(),
        operand,
    };

    match i.op {
        OpCode::Literal | OpCode::IndexN | OpCode::IndexSetN if i.value.is_none() => {
            return Err(missing("value"))
        }
        OpCode::Load | OpCode::Store if i.symbol.is_none() => return Err(missing("symbol")),
        OpCode::Args if i.symbols.is_none() => return Err(missing("symbols")),
        OpCode::Closure => {
            let captures = i.symbols.as_deref().ok_or_else(|| missing("symbols"))?;
            if captures.iter().any(|s| matches!(s, SymbolRef::Global { .. })) {
                return Err(ValidationErrorKind::GlobalCapture);
            }
            match code.instructions.get(i.num_val) {
                Some(target) if target.op == OpCode::BeginFn => {}
                _ => return Err(ValidationErrorKind::BadEntryPoint { target: i.num_val }),
            }
        }
        OpCode::Ret if i.num_val > 1 => {
            return Err(ValidationErrorKind::BadReturnCount { count: i.num_val })
        }
        OpCode::Invalid => return Err(ValidationErrorKind::InvalidOpcode),
        op if op.is_jump() && i.num_val >= code.len() => {
            return Err(ValidationErrorKind::JumpOutOfBounds {
                target: i.num_val,
                len: code.len(),
            })
        }
        _ => {}
    }
    Ok(())
}
