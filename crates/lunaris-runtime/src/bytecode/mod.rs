//! Compiler/runtime bytecode contract
//!
//! A chunk is a flat, immutable instruction array with absolute jump targets.
//! Every function of the chunk lives in the same array; a closure is an entry
//! point into it (always a `BeginFn` instruction) plus captured cells.
//!
//! Instructions carry their operands inline rather than encoded in bytes:
//! two integers, an optional literal, symbol references and a name.

mod disasm;
mod opcode;
mod validator;

pub use opcode::OpCode;
pub use validator::{validate, ValidationError, ValidationErrorKind};

use crate::symbol::SymbolRef;
use crate::value::Value;
use std::fmt;
use std::rc::Rc;

/// Position in the chunk's source text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceSpan {
    pub line: u32,
    pub column: u32,
}

/// Source position qualified with the chunk name, as reported in errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub chunk: Rc<str>,
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chunk, self.line)
    }
}

/// One instruction with its inline operands
#[derive(Debug, Clone)]
pub struct Instruction {
    pub op: OpCode,
    pub num_val: usize,
    pub num_val2: usize,
    pub value: Option<Value>,
    pub symbol: Option<SymbolRef>,
    pub symbols: Option<Rc<[SymbolRef]>>,
    pub name: Option<Rc<str>>,
    pub source: Option<SourceSpan>,
}

impl Instruction {
    pub fn new(op: OpCode) -> Self {
        Self {
            op,
            num_val: 0,
            num_val2: 0,
            value: None,
            symbol: None,
            symbols: None,
            name: None,
            source: None,
        }
    }

    pub fn with_num(mut self, num_val: usize) -> Self {
        self.num_val = num_val;
        self
    }

    pub fn with_num2(mut self, num_val2: usize) -> Self {
        self.num_val2 = num_val2;
        self
    }

    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_symbol(mut self, symbol: SymbolRef) -> Self {
        self.symbol = Some(symbol);
        self
    }

    pub fn with_symbols(mut self, symbols: Vec<SymbolRef>) -> Self {
        self.symbols = Some(symbols.into());
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(Rc::from(name));
        self
    }
}

/// Validated-on-load chunk of instructions
#[derive(Debug, Clone)]
pub struct ByteCode {
    pub name: Rc<str>,
    pub instructions: Vec<Instruction>,
}

impl ByteCode {
    pub fn new(name: &str, instructions: Vec<Instruction>) -> Self {
        Self {
            name: Rc::from(name),
            instructions,
        }
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Source location of instruction `ip`, when the compiler recorded one
    pub fn location(&self, ip: usize) -> Option<SourceLocation> {
        let span = self.instructions.get(ip)?.source?;
        Some(SourceLocation {
            chunk: Rc::clone(&self.name),
            line: span.line,
            column: span.column,
        })
    }

    /// Human-readable listing
    pub fn disassemble(&self) -> String {
        disasm::disassemble(self)
    }
}

/// Incremental chunk construction for compilers and tests
///
/// Jumps are emitted with a placeholder target and patched once the
/// destination is known:
///
/// ```
/// use lunaris_runtime::bytecode::{ByteCodeBuilder, OpCode};
///
/// let mut b = ByteCodeBuilder::new("chunk");
/// b.begin_fn(0);
/// b.literal(true);
/// let skip = b.jump(OpCode::Jf);
/// b.literal(1.0);
/// b.ret(1);
/// b.patch_jump(skip);
/// b.ret(0);
/// let code = b.build();
/// assert_eq!(code.instructions[2].num_val, 5);
/// ```
#[derive(Debug)]
pub struct ByteCodeBuilder {
    name: Rc<str>,
    instructions: Vec<Instruction>,
    source: Option<SourceSpan>,
}

impl ByteCodeBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: Rc::from(name),
            instructions: Vec::new(),
            source: None,
        }
    }

    /// Source position attached to every following instruction
    pub fn set_source(&mut self, line: u32, column: u32) {
        self.source = Some(SourceSpan { line, column });
    }

    /// Index the next instruction will get
    pub fn here(&self) -> usize {
        self.instructions.len()
    }

    pub fn emit(&mut self, mut instruction: Instruction) -> usize {
        if instruction.source.is_none() {
            instruction.source = self.source;
        }
        self.instructions.push(instruction);
        self.instructions.len() - 1
    }

    pub fn op(&mut self, op: OpCode) -> usize {
        self.emit(Instruction::new(op))
    }

    pub fn op_n(&mut self, op: OpCode, num_val: usize) -> usize {
        self.emit(Instruction::new(op).with_num(num_val))
    }

    pub fn literal(&mut self, value: impl Into<Value>) -> usize {
        self.emit(Instruction::new(OpCode::Literal).with_value(value))
    }

    pub fn begin_fn(&mut self, local_count: usize) -> usize {
        self.op_n(OpCode::BeginFn, local_count)
    }

    pub fn args(&mut self, params: Vec<SymbolRef>) -> usize {
        self.emit(Instruction::new(OpCode::Args).with_symbols(params))
    }

    pub fn load(&mut self, symbol: SymbolRef) -> usize {
        self.emit(Instruction::new(OpCode::Load).with_symbol(symbol))
    }

    /// Store the top value and pop it
    pub fn store_pop(&mut self, symbol: SymbolRef) -> usize {
        let at = self.emit(Instruction::new(OpCode::Store).with_symbol(symbol));
        self.op_n(OpCode::Pop, 1);
        at
    }

    pub fn index_n(&mut self, name: &str) -> usize {
        self.emit(Instruction::new(OpCode::IndexN).with_value(name))
    }

    pub fn call(&mut self, arg_count: usize) -> usize {
        self.op_n(OpCode::Call, arg_count)
    }

    pub fn ret(&mut self, count: usize) -> usize {
        self.op_n(OpCode::Ret, count)
    }

    pub fn closure(&mut self, entry_point: usize, captures: Vec<SymbolRef>, name: &str) -> usize {
        self.emit(
            Instruction::new(OpCode::Closure)
                .with_num(entry_point)
                .with_symbols(captures)
                .with_name(name),
        )
    }

    /// Emit a jump with an unresolved target
    pub fn jump(&mut self, op: OpCode) -> usize {
        self.op_n(op, usize::MAX)
    }

    /// Point the jump at `at` to the next instruction
    pub fn patch_jump(&mut self, at: usize) {
        let target = self.here();
        self.patch(at, target);
    }

    /// Overwrite `num_val` of instruction `at`
    pub fn patch(&mut self, at: usize, num_val: usize) {
        if let Some(instruction) = self.instructions.get_mut(at) {
            instruction.num_val = num_val;
        }
    }

    pub fn build(self) -> ByteCode {
        ByteCode {
            name: self.name,
            instructions: self.instructions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_applies_to_following_instructions() {
        let mut b = ByteCodeBuilder::new("chunk");
        b.op(OpCode::Nop);
        b.set_source(4, 2);
        b.op(OpCode::Nop);
        let code = b.build();

        assert_eq!(code.location(0), None);
        assert_eq!(
            code.location(1),
            Some(SourceLocation {
                chunk: Rc::from("chunk"),
                line: 4,
                column: 2
            })
        );
        assert_eq!(code.location(7), None);
    }

    #[test]
    fn test_unpatched_jump_is_placeholder() {
        let mut b = ByteCodeBuilder::new("chunk");
        let at = b.jump(OpCode::Jump);
        assert_eq!(b.build().instructions[at].num_val, usize::MAX);
    }

    #[test]
    fn test_store_pop_emits_two_instructions() {
        let mut b = ByteCodeBuilder::new("chunk");
        b.store_pop(SymbolRef::local(0, "x"));
        let code = b.build();
        assert_eq!(code.instructions[0].op, OpCode::Store);
        assert_eq!(code.instructions[1].op, OpCode::Pop);
        assert_eq!(code.instructions[1].num_val, 1);
    }
}
