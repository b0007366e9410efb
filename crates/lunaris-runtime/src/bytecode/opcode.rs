//! Instruction set
//!
//! Stack notation: `[.., a, b]` lists the top of the value stack last.
//! "Offset" operands count down from the top (0 is the top value).

/// Bytecode opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    // ===== Stack =====
    /// No operation
    Nop,
    /// Pop `num_val` values
    Pop,
    /// Push a copy of the value at offset `num_val`
    Copy,
    /// Swap the values at offsets `num_val` and `num_val2`
    Swap,
    /// Push `value`
    Literal,
    /// Pop `num_val` values, push them as one tuple (last one spliced)
    MkTuple,
    /// Collapse the top value to a scalar
    Scalar,

    // ===== Variables =====
    /// Push the value of `symbol`
    Load,
    /// Assign element `num_val2` of the value at offset `num_val` to `symbol`; no pop
    Store,
    /// Give locals `num_val .. num_val + num_val2` fresh cells holding nil
    Clean,

    // ===== Functions =====
    /// Push a closure over `symbols` with entry point `num_val`, named `name`
    Closure,
    /// Allocate `num_val` local cells for the new frame
    BeginFn,
    /// Bind the frame's pending arguments to the parameter locals in `symbols`
    Args,
    /// `[.., f, a1..an]` with n = `num_val`: call f
    Call,
    /// Like `Call`, with the receiver as the first argument
    ThisCall,
    /// Return Void (`num_val` = 0) or the popped top value (`num_val` = 1)
    Ret,

    // ===== Tables =====
    /// Push an empty table
    NewTable,
    /// `[.., t, k, v]` -> `[.., t]` with `t[k] = v` (raw)
    TblInitN,
    /// `[.., t, v]` -> `[.., t]` with `t[num_val] = v` (raw); when `num_val2`
    /// is 1 a tuple `v` fills `num_val`, `num_val + 1`, ...
    TblInitI,
    /// `[.., o, k]` -> `[.., o[k]]`
    Index,
    /// `[.., o]` -> `[.., o[value]]`
    IndexN,
    /// `[.., o, keys]` -> `[.., o[keys...]]` (multi-key, user data only)
    IndexL,
    /// `[.., o, k]` -> `[..]` with `o[k] = ` element `num_val2` of the value
    /// at offset `num_val`
    IndexSet,
    /// `[.., o]` -> `[..]` with `o[value] = ` element `num_val2` of offset `num_val`
    IndexSetN,
    /// `[.., o, keys]` -> `[..]`, multi-key assignment (user data only)
    IndexSetL,

    // ===== Control flow =====
    /// Jump to `num_val`
    Jump,
    /// Pop; jump to `num_val` when falsy
    Jf,
    /// Pop; jump to `num_val` when nil
    JNil,
    /// Jump to `num_val` keeping the top when truthy, else pop
    JtOrPop,
    /// Jump to `num_val` keeping the top when falsy, else pop
    JfOrPop,
    /// `[.., var, limit, step]`: jump to `num_val` once the loop is done
    JFor,
    /// `[.., var, limit, step]` -> `var += step`
    Incr,
    /// Coerce the top to a number; `num_val` names the `for` operand (0-2)
    ToNum,
    /// Replace the top with its truthiness
    ToBool,
    /// Normalize the top value into `[.., f, s, var]`
    IterPrep,
    /// `[.., f, s, var, results]` -> `[.., f, s, results[0]]`
    IterUpd,

    // ===== Operators =====
    Concat,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Neg,
    Not,
    Len,
    Eq,
    Less,
    LessEq,

    /// Never emitted by a correct compiler
    Invalid,
}

impl OpCode {
    /// Operand `num_val` is an absolute instruction index
    pub fn is_jump(self) -> bool {
        matches!(
            self,
            OpCode::Jump
                | OpCode::Jf
                | OpCode::JNil
                | OpCode::JtOrPop
                | OpCode::JfOrPop
                | OpCode::JFor
        )
    }

    /// Binary operator consuming two operands
    pub fn is_binary(self) -> bool {
        matches!(
            self,
            OpCode::Concat
                | OpCode::Add
                | OpCode::Sub
                | OpCode::Mul
                | OpCode::Div
                | OpCode::Mod
                | OpCode::Pow
                | OpCode::Eq
                | OpCode::Less
                | OpCode::LessEq
        )
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            OpCode::Nop => "NOP",
            OpCode::Pop => "POP",
            OpCode::Copy => "COPY",
            OpCode::Swap => "SWAP",
            OpCode::Literal => "LITERAL",
            OpCode::MkTuple => "MKTUPLE",
            OpCode::Scalar => "SCALAR",
            OpCode::Load => "LOAD",
            OpCode::Store => "STORE",
            OpCode::Clean => "CLEAN",
            OpCode::Closure => "CLOSURE",
            OpCode::BeginFn => "BEGINFN",
            OpCode::Args => "ARGS",
            OpCode::Call => "CALL",
            OpCode::ThisCall => "THISCALL",
            OpCode::Ret => "RET",
            OpCode::NewTable => "NEWTABLE",
            OpCode::TblInitN => "TBLINITN",
            OpCode::TblInitI => "TBLINITI",
            OpCode::Index => "INDEX",
            OpCode::IndexN => "INDEXN",
            OpCode::IndexL => "INDEXL",
            OpCode::IndexSet => "INDEXSET",
            OpCode::IndexSetN => "INDEXSETN",
            OpCode::IndexSetL => "INDEXSETL",
            OpCode::Jump => "JUMP",
            OpCode::Jf => "JF",
            OpCode::JNil => "JNIL",
            OpCode::JtOrPop => "JTORPOP",
            OpCode::JfOrPop => "JFORPOP",
            OpCode::JFor => "JFOR",
            OpCode::Incr => "INCR",
            OpCode::ToNum => "TONUM",
            OpCode::ToBool => "TOBOOL",
            OpCode::IterPrep => "ITERPREP",
            OpCode::IterUpd => "ITERUPD",
            OpCode::Concat => "CONCAT",
            OpCode::Add => "ADD",
            OpCode::Sub => "SUB",
            OpCode::Mul => "MUL",
            OpCode::Div => "DIV",
            OpCode::Mod => "MOD",
            OpCode::Pow => "POW",
            OpCode::Neg => "NEG",
            OpCode::Not => "NOT",
            OpCode::Len => "LEN",
            OpCode::Eq => "EQ",
            OpCode::Less => "LESS",
            OpCode::LessEq => "LESSEQ",
            OpCode::Invalid => "INVALID",
        }
    }
}
