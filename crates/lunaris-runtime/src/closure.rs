//! Script closures and captured variable cells

use crate::bytecode::ByteCode;
use crate::value::{RefIdAllocator, Value};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Shared, mutable variable slot
///
/// Locals live in cells so a nested closure can capture the slot itself;
/// writes through either side are visible to the other.
pub type ValueCell = Rc<RefCell<Value>>;

pub fn new_cell(value: Value) -> ValueCell {
    Rc::new(RefCell::new(value))
}

/// A function body plus its captured environment
pub struct Closure {
    code: Rc<ByteCode>,
    entry_point: usize,
    upvalues: Vec<ValueCell>,
    upvalue_names: Vec<Rc<str>>,
    name: Option<Rc<str>>,
    ref_id: u64,
}

impl Closure {
    pub fn code(&self) -> &Rc<ByteCode> {
        &self.code
    }

    pub fn entry_point(&self) -> usize {
        self.entry_point
    }

    pub fn upvalue(&self, index: usize) -> Option<&ValueCell> {
        self.upvalues.get(index)
    }

    pub fn upvalue_count(&self) -> usize {
        self.upvalues.len()
    }

    /// Names of the captured variables, for introspection only
    pub fn upvalue_names(&self) -> &[Rc<str>] {
        &self.upvalue_names
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

/// Shared handle to a [`Closure`]
#[derive(Clone)]
pub struct ClosureRef(Rc<Closure>);

impl ClosureRef {
    pub fn new(
        code: Rc<ByteCode>,
        entry_point: usize,
        upvalues: Vec<ValueCell>,
        upvalue_names: Vec<Rc<str>>,
        name: Option<Rc<str>>,
        ids: &RefIdAllocator,
    ) -> Self {
        ClosureRef(Rc::new(Closure {
            code,
            entry_point,
            upvalues,
            upvalue_names,
            name,
            ref_id: ids.next_id(),
        }))
    }

    pub fn ref_id(&self) -> u64 {
        self.0.ref_id
    }

    pub fn ptr_eq(&self, other: &ClosureRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Name for tracebacks
    pub fn display_name(&self) -> &str {
        self.0.name().unwrap_or("?")
    }
}

impl std::ops::Deref for ClosureRef {
    type Target = Closure;

    fn deref(&self) -> &Closure {
        &self.0
    }
}

impl fmt::Debug for ClosureRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClosureRef({} #{})", self.display_name(), self.ref_id())
    }
}
