//! Symbol references and lexical scope resolution
//!
//! A compiler resolves every variable to a [`SymbolRef`] ahead of time; the
//! processor only ever follows those references. [`ScopeResolver`] is the
//! helper that produces them.

use std::fmt;
use std::rc::Rc;

/// Name of the environment variable every chunk captures as upvalue 0
pub const ENV_NAME: &str = "_ENV";

/// Name of the variadic parameter
pub const VARARGS_NAME: &str = "...";

/// Compile-time-resolved variable reference
#[derive(Debug, Clone, PartialEq)]
pub enum SymbolRef {
    /// Slot in the current frame's locals
    Local { index: usize, name: Rc<str> },
    /// Slot in the running closure's captures
    Upvalue { index: usize, name: Rc<str> },
    /// Field of the environment table the `env` symbol resolves to
    Global { name: Rc<str>, env: Box<SymbolRef> },
}

impl SymbolRef {
    pub fn local(index: usize, name: &str) -> Self {
        SymbolRef::Local {
            index,
            name: Rc::from(name),
        }
    }

    pub fn upvalue(index: usize, name: &str) -> Self {
        SymbolRef::Upvalue {
            index,
            name: Rc::from(name),
        }
    }

    pub fn global(name: &str, env: SymbolRef) -> Self {
        SymbolRef::Global {
            name: Rc::from(name),
            env: Box::new(env),
        }
    }

    /// The chunk environment as seen from the root function
    pub fn root_env() -> Self {
        SymbolRef::upvalue(0, ENV_NAME)
    }

    pub fn name(&self) -> &str {
        match self {
            SymbolRef::Local { name, .. }
            | SymbolRef::Upvalue { name, .. }
            | SymbolRef::Global { name, .. } => name,
        }
    }

    pub fn is_varargs(&self) -> bool {
        matches!(self, SymbolRef::Local { name, .. } if &**name == VARARGS_NAME)
    }
}

impl fmt::Display for SymbolRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolRef::Local { index, name } => write!(f, "local {}@{}", name, index),
            SymbolRef::Upvalue { index, name } => write!(f, "upvalue {}@{}", name, index),
            SymbolRef::Global { name, env } => write!(f, "global {} in {}", name, env),
        }
    }
}

/// Frame layout of a finished function
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionLayout {
    /// Operand of the function's `BeginFn`
    pub local_count: usize,
    /// What the `Closure` instruction must capture, resolved in the enclosing function
    pub captures: Vec<SymbolRef>,
    /// Names of the function's upvalues, in index order
    pub upvalue_names: Vec<Rc<str>>,
}

#[derive(Debug)]
struct Upvalue {
    name: Rc<str>,
    /// None for the root's `_ENV`, which the host supplies
    capture: Option<SymbolRef>,
}

#[derive(Debug, Default)]
struct FunctionScope {
    /// Visible locals, innermost last
    visible: Vec<(Rc<str>, usize)>,
    /// Length of `visible` at each open block
    blocks: Vec<usize>,
    local_count: usize,
    upvalues: Vec<Upvalue>,
}

impl FunctionScope {
    fn find_local(&self, name: &str) -> Option<usize> {
        self.visible
            .iter()
            .rev()
            .find(|(n, _)| &**n == name)
            .map(|(_, index)| *index)
    }

    fn find_upvalue(&self, name: &str) -> Option<usize> {
        self.upvalues.iter().position(|u| &*u.name == name)
    }
}

/// Lexical scope tracker for compilers
///
/// Starts with the root function open; the root has `_ENV` as upvalue 0.
#[derive(Debug)]
pub struct ScopeResolver {
    /// Stack of open functions (innermost last)
    functions: Vec<FunctionScope>,
}

impl ScopeResolver {
    pub fn new() -> Self {
        let root = FunctionScope {
            upvalues: vec![Upvalue {
                name: Rc::from(ENV_NAME),
                capture: None,
            }],
            ..FunctionScope::default()
        };
        Self {
            functions: vec![root],
        }
    }

    fn current(&mut self) -> &mut FunctionScope {
        let last = self.functions.len() - 1;
        &mut self.functions[last]
    }

    pub fn push_function(&mut self) {
        self.functions.push(FunctionScope::default());
    }

    /// Close the innermost function and report its layout
    pub fn pop_function(&mut self) -> Option<FunctionLayout> {
        let scope = self.functions.pop()?;
        Some(FunctionLayout {
            local_count: scope.local_count,
            captures: scope
                .upvalues
                .iter()
                .filter_map(|u| u.capture.clone())
                .collect(),
            upvalue_names: scope.upvalues.into_iter().map(|u| u.name).collect(),
        })
    }

    pub fn push_block(&mut self) {
        let scope = self.current();
        let mark = scope.visible.len();
        scope.blocks.push(mark);
    }

    /// Close the innermost block; its locals go out of sight
    pub fn pop_block(&mut self) {
        let scope = self.current();
        if let Some(mark) = scope.blocks.pop() {
            scope.visible.truncate(mark);
        }
    }

    /// Allocate a fresh slot; a repeated name shadows the earlier one
    pub fn define_local(&mut self, name: &str) -> SymbolRef {
        let scope = self.current();
        let index = scope.local_count;
        scope.local_count += 1;
        let name: Rc<str> = Rc::from(name);
        scope.visible.push((Rc::clone(&name), index));
        SymbolRef::Local { index, name }
    }

    /// Resolve a name from the innermost open function outwards.
    ///
    /// Names no function declares become globals of `_ENV`.
    pub fn resolve(&mut self, name: &str) -> SymbolRef {
        let level = self.functions.len() - 1;
        if let Some(symbol) = self.resolve_at(level, name) {
            return symbol;
        }
        let env = self
            .resolve_at(level, ENV_NAME)
            .unwrap_or_else(SymbolRef::root_env);
        SymbolRef::global(name, env)
    }

    fn resolve_at(&mut self, level: usize, name: &str) -> Option<SymbolRef> {
        let scope = &self.functions[level];
        if let Some(index) = scope.find_local(name) {
            return Some(SymbolRef::local(index, name));
        }
        if let Some(index) = scope.find_upvalue(name) {
            return Some(SymbolRef::upvalue(index, name));
        }
        if level == 0 {
            return None;
        }

        // Capture through every intermediate function
        let outer = self.resolve_at(level - 1, name)?;
        let scope = &mut self.functions[level];
        let index = scope.upvalues.len();
        scope.upvalues.push(Upvalue {
            name: Rc::from(name),
            capture: Some(outer),
        });
        Some(SymbolRef::upvalue(index, name))
    }
}

impl Default for ScopeResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_unknown_name_is_global_of_root_env() {
        let mut r = ScopeResolver::new();
        assert_eq!(r.resolve("print"), SymbolRef::global("print", SymbolRef::root_env()));
    }

    #[test]
    fn test_shadowing_prefers_latest() {
        let mut r = ScopeResolver::new();
        r.define_local("x");
        r.push_block();
        let inner = r.define_local("x");
        assert_eq!(r.resolve("x"), inner);
        r.pop_block();
        assert_eq!(r.resolve("x"), SymbolRef::local(0, "x"));
    }

    #[test]
    fn test_capture_through_intermediate_function() {
        let mut r = ScopeResolver::new();
        r.define_local("counter");

        r.push_function();
        r.push_function();
        assert_eq!(r.resolve("counter"), SymbolRef::upvalue(0, "counter"));
        let innermost = r.pop_function().unwrap();
        assert_eq!(innermost.captures, vec![SymbolRef::upvalue(0, "counter")]);

        let middle = r.pop_function().unwrap();
        assert_eq!(middle.captures, vec![SymbolRef::local(0, "counter")]);
    }

    #[test]
    fn test_nested_global_captures_env() {
        let mut r = ScopeResolver::new();
        r.push_function();
        assert_eq!(
            r.resolve("x"),
            SymbolRef::global("x", SymbolRef::upvalue(0, ENV_NAME))
        );
        let layout = r.pop_function().unwrap();
        assert_eq!(layout.captures, vec![SymbolRef::root_env()]);
    }

    #[test]
    fn test_root_layout() {
        let mut r = ScopeResolver::new();
        r.define_local("a");
        r.define_local("b");
        let layout = r.pop_function().unwrap();
        assert_eq!(layout.local_count, 2);
        assert!(layout.captures.is_empty());
        assert_eq!(layout.upvalue_names, vec![Rc::<str>::from(ENV_NAME)]);
    }
}
