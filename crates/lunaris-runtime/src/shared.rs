//! State shared by every processor of one runtime
//!
//! Coroutines own their stacks but see one global table, one reference-id
//! sequence and one set of type metatables through [`RuntimeShared`].

use crate::coroutine::CoroutineRef;
use crate::table::TableRef;
use crate::value::{DataType, RefIdAllocator};
use lunaris_config::RuntimeConfig;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag
///
/// Clones share the flag and may be handed to other threads; the processor
/// polls it once per instruction.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear a previous cancellation so the runtime can be used again
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Sink for the `print` library function
pub type PrintHook = Box<dyn Fn(&str)>;

pub struct RuntimeShared {
    ids: RefIdAllocator,
    globals: TableRef,
    type_metatables: RefCell<HashMap<DataType, TableRef>>,
    /// Coroutines currently being resumed, innermost last
    in_flight: RefCell<Vec<CoroutineRef>>,
    config: RuntimeConfig,
    cancel: CancellationToken,
    print_hook: RefCell<PrintHook>,
}

impl RuntimeShared {
    pub fn new(config: RuntimeConfig) -> Self {
        let ids = RefIdAllocator::new();
        let globals = TableRef::new(&ids);
        Self {
            ids,
            globals,
            type_metatables: RefCell::new(HashMap::new()),
            in_flight: RefCell::new(Vec::new()),
            config,
            cancel: CancellationToken::new(),
            print_hook: RefCell::new(Box::new(|line| println!("{}", line))),
        }
    }

    pub fn ids(&self) -> &RefIdAllocator {
        &self.ids
    }

    pub fn globals(&self) -> &TableRef {
        &self.globals
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn new_table(&self) -> TableRef {
        TableRef::new(&self.ids)
    }

    /// Metatable used for every value of a non-table type
    pub fn type_metatable(&self, data_type: DataType) -> Option<TableRef> {
        if data_type == DataType::Table {
            return None;
        }
        self.type_metatables.borrow().get(&data_type).cloned()
    }

    pub fn set_type_metatable(&self, data_type: DataType, metatable: Option<TableRef>) {
        let mut metatables = self.type_metatables.borrow_mut();
        match metatable {
            Some(meta) => {
                metatables.insert(data_type, meta);
            }
            None => {
                metatables.remove(&data_type);
            }
        }
    }

    pub(crate) fn push_coroutine(&self, coroutine: CoroutineRef) {
        self.in_flight.borrow_mut().push(coroutine);
    }

    pub(crate) fn pop_coroutine(&self) {
        self.in_flight.borrow_mut().pop();
    }

    /// Innermost coroutine being resumed
    pub fn current_coroutine(&self) -> Option<CoroutineRef> {
        self.in_flight.borrow().last().cloned()
    }

    pub fn coroutine_depth(&self) -> usize {
        self.in_flight.borrow().len()
    }

    pub fn set_print_hook(&self, hook: PrintHook) {
        *self.print_hook.borrow_mut() = hook;
    }

    pub fn print(&self, line: &str) {
        (self.print_hook.borrow())(line)
    }
}

impl fmt::Debug for RuntimeShared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeShared")
            .field("globals", &self.globals)
            .field("coroutine_depth", &self.coroutine_depth())
            .finish()
    }
}
