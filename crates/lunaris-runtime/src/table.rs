//! Hybrid array/hash associative container
//!
//! A table keeps every entry in one insertion-ordered backing sequence and
//! indexes it three ways, chosen by the canonical class of the key:
//!
//! ```text
//!  string_index  "name" ─┐
//!  array_index        1 ─┼──► entries: [(k0,v0) (k1,v1) (k2,nil) (k3,v3) ...]
//!  value_index     true ─┘                          ▲
//!                                                   └ tombstone
//! ```
//!
//! Assigning nil to an existing key leaves a tombstone in place so that an
//! iteration in progress can continue from that key. Tombstones are swept by
//! [`Table::collect_dead_keys`], which runs lazily: only when a non-nil value
//! is inserted while the table is known to contain dead entries.
//!
//! Floats equal to a positive integer are stored under the integer key.

use crate::error::{ScriptError, ScriptErrorKind};
use crate::value::{RefIdAllocator, Value};
use ordered_float::OrderedFloat;
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// Largest integer key routed to the array index (2^53)
const MAX_ARRAY_KEY: f64 = 9_007_199_254_740_992.0;

/// A key/value pair yielded by iteration
#[derive(Debug, Clone, PartialEq)]
pub struct TablePair {
    pub key: Value,
    pub value: Value,
}

impl TablePair {
    /// End-of-iteration sentinel
    pub fn nil() -> Self {
        Self {
            key: Value::Nil,
            value: Value::Nil,
        }
    }

    pub fn is_nil(&self) -> bool {
        self.key.is_nil()
    }
}

/// Key wrapper for the generic index
///
/// Never holds nil, NaN, strings or positive integers.
#[derive(Clone)]
struct ValueKey(Value);

impl PartialEq for ValueKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.raw_equals(&other.0)
    }
}

impl Eq for ValueKey {}

impl Hash for ValueKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(&self.0).hash(state);
        match &self.0 {
            Value::Number(n) => {
                let n = if *n == 0.0 { 0.0 } else { *n };
                OrderedFloat(n).hash(state)
            }
            Value::Boolean(b) => b.hash(state),
            other => other.ref_id().hash(state),
        }
    }
}

enum KeyClass {
    Str(Rc<str>),
    Int(usize),
    Other(ValueKey),
}

fn classify(key: &Value) -> Option<KeyClass> {
    match key {
        Value::String(s) => Some(KeyClass::Str(Rc::clone(s))),
        Value::Number(n) if n.is_nan() => None,
        Value::Number(n) if n.fract() == 0.0 && *n >= 1.0 && *n <= MAX_ARRAY_KEY => {
            Some(KeyClass::Int(*n as usize))
        }
        Value::Nil | Value::Void => None,
        Value::Tuple(_) => classify(&key.to_scalar()),
        other => Some(KeyClass::Other(ValueKey(other.clone()))),
    }
}

fn classify_for_write(key: &Value) -> Result<KeyClass, ScriptError> {
    classify(key).ok_or_else(|| {
        let msg = match key.to_scalar() {
            Value::Number(_) => "table index is NaN",
            _ => "table index is nil",
        };
        ScriptError::new(ScriptErrorKind::Index, msg)
    })
}

struct Entry {
    key: Value,
    value: Value,
}

/// Associative container (use through [`TableRef`])
#[derive(Default)]
pub struct Table {
    entries: Vec<Entry>,
    string_index: HashMap<Rc<str>, usize>,
    array_index: HashMap<usize, usize>,
    value_index: HashMap<ValueKey, usize>,
    cached_length: Cell<Option<usize>>,
    contains_dead: bool,
    metatable: Option<TableRef>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, class: &KeyClass) -> Option<usize> {
        match class {
            KeyClass::Str(s) => self.string_index.get(s).copied(),
            KeyClass::Int(i) => self.array_index.get(i).copied(),
            KeyClass::Other(k) => self.value_index.get(k).copied(),
        }
    }

    fn value_at(&self, slot: Option<usize>) -> Value {
        slot.map(|pos| self.entries[pos].value.clone())
            .unwrap_or(Value::Nil)
    }

    /// Raw read; missing keys (and nil/NaN keys) yield Nil
    pub fn get(&self, key: &Value) -> Value {
        match classify(key) {
            Some(class) => self.value_at(self.slot(&class)),
            None => Value::Nil,
        }
    }

    pub fn get_str(&self, key: &str) -> Value {
        self.value_at(self.string_index.get(key).copied())
    }

    pub fn get_int(&self, key: i64) -> Value {
        if key >= 1 {
            self.value_at(self.array_index.get(&(key as usize)).copied())
        } else {
            self.get(&Value::Number(key as f64))
        }
    }

    /// Raw write; assigning nil leaves a tombstone
    pub fn set(&mut self, key: Value, value: Value) -> Result<(), ScriptError> {
        let key = key.to_scalar();
        let class = classify_for_write(&key)?;
        self.set_class(class, key, value.to_storable());
        Ok(())
    }

    pub fn set_str(&mut self, key: &str, value: Value) {
        let key: Rc<str> = Rc::from(key);
        self.set_class(
            KeyClass::Str(Rc::clone(&key)),
            Value::String(key),
            value.to_storable(),
        );
    }

    pub fn set_int(&mut self, key: i64, value: Value) {
        let key = Value::Number(key as f64);
        if let Some(class) = classify(&key) {
            self.set_class(class, key, value.to_storable());
        }
    }

    fn set_class(&mut self, class: KeyClass, key: Value, value: Value) {
        match self.slot(&class) {
            Some(pos) => {
                let was_nil = self.entries[pos].value.is_nil();
                if value.is_nil() {
                    if !was_nil {
                        self.entries[pos].value = Value::Nil;
                        self.contains_dead = true;
                        if let KeyClass::Int(i) = class {
                            self.shrink_length(i);
                        }
                    }
                } else if was_nil {
                    // Revived tombstone: sweep, then the key is new again
                    self.collect_dead_keys();
                    self.insert_new(class, key, value);
                } else {
                    self.entries[pos].value = value;
                }
            }
            None => {
                if value.is_nil() {
                    return;
                }
                if self.contains_dead {
                    self.collect_dead_keys();
                }
                self.insert_new(class, key, value);
            }
        }
    }

    fn insert_new(&mut self, class: KeyClass, key: Value, value: Value) {
        let pos = self.entries.len();
        self.entries.push(Entry { key, value });
        match class {
            KeyClass::Str(s) => {
                self.string_index.insert(s, pos);
            }
            KeyClass::Int(i) => {
                self.array_index.insert(i, pos);
                self.grow_length(i);
            }
            KeyClass::Other(k) => {
                self.value_index.insert(k, pos);
            }
        }
    }

    /// Unlink `key`; returns whether a live value was removed.
    ///
    /// The entry stays in the backing sequence as a tombstone until the
    /// next sweep, so the order of the remaining keys is unchanged.
    pub fn remove(&mut self, key: &Value) -> bool {
        let Some(class) = classify(key) else {
            return false;
        };
        let pos = match &class {
            KeyClass::Str(s) => self.string_index.remove(s),
            KeyClass::Int(i) => self.array_index.remove(i),
            KeyClass::Other(k) => self.value_index.remove(k),
        };
        let Some(pos) = pos else {
            return false;
        };
        let was_live = !self.entries[pos].value.is_nil();
        self.entries[pos].value = Value::Nil;
        self.contains_dead = true;
        if let KeyClass::Int(i) = class {
            if was_live {
                self.shrink_length(i);
            }
        }
        was_live
    }

    /// Physically drop every tombstone and rebuild the indexes
    pub fn collect_dead_keys(&mut self) {
        self.entries.retain(|e| !e.value.is_nil());
        self.string_index.clear();
        self.array_index.clear();
        self.value_index.clear();
        for (pos, entry) in self.entries.iter().enumerate() {
            match classify(&entry.key) {
                Some(KeyClass::Str(s)) => {
                    self.string_index.insert(s, pos);
                }
                Some(KeyClass::Int(i)) => {
                    self.array_index.insert(i, pos);
                }
                Some(KeyClass::Other(k)) => {
                    self.value_index.insert(k, pos);
                }
                None => {}
            }
        }
        self.contains_dead = false;
    }

    pub fn contains_dead_entries(&self) -> bool {
        self.contains_dead
    }

    /// Key `i` became live; only `cached + 1` moves the border
    fn grow_length(&self, i: usize) {
        if let Some(n) = self.cached_length.get() {
            if i == n + 1 {
                self.cached_length.set(Some(self.probe_border(i)));
            }
        }
    }

    /// Key `i` became nil; `1..i` are still live when `i` is within the border
    fn shrink_length(&self, i: usize) {
        if let Some(n) = self.cached_length.get() {
            if i <= n {
                self.cached_length.set(Some(i - 1));
            }
        }
    }

    fn is_live_int(&self, i: usize) -> bool {
        self.array_index
            .get(&i)
            .is_some_and(|&pos| !self.entries[pos].value.is_nil())
    }

    /// First border at or after `from`, given `1..from` are live
    fn probe_border(&self, from: usize) -> usize {
        let mut n = from.saturating_sub(1);
        while self.is_live_int(n + 1) {
            n += 1;
        }
        n
    }

    /// Border of the array part: largest `n` with `1..=n` all non-nil
    pub fn length(&self) -> usize {
        if let Some(n) = self.cached_length.get() {
            return n;
        }
        let n = self.probe_border(1);
        self.cached_length.set(Some(n));
        n
    }

    /// Entry after `prev` in insertion order.
    ///
    /// A nil `prev` starts the iteration; the end is signalled by
    /// `Some(TablePair::nil())`; `None` means `prev` is not a key of this table.
    pub fn next_key(&self, prev: &Value) -> Option<TablePair> {
        let start = if prev.is_nil() {
            0
        } else {
            self.slot(&classify(prev)?)? + 1
        };
        let pair = self.entries[start..]
            .iter()
            .find(|e| !e.value.is_nil())
            .map(|e| TablePair {
                key: e.key.clone(),
                value: e.value.clone(),
            })
            .unwrap_or_else(TablePair::nil);
        Some(pair)
    }

    /// Live entries in insertion order
    pub fn pairs(&self) -> impl Iterator<Item = (&Value, &Value)> + '_ {
        self.entries
            .iter()
            .filter(|e| !e.value.is_nil())
            .map(|e| (&e.key, &e.value))
    }

    /// Number of live entries
    pub fn live_count(&self) -> usize {
        self.pairs().count()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs().next().is_none()
    }

    pub fn metatable(&self) -> Option<&TableRef> {
        self.metatable.as_ref()
    }

    pub fn set_metatable(&mut self, metatable: Option<TableRef>) {
        self.metatable = metatable;
    }

    /// `t[#t + 1] = value`
    pub fn append(&mut self, value: Value) {
        let n = self.length() as i64;
        self.set_int(n + 1, value);
    }

    /// Insert at `pos` (1-based), shifting `pos..=#t` up by one
    pub fn insert_at(&mut self, pos: usize, value: Value) {
        let len = self.length();
        for i in (pos..=len).rev() {
            let moved = self.get_int(i as i64);
            self.set_int(i as i64 + 1, moved);
        }
        self.set_int(pos as i64, value);
    }

    /// Remove at `pos` (1-based), shifting `pos+1..=#t` down by one
    pub fn remove_at(&mut self, pos: usize) -> Value {
        let len = self.length();
        let removed = self.get_int(pos as i64);
        for i in pos..len {
            let moved = self.get_int(i as i64 + 1);
            self.set_int(i as i64, moved);
        }
        if pos <= len {
            self.set_int(len as i64, Value::Nil);
        }
        removed
    }
}

struct TableCell {
    ref_id: u64,
    table: RefCell<Table>,
}

/// Shared handle to a [`Table`]
#[derive(Clone)]
pub struct TableRef(Rc<TableCell>);

impl TableRef {
    pub fn new(ids: &RefIdAllocator) -> Self {
        Self::from_table(Table::new(), ids)
    }

    pub fn from_table(table: Table, ids: &RefIdAllocator) -> Self {
        TableRef(Rc::new(TableCell {
            ref_id: ids.next_id(),
            table: RefCell::new(table),
        }))
    }

    pub fn borrow(&self) -> Ref<'_, Table> {
        self.0.table.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, Table> {
        self.0.table.borrow_mut()
    }

    pub fn ref_id(&self) -> u64 {
        self.0.ref_id
    }

    pub fn ptr_eq(&self, other: &TableRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn get(&self, key: &Value) -> Value {
        self.borrow().get(key)
    }

    pub fn get_str(&self, key: &str) -> Value {
        self.borrow().get_str(key)
    }

    pub fn set(&self, key: Value, value: Value) -> Result<(), ScriptError> {
        self.borrow_mut().set(key, value)
    }

    pub fn set_str(&self, key: &str, value: Value) {
        self.borrow_mut().set_str(key, value)
    }

    pub fn length(&self) -> usize {
        self.borrow().length()
    }

    pub fn metatable(&self) -> Option<TableRef> {
        self.borrow().metatable().cloned()
    }

    pub fn set_metatable(&self, metatable: Option<TableRef>) {
        self.borrow_mut().set_metatable(metatable)
    }

    /// `t[k1][k2]...[kn]`, raw; every intermediate value must be a table
    pub fn get_path(&self, keys: &[Value]) -> Result<Value, ScriptError> {
        let Some((last, init)) = keys.split_last() else {
            return Ok(Value::Table(self.clone()));
        };
        let parent = self.navigate(init)?;
        let value = parent.get(last);
        Ok(value)
    }

    /// `t[k1][k2]...[kn] = value`, raw; every intermediate value must be a table
    pub fn set_path(&self, keys: &[Value], value: Value) -> Result<(), ScriptError> {
        let Some((last, init)) = keys.split_last() else {
            return Err(ScriptError::new(ScriptErrorKind::Index, "empty key path"));
        };
        self.navigate(init)?.set(last.clone(), value)
    }

    fn navigate(&self, keys: &[Value]) -> Result<TableRef, ScriptError> {
        let mut current = self.clone();
        for key in keys {
            let next = current.get(key);
            current = match next {
                Value::Table(t) => t,
                other => {
                    return Err(ScriptError::new(
                        ScriptErrorKind::Index,
                        format!(
                            "cannot navigate through key '{}': {} is not a table",
                            key,
                            other.type_name()
                        ),
                    ))
                }
            };
        }
        Ok(current)
    }
}

impl fmt::Debug for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TableRef(#{})", self.ref_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn table() -> TableRef {
        TableRef::new(&RefIdAllocator::new())
    }

    fn keys(t: &TableRef) -> Vec<Value> {
        t.borrow().pairs().map(|(k, _)| k.clone()).collect()
    }

    #[test]
    fn test_float_key_canonicalized_to_integer() {
        let t = table();
        t.set(Value::Number(2.0), Value::from("two")).unwrap();
        assert_eq!(t.borrow().get_int(2), Value::from("two"));
        assert_eq!(t.borrow().array_index.len(), 1);
        assert!(t.borrow().value_index.is_empty());
    }

    #[test]
    fn test_non_positive_and_fractional_keys_use_generic_index() {
        let t = table();
        t.set(Value::Number(0.0), Value::from("zero")).unwrap();
        t.set(Value::Number(-1.0), Value::from("neg")).unwrap();
        t.set(Value::Number(1.5), Value::from("frac")).unwrap();
        assert_eq!(t.borrow().value_index.len(), 3);
        assert_eq!(t.get(&Value::Number(-0.0)), Value::from("zero"));
        assert_eq!(t.borrow().get_int(-1), Value::from("neg"));
    }

    #[test]
    fn test_nil_and_nan_keys() {
        let t = table();
        assert_eq!(t.get(&Value::Nil), Value::Nil);
        let err = t.set(Value::Nil, Value::from(1.0)).unwrap_err();
        assert_eq!(err.message(), "table index is nil");
        let err = t.set(Value::Number(f64::NAN), Value::from(1.0)).unwrap_err();
        assert_eq!(err.message(), "table index is NaN");
    }

    #[test]
    fn test_nil_assignment_leaves_tombstone() {
        let t = table();
        t.set_str("a", Value::from(1.0));
        t.set_str("b", Value::from(2.0));
        t.set_str("a", Value::Nil);

        let inner = t.borrow();
        assert!(inner.contains_dead_entries());
        assert_eq!(inner.entries.len(), 2);
        assert_eq!(inner.get_str("a"), Value::Nil);
        assert_eq!(inner.live_count(), 1);
    }

    #[test]
    fn test_insert_after_tombstone_sweeps() {
        let t = table();
        t.set_str("a", Value::from(1.0));
        t.set_str("b", Value::from(2.0));
        t.set_str("a", Value::Nil);
        t.set_str("c", Value::from(3.0));

        let inner = t.borrow();
        assert!(!inner.contains_dead_entries());
        assert_eq!(inner.entries.len(), 2);
        drop(inner);
        assert_eq!(keys(&t), vec![Value::from("b"), Value::from("c")]);
    }

    #[test]
    fn test_overwrite_keeps_insertion_order() {
        let t = table();
        t.set_str("x", Value::from(1.0));
        t.set_str("y", Value::from(2.0));
        t.set_str("x", Value::from(10.0));
        assert_eq!(keys(&t), vec![Value::from("x"), Value::from("y")]);
    }

    #[test]
    fn test_length_with_gap_and_refill() {
        let t = table();
        for (i, v) in [10.0, 20.0, 30.0].into_iter().enumerate() {
            t.set(Value::from((i + 1) as f64), Value::from(v)).unwrap();
        }
        assert_eq!(t.length(), 3);

        t.set(Value::from(2.0), Value::Nil).unwrap();
        assert!(t.length() < 3);

        t.set(Value::from(2.0), Value::from(25.0)).unwrap();
        assert_eq!(t.length(), 3);
    }

    #[test]
    fn test_next_key_walks_insertion_order() {
        let t = table();
        t.set_str("first", Value::from(1.0));
        t.set(Value::from(1.0), Value::from(2.0)).unwrap();
        t.set(Value::Boolean(true), Value::from(3.0)).unwrap();

        let inner = t.borrow();
        let mut key = Value::Nil;
        let mut seen = Vec::new();
        loop {
            let pair = inner.next_key(&key).unwrap();
            if pair.is_nil() {
                break;
            }
            seen.push(pair.value.clone());
            key = pair.key;
        }
        assert_eq!(seen, vec![Value::from(1.0), Value::from(2.0), Value::from(3.0)]);
    }

    #[test]
    fn test_next_key_survives_clearing_current_key() {
        let t = table();
        t.set_str("a", Value::from(1.0));
        t.set_str("b", Value::from(2.0));
        t.set_str("c", Value::from(3.0));

        let first = t.borrow().next_key(&Value::Nil).unwrap();
        t.set(first.key.clone(), Value::Nil).unwrap();
        let second = t.borrow().next_key(&first.key).unwrap();
        assert_eq!(second.key, Value::from("b"));
    }

    #[test]
    fn test_next_key_unknown_key() {
        let t = table();
        t.set_str("a", Value::from(1.0));
        assert!(t.borrow().next_key(&Value::from("zzz")).is_none());
    }

    #[test]
    fn test_remove_keeps_order_of_others() {
        let t = table();
        for k in ["a", "b", "c"] {
            t.set_str(k, Value::from(k));
        }
        assert!(t.borrow_mut().remove(&Value::from("b")));
        assert!(!t.borrow_mut().remove(&Value::from("b")));
        assert_eq!(keys(&t), vec![Value::from("a"), Value::from("c")]);
    }

    #[test]
    fn test_insert_and_remove_at() {
        let t = table();
        {
            let mut inner = t.borrow_mut();
            inner.append(Value::from("a"));
            inner.append(Value::from("c"));
            inner.insert_at(2, Value::from("b"));
        }
        assert_eq!(t.length(), 3);
        assert_eq!(t.borrow().get_int(2), Value::from("b"));

        let removed = t.borrow_mut().remove_at(1);
        assert_eq!(removed, Value::from("a"));
        assert_eq!(t.length(), 2);
        assert_eq!(t.borrow().get_int(1), Value::from("b"));
    }

    #[test]
    fn test_append_large_sequence() {
        let mut t = Table::new();
        for i in 1..=200_000 {
            t.append(Value::from(i as f64));
        }
        assert_eq!(t.length(), 200_000);
        assert_eq!(t.get_int(200_000), Value::from(200_000.0));

        t.remove_at(200_000);
        assert_eq!(t.length(), 199_999);
    }

    #[test]
    fn test_filling_gap_joins_runs() {
        let mut t = Table::new();
        t.set_int(1, Value::from(1.0));
        t.set_int(3, Value::from(3.0));
        t.set_int(4, Value::from(4.0));
        assert_eq!(t.length(), 1);

        t.set_int(2, Value::from(2.0));
        assert_eq!(t.length(), 4);

        t.set_int(3, Value::Nil);
        assert_eq!(t.length(), 2);
        t.remove(&Value::from(1.0));
        assert_eq!(t.length(), 0);
        assert_eq!(t.probe_border(1), 0);
    }

    #[test]
    fn test_path_navigation() {
        let ids = RefIdAllocator::new();
        let root = TableRef::new(&ids);
        let inner = TableRef::new(&ids);
        root.set_str("a", Value::Table(inner.clone()));
        root.set_path(&[Value::from("a"), Value::from("b")], Value::from(7.0))
            .unwrap();

        assert_eq!(
            root.get_path(&[Value::from("a"), Value::from("b")]).unwrap(),
            Value::from(7.0)
        );
        assert_eq!(inner.get_str("b"), Value::from(7.0));

        let err = root
            .get_path(&[Value::from("missing"), Value::from("b")])
            .unwrap_err();
        assert_eq!(err.kind(), ScriptErrorKind::Index);
    }

    #[test]
    fn test_self_metatable_is_allowed() {
        let t = table();
        t.set_metatable(Some(t.clone()));
        assert!(t.metatable().is_some_and(|m| m.ptr_eq(&t)));
    }
}
