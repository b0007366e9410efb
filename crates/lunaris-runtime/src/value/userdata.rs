//! Opaque host objects
//!
//! A [`UserData`] pairs an arbitrary Rust object with a descriptor that tells
//! the processor how scripts may index it, which operators it supports and
//! how two instances compare.

use crate::error::{RuntimeError, ScriptError, ScriptErrorKind};
use crate::metamethod::Operator;
use crate::value::Value;
use std::any::Any;
use std::rc::Rc;

/// Behaviour of a family of host objects
///
/// Every method has a default, so a descriptor that only names its type is a
/// valid, fully opaque handle.
pub trait UserDataDescriptor {
    /// Name used in diagnostics
    fn type_name(&self) -> &str;

    /// `object[key]`
    fn index(&self, object: &UserData, key: &Value) -> Result<Value, RuntimeError> {
        let _ = object;
        Err(missing_field(self.type_name(), key))
    }

    /// `object[key] = value`
    fn set_index(&self, object: &UserData, key: &Value, value: Value) -> Result<(), RuntimeError> {
        let _ = (object, value);
        Err(missing_field(self.type_name(), key))
    }

    /// Descriptor-level metamethod lookup
    fn meta_method(&self, object: &UserData, op: Operator) -> Option<Value> {
        let _ = (object, op);
        None
    }

    /// Equality of two wrapped objects sharing this descriptor
    fn equals(&self, a: &UserData, b: &UserData) -> bool {
        a.same_object(b)
    }
}

/// Standard "missing field" error for descriptors
pub fn missing_field(type_name: &str, key: &Value) -> RuntimeError {
    ScriptError::new(
        ScriptErrorKind::Index,
        format!("cannot access field {} of userdata<{}>", key, type_name),
    )
    .into()
}

/// A host object plus its descriptor
pub struct UserData {
    descriptor: Rc<dyn UserDataDescriptor>,
    object: Rc<dyn Any>,
    ref_id: u64,
}

impl UserData {
    pub fn descriptor(&self) -> &Rc<dyn UserDataDescriptor> {
        &self.descriptor
    }

    pub fn object(&self) -> &Rc<dyn Any> {
        &self.object
    }

    /// Checked downcast of the wrapped object
    pub fn downcast<T: 'static>(&self) -> Option<Rc<T>> {
        Rc::clone(&self.object).downcast::<T>().ok()
    }

    pub fn same_object(&self, other: &UserData) -> bool {
        std::ptr::eq(
            Rc::as_ptr(&self.object) as *const (),
            Rc::as_ptr(&other.object) as *const (),
        )
    }

    pub fn same_descriptor(&self, other: &UserData) -> bool {
        std::ptr::eq(
            Rc::as_ptr(&self.descriptor) as *const (),
            Rc::as_ptr(&other.descriptor) as *const (),
        )
    }
}

/// Shared handle to a [`UserData`]
#[derive(Clone)]
pub struct UserDataRef(Rc<UserData>);

impl UserDataRef {
    pub fn new(
        descriptor: Rc<dyn UserDataDescriptor>,
        object: Rc<dyn Any>,
        ref_id: u64,
    ) -> Self {
        UserDataRef(Rc::new(UserData {
            descriptor,
            object,
            ref_id,
        }))
    }

    pub fn ref_id(&self) -> u64 {
        self.0.ref_id
    }

    pub fn ptr_eq(&self, other: &UserDataRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Wrapped-object equality, only between instances of one descriptor
    pub fn equals(&self, other: &UserDataRef) -> bool {
        self.ptr_eq(other)
            || (self.0.same_descriptor(&other.0) && self.0.descriptor.equals(&self.0, &other.0))
    }
}

impl std::ops::Deref for UserDataRef {
    type Target = UserData;

    fn deref(&self) -> &UserData {
        &self.0
    }
}
