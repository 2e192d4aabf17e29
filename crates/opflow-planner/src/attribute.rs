//! Type-keyed attribute storage.
//!
//! One slot per concrete Rust type. Writing a value of a type that is already
//! present replaces it; values are never merged.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct AttributeMap {
    slots: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl AttributeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value`, returning true if it replaced an earlier value of `T`.
    pub fn insert<T: Any + Send + Sync>(&mut self, value: T) -> bool {
        self.slots
            .insert(TypeId::of::<T>(), Arc::new(value))
            .is_some()
    }

    pub fn get<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.slots
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
    }

    pub fn contains<T: Any + Send + Sync>(&self) -> bool {
        self.slots.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl fmt::Debug for AttributeMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeMap")
            .field("len", &self.slots.len())
            .finish()
    }
}
