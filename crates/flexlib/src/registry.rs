//! Identifier-keyed collections of live objects.
//!
//! A [`Registry`] owns every instance of one [`DynamicObject`] type. Lookups
//! hand out `Arc` clones so callers never hold the registry lock while they
//! touch an object, and an identifier maps to at most one object at a time.

use std::collections::BTreeMap;
use std::sync::Arc;

use flexlib_core::Guarded;

use crate::objects::DynamicObject;

#[derive(Debug)]
pub struct Registry<T> {
    objects: Guarded<BTreeMap<u32, Arc<T>>>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            objects: Guarded::new(BTreeMap::new()),
        }
    }
}

impl<T: DynamicObject> Registry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: u32) -> Option<Arc<T>> {
        self.objects.read(|m| m.get(&id).cloned())
    }

    pub fn contains(&self, id: u32) -> bool {
        self.objects.read(|m| m.contains_key(&id))
    }

    /// The object for `id`, creating it if absent. The flag reports
    /// whether it was created by this call.
    pub fn get_or_create(&self, id: u32) -> (Arc<T>, bool) {
        self.objects.write(|m| {
            if let Some(existing) = m.get(&id) {
                return (Arc::clone(existing), false);
            }
            let created = Arc::new(T::create(id));
            m.insert(id, Arc::clone(&created));
            tracing::trace!(object = %T::KIND, id = format!("0x{id:08X}"), "Object created");
            (created, true)
        })
    }

    /// Remove `id`. Removing an unknown id is a no-op returning `None`.
    pub fn remove(&self, id: u32) -> Option<Arc<T>> {
        self.objects.write(|m| m.remove(&id))
    }

    /// Remove everything, returning the removed objects in id order.
    pub fn clear(&self) -> Vec<Arc<T>> {
        self.objects
            .write(|m| std::mem::take(m).into_values().collect())
    }

    /// Ids in ascending order.
    pub fn ids(&self) -> Vec<u32> {
        self.objects.read(|m| m.keys().copied().collect())
    }

    /// Snapshot of all objects in id order.
    pub fn all(&self) -> Vec<Arc<T>> {
        self.objects.read(|m| m.values().cloned().collect())
    }

    /// First object matching `pred`.
    pub fn find(&self, mut pred: impl FnMut(&T) -> bool) -> Option<Arc<T>> {
        self.objects
            .read(|m| m.values().find(|obj| pred(obj)).cloned())
    }

    pub fn len(&self) -> usize {
        self.objects.read(|m| m.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
