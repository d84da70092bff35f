//! Object store shared by the reader, clone engine and staged writer
//!
//! Objects are content addressed, so the store only ever inserts: a second
//! insert of the same hash is ignored. Lookups name the type they expect and
//! miss when the stored object has another type, which lets callers treat
//! "wrong type" and "not cached" the same way (fetch and check).

use crate::artifacts::objects::object::PackfileObject;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, Mutex, MutexGuard};

/// A cache of protocol objects keyed by hash
pub trait ObjectStore: Debug + Send + Sync {
    fn get(&self, id: &ObjectId) -> Option<Arc<PackfileObject>>;

    /// Insert unless an object with the same hash is present
    fn add(&self, object: PackfileObject);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn contains(&self, id: &ObjectId) -> bool {
        self.get(id).is_some()
    }

    fn get_by_type(&self, id: &ObjectId, object_type: ObjectType) -> Option<Arc<PackfileObject>> {
        self.get(id).filter(|object| object.is_type(object_type))
    }

    fn add_all(&self, objects: Vec<PackfileObject>) {
        for object in objects {
            self.add(object);
        }
    }
}

/// Process-local [`ObjectStore`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<ObjectId, Arc<PackfileObject>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ObjectId, Arc<PackfileObject>>> {
        self.objects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ObjectStore for MemoryStore {
    fn get(&self, id: &ObjectId) -> Option<Arc<PackfileObject>> {
        self.lock().get(id).cloned()
    }

    fn add(&self, object: PackfileObject) {
        self.lock()
            .entry(object.hash)
            .or_insert_with(|| Arc::new(object));
    }

    fn len(&self) -> usize {
        self.lock().len()
    }
}
