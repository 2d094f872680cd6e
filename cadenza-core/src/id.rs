//! # Runtime IDs
//!
//! Boxes, scenes and cache containers are identified by a [`RuntimeID`], unique within this execution of the
//! program and namespaced by a marker type. Runtime IDs are never written to disk - files refer to objects by
//! dense *write ids* instead, see [`crate::io::tasks::WriteIds`].

use std::sync::atomic::{AtomicU64, Ordering};

// Next free value per namespace. Namespaces are registered lazily on first allocation.
static NAMESPACES: parking_lot::RwLock<std::collections::BTreeMap<std::any::TypeId, AtomicU64>> =
    parking_lot::const_rwlock(std::collections::BTreeMap::new());

/// ID that is unique within this execution of the program.
/// IDs of different namespaces may share a numeric value but are different types.
pub struct RuntimeID<T: std::any::Any> {
    id: std::num::NonZeroU64,
    _namespace: std::marker::PhantomData<fn() -> T>,
}
impl<T: std::any::Any> Clone for RuntimeID<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T: std::any::Any> Copy for RuntimeID<T> {}
impl<T: std::any::Any> PartialEq for RuntimeID<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl<T: std::any::Any> Eq for RuntimeID<T> {}
impl<T: std::any::Any> PartialOrd for RuntimeID<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl<T: std::any::Any> Ord for RuntimeID<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}
impl<T: std::any::Any> std::hash::Hash for RuntimeID<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T: std::any::Any> RuntimeID<T> {
    /// Allocate a fresh ID in this namespace.
    #[must_use]
    pub fn new() -> Self {
        let ty = std::any::TypeId::of::<T>();
        let value = {
            let read = NAMESPACES.upgradable_read();
            if let Some(counter) = read.get(&ty) {
                counter.fetch_add(1, Ordering::Relaxed)
            } else {
                let mut write = parking_lot::RwLockUpgradableReadGuard::upgrade(read);
                // Another thread may have raced us between the upgrade.
                write
                    .entry(ty)
                    .or_insert_with(|| AtomicU64::new(1))
                    .fetch_add(1, Ordering::Relaxed)
            }
        };
        // Counters start at one and a u64 will not realistically wrap.
        let id = std::num::NonZeroU64::new(value).unwrap_or(std::num::NonZeroU64::MIN);
        Self {
            id,
            _namespace: std::marker::PhantomData,
        }
    }
    /// Get the raw numeric value of this ID.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id.get()
    }
}
impl<T: std::any::Any> Default for RuntimeID<T> {
    fn default() -> Self {
        Self::new()
    }
}
impl<T: std::any::Any> std::fmt::Display for RuntimeID<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = std::any::type_name::<T>();
        let short = name.rsplit("::").next().unwrap_or(name);
        write!(f, "{short}#{}", self.id)
    }
}
impl<T: std::any::Any> std::fmt::Debug for RuntimeID<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod test {
    use super::RuntimeID;

    #[test]
    fn unique_within_namespace() {
        struct Namespace;
        type TestID = RuntimeID<Namespace>;

        let mut ids: Vec<_> = (0..512).map(|_| TestID::new()).collect();
        let before = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(before, ids.len(), "had duplicate ids");
    }
    #[test]
    fn namespaces_count_independently() {
        struct First;
        struct Second;

        let a = RuntimeID::<First>::new();
        let b = RuntimeID::<Second>::new();
        // Fresh namespaces both start counting at one.
        assert_eq!(a.id(), 1);
        assert_eq!(b.id(), 1);
        assert_eq!(format!("{a}"), "First#1");
    }
}
