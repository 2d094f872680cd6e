use std::sync::{Arc, Weak};

use super::{CachePayload, ContainerID, Evict, MemoryDataHandler};

struct State<T> {
    payload: Option<T>,
    in_use: u32,
    /// Currently registered with the memory registry.
    handled: bool,
}

// The half of the container shared with the registry.
struct ContainerCell<T: CachePayload> {
    id: ContainerID,
    handler: Arc<MemoryDataHandler>,
    state: parking_lot::Mutex<State<T>>,
    // Handed to the registry on each registration.
    this: Weak<ContainerCell<T>>,
}
impl<T: CachePayload> ContainerCell<T> {
    fn weak_evict(&self) -> Weak<dyn Evict> {
        self.this.clone()
    }
    /// Register if unused and not yet registered. Lock must be held by the caller.
    fn add_locked(&self, state: &mut State<T>) {
        if state.handled || state.in_use > 0 {
            return;
        }
        state.handled = self.handler.add_container(self.weak_evict(), self.id);
    }
    fn remove_locked(&self, state: &mut State<T>) {
        if !state.handled {
            return;
        }
        self.handler.remove_container(self.id);
        state.handled = false;
    }
}
impl<T: CachePayload> Evict for ContainerCell<T> {
    fn container_id(&self) -> ContainerID {
        self.id
    }
    fn byte_count(&self) -> usize {
        self.state
            .lock()
            .payload
            .as_ref()
            .map_or(0, CachePayload::byte_count)
    }
    fn evict(&self) -> usize {
        let mut state = self.state.lock();
        // Already out of the registry at this point.
        state.handled = false;
        if state.in_use > 0 {
            // Picked up between being taken and evicted. It re-registers once released.
            return 0;
        }
        state.payload.take().map_or(0, |payload| payload.byte_count())
    }
}
impl<T: CachePayload> Drop for ContainerCell<T> {
    fn drop(&mut self) {
        if !self.handler.is_alive() {
            return;
        }
        if self.state.get_mut().handled {
            self.handler.remove_container(self.id);
        }
    }
}

/// A unit of cached data, tracked by a [`MemoryDataHandler`].
///
/// While the in-use count is zero, the container sits in the registry and its payload may be evicted at
/// any time. Holders that need the data to stay put should take an [`InUseGuard`].
pub struct CacheContainer<T: CachePayload> {
    cell: Arc<ContainerCell<T>>,
}
impl<T: CachePayload> CacheContainer<T> {
    /// Create a container holding `payload`, registering it with `handler`.
    #[must_use]
    pub fn new(handler: &Arc<MemoryDataHandler>, payload: T) -> Self {
        Self::with_payload(handler, Some(payload))
    }
    /// Create a container with no data yet.
    #[must_use]
    pub fn empty(handler: &Arc<MemoryDataHandler>) -> Self {
        Self::with_payload(handler, None)
    }
    fn with_payload(handler: &Arc<MemoryDataHandler>, payload: Option<T>) -> Self {
        let cell = Arc::new_cyclic(|this| ContainerCell {
            id: ContainerID::new(),
            handler: handler.clone(),
            state: parking_lot::Mutex::new(State {
                payload,
                in_use: 0,
                handled: false,
            }),
            this: this.clone(),
        });
        cell.add_locked(&mut cell.state.lock());
        Self { cell }
    }
    #[must_use]
    pub fn id(&self) -> ContainerID {
        self.cell.id
    }
    /// Mark as in use, taking it out of the eviction pool.
    pub fn inc_in_use(&self) {
        let mut state = self.cell.state.lock();
        state.in_use += 1;
        self.cell.remove_locked(&mut state);
    }
    /// Release one use. Once the count reaches zero, the container becomes evictable again.
    ///
    /// # Panics
    /// If the container is not in use.
    pub fn dec_in_use(&self) {
        let mut state = self.cell.state.lock();
        assert!(state.in_use > 0, "{} released more than acquired", self.cell.id);
        state.in_use -= 1;
        if state.in_use == 0 {
            self.cell.add_locked(&mut state);
        }
    }
    /// Mark as in use for the lifetime of the returned guard.
    #[must_use = "dropping the guard releases the container immediately"]
    pub fn use_guard(&self) -> InUseGuard<'_, T> {
        self.inc_in_use();
        InUseGuard { container: self }
    }
    #[must_use]
    pub fn in_use(&self) -> u32 {
        self.cell.state.lock().in_use
    }
    /// Whether the container is currently in the registry.
    #[must_use]
    pub fn handled(&self) -> bool {
        self.cell.state.lock().handled
    }
    /// Register with the registry. No-op if already registered or in use.
    pub fn add_to_memory_management(&self) {
        self.cell.add_locked(&mut self.cell.state.lock());
    }
    /// Leave the registry. No-op if not registered.
    pub fn remove_from_memory_management(&self) {
        self.cell.remove_locked(&mut self.cell.state.lock());
    }
    /// Register if not yet registered, otherwise mark as recently touched.
    pub fn update_in_memory_management(&self) {
        let mut state = self.cell.state.lock();
        if state.handled {
            self.cell.handler.container_updated(self.cell.id);
        } else {
            self.cell.add_locked(&mut state);
        }
    }
    /// Drop the payload, returning the number of bytes freed.
    pub fn free_ram(&self) -> usize {
        self.cell
            .state
            .lock()
            .payload
            .take()
            .map_or(0, |payload| payload.byte_count())
    }
    /// Swap in new data, returning the old. Counts as a touch.
    pub fn replace_data(&self, payload: T) -> Option<T> {
        let old = self.cell.state.lock().payload.replace(payload);
        self.update_in_memory_management();
        old
    }
    /// Access the data, if it has not been evicted.
    pub fn with_data<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.cell.state.lock().payload.as_ref().map(f)
    }
    #[must_use]
    pub fn stores_data_in_memory(&self) -> bool {
        self.cell.state.lock().payload.is_some()
    }
    #[must_use]
    pub fn byte_count(&self) -> usize {
        Evict::byte_count(&*self.cell)
    }
}
impl<T: CachePayload> std::fmt::Debug for CacheContainer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.cell.state.lock();
        f.debug_struct("CacheContainer")
            .field("id", &self.cell.id)
            .field("in_use", &state.in_use)
            .field("handled", &state.handled)
            .field("resident", &state.payload.is_some())
            .finish()
    }
}

/// Keeps a [`CacheContainer`] out of the eviction pool while alive.
pub struct InUseGuard<'a, T: CachePayload> {
    container: &'a CacheContainer<T>,
}
impl<T: CachePayload> InUseGuard<'_, T> {
    pub fn with_data<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.container.with_data(f)
    }
}
impl<T: CachePayload> Drop for InUseGuard<'_, T> {
    fn drop(&mut self) {
        self.container.dec_in_use();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn registered_iff_unused() {
        let handler = MemoryDataHandler::new();
        let container = CacheContainer::new(&handler, vec![0u8; 16]);
        let registered = || handler.contains(container.id());
        assert!(registered());

        // Arbitrary walk that never goes negative.
        let walk = [1, 1, -1, 1, -1, -1, 1, -1, 1, 1, 1, -1, -1, -1];
        let mut count = 0i32;
        for step in walk {
            if step > 0 {
                container.inc_in_use();
            } else {
                container.dec_in_use();
            }
            count += step;
            assert_eq!(registered(), count == 0, "at count {count}");
            assert_eq!(container.handled(), count == 0);
        }
        assert_eq!(handler.len(), 1);
    }
    #[test]
    #[should_panic(expected = "released more than acquired")]
    fn underflow_panics() {
        let handler = MemoryDataHandler::new();
        let container = CacheContainer::new(&handler, vec![0u8]);
        container.dec_in_use();
    }
    #[test]
    fn registration_idempotent() {
        let handler = MemoryDataHandler::new();
        let container = CacheContainer::new(&handler, vec![0u8; 3]);
        container.add_to_memory_management();
        container.add_to_memory_management();
        assert_eq!(handler.len(), 1);

        container.remove_from_memory_management();
        container.remove_from_memory_management();
        assert!(handler.is_empty());

        // In use, adding is refused.
        container.inc_in_use();
        container.add_to_memory_management();
        assert!(handler.is_empty());
        container.dec_in_use();
        assert_eq!(handler.len(), 1);
    }
    #[test]
    fn guard_and_free() {
        let handler = MemoryDataHandler::new();
        let container = CacheContainer::new(&handler, vec![7u8; 100]);
        {
            let guard = container.use_guard();
            assert!(handler.is_empty());
            // Nothing evictable while in use.
            assert_eq!(handler.free_memory(1), 0);
            assert_eq!(guard.with_data(|data| data[0]), Some(7));
        }
        assert_eq!(handler.len(), 1);
        assert_eq!(container.free_ram(), 100);
        assert!(!container.stores_data_in_memory());
        assert_eq!(container.free_ram(), 0);

        assert_eq!(container.replace_data(vec![1, 2]), None);
        assert_eq!(container.byte_count(), 2);
    }
    #[test]
    fn empty_registers_while_unused() {
        let handler = MemoryDataHandler::new();
        let container = CacheContainer::<Vec<u8>>::empty(&handler);
        // Registration follows the use count alone, with or without data.
        assert!(container.handled());
        assert_eq!(container.byte_count(), 0);
        assert_eq!(handler.free_memory(1), 0);
        assert!(!container.handled());

        // Filling it in registers it again.
        assert_eq!(container.replace_data(vec![9; 6]), None);
        assert!(container.handled());
        assert_eq!(handler.registered_bytes(), 6);
    }
    #[test]
    fn drop_unregisters() {
        let handler = MemoryDataHandler::new();
        let container = CacheContainer::new(&handler, vec![0u8; 3]);
        assert_eq!(handler.len(), 1);
        drop(container);
        assert!(handler.is_empty());
    }
}
