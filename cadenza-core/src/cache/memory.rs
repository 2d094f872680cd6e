//! # Memory registry
//!
//! [`MemoryDataHandler`] is the registry of every cache container that currently holds data but is not in use.
//! It is an explicitly constructed, shared service: containers hold an `Arc` to it and check [`MemoryDataHandler::is_alive`]
//! before deregistering, so the order in which containers and the registry are torn down does not matter.
//!
//! [`MemoryHandler`] sits on top and decides *how much* to free, based on memory usage samples taken by the host.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use super::{ContainerID, Evict};

struct Registered {
    /// Position in the eviction order. Lower is older.
    seq: u64,
    container: Weak<dyn Evict>,
}

#[derive(Default)]
struct Registry {
    /// seq -> id, oldest first.
    order: BTreeMap<u64, ContainerID>,
    entries: hashbrown::HashMap<ContainerID, Registered>,
    next_seq: u64,
}
impl Registry {
    fn bump_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }
    /// Returns false if already registered.
    fn push_back(&mut self, id: ContainerID, container: Weak<dyn Evict>) -> bool {
        if self.entries.contains_key(&id) {
            return false;
        }
        let seq = self.bump_seq();
        self.order.insert(seq, id);
        self.entries.insert(id, Registered { seq, container });
        true
    }
    fn remove(&mut self, id: ContainerID) -> Option<Registered> {
        let entry = self.entries.remove(&id)?;
        self.order.remove(&entry.seq);
        Some(entry)
    }
    /// Move to the most-recent end. Returns false if not registered.
    fn touch(&mut self, id: ContainerID) -> bool {
        let seq = self.bump_seq();
        let Some(entry) = self.entries.get_mut(&id) else {
            return false;
        };
        self.order.remove(&entry.seq);
        entry.seq = seq;
        self.order.insert(seq, id);
        true
    }
    fn pop_front(&mut self) -> Option<Registered> {
        let (_, id) = self.order.pop_first()?;
        self.entries.remove(&id)
    }
    fn clear(&mut self) {
        self.order.clear();
        self.entries.clear();
    }
}

/// Registry of unused, evictable cache containers, in least-recently-touched order.
pub struct MemoryDataHandler {
    registry: parking_lot::Mutex<Registry>,
    alive: AtomicBool,
}
impl MemoryDataHandler {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            registry: parking_lot::Mutex::default(),
            alive: AtomicBool::new(true),
        })
    }
    /// False once [`Self::tear_down`] has been called. Registrations are ignored from then on.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }
    /// Drop every registration and refuse new ones.
    pub fn tear_down(&self) {
        self.alive.store(false, Ordering::Release);
        self.registry.lock().clear();
        log::debug!("memory registry torn down");
    }
    /// Register a container at the most-recent end. Returns false if it was already registered,
    /// or if the registry has been torn down.
    pub fn add_container(&self, container: Weak<dyn Evict>, id: ContainerID) -> bool {
        if !self.is_alive() {
            return false;
        }
        let added = self.registry.lock().push_back(id, container);
        if added {
            log::trace!("registered {id}");
        }
        added
    }
    /// Returns whether the container was registered.
    pub fn remove_container(&self, id: ContainerID) -> bool {
        let removed = self.registry.lock().remove(id).is_some();
        if removed {
            log::trace!("unregistered {id}");
        }
        removed
    }
    /// Notify that a registered container was touched, making it the last candidate for eviction.
    pub fn container_updated(&self, id: ContainerID) -> bool {
        self.registry.lock().touch(id)
    }
    #[must_use]
    pub fn contains(&self, id: ContainerID) -> bool {
        self.registry.lock().entries.contains_key(&id)
    }
    #[must_use]
    pub fn len(&self) -> usize {
        self.registry.lock().entries.len()
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Take the least recently touched container out of the registry.
    /// Registrations whose container has since been dropped are skipped.
    pub fn take_first(&self) -> Option<Arc<dyn Evict>> {
        let mut registry = self.registry.lock();
        while let Some(entry) = registry.pop_front() {
            if let Some(container) = entry.container.upgrade() {
                return Some(container);
            }
        }
        None
    }
    /// Total bytes held by registered containers.
    #[must_use]
    pub fn registered_bytes(&self) -> usize {
        // Never call into containers with the registry locked.
        let containers: Vec<_> = self
            .registry
            .lock()
            .entries
            .values()
            .filter_map(|entry| entry.container.upgrade())
            .collect();
        containers
            .iter()
            .map(|container| container.byte_count())
            .fold(0, usize::saturating_add)
    }
    /// Evict containers, oldest first, until at least `min_bytes` have been freed or the registry is empty.
    /// Returns the number of bytes actually freed.
    pub fn free_memory(&self, min_bytes: u64) -> u64 {
        let mut freed = 0u64;
        while freed < min_bytes {
            let Some(container) = self.take_first() else {
                break;
            };
            freed = freed.saturating_add(container.evict() as u64);
        }
        if freed != 0 {
            log::debug!(
                "evicted {} from cache",
                human_bytes::human_bytes(freed as f64)
            );
        }
        freed
    }
}

/// How much pressure the system memory is under, in increasing severity.
#[derive(
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Debug,
    Default,
    strum::Display,
    serde::Serialize,
    serde::Deserialize,
)]
pub enum MemoryState {
    #[default]
    Normal,
    Low,
    VeryLow,
    Critical,
}

/// Thresholds for [`MemoryHandler::check_usage`].
#[derive(Clone, PartialEq, Eq, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct MemorySettings {
    /// Below this much free memory, the state is [`MemoryState::Low`] and caches are trimmed back above it.
    pub low_free_bytes: u64,
    /// Below this much free memory, the state is [`MemoryState::VeryLow`].
    pub very_low_free_bytes: u64,
    /// Below this much free memory, the state is [`MemoryState::Critical`].
    pub critical_free_bytes: u64,
    pub normal_interval_ms: u64,
    pub low_interval_ms: u64,
    pub very_low_interval_ms: u64,
}
impl Default for MemorySettings {
    fn default() -> Self {
        const MIB: u64 = 1024 * 1024;
        Self {
            low_free_bytes: 1024 * MIB,
            very_low_free_bytes: 512 * MIB,
            critical_free_bytes: 256 * MIB,
            normal_interval_ms: 1000,
            low_interval_ms: 500,
            very_low_interval_ms: 250,
        }
    }
}
impl MemorySettings {
    #[must_use]
    pub fn classify(&self, free_bytes: u64) -> MemoryState {
        if free_bytes < self.critical_free_bytes {
            MemoryState::Critical
        } else if free_bytes < self.very_low_free_bytes {
            MemoryState::VeryLow
        } else if free_bytes < self.low_free_bytes {
            MemoryState::Low
        } else {
            MemoryState::Normal
        }
    }
}

/// Notifications produced by [`MemoryHandler`], for the host to surface.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum MemoryEvent {
    StateChanged { from: MemoryState, to: MemoryState },
    EnteredCriticalState,
    FinishedCriticalState,
    /// A sweep could not free as much as requested.
    AllMemoryUsed,
    MemoryFreed { bytes: u64 },
}

/// Owns the registry and drives eviction from memory usage samples.
///
/// Dropping the handler tears the registry down; any containers still alive afterwards
/// simply stop registering themselves.
pub struct MemoryHandler {
    data: Arc<MemoryDataHandler>,
    settings: MemorySettings,
    state: MemoryState,
}
impl MemoryHandler {
    #[must_use]
    pub fn new(settings: MemorySettings) -> Self {
        Self {
            data: MemoryDataHandler::new(),
            settings,
            state: MemoryState::Normal,
        }
    }
    /// The registry that cache containers should be created against.
    #[must_use]
    pub fn data_handler(&self) -> &Arc<MemoryDataHandler> {
        &self.data
    }
    #[must_use]
    pub fn state(&self) -> MemoryState {
        self.state
    }
    #[must_use]
    pub fn settings(&self) -> &MemorySettings {
        &self.settings
    }
    /// How long the host should wait before taking the next usage sample.
    #[must_use]
    pub fn poll_interval(&self) -> std::time::Duration {
        let ms = match self.state {
            MemoryState::Normal => self.settings.normal_interval_ms,
            MemoryState::Low => self.settings.low_interval_ms,
            MemoryState::VeryLow | MemoryState::Critical => self.settings.very_low_interval_ms,
        };
        std::time::Duration::from_millis(ms)
    }
    /// Classify a sample of free system memory and free enough cache to climb back above the low threshold.
    pub fn check_usage(&mut self, free_bytes: u64) -> Vec<MemoryEvent> {
        let state = self.settings.classify(free_bytes);
        let min_free = match state {
            MemoryState::Normal => 0,
            _ => self.settings.low_free_bytes.saturating_sub(free_bytes),
        };
        self.handle_memory_state(state, min_free)
    }
    /// Free everything that can be freed.
    pub fn clear_memory(&mut self) -> Vec<MemoryEvent> {
        self.handle_memory_state(MemoryState::Normal, u64::MAX)
    }
    /// Enter `new_state` and evict at least `min_free_bytes`, if possible.
    pub fn handle_memory_state(
        &mut self,
        new_state: MemoryState,
        min_free_bytes: u64,
    ) -> Vec<MemoryEvent> {
        let mut events = Vec::new();
        if new_state != self.state {
            log::debug!("memory state {} -> {}", self.state, new_state);
            events.push(MemoryEvent::StateChanged {
                from: self.state,
                to: new_state,
            });
            if self.state == MemoryState::Critical {
                events.push(MemoryEvent::FinishedCriticalState);
            }
            self.state = new_state;
        }
        if min_free_bytes == 0 {
            return events;
        }

        let freed = self.data.free_memory(min_free_bytes);
        if new_state == MemoryState::Critical || freed < min_free_bytes {
            // `clear_memory` asks for everything, not finding it is expected.
            if min_free_bytes != u64::MAX || new_state == MemoryState::Critical {
                log::warn!(
                    "memory critical, freed {} of requested {}",
                    human_bytes::human_bytes(freed as f64),
                    human_bytes::human_bytes(min_free_bytes as f64)
                );
                self.state = MemoryState::Critical;
                events.push(MemoryEvent::EnteredCriticalState);
                events.push(MemoryEvent::AllMemoryUsed);
            }
        }
        events.push(MemoryEvent::MemoryFreed { bytes: freed });
        events
    }
}
impl Drop for MemoryHandler {
    fn drop(&mut self) {
        self.data.tear_down();
    }
}
