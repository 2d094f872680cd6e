//! # Caches
//!
//! Rendered frames are expensive to recompute, so they are kept around in [`CacheContainer`]s for as long as
//! memory allows. Every container that is not actively being used is registered with a [`MemoryDataHandler`],
//! which evicts the least recently touched containers first when memory runs low.
//!
//! Per box, render results are indexed by quantized frame in a [`RenderDataHandler`].

pub mod container;
pub mod memory;
pub mod render_data;

pub use container::{CacheContainer, InUseGuard};
pub use memory::{MemoryDataHandler, MemoryEvent, MemoryHandler, MemorySettings, MemoryState};
pub use render_data::{frame_to_key, BoxRenderData, RelFrame, RenderDataHandler};

pub struct ContainerIDMarker;
pub type ContainerID = crate::RuntimeID<ContainerIDMarker>;

/// Data that can be held by a [`CacheContainer`].
pub trait CachePayload: Send + 'static {
    /// Resident size of this payload, in bytes.
    fn byte_count(&self) -> usize;
}
impl CachePayload for Vec<u8> {
    fn byte_count(&self) -> usize {
        self.len()
    }
}
impl CachePayload for Box<[u8]> {
    fn byte_count(&self) -> usize {
        self.len()
    }
}

/// The view the memory registry has of a container. Implemented by the shared half of [`CacheContainer`].
pub trait Evict: Send + Sync {
    fn container_id(&self) -> ContainerID;
    /// Current resident size in bytes.
    fn byte_count(&self) -> usize;
    /// Drop the payload, returning how many bytes were freed.
    /// Called by the registry after the container has already been taken out of it.
    fn evict(&self) -> usize;
}
