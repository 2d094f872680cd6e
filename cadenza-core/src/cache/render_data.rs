use std::collections::BTreeMap;
use std::sync::Arc;

use super::{CacheContainer, MemoryDataHandler};

/// Quantize a relative frame to thousandths, the precision at which render data is cached.
///
/// Saturates at the bounds of `i32`, `NaN` maps to zero.
#[must_use]
pub fn frame_to_key(frame: f64) -> i32 {
    if frame.is_nan() {
        return 0;
    }
    az::saturating_cast((frame * 1000.0).round())
}

/// Anything that can be indexed by a [`RenderDataHandler`].
pub trait RelFrame {
    fn rel_frame(&self) -> f64;
}

/// The cached render result for one frame of one box.
#[derive(Debug)]
pub struct BoxRenderData {
    rel_frame: f64,
    pub container: CacheContainer<Vec<u8>>,
}
impl BoxRenderData {
    #[must_use]
    pub fn new(handler: &Arc<MemoryDataHandler>, rel_frame: f64, raster: Vec<u8>) -> Self {
        Self {
            rel_frame,
            container: CacheContainer::new(handler, raster),
        }
    }
}
impl RelFrame for BoxRenderData {
    fn rel_frame(&self) -> f64 {
        self.rel_frame
    }
}

/// Per-box map from quantized frame to cached render data. At most one item per key.
pub struct RenderDataHandler<T = BoxRenderData> {
    items: BTreeMap<i32, Arc<T>>,
}
impl<T> Default for RenderDataHandler<T> {
    fn default() -> Self {
        Self {
            items: BTreeMap::new(),
        }
    }
}
impl<T: RelFrame> RenderDataHandler<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
    /// Exact lookup, no nearest-match.
    #[must_use]
    pub fn get_item_at_rel_frame(&self, frame: f64) -> Option<&Arc<T>> {
        self.items.get(&frame_to_key(frame))
    }
    /// Insert at the item's own frame, replacing any previous item with the same key.
    pub fn add_item_at_rel_frame(&mut self, item: Arc<T>) -> Option<Arc<T>> {
        let key = frame_to_key(item.rel_frame());
        self.items.insert(key, item)
    }
    /// Remove this exact item. Returns false if it is not the item stored at its frame.
    pub fn remove_item(&mut self, item: &Arc<T>) -> bool {
        let key = frame_to_key(item.rel_frame());
        match self.items.get(&key) {
            Some(stored) if Arc::ptr_eq(stored, item) => {
                self.items.remove(&key);
                true
            }
            _ => false,
        }
    }
    pub fn remove_item_at_rel_frame(&mut self, frame: f64) -> bool {
        self.items.remove(&frame_to_key(frame)).is_some()
    }
    /// Forget every item. Items are only dropped, nothing is explicitly evicted.
    pub fn clear(&mut self) {
        self.items.clear();
    }
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
    /// Keys in ascending frame order.
    pub fn keys(&self) -> impl Iterator<Item = i32> + '_ {
        self.items.keys().copied()
    }
}
impl<T> std::fmt::Debug for RenderDataHandler<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.items.keys()).finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    struct Frame(f64);
    impl RelFrame for Frame {
        fn rel_frame(&self) -> f64 {
            self.0
        }
    }

    #[test]
    fn key_quantization() {
        for f in [-3.0, 0.0, 1.0, 12.0, 250.0] {
            assert_eq!(frame_to_key(f), frame_to_key(f + 0.0004));
            assert_ne!(frame_to_key(f), frame_to_key(f + 0.002));
        }
        assert_eq!(frame_to_key(1.5), 1500);
        assert_eq!(frame_to_key(f64::INFINITY), i32::MAX);
        assert_eq!(frame_to_key(-1e12), i32::MIN);
        assert_eq!(frame_to_key(f64::NAN), 0);
    }
    #[test]
    fn key_monotonic() {
        let mut last = i32::MIN;
        let mut f = -5.0;
        while f < 5.0 {
            let key = frame_to_key(f);
            assert!(key >= last);
            last = key;
            f += 0.00037;
        }
    }
    #[test]
    fn lookup_insert_remove() {
        let mut handler = RenderDataHandler::new();
        let a = Arc::new(Frame(1.0));
        let b = Arc::new(Frame(2.5));
        assert!(handler.add_item_at_rel_frame(a.clone()).is_none());
        handler.add_item_at_rel_frame(b.clone());

        assert!(handler.get_item_at_rel_frame(1.0001).is_some());
        // Exact keys only.
        assert!(handler.get_item_at_rel_frame(1.01).is_none());

        // Overwrite at the same key.
        let a2 = Arc::new(Frame(1.0002));
        let old = handler.add_item_at_rel_frame(a2.clone());
        assert!(old.is_some_and(|old| Arc::ptr_eq(&old, &a)));
        // The replaced item is not removable by identity anymore.
        assert!(!handler.remove_item(&a));
        assert!(handler.remove_item(&a2));
        assert_eq!(handler.keys().collect::<Vec<_>>(), [2500]);

        assert!(handler.remove_item_at_rel_frame(2.5));
        assert!(!handler.remove_item_at_rel_frame(2.5));
        assert!(handler.is_empty());
    }
    #[test]
    fn clear_keeps_containers_alive_elsewhere() {
        let memory = MemoryDataHandler::new();
        let mut handler = RenderDataHandler::new();
        let data = Arc::new(BoxRenderData::new(&memory, 0.0, vec![0; 64]));
        handler.add_item_at_rel_frame(data.clone());
        handler.clear();
        assert!(handler.is_empty());
        // Still held, still cached.
        assert!(data.container.stores_data_in_memory());
        assert_eq!(memory.len(), 1);
        drop(data);
        assert!(memory.is_empty());
    }
}
