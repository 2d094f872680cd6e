//! # Deferred resolution
//!
//! Boxes refer to each other by [`BoxID`], which only exists at runtime. Files instead number boxes densely in
//! the order they are written ([`WriteIds`]). While reading, a link may name a box that has not been read yet,
//! so resolving it is pushed to [`DeferredTasks`] and run once the whole document exists.

use std::collections::VecDeque;

use az::CheckedAs;

use super::Error;
use crate::state::{BoxID, Document, PropertyPath, PropertyValue, SceneID};

/// Dense file-local numbering of boxes, assigned on write.
#[derive(Default, Debug)]
pub struct WriteIds {
    ids: hashbrown::HashMap<BoxID, u32>,
}
impl WriteIds {
    /// Number every box of the document, scene by scene, in order.
    pub fn from_document(document: &Document) -> Result<Self, Error> {
        let mut ids = Self::default();
        for scene in document.scenes() {
            for node in scene.boxes() {
                ids.assign(node.id())?;
            }
        }
        Ok(ids)
    }
    /// Get the id of `id`, numbering it if it wasn't yet.
    pub fn assign(&mut self, id: BoxID) -> Result<u32, Error> {
        if let Some(&existing) = self.ids.get(&id) {
            return Ok(existing);
        }
        // Leave room for the -1 "no box" sentinel when stored signed.
        let next: u32 = self
            .ids
            .len()
            .checked_as::<i32>()
            .and_then(|next| next.checked_as())
            .ok_or_else(|| Error::Format("too many boxes".to_owned()))?;
        self.ids.insert(id, next);
        Ok(next)
    }
    #[must_use]
    pub fn get(&self, id: BoxID) -> Option<u32> {
        self.ids.get(&id).copied()
    }
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Boxes created while reading, by the id the file gave them.
#[derive(Default, Debug)]
pub struct ReadBoxes {
    boxes: hashbrown::HashMap<u32, (SceneID, BoxID)>,
}
impl ReadBoxes {
    /// Record that file id `read_id` was read as `node` of `scene`.
    pub fn insert(&mut self, read_id: u32, scene: SceneID, node: BoxID) -> Result<(), Error> {
        match self.boxes.entry(read_id) {
            hashbrown::hash_map::Entry::Occupied(_) => {
                Err(Error::Format(format!("duplicate box id {read_id}")))
            }
            hashbrown::hash_map::Entry::Vacant(vacant) => {
                vacant.insert((scene, node));
                Ok(())
            }
        }
    }
    #[must_use]
    pub fn get(&self, read_id: u32) -> Option<(SceneID, BoxID)> {
        self.boxes.get(&read_id).copied()
    }
    #[must_use]
    pub fn len(&self) -> usize {
        self.boxes.len()
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }
}

type Task = Box<dyn FnOnce(&mut Document, &ReadBoxes) -> Result<(), Error>>;

/// Work to do once every box of a document has been read, in the order it was queued.
#[derive(Default)]
pub struct DeferredTasks {
    queue: VecDeque<Task>,
}
impl DeferredTasks {
    pub fn push(
        &mut self,
        task: impl FnOnce(&mut Document, &ReadBoxes) -> Result<(), Error> + 'static,
    ) {
        self.queue.push_back(Box::new(task));
    }
    /// Point the link property at `path` of `node` to whichever box was read as `read_id`.
    pub fn push_link(&mut self, scene: SceneID, node: BoxID, path: PropertyPath, read_id: u32) {
        self.push(move |document, boxes| {
            let target = match boxes.get(read_id) {
                Some((target_scene, target)) if target_scene == scene => Some(target),
                Some(_) => {
                    log::warn!("link from {node} to box {read_id} of another scene dropped");
                    None
                }
                None => {
                    log::warn!("link from {node} to unknown box {read_id} dropped");
                    None
                }
            };
            let property = document
                .scene_mut(scene)
                .and_then(|scene| scene.node_mut(node))
                .and_then(|node| node.property_mut(&path))
                .ok_or_else(|| Error::Format(format!("link property of {node} vanished")))?;
            let PropertyValue::Link(link) = &mut property.value else {
                return Err(Error::Format(format!(
                    "property {:?} of {node} is not a link",
                    property.name
                )));
            };
            *link = target;
            Ok(())
        });
    }
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
    /// Run every task, in order, stopping at the first failure.
    pub fn drain(mut self, document: &mut Document, boxes: &ReadBoxes) -> Result<(), Error> {
        if !self.queue.is_empty() {
            log::debug!("running {} deferred tasks", self.queue.len());
        }
        while let Some(task) = self.queue.pop_front() {
            task(document, boxes)?;
        }
        Ok(())
    }
}
impl std::fmt::Debug for DeferredTasks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredTasks")
            .field("len", &self.queue.len())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::{DeferredTasks, ReadBoxes, WriteIds};
    use crate::state::{BoxNode, Document, PropertyValue, Scene, SceneSettings};

    #[test]
    fn write_ids_dense() {
        let mut document = Document::new();
        let mut scene = Scene::new(SceneSettings::default());
        let a = scene.push_box(BoxNode::new("a"));
        let b = scene.push_box(BoxNode::new("b"));
        document.push_scene(scene);
        let mut ids = WriteIds::from_document(&document).unwrap();
        assert_eq!(ids.get(a), Some(0));
        assert_eq!(ids.get(b), Some(1));
        assert_eq!(ids.assign(a).unwrap(), 0);
        assert_eq!(ids.len(), 2);
        assert_eq!(ids.get(BoxNode::new("c").id()), None);
    }
    #[test]
    fn duplicate_read_id() {
        let mut boxes = ReadBoxes::default();
        let scene = Scene::new(SceneSettings::default()).id();
        boxes.insert(3, scene, BoxNode::new("a").id()).unwrap();
        assert!(boxes.insert(3, scene, BoxNode::new("b").id()).is_err());
    }
    #[test]
    fn links_resolve_in_order() {
        let mut document = Document::new();
        let mut scene = Scene::new(SceneSettings::default());
        let scene_id = scene.id();
        let from = scene.push_box(
            BoxNode::new("from")
                .with_property("first", PropertyValue::Link(None))
                .with_property("second", PropertyValue::Link(None)),
        );
        let to = scene.push_box(BoxNode::new("to"));
        document.push_scene(scene);

        let mut boxes = ReadBoxes::default();
        boxes.insert(0, scene_id, from).unwrap();
        boxes.insert(1, scene_id, to).unwrap();
        let mut tasks = DeferredTasks::default();
        tasks.push_link(scene_id, from, [0].into_iter().collect(), 1);
        // Unknown targets resolve to nothing.
        tasks.push_link(scene_id, from, [1].into_iter().collect(), 7);
        assert_eq!(tasks.len(), 2);
        tasks.drain(&mut document, &boxes).unwrap();

        let node = document.scene(scene_id).unwrap().node(from).unwrap();
        assert_eq!(node.property(&[0]).unwrap().value, PropertyValue::Link(Some(to)));
        assert_eq!(node.property(&[1]).unwrap().value, PropertyValue::Link(None));
    }
    #[test]
    fn link_to_non_link_fails() {
        let mut document = Document::new();
        let mut scene = Scene::new(SceneSettings::default());
        let scene_id = scene.id();
        let from = scene.push_box(BoxNode::new("from").with_property("b", PropertyValue::Bool(true)));
        document.push_scene(scene);
        let mut boxes = ReadBoxes::default();
        boxes.insert(0, scene_id, from).unwrap();
        let mut tasks = DeferredTasks::default();
        tasks.push_link(scene_id, from, [0].into_iter().collect(), 0);
        assert!(tasks.drain(&mut document, &boxes).is_err());
    }
}
