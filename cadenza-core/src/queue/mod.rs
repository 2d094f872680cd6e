//! Command Queue
//!
//! The queue owns a document together with the history of every command applied to it. It is the ground
//! truth for the current state of the document: all edits go through [`DocumentCommandQueue::write_with`],
//! which records each change before applying it, and undo/redo walk the history applying commands in reverse
//! or forward.
//!
//! History is linear. Writing after an undo discards the undone commands.

use std::sync::Arc;

use crate::{
    commands::{self, CommandConsumer, CommandError},
    state,
};

pub mod writer;

/// One undo step.
#[derive(Clone, Debug)]
pub struct HistoryEntry {
    /// User-facing name of the change, like "Set Opacity".
    pub label: Option<String>,
    pub command: commands::Command,
}

struct DocumentCommandQueueInner {
    history: Vec<HistoryEntry>,
    /// Number of entries of `history` currently applied to the document.
    present: usize,
    /// Value of `present` when the document was last saved, None if never or if that point was discarded.
    saved: Option<usize>,
    document: state::Document,
}
impl DocumentCommandQueueInner {
    fn push(&mut self, entry: HistoryEntry) {
        if self.present < self.history.len() {
            log::trace!(
                "discarding {} undone commands",
                self.history.len() - self.present
            );
            self.history.truncate(self.present);
            if self.saved.is_some_and(|saved| saved > self.present) {
                self.saved = None;
            }
        }
        self.history.push(entry);
        self.present = self.history.len();
    }
}

pub struct DocumentCommandQueue {
    inner: Arc<parking_lot::RwLock<DocumentCommandQueueInner>>,
    id: DocumentID,
}
pub struct DocumentIDMarker;
pub type DocumentID = crate::RuntimeID<DocumentIDMarker>;

impl Default for DocumentCommandQueue {
    fn default() -> Self {
        Self::from_state(state::Document::default())
    }
}
impl DocumentCommandQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
    /// Create a queue from data, without a history. The document counts as saved.
    #[must_use]
    pub fn from_state(document: state::Document) -> Self {
        Self {
            inner: Arc::new(
                DocumentCommandQueueInner {
                    history: Vec::new(),
                    present: 0,
                    saved: Some(0),
                    document,
                }
                .into(),
            ),
            id: DocumentID::default(),
        }
    }
    #[must_use]
    pub fn id(&self) -> DocumentID {
        self.id
    }
    /// Locks the queue for writing commands during the span of the closure, where each modification of the state is tracked
    /// by the command queue. If multiple commands are written, they will be written in order as a single Atoms scope.
    pub fn write_with<F, T>(&self, write: F) -> T
    where
        F: FnOnce(&mut writer::CommandQueueWriter<'_>) -> T,
    {
        let lock = self.inner.write();
        let mut writer = writer::CommandQueueWriter {
            lock,
            recorded: writer::Recorded::default(),
        };
        // Panic safe - `writer::CommandQueueWriter`'s Drop impl will do the cleanup ensuring the queue's commands and state are synchronized.
        write(&mut writer)
    }
    /// View the document as it is at this moment.
    #[must_use]
    pub fn read(&self) -> parking_lot::MappedRwLockReadGuard<'_, state::Document> {
        parking_lot::RwLockReadGuard::map(self.inner.read(), |inner| &inner.document)
    }
    /// Step back up to `num` entries. Returns how many were undone.
    pub fn undo_n(&self, num: usize) -> Result<usize, CommandError> {
        let mut lock = self.inner.write();
        let DocumentCommandQueueInner {
            history,
            present,
            document,
            ..
        } = &mut *lock;
        let steps = num.min(*present);
        for _ in 0..steps {
            let entry = &history[*present - 1];
            document.apply(commands::DoUndo::Undo(&entry.command))?;
            *present -= 1;
        }
        Ok(steps)
    }
    /// Step forward up to `num` previously undone entries. Returns how many were redone.
    pub fn redo_n(&self, num: usize) -> Result<usize, CommandError> {
        let mut lock = self.inner.write();
        let DocumentCommandQueueInner {
            history,
            present,
            document,
            ..
        } = &mut *lock;
        let steps = num.min(history.len() - *present);
        for _ in 0..steps {
            let entry = &history[*present];
            document.apply(commands::DoUndo::Do(&entry.command))?;
            *present += 1;
        }
        Ok(steps)
    }
    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.inner.read().present > 0
    }
    #[must_use]
    pub fn can_redo(&self) -> bool {
        let lock = self.inner.read();
        lock.present < lock.history.len()
    }
    /// Name of the change that [`Self::undo_n`] would revert next.
    #[must_use]
    pub fn undo_label(&self) -> Option<String> {
        let lock = self.inner.read();
        let present = lock.present.checked_sub(1)?;
        lock.history.get(present)?.label.clone()
    }
    /// Name of the change that [`Self::redo_n`] would reapply next.
    #[must_use]
    pub fn redo_label(&self) -> Option<String> {
        let lock = self.inner.read();
        lock.history.get(lock.present)?.label.clone()
    }
    /// Number of entries in the history, including undone ones.
    #[must_use]
    pub fn history_len(&self) -> usize {
        self.inner.read().history.len()
    }
    /// Record that the document in its current state was written to `path`.
    pub fn mark_saved(&self, path: std::path::PathBuf) {
        let mut lock = self.inner.write();
        lock.saved = Some(lock.present);
        lock.document.path = Some(path);
    }
    /// Whether the document differs from what was last saved.
    #[must_use]
    pub fn is_modified(&self) -> bool {
        let lock = self.inner.read();
        lock.saved != Some(lock.present)
    }
}

#[cfg(test)]
mod test {
    use super::DocumentCommandQueue;
    use crate::color::Color;
    use crate::commands::{Command, MetaCommand, ScopeType};
    use crate::state::{BoxNode, Document, PropertyValue, Scene, SceneSettings};
    use crate::util::FrameRange;

    #[test]
    fn bookmark_undo_redo() {
        let queue = DocumentCommandQueue::new();
        let red = Color::rgb(255, 0, 0);
        let added = queue.write_with(|w| w.document().add_color_bookmark(red));
        assert_eq!(added, Ok(true));
        // Already present, nothing recorded.
        let again = queue.write_with(|w| w.document().add_color_bookmark(red));
        assert_eq!(again, Ok(false));
        assert_eq!(queue.history_len(), 1);
        assert_eq!(queue.undo_label().as_deref(), Some("Add Color Bookmark"));

        assert_eq!(queue.undo_n(5), Ok(1));
        assert!(queue.read().color_bookmarks().is_empty());
        assert_eq!(queue.redo_n(1), Ok(1));
        assert_eq!(queue.read().color_bookmarks(), [red]);

        // Removing something absent is a no-op.
        let removed = queue.write_with(|w| w.document().remove_color_bookmark(Color::BLACK));
        assert_eq!(removed, Ok(false));
        assert_eq!(queue.history_len(), 1);
    }
    #[test]
    fn scene_settings_undo() {
        let queue = DocumentCommandQueue::new();
        let scene = queue
            .write_with(|w| w.document().create_scene(SceneSettings::default()))
            .unwrap();
        queue
            .write_with(|w| -> Result<(), crate::commands::CommandError> {
                let mut document = w.document();
                let mut scene = document.scene(scene)?;
                scene.set_fps(30.0)?;
                scene.set_frame_range(FrameRange::new(5, 50))
            })
            .unwrap();
        // Both edits are one undo step.
        assert_eq!(queue.history_len(), 2);
        assert!(matches!(
            queue.inner.read().history[1].command,
            Command::Meta(MetaCommand::Scope(ScopeType::Atoms, ref inner)) if inner.len() == 2
        ));
        assert_eq!(queue.undo_label().as_deref(), Some("Set Frame Rate"));

        // Rejected edits record nothing.
        let inverted = queue.write_with(|w| {
            w.document()
                .scene(scene)?
                .set_frame_range(FrameRange::new(10, 5))
        });
        assert!(inverted.is_err());
        assert_eq!(queue.history_len(), 2);

        queue.undo_n(1).unwrap();
        {
            let document = queue.read();
            let settings = document.scene(scene).unwrap().settings();
            assert_eq!(settings.fps, 24.0);
            assert_eq!(settings.frame_range, FrameRange::DEFAULT);
        }
        // Undo the creation as well, then redo both.
        queue.undo_n(1).unwrap();
        assert!(queue.read().scenes().is_empty());
        assert_eq!(queue.redo_n(2), Ok(2));
        assert_eq!(queue.read().scene(scene).unwrap().settings().fps, 30.0);
    }
    #[test]
    fn property_undo_and_labels() {
        let queue = DocumentCommandQueue::new();
        let (scene, node) = queue.write_with(|w| {
            let mut document = w.document();
            let scene = document.create_scene(SceneSettings::default()).unwrap();
            let node = document.scene(scene).unwrap().add_box(
                BoxNode::new("circle")
                    .with_property("visible", PropertyValue::Bool(true))
                    .with_property("opacity", PropertyValue::Real(1.0))
                    .with_property("target", PropertyValue::Link(None)),
            );
            (scene, node)
        });
        macro_rules! set {
            ($method:ident($($arg:expr),*)) => {
                queue.write_with(|w| w.document().scene(scene)?.node(node)?.$method($($arg),*))
            };
        }
        set!(set_bool(&[0], false)).unwrap();
        assert_eq!(queue.undo_label().as_deref(), Some("Disable Property"));
        set!(set_real(&[1], 0.25)).unwrap();
        assert_eq!(queue.undo_label().as_deref(), Some("Set opacity"));
        // Same value, no entry.
        set!(set_real(&[1], 0.25)).unwrap();
        assert_eq!(queue.history_len(), 3);
        // Wrong type.
        assert!(set!(set_real(&[0], 0.25)).is_err());
        // Links must point into the same scene.
        let stranger = BoxNode::new("elsewhere").id();
        assert!(set!(set_link(&[2], Some(stranger))).is_err());
        assert_eq!(queue.history_len(), 3);

        queue.undo_n(2).unwrap();
        let document = queue.read();
        let node = document.scene(scene).unwrap().node(node).unwrap();
        assert_eq!(node.property(&[0]).unwrap().value, PropertyValue::Bool(true));
        assert_eq!(node.property(&[1]).unwrap().value, PropertyValue::Real(1.0));
    }
    #[test]
    fn loaded_inverted_range_allows_other_edits() {
        let mut document = Document::new();
        let scene = document.push_scene(Scene::new(SceneSettings {
            frame_range: FrameRange::new(10, 5),
            ..SceneSettings::default()
        }));
        let queue = DocumentCommandQueue::from_state(document);

        queue
            .write_with(|w| w.document().scene(scene)?.set_name("Renamed"))
            .unwrap();
        queue
            .write_with(|w| w.document().scene(scene)?.set_fps(12.0))
            .unwrap();
        // Still refuses to write a new inverted range.
        let inverted = queue.write_with(|w| {
            w.document()
                .scene(scene)?
                .set_frame_range(FrameRange::new(30, 20))
        });
        assert!(inverted.is_err());
        queue
            .write_with(|w| {
                w.document()
                    .scene(scene)?
                    .set_frame_range(FrameRange::new(5, 10))
            })
            .unwrap();
        assert_eq!(queue.history_len(), 3);

        queue.undo_n(3).unwrap();
        let document = queue.read();
        let settings = document.scene(scene).unwrap().settings();
        assert_eq!(settings.name, "Scene");
        assert_eq!(settings.frame_range, FrameRange::new(10, 5));
    }
    #[test]
    fn writing_discards_redo() {
        let queue = DocumentCommandQueue::new();
        queue
            .write_with(|w| w.document().add_color_bookmark(Color::WHITE))
            .unwrap();
        queue.undo_n(1).unwrap();
        assert!(queue.can_redo());
        queue
            .write_with(|w| w.document().add_color_bookmark(Color::BLACK))
            .unwrap();
        assert!(!queue.can_redo());
        assert_eq!(queue.history_len(), 1);
        assert_eq!(queue.read().color_bookmarks(), [Color::BLACK]);
    }
    #[test]
    fn modified_tracking() {
        let queue = DocumentCommandQueue::new();
        assert!(!queue.is_modified());
        queue
            .write_with(|w| w.document().add_color_bookmark(Color::WHITE))
            .unwrap();
        assert!(queue.is_modified());
        queue.mark_saved("out.cdz".into());
        assert!(!queue.is_modified());
        queue.undo_n(1).unwrap();
        assert!(queue.is_modified());
        queue.redo_n(1).unwrap();
        assert!(!queue.is_modified());
    }
    #[test]
    fn panic_mid_write_is_recorded() {
        let queue = DocumentCommandQueue::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            queue.write_with(|w| {
                w.document().add_color_bookmark(Color::WHITE).unwrap();
                panic!("oh no");
            });
        }));
        assert!(result.is_err());
        // parking_lot locks do not poison, and the partial write is kept in sync with the state.
        assert_eq!(queue.history_len(), 1);
        assert!(matches!(
            queue.inner.read().history[0].command,
            Command::Meta(MetaCommand::Scope(ScopeType::WritePanic, _))
        ));
        assert_eq!(queue.read().color_bookmarks(), [Color::WHITE]);
        queue.undo_n(1).unwrap();
        assert!(queue.read().color_bookmarks().is_empty());
    }
}
