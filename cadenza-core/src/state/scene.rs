use super::property::{self, PropertyValue};
use super::{BoxID, BoxNode, SceneID};
use crate::commands::{CommandConsumer, CommandError, DoUndo};
use crate::util::FrameRange;

/// Geometry and timing of a scene.
#[derive(Clone, PartialEq, Debug)]
pub struct SceneSettings {
    pub name: String,
    /// Canvas size, in pixels.
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Scale at which the canvas is rendered, `1.0` being full size.
    pub resolution: f64,
    pub frame_range: FrameRange,
    pub current_frame: i32,
    pub clip_to_canvas: bool,
}
impl Default for SceneSettings {
    fn default() -> Self {
        Self {
            name: "Scene".to_owned(),
            width: 1920,
            height: 1080,
            fps: 24.0,
            resolution: 1.0,
            frame_range: FrameRange::DEFAULT,
            current_frame: 0,
            clip_to_canvas: false,
        }
    }
}
impl SceneSettings {
    /// Check the constraints that every user edit must uphold.
    /// Values read from files are not held to this.
    pub fn validate(&self) -> Result<(), CommandError> {
        crate::util::positive(self.fps).map_err(|_| CommandError::InvalidValue("fps"))?;
        crate::util::positive(self.resolution)
            .map_err(|_| CommandError::InvalidValue("resolution"))?;
        if !self.frame_range.is_ordered() {
            return Err(CommandError::InvalidValue("frame range min > max"));
        }
        Ok(())
    }
    /// Like [`Self::validate`], but only for the fields that differ from `from`.
    pub fn validate_change(&self, from: &Self) -> Result<(), CommandError> {
        if self.fps.to_bits() != from.fps.to_bits() {
            crate::util::positive(self.fps).map_err(|_| CommandError::InvalidValue("fps"))?;
        }
        if self.resolution.to_bits() != from.resolution.to_bits() {
            crate::util::positive(self.resolution)
                .map_err(|_| CommandError::InvalidValue("resolution"))?;
        }
        if self.frame_range != from.frame_range && !self.frame_range.is_ordered() {
            return Err(CommandError::InvalidValue("frame range min > max"));
        }
        Ok(())
    }
}

pub struct Scene {
    id: SceneID,
    settings: SceneSettings,
    boxes: Vec<BoxNode>,
    // Boxes whose creation has been undone or that have been removed. Kept so the command can be redone.
    removed: hashbrown::HashMap<BoxID, BoxNode>,
}
impl Scene {
    #[must_use]
    pub fn new(settings: SceneSettings) -> Self {
        Self {
            id: SceneID::default(),
            settings,
            boxes: Vec::new(),
            removed: hashbrown::HashMap::new(),
        }
    }
    #[must_use]
    pub fn id(&self) -> SceneID {
        self.id
    }
    #[must_use]
    pub fn settings(&self) -> &SceneSettings {
        &self.settings
    }
    /// Direct access, for loaders. Edits should go through a [`writer::SceneWriter`].
    pub fn settings_mut(&mut self) -> &mut SceneSettings {
        &mut self.settings
    }
    #[must_use]
    pub fn boxes(&self) -> &[BoxNode] {
        &self.boxes
    }
    #[must_use]
    pub fn node(&self, id: BoxID) -> Option<&BoxNode> {
        self.boxes.iter().find(|node| node.id() == id)
    }
    pub fn node_mut(&mut self, id: BoxID) -> Option<&mut BoxNode> {
        self.boxes.iter_mut().find(|node| node.id() == id)
    }
    #[must_use]
    pub fn box_index(&self, id: BoxID) -> Option<usize> {
        self.boxes.iter().position(|node| node.id() == id)
    }
    /// Append a box outside of any command, for loaders.
    pub fn push_box(&mut self, node: BoxNode) -> BoxID {
        let id = node.id();
        self.boxes.push(node);
        id
    }
    pub(crate) fn boxes_mut(&mut self) -> &mut [BoxNode] {
        &mut self.boxes
    }
    /// Move a live box into the removed set. `index` must be where it lives.
    fn bury(&mut self, id: BoxID, index: usize) -> Result<(), CommandError> {
        if self.boxes.get(index).map(BoxNode::id) != Some(id) {
            return Err(CommandError::MismatchedState);
        }
        let mut node = self.boxes.remove(index);
        node.invalidate();
        self.removed.insert(id, node);
        Ok(())
    }
    /// Move a removed box back to `index`.
    fn resurrect(&mut self, id: BoxID, index: usize) -> Result<(), CommandError> {
        if index > self.boxes.len() {
            return Err(CommandError::MismatchedState);
        }
        let node = self.removed.remove(&id).ok_or(CommandError::UnknownResource)?;
        self.boxes.insert(index, node);
        Ok(())
    }
}
impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene")
            .field("id", &self.id)
            .field("settings", &self.settings)
            .field("boxes", &self.boxes)
            .finish_non_exhaustive()
    }
}

pub mod commands {
    use super::super::{BoxID, SceneID};
    use super::SceneSettings;

    #[derive(Clone, Debug, PartialEq)]
    pub enum Command {
        SettingsChanged {
            target: SceneID,
            from: Box<SceneSettings>,
            to: Box<SceneSettings>,
        },
        BoxAdded {
            target: SceneID,
            node: BoxID,
            index: usize,
        },
        BoxRemoved {
            target: SceneID,
            node: BoxID,
            index: usize,
        },
    }
    impl Command {
        #[must_use]
        pub fn target(&self) -> SceneID {
            match self {
                Self::SettingsChanged { target, .. }
                | Self::BoxAdded { target, .. }
                | Self::BoxRemoved { target, .. } => *target,
            }
        }
    }
}

impl CommandConsumer<commands::Command> for Scene {
    fn apply(&mut self, command: DoUndo<'_, commands::Command>) -> Result<(), CommandError> {
        use commands::Command;
        match command {
            DoUndo::Do(Command::SettingsChanged { from, to, .. })
            | DoUndo::Undo(Command::SettingsChanged {
                from: to, to: from, ..
            }) => {
                if self.settings != **from {
                    return Err(CommandError::MismatchedState);
                }
                self.settings = (**to).clone();
                // Resolution and canvas affect every render.
                for node in &mut self.boxes {
                    node.invalidate();
                }
                Ok(())
            }
            DoUndo::Do(Command::BoxAdded { node, index, .. })
            | DoUndo::Undo(Command::BoxRemoved { node, index, .. }) => {
                self.resurrect(*node, *index)
            }
            DoUndo::Undo(Command::BoxAdded { node, index, .. })
            | DoUndo::Do(Command::BoxRemoved { node, index, .. }) => self.bury(*node, *index),
        }
    }
}

impl CommandConsumer<property::commands::Command> for Scene {
    fn apply(
        &mut self,
        command: DoUndo<'_, property::commands::Command>,
    ) -> Result<(), CommandError> {
        let (property::commands::Command::Changed { target, change }, undo) = match command {
            DoUndo::Do(c) => (c, false),
            DoUndo::Undo(c) => (c, true),
        };
        if target.scene != self.id {
            return Err(CommandError::MismatchedState);
        }
        let node = self
            .boxes
            .iter_mut()
            .find(|node| node.id() == target.node)
            .ok_or(CommandError::UnknownResource)?;
        let value: &mut PropertyValue = &mut node
            .property_mut(&target.path)
            .ok_or(CommandError::UnknownResource)?
            .value;
        if undo {
            value.apply(DoUndo::Undo(change))?;
        } else {
            value.apply(DoUndo::Do(change))?;
        }
        node.invalidate();
        Ok(())
    }
}

pub mod writer {
    use super::commands::Command;
    use super::{Scene, SceneSettings};
    use crate::commands::{CommandConsumer, CommandError, DoUndo};
    use crate::queue::writer::CommandWrite;
    use crate::state::node::writer::NodeWriter;
    use crate::state::{property, BoxID, BoxNode};
    use crate::util::FrameRange;

    pub struct SceneWriter<'a, Write> {
        writer: Write,
        state: &'a mut Scene,
    }
    impl<Write> std::ops::Deref for SceneWriter<'_, Write> {
        type Target = Scene;
        fn deref(&self) -> &Self::Target {
            self.state
        }
    }
    impl<'a, Write> SceneWriter<'a, Write>
    where
        Write: CommandWrite<Command> + CommandWrite<property::commands::Command>,
    {
        pub fn new(writer: Write, state: &'a mut Scene) -> Self {
            Self { writer, state }
        }
        /// Apply an edit to a copy of the settings, validate, record, then apply.
        fn edit(
            &mut self,
            label: &str,
            f: impl FnOnce(&mut SceneSettings),
        ) -> Result<(), CommandError> {
            let mut to = self.state.settings.clone();
            f(&mut to);
            if to == self.state.settings {
                return Ok(());
            }
            to.validate_change(&self.state.settings)?;
            let command = Command::SettingsChanged {
                target: self.state.id,
                from: Box::new(self.state.settings.clone()),
                to: Box::new(to),
            };
            CommandWrite::<Command>::name(&mut self.writer, label);
            CommandWrite::<Command>::write(&mut self.writer, command.clone());
            self.state.apply(DoUndo::Do(&command))
        }
        pub fn set_name(&mut self, name: &str) -> Result<(), CommandError> {
            self.edit("Rename Scene", |s| name.clone_into(&mut s.name))
        }
        pub fn set_canvas_size(&mut self, width: u32, height: u32) -> Result<(), CommandError> {
            self.edit("Set Canvas Size", |s| {
                s.width = width;
                s.height = height;
            })
        }
        pub fn set_fps(&mut self, fps: f64) -> Result<(), CommandError> {
            self.edit("Set Frame Rate", |s| s.fps = fps)
        }
        pub fn set_resolution(&mut self, resolution: f64) -> Result<(), CommandError> {
            self.edit("Set Resolution", |s| s.resolution = resolution)
        }
        pub fn set_frame_range(&mut self, range: FrameRange) -> Result<(), CommandError> {
            self.edit("Set Frame Range", |s| s.frame_range = range)
        }
        pub fn set_current_frame(&mut self, frame: i32) -> Result<(), CommandError> {
            self.edit("Set Frame", |s| s.current_frame = frame)
        }
        pub fn set_clip_to_canvas(&mut self, clip: bool) -> Result<(), CommandError> {
            self.edit("Clip To Canvas", |s| s.clip_to_canvas = clip)
        }
        /// Insert a new box at the end of the scene.
        pub fn add_box(&mut self, node: BoxNode) -> BoxID {
            let id = node.id();
            let index = self.state.boxes.len();
            CommandWrite::<Command>::name(&mut self.writer, "Add Box");
            CommandWrite::<Command>::write(
                &mut self.writer,
                Command::BoxAdded {
                    target: self.state.id,
                    node: id,
                    index,
                },
            );
            self.state.boxes.push(node);
            id
        }
        pub fn remove_box(&mut self, node: BoxID) -> Result<(), CommandError> {
            let index = self
                .state
                .box_index(node)
                .ok_or(CommandError::UnknownResource)?;
            let command = Command::BoxRemoved {
                target: self.state.id,
                node,
                index,
            };
            CommandWrite::<Command>::name(&mut self.writer, "Delete Box");
            CommandWrite::<Command>::write(&mut self.writer, command.clone());
            self.state.apply(DoUndo::Do(&command))
        }
        /// Edit the properties of a box of this scene.
        pub fn node(
            &mut self,
            node: BoxID,
        ) -> Result<NodeWriter<'_, &mut Write>, CommandError> {
            NodeWriter::new(&mut self.writer, self.state, node)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::state::property::commands::{Change, Command as PropertyCommand, Target};

    #[test]
    fn validation() {
        assert!(SceneSettings::default().validate().is_ok());
        let bad_fps = SceneSettings {
            fps: 0.0,
            ..SceneSettings::default()
        };
        assert!(bad_fps.validate().is_err());
        let inverted = SceneSettings {
            frame_range: FrameRange::new(10, 5),
            ..SceneSettings::default()
        };
        assert!(inverted.validate().is_err());

        // Untouched fields are not checked.
        let renamed = SceneSettings {
            name: "Renamed".to_owned(),
            ..inverted.clone()
        };
        assert!(renamed.validate_change(&inverted).is_ok());
        let still_inverted = SceneSettings {
            frame_range: FrameRange::new(20, 1),
            ..inverted.clone()
        };
        assert!(still_inverted.validate_change(&inverted).is_err());
        let zero_fps = SceneSettings {
            fps: 0.0,
            ..inverted.clone()
        };
        assert!(zero_fps.validate_change(&inverted).is_err());
    }
    #[test]
    fn property_change_invalidates() {
        use crate::cache::{BoxRenderData, MemoryDataHandler};
        use std::sync::Arc;

        let memory = MemoryDataHandler::new();
        let mut scene = Scene::new(SceneSettings::default());
        let id = scene
            .push_box(BoxNode::new("shape").with_property("visible", PropertyValue::Bool(true)));
        let render = Arc::new(BoxRenderData::new(&memory, 3.0, vec![0; 32]));
        scene
            .node_mut(id)
            .unwrap()
            .render_data_mut()
            .add_item_at_rel_frame(render);
        assert_eq!(memory.len(), 1);

        let command = PropertyCommand::Changed {
            target: Target {
                scene: scene.id(),
                node: id,
                path: [0].into_iter().collect(),
            },
            change: Change::Bool {
                from: true,
                to: false,
            },
        };
        scene.apply(DoUndo::Do(&command)).unwrap();
        assert!(scene.node(id).unwrap().render_data().is_empty());
        // The only reference was in the handler, so the container left the registry with it.
        assert!(memory.is_empty());
        assert_eq!(
            scene.node(id).unwrap().property(&[0]).unwrap().value,
            PropertyValue::Bool(false)
        );
        scene.apply(DoUndo::Undo(&command)).unwrap();
        assert_eq!(
            scene.node(id).unwrap().property(&[0]).unwrap().value,
            PropertyValue::Bool(true)
        );
    }
    #[test]
    fn box_removal_round_trip() {
        let mut scene = Scene::new(SceneSettings::default());
        let a = scene.push_box(BoxNode::new("a"));
        let b = scene.push_box(BoxNode::new("b"));
        let removed = commands::Command::BoxRemoved {
            target: scene.id(),
            node: a,
            index: 0,
        };
        scene.apply(DoUndo::Do(&removed)).unwrap();
        assert_eq!(scene.boxes().len(), 1);
        assert_eq!(scene.box_index(b), Some(0));
        // Already gone.
        assert!(scene.apply(DoUndo::Do(&removed)).is_err());
        scene.apply(DoUndo::Undo(&removed)).unwrap();
        assert_eq!(scene.box_index(a), Some(0));
    }
}
