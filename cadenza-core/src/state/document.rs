use super::{Scene, SceneID};
use crate::color::Color;
use crate::commands::{Command, CommandConsumer, CommandError, DoUndo, MetaCommand};

/// Reference to a brush of some brush collection, bookmarked for quick access.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct BrushRef {
    pub collection: String,
    pub name: String,
}

#[derive(Default)]
pub struct Document {
    /// The path from which the file was loaded or saved, or None if opened as new.
    pub path: Option<std::path::PathBuf>,
    color_bookmarks: Vec<Color>,
    brush_bookmarks: Vec<BrushRef>,
    scenes: Vec<Scene>,
    // Scenes whose creation was undone or which were removed.
    removed_scenes: hashbrown::HashMap<SceneID, Scene>,
}
impl Document {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
    #[must_use]
    pub fn color_bookmarks(&self) -> &[Color] {
        &self.color_bookmarks
    }
    #[must_use]
    pub fn brush_bookmarks(&self) -> &[BrushRef] {
        &self.brush_bookmarks
    }
    #[must_use]
    pub fn scenes(&self) -> &[Scene] {
        &self.scenes
    }
    pub fn scenes_mut(&mut self) -> &mut [Scene] {
        &mut self.scenes
    }
    #[must_use]
    pub fn scene(&self, id: SceneID) -> Option<&Scene> {
        self.scenes.iter().find(|scene| scene.id() == id)
    }
    pub fn scene_mut(&mut self, id: SceneID) -> Option<&mut Scene> {
        self.scenes.iter_mut().find(|scene| scene.id() == id)
    }
    #[must_use]
    pub fn scene_index(&self, id: SceneID) -> Option<usize> {
        self.scenes.iter().position(|scene| scene.id() == id)
    }
    /// Bookmark a color, outside of any command. Returns false if it was already bookmarked.
    pub fn push_color_bookmark(&mut self, color: Color) -> bool {
        if self.color_bookmarks.contains(&color) {
            return false;
        }
        self.color_bookmarks.push(color);
        true
    }
    /// Bookmark a brush, outside of any command. Returns false if it was already bookmarked.
    pub fn push_brush_bookmark(&mut self, brush: BrushRef) -> bool {
        if self.brush_bookmarks.contains(&brush) {
            return false;
        }
        self.brush_bookmarks.push(brush);
        true
    }
    /// Append a scene outside of any command, for loaders.
    pub fn push_scene(&mut self, scene: Scene) -> SceneID {
        let id = scene.id();
        self.scenes.push(scene);
        id
    }
}
impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("path", &self.path)
            .field("color_bookmarks", &self.color_bookmarks)
            .field("brush_bookmarks", &self.brush_bookmarks)
            .field("scenes", &self.scenes)
            .finish_non_exhaustive()
    }
}

pub mod commands {
    use super::{BrushRef, Color, SceneID};
    #[derive(Clone, Debug, PartialEq)]
    pub enum Command {
        BookmarkColorAdded { index: usize, color: Color },
        BookmarkColorRemoved { index: usize, color: Color },
        BookmarkBrushAdded { index: usize, brush: BrushRef },
        BookmarkBrushRemoved { index: usize, brush: BrushRef },
        SceneCreated { index: usize, scene: SceneID },
        SceneRemoved { index: usize, scene: SceneID },
    }
}

// Insert `item` at `index`, which must be in bounds for an insert.
fn insert_at<T>(list: &mut Vec<T>, index: usize, item: T) -> Result<(), CommandError> {
    if index > list.len() {
        return Err(CommandError::MismatchedState);
    }
    list.insert(index, item);
    Ok(())
}
// Remove the item at `index`, which must be equal to `item`.
fn remove_at<T: PartialEq>(list: &mut Vec<T>, index: usize, item: &T) -> Result<(), CommandError> {
    match list.get(index) {
        Some(current) if current == item => {
            list.remove(index);
            Ok(())
        }
        Some(_) => Err(CommandError::MismatchedState),
        None => Err(CommandError::UnknownResource),
    }
}

impl CommandConsumer<commands::Command> for Document {
    fn apply(&mut self, command: DoUndo<'_, commands::Command>) -> Result<(), CommandError> {
        use commands::Command;
        match command {
            DoUndo::Do(Command::BookmarkColorAdded { index, color })
            | DoUndo::Undo(Command::BookmarkColorRemoved { index, color }) => {
                insert_at(&mut self.color_bookmarks, *index, *color)
            }
            DoUndo::Undo(Command::BookmarkColorAdded { index, color })
            | DoUndo::Do(Command::BookmarkColorRemoved { index, color }) => {
                remove_at(&mut self.color_bookmarks, *index, color)
            }
            DoUndo::Do(Command::BookmarkBrushAdded { index, brush })
            | DoUndo::Undo(Command::BookmarkBrushRemoved { index, brush }) => {
                insert_at(&mut self.brush_bookmarks, *index, brush.clone())
            }
            DoUndo::Undo(Command::BookmarkBrushAdded { index, brush })
            | DoUndo::Do(Command::BookmarkBrushRemoved { index, brush }) => {
                remove_at(&mut self.brush_bookmarks, *index, brush)
            }
            DoUndo::Do(Command::SceneCreated { index, scene })
            | DoUndo::Undo(Command::SceneRemoved { index, scene }) => {
                if *index > self.scenes.len() {
                    return Err(CommandError::MismatchedState);
                }
                let restored = self
                    .removed_scenes
                    .remove(scene)
                    .ok_or(CommandError::UnknownResource)?;
                self.scenes.insert(*index, restored);
                Ok(())
            }
            DoUndo::Undo(Command::SceneCreated { index, scene })
            | DoUndo::Do(Command::SceneRemoved { index, scene }) => {
                if self.scenes.get(*index).map(Scene::id) != Some(*scene) {
                    return Err(CommandError::MismatchedState);
                }
                let mut removed = self.scenes.remove(*index);
                for node in removed.boxes_mut() {
                    node.invalidate();
                }
                self.removed_scenes.insert(*scene, removed);
                Ok(())
            }
        }
    }
}

impl CommandConsumer<Command> for Document {
    fn apply(&mut self, command: DoUndo<'_, Command>) -> Result<(), CommandError> {
        match command {
            DoUndo::Do(Command::Meta(MetaCommand::Scope(_, commands))) => {
                for (idx, command) in commands.iter().enumerate() {
                    if let Err(err) = self.apply(DoUndo::Do(command)) {
                        // Roll back what was already applied, leaving the state untouched.
                        for applied in commands[..idx].iter().rev() {
                            self.apply(DoUndo::Undo(applied))?;
                        }
                        return Err(err);
                    }
                }
                Ok(())
            }
            DoUndo::Undo(Command::Meta(MetaCommand::Scope(_, commands))) => {
                for (idx, command) in commands.iter().enumerate().rev() {
                    if let Err(err) = self.apply(DoUndo::Undo(command)) {
                        for undone in &commands[idx + 1..] {
                            self.apply(DoUndo::Do(undone))?;
                        }
                        return Err(err);
                    }
                }
                Ok(())
            }
            DoUndo::Do(Command::Document(c)) => self.apply(DoUndo::Do(c)),
            DoUndo::Undo(Command::Document(c)) => self.apply(DoUndo::Undo(c)),
            DoUndo::Do(Command::Scene(c)) | DoUndo::Undo(Command::Scene(c)) => {
                let scene = self
                    .scene_mut(c.target())
                    .ok_or(CommandError::UnknownResource)?;
                command
                    .filter_map(Command::scene)
                    .map_or(Err(CommandError::MismatchedState), |c| scene.apply(c))
            }
            DoUndo::Do(Command::Property(c)) | DoUndo::Undo(Command::Property(c)) => {
                let scene = self
                    .scene_mut(c.target().scene)
                    .ok_or(CommandError::UnknownResource)?;
                command
                    .filter_map(Command::property)
                    .map_or(Err(CommandError::MismatchedState), |c| scene.apply(c))
            }
        }
    }
}

pub mod writer {
    use super::commands::Command;
    use super::{BrushRef, Color, Document};
    use crate::commands::{CommandConsumer, CommandError, DoUndo};
    use crate::queue::writer::CommandWrite;
    use crate::state::scene::{self, writer::SceneWriter, Scene, SceneSettings};
    use crate::state::{property, SceneID};

    pub struct DocumentWriter<'a, Write> {
        writer: Write,
        state: &'a mut Document,
    }
    impl<Write> std::ops::Deref for DocumentWriter<'_, Write> {
        type Target = Document;
        fn deref(&self) -> &Self::Target {
            self.state
        }
    }
    impl<'a, Write> DocumentWriter<'a, Write>
    where
        Write: CommandWrite<Command>
            + CommandWrite<scene::commands::Command>
            + CommandWrite<property::commands::Command>,
    {
        pub fn new(writer: Write, state: &'a mut Document) -> Self {
            Self { writer, state }
        }
        fn record(&mut self, label: &str, command: Command) -> Result<(), CommandError> {
            CommandWrite::<Command>::name(&mut self.writer, label);
            CommandWrite::<Command>::write(&mut self.writer, command.clone());
            self.state.apply(DoUndo::Do(&command))
        }
        /// Bookmark a color. Returns false, recording nothing, if it was already bookmarked.
        pub fn add_color_bookmark(&mut self, color: Color) -> Result<bool, CommandError> {
            if self.state.color_bookmarks.contains(&color) {
                return Ok(false);
            }
            let index = self.state.color_bookmarks.len();
            self.record(
                "Add Color Bookmark",
                Command::BookmarkColorAdded { index, color },
            )?;
            Ok(true)
        }
        /// Returns false, recording nothing, if the color was not bookmarked.
        pub fn remove_color_bookmark(&mut self, color: Color) -> Result<bool, CommandError> {
            let Some(index) = self.state.color_bookmarks.iter().position(|c| *c == color) else {
                return Ok(false);
            };
            self.record(
                "Remove Color Bookmark",
                Command::BookmarkColorRemoved { index, color },
            )?;
            Ok(true)
        }
        pub fn add_brush_bookmark(&mut self, brush: BrushRef) -> Result<bool, CommandError> {
            if self.state.brush_bookmarks.contains(&brush) {
                return Ok(false);
            }
            let index = self.state.brush_bookmarks.len();
            self.record(
                "Add Brush Bookmark",
                Command::BookmarkBrushAdded { index, brush },
            )?;
            Ok(true)
        }
        pub fn remove_brush_bookmark(&mut self, brush: &BrushRef) -> Result<bool, CommandError> {
            let Some(index) = self.state.brush_bookmarks.iter().position(|b| b == brush) else {
                return Ok(false);
            };
            self.record(
                "Remove Brush Bookmark",
                Command::BookmarkBrushRemoved {
                    index,
                    brush: brush.clone(),
                },
            )?;
            Ok(true)
        }
        /// Create a new, empty scene at the end of the document.
        pub fn create_scene(&mut self, settings: SceneSettings) -> Result<SceneID, CommandError> {
            settings.validate()?;
            let scene = Scene::new(settings);
            let id = scene.id();
            let index = self.state.scenes.len();
            CommandWrite::<Command>::name(&mut self.writer, "Create Scene");
            CommandWrite::<Command>::write(
                &mut self.writer,
                Command::SceneCreated { index, scene: id },
            );
            self.state.scenes.push(scene);
            Ok(id)
        }
        pub fn remove_scene(&mut self, scene: SceneID) -> Result<(), CommandError> {
            let index = self
                .state
                .scene_index(scene)
                .ok_or(CommandError::UnknownResource)?;
            self.record("Delete Scene", Command::SceneRemoved { index, scene })
        }
        pub fn scene(&mut self, scene: SceneID) -> Result<SceneWriter<'_, &mut Write>, CommandError> {
            let state = self
                .state
                .scene_mut(scene)
                .ok_or(CommandError::UnknownResource)?;
            Ok(SceneWriter::new(&mut self.writer, state))
        }
    }
}

#[cfg(test)]
mod test {
    use super::commands::Command as DocumentCommand;
    use super::*;

    #[test]
    fn bookmark_commands() {
        let mut document = Document::new();
        let red = Color::rgb(255, 0, 0);
        let added = DocumentCommand::BookmarkColorAdded {
            index: 0,
            color: red,
        };
        document.apply(DoUndo::Do(&added)).unwrap();
        assert_eq!(document.color_bookmarks(), [red]);
        document.apply(DoUndo::Undo(&added)).unwrap();
        assert!(document.color_bookmarks().is_empty());
        // Nothing left to remove.
        assert!(document.apply(DoUndo::Undo(&added)).is_err());
    }
    #[test]
    fn scope_rolls_back() {
        let mut document = Document::new();
        let red = Color::rgb(255, 0, 0);
        let scope = Command::Meta(MetaCommand::Scope(
            crate::commands::ScopeType::Atoms,
            vec![
                DocumentCommand::BookmarkColorAdded {
                    index: 0,
                    color: red,
                }
                .into(),
                // Index out of bounds, fails.
                DocumentCommand::BookmarkColorAdded {
                    index: 5,
                    color: Color::BLACK,
                }
                .into(),
            ]
            .into_boxed_slice(),
        ));
        assert!(document.apply(DoUndo::Do(&scope)).is_err());
        assert!(document.color_bookmarks().is_empty());
    }
    #[test]
    fn push_dedups() {
        let mut document = Document::new();
        assert!(document.push_color_bookmark(Color::WHITE));
        assert!(!document.push_color_bookmark(Color::WHITE));
        let brush = BrushRef {
            collection: "default".into(),
            name: "Pencil".into(),
        };
        assert!(document.push_brush_bookmark(brush.clone()));
        assert!(!document.push_brush_bookmark(brush));
    }
}
