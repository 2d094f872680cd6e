//! # Commands
//!
//! Commands are the way the shared state of the document is modified. Every change made by a user
//! is recorded automatically as a command by a [`crate::queue::writer`], before it is applied.

pub use state::document::commands::Command as DocumentCommand;
pub use state::property::commands::Command as PropertyCommand;
pub use state::scene::commands::Command as SceneCommand;

use crate::state;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("command constructed for a state that does not match the current state")]
    MismatchedState,
    #[error("resource referenced by the command is not found")]
    UnknownResource,
    #[error("invalid value: {}", .0)]
    InvalidValue(&'static str),
}
pub trait CommandConsumer<C> {
    /// Apply a single command. If this generates an error,
    /// the state of `self` should *not* be observably changed.
    fn apply(&mut self, command: DoUndo<'_, C>) -> Result<(), CommandError>;
}
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScopeType {
    /// Commands are grouped because they were individual parts in part of a single, larger operation.
    Atoms,
    /// A command writer panicked mid write. The commands contained may be part of an incomplete operation,
    /// but are still tracked to keep the history consistent with the state.
    WritePanic,
}
/// Commands about commands!
#[derive(Clone, Debug, PartialEq)]
pub enum MetaCommand {
    /// Bundle many commands into one big group. Can be nested many times.
    /// Grouped commands are treated as a single command, as far as the user can tell.
    Scope(ScopeType, Box<[Command]>),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Meta(MetaCommand),
    Document(DocumentCommand),
    Scene(SceneCommand),
    Property(PropertyCommand),
}
impl From<MetaCommand> for Command {
    fn from(value: MetaCommand) -> Self {
        Self::Meta(value)
    }
}
impl From<DocumentCommand> for Command {
    fn from(value: DocumentCommand) -> Self {
        Self::Document(value)
    }
}
impl From<SceneCommand> for Command {
    fn from(value: SceneCommand) -> Self {
        Self::Scene(value)
    }
}
impl From<PropertyCommand> for Command {
    fn from(value: PropertyCommand) -> Self {
        Self::Property(value)
    }
}
impl Command {
    #[must_use]
    pub fn scene(&self) -> Option<&SceneCommand> {
        match self {
            Self::Scene(m) => Some(m),
            _ => None,
        }
    }
    #[must_use]
    pub fn property(&self) -> Option<&PropertyCommand> {
        match self {
            Self::Property(m) => Some(m),
            _ => None,
        }
    }
}

#[derive(PartialEq, Eq, Debug)]
pub enum DoUndo<'c, T> {
    Do(&'c T),
    Undo(&'c T),
}
impl<'c, T> DoUndo<'c, T> {
    /// Apply a closure to the inner type T, maintaining the
    /// Do or Undo status. Returns None if the closure returns None.
    pub fn filter_map<Func, Return>(&self, f: Func) -> Option<DoUndo<'c, Return>>
    where
        Func: FnOnce(&'c T) -> Option<&'c Return>,
        Return: 'c,
    {
        match self {
            Self::Do(c) => Some(DoUndo::Do(f(c)?)),
            Self::Undo(c) => Some(DoUndo::Undo(f(c)?)),
        }
    }
    #[must_use]
    pub fn is_undo(&self) -> bool {
        matches!(self, Self::Undo(_))
    }
}
