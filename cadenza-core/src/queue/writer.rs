use crate::commands::{self, Command};

/// Any type which can sink commands.
pub trait CommandWrite<Command> {
    /// Inserts a command.
    fn write(&mut self, command: Command);
    /// Suggest a user-facing name for the change being written, like "Set Opacity".
    /// Sinks that track names keep the first suggestion.
    fn name(&mut self, _name: &str) {}
}
impl<Write, Command> CommandWrite<Command> for &mut Write
where
    Write: CommandWrite<Command>,
{
    fn write(&mut self, command: Command) {
        (**self).write(command);
    }
    fn name(&mut self, name: &str) {
        (**self).name(name);
    }
}

/// Commands written so far during one [`super::DocumentCommandQueue::write_with`] call.
#[derive(Default)]
pub struct Recorded {
    // Optimize for exactly one command (the most common case)
    commands: smallvec::SmallVec<[Command; 1]>,
    label: Option<String>,
}
// Any subcommand that can be wrapped in Command can be recorded.
impl<Subcommand> CommandWrite<Subcommand> for Recorded
where
    Subcommand: Into<Command>,
{
    fn write(&mut self, command: Subcommand) {
        self.commands.push(command.into());
    }
    fn name(&mut self, name: &str) {
        if self.label.is_none() {
            self.label = Some(name.to_owned());
        }
    }
}

pub struct CommandQueueWriter<'a> {
    pub(super) lock: parking_lot::RwLockWriteGuard<'a, super::DocumentCommandQueueInner>,
    pub(super) recorded: Recorded,
}
// If this is leaked the history no longer matches the state, but the lock is then held forever so
// nobody can observe the mismatch.
impl Drop for CommandQueueWriter<'_> {
    fn drop(&mut self) {
        // Skip if nothing to write.
        if self.recorded.commands.is_empty() {
            return;
        }
        let mut written = std::mem::take(&mut self.recorded.commands);

        // We always write exactly one command - bundle into one if more!
        // If panic exit, write as a panic scope (even if the scope is just one command long)
        let command = if std::thread::panicking() {
            Command::Meta(commands::MetaCommand::Scope(
                commands::ScopeType::WritePanic,
                written.into_boxed_slice(),
            ))
        } else if written.len() == 1 {
            // Not panicking. Write the single command, or write as Atoms scope if multiple.
            let Some(single) = written.pop() else {
                return;
            };
            single
        } else {
            Command::Meta(commands::MetaCommand::Scope(
                commands::ScopeType::Atoms,
                written.into_boxed_slice(),
            ))
        };

        log::trace!("Writing new command: {:#?}", command);
        let label = self.recorded.label.take();
        self.lock.push(super::HistoryEntry { label, command });
    }
}
impl CommandQueueWriter<'_> {
    /// Override the user-facing name of this change.
    pub fn set_label(&mut self, label: impl Into<String>) {
        self.recorded.label = Some(label.into());
    }
    pub fn document(
        &'_ mut self,
    ) -> crate::state::document::writer::DocumentWriter<'_, &mut Recorded> {
        crate::state::document::writer::DocumentWriter::new(
            &mut self.recorded,
            &mut self.lock.document,
        )
    }
}
