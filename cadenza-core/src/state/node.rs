use super::property::{self, Property, PropertyValue};
use super::BoxID;
use crate::cache::RenderDataHandler;

/// Binary payload embedded in a box, such as an image. Stored beside the manifest in archives.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Asset {
    /// Name of the file, relative to the scene's asset folder.
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// A node of a scene's box graph.
pub struct BoxNode {
    id: BoxID,
    pub name: String,
    properties: Vec<Property>,
    pub asset: Option<Asset>,
    render_data: RenderDataHandler,
}
impl BoxNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: BoxID::default(),
            name: name.into(),
            properties: Vec::new(),
            asset: None,
            render_data: RenderDataHandler::new(),
        }
    }
    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, value: PropertyValue) -> Self {
        self.properties.push(Property::new(name, value));
        self
    }
    #[must_use]
    pub fn with_asset(mut self, asset: Asset) -> Self {
        self.asset = Some(asset);
        self
    }
    #[must_use]
    pub fn id(&self) -> BoxID {
        self.id
    }
    #[must_use]
    pub fn properties(&self) -> &[Property] {
        &self.properties
    }
    /// Add a property outside of any command, for building boxes before they are inserted into a scene.
    pub fn push_property(&mut self, property: Property) {
        self.properties.push(property);
    }
    #[must_use]
    pub fn property(&self, path: &[usize]) -> Option<&Property> {
        property::get(&self.properties, path)
    }
    pub(crate) fn property_mut(&mut self, path: &[usize]) -> Option<&mut Property> {
        property::get_mut(&mut self.properties, path)
    }
    /// Find a top-level property by name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<usize> {
        self.properties.iter().position(|p| p.name == name)
    }
    /// Every box linked from this box's properties.
    #[must_use]
    pub fn links(&self) -> Vec<BoxID> {
        let mut links = Vec::new();
        property::visit(&self.properties, &mut |p| {
            if let PropertyValue::Link(Some(target)) = p.value {
                links.push(target);
            }
        });
        links
    }
    #[must_use]
    pub fn render_data(&self) -> &RenderDataHandler {
        &self.render_data
    }
    pub fn render_data_mut(&mut self) -> &mut RenderDataHandler {
        &mut self.render_data
    }
    /// Drop all cached renders, after the box has changed.
    pub fn invalidate(&mut self) {
        if !self.render_data.is_empty() {
            log::trace!(
                "invalidating {} cached frames of {}",
                self.render_data.len(),
                self.id
            );
        }
        self.render_data.clear();
    }
}
impl std::fmt::Debug for BoxNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxNode")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("properties", &self.properties)
            .field("asset", &self.asset.as_ref().map(|a| &a.file_name))
            .finish_non_exhaustive()
    }
}

pub mod writer {
    use super::super::property::commands::{Change, Command, Target};
    use super::super::property::{PropertyPath, PropertyValue};
    use super::super::{BoxID, Scene};
    use crate::commands::{CommandConsumer, CommandError, DoUndo};
    use crate::queue::writer::CommandWrite;

    /// Records changes to the properties of one box.
    pub struct NodeWriter<'a, Write> {
        writer: Write,
        scene: &'a mut Scene,
        node: BoxID,
    }
    impl<'a, Write: CommandWrite<Command>> NodeWriter<'a, Write> {
        /// Fails if the box is not part of the scene.
        pub fn new(writer: Write, scene: &'a mut Scene, node: BoxID) -> Result<Self, CommandError> {
            if scene.node(node).is_none() {
                return Err(CommandError::UnknownResource);
            }
            Ok(Self {
                writer,
                scene,
                node,
            })
        }
        fn current(&self, path: &[usize]) -> Result<&PropertyValue, CommandError> {
            self.scene
                .node(self.node)
                .and_then(|node| node.property(path))
                .map(|p| &p.value)
                .ok_or(CommandError::UnknownResource)
        }
        fn property_name(&self, path: &[usize]) -> String {
            self.scene
                .node(self.node)
                .and_then(|node| node.property(path))
                .map(|p| p.name.clone())
                .unwrap_or_default()
        }
        /// Record, then apply. The change has already been checked against the current value.
        fn commit(&mut self, path: &[usize], change: Change) -> Result<(), CommandError> {
            let command = Command::Changed {
                target: Target {
                    scene: self.scene.id(),
                    node: self.node,
                    path: PropertyPath::from_slice(path),
                },
                change,
            };
            self.writer.write(command.clone());
            self.scene.apply(DoUndo::Do(&command))
        }
        pub fn set_bool(&mut self, path: &[usize], to: bool) -> Result<(), CommandError> {
            let &PropertyValue::Bool(from) = self.current(path)? else {
                return Err(CommandError::MismatchedState);
            };
            if from == to {
                return Ok(());
            }
            self.writer.name(if to {
                "Enable Property"
            } else {
                "Disable Property"
            });
            self.commit(path, Change::Bool { from, to })
        }
        pub fn set_checked(&mut self, path: &[usize], to: bool) -> Result<(), CommandError> {
            let PropertyValue::Container(container) = self.current(path)? else {
                return Err(CommandError::MismatchedState);
            };
            let from = container.checked;
            if from == to {
                return Ok(());
            }
            self.writer.name(if to {
                "Enable Property"
            } else {
                "Disable Property"
            });
            self.commit(path, Change::Checked { from, to })
        }
        pub fn set_combo(&mut self, path: &[usize], to: i32) -> Result<(), CommandError> {
            let PropertyValue::Combo(combo) = self.current(path)? else {
                return Err(CommandError::MismatchedState);
            };
            let from = combo.current;
            if from == to {
                return Ok(());
            }
            if !combo.is_valid_index(to) {
                return Err(CommandError::InvalidValue("combo index out of range"));
            }
            let name = self.property_name(path);
            self.writer.name(&format!("Set {name}"));
            self.commit(path, Change::Combo { from, to })
        }
        pub fn set_real(&mut self, path: &[usize], to: f64) -> Result<(), CommandError> {
            let &PropertyValue::Real(from) = self.current(path)? else {
                return Err(CommandError::MismatchedState);
            };
            if from.to_bits() == to.to_bits() {
                return Ok(());
            }
            if !to.is_finite() {
                return Err(CommandError::InvalidValue("value not finite"));
            }
            let name = self.property_name(path);
            self.writer.name(&format!("Set {name}"));
            self.commit(path, Change::Real { from, to })
        }
        /// Point a link at another box of the same scene, or clear it.
        pub fn set_link(&mut self, path: &[usize], to: Option<BoxID>) -> Result<(), CommandError> {
            let &PropertyValue::Link(from) = self.current(path)? else {
                return Err(CommandError::MismatchedState);
            };
            if from == to {
                return Ok(());
            }
            if to.is_some_and(|target| self.scene.node(target).is_none()) {
                return Err(CommandError::UnknownResource);
            }
            let name = self.property_name(path);
            self.writer.name(&format!("Set {name}"));
            self.commit(path, Change::Link { from, to })
        }
    }
}
