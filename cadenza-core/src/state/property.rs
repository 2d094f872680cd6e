//! # Properties
//!
//! Every user-facing setting of a box is a named [`Property`]. Containers nest further properties,
//! so a property is addressed by a [`PropertyPath`] of indices from the box's top level down.

use super::BoxID;
use crate::commands::{CommandConsumer, CommandError, DoUndo};

/// Indices from the top-level property list into nested containers.
pub type PropertyPath = smallvec::SmallVec<[usize; 4]>;

#[derive(Clone, PartialEq, Debug)]
pub struct Property {
    pub name: String,
    pub value: PropertyValue,
}
impl Property {
    pub fn new(name: impl Into<String>, value: PropertyValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

#[derive(Clone, PartialEq, Debug)]
pub enum PropertyValue {
    Bool(bool),
    Combo(Combo),
    Real(f64),
    /// Reference to another box of the same scene.
    Link(Option<BoxID>),
    Container(BoolContainer),
}
impl PropertyValue {
    #[must_use]
    pub fn kind(&self) -> PropertyKind {
        match self {
            Self::Bool(_) => PropertyKind::Bool,
            Self::Combo(_) => PropertyKind::Combo,
            Self::Real(_) => PropertyKind::Real,
            Self::Link(_) => PropertyKind::Link,
            Self::Container(_) => PropertyKind::Container,
        }
    }
}

/// The type of a property, without its value. Doubles as the tag in both file formats.
#[derive(
    Copy,
    Clone,
    PartialEq,
    Eq,
    Hash,
    Debug,
    strum::IntoStaticStr,
    strum::EnumString,
    strum::FromRepr,
)]
#[repr(u8)]
pub enum PropertyKind {
    Bool = 0,
    Combo = 1,
    Real = 2,
    Link = 3,
    #[strum(serialize = "BoolContainer")]
    Container = 4,
}

/// A choice of one of several named options.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct Combo {
    pub names: Vec<String>,
    pub current: i32,
}
impl Combo {
    #[must_use]
    pub fn current_name(&self) -> Option<&str> {
        usize::try_from(self.current)
            .ok()
            .and_then(|idx| self.names.get(idx))
            .map(String::as_str)
    }
    #[must_use]
    pub fn is_valid_index(&self, idx: i32) -> bool {
        usize::try_from(idx).is_ok_and(|idx| idx < self.names.len())
    }
}

/// A group of properties that can be switched on and off as a whole.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct BoolContainer {
    pub checked: bool,
    pub children: Vec<Property>,
}

/// Follow a path through nested containers.
#[must_use]
pub fn get<'a>(properties: &'a [Property], path: &[usize]) -> Option<&'a Property> {
    let (&first, rest) = path.split_first()?;
    let mut property = properties.get(first)?;
    for &idx in rest {
        let PropertyValue::Container(container) = &property.value else {
            return None;
        };
        property = container.children.get(idx)?;
    }
    Some(property)
}
pub fn get_mut<'a>(properties: &'a mut [Property], path: &[usize]) -> Option<&'a mut Property> {
    let (&first, rest) = path.split_first()?;
    let mut property = properties.get_mut(first)?;
    for &idx in rest {
        let PropertyValue::Container(container) = &mut property.value else {
            return None;
        };
        property = container.children.get_mut(idx)?;
    }
    Some(property)
}
/// Depth-first visit of every property, containers before their children.
pub fn visit<'a>(properties: &'a [Property], f: &mut impl FnMut(&'a Property)) {
    for property in properties {
        f(property);
        if let PropertyValue::Container(container) = &property.value {
            visit(&container.children, f);
        }
    }
}

pub fn visit_mut(properties: &mut [Property], f: &mut impl FnMut(&mut Property)) {
    for property in properties {
        f(property);
        if let PropertyValue::Container(container) = &mut property.value {
            visit_mut(&mut container.children, f);
        }
    }
}

pub mod commands {
    use super::{BoxID, PropertyPath};
    use crate::state::SceneID;

    #[derive(Clone, Debug, PartialEq)]
    pub struct Target {
        pub scene: SceneID,
        pub node: BoxID,
        pub path: PropertyPath,
    }
    /// A change of a single value, with enough information to reverse it.
    #[derive(Clone, Debug, PartialEq)]
    pub enum Change {
        Bool { from: bool, to: bool },
        Combo { from: i32, to: i32 },
        Real { from: f64, to: f64 },
        Link { from: Option<BoxID>, to: Option<BoxID> },
        /// The `checked` flag of a container.
        Checked { from: bool, to: bool },
    }
    impl Change {
        /// The same change, undone.
        #[must_use]
        pub fn inverse(&self) -> Self {
            match *self {
                Self::Bool { from, to } => Self::Bool { from: to, to: from },
                Self::Combo { from, to } => Self::Combo { from: to, to: from },
                Self::Real { from, to } => Self::Real { from: to, to: from },
                Self::Link { from, to } => Self::Link { from: to, to: from },
                Self::Checked { from, to } => Self::Checked { from: to, to: from },
            }
        }
    }
    #[derive(Clone, Debug, PartialEq)]
    pub enum Command {
        Changed { target: Target, change: Change },
    }
    impl Command {
        #[must_use]
        pub fn target(&self) -> &Target {
            match self {
                Self::Changed { target, .. } => target,
            }
        }
    }
}

impl CommandConsumer<commands::Change> for PropertyValue {
    fn apply(&mut self, command: DoUndo<'_, commands::Change>) -> Result<(), CommandError> {
        use commands::Change;
        let inverse;
        let change = match command {
            DoUndo::Do(change) => change,
            DoUndo::Undo(change) => {
                inverse = change.inverse();
                &inverse
            }
        };
        // Floats compared bitwise, the recorded value is an exact copy.
        match (self, change) {
            (Self::Bool(value), Change::Bool { from, to }) if value == from => *value = *to,
            (Self::Combo(combo), Change::Combo { from, to }) if combo.current == *from => {
                if !combo.is_valid_index(*to) {
                    return Err(CommandError::InvalidValue("combo index out of range"));
                }
                combo.current = *to;
            }
            (Self::Real(value), Change::Real { from, to }) if value.to_bits() == from.to_bits() => {
                *value = *to;
            }
            (Self::Link(value), Change::Link { from, to }) if value == from => *value = *to,
            (Self::Container(container), Change::Checked { from, to })
                if container.checked == *from =>
            {
                container.checked = *to;
            }
            _ => return Err(CommandError::MismatchedState),
        }
        Ok(())
    }
}
