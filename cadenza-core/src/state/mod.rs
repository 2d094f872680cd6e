//! # State
//!
//! The in-memory model of a document: bookmarks and scenes, scenes own a flat graph of boxes, and boxes
//! expose their settings as properties. Every type here that can be edited by the user has a `commands`
//! submodule describing its changes and a `writer` submodule recording them.

pub mod document;
pub mod node;
pub mod property;
pub mod scene;

pub use document::{BrushRef, Document};
pub use node::{Asset, BoxNode};
pub use property::{Property, PropertyPath, PropertyValue};
pub use scene::{Scene, SceneSettings};

pub struct SceneIDMarker;
pub type SceneID = crate::RuntimeID<SceneIDMarker>;
pub struct BoxIDMarker;
pub type BoxID = crate::RuntimeID<BoxIDMarker>;
