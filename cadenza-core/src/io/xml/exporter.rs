//! Box graphs of a single scene, stored under `scenes/<index>/` of the archive:
//! `boxes.xml` and the `assets/` the boxes embed.
//!
//! ```xml
//! <Boxes>
//!   <Box id="0" name="image" file="cat.png" asset="assets/cat.png">
//!     <Real name="opacity" value="0.5"/>
//!     <Link name="parent" box="3"/>
//!     <BoolContainer name="effects" checked="true">
//!       <Combo name="mode" current="1"><Option name="add"/><Option name="multiply"/></Combo>
//!     </BoolContainer>
//!   </Box>
//! </Boxes>
//! ```

use std::io::{Read, Seek, Write};
use std::str::FromStr;

use super::dom::Element;
use super::{optional, required};
use crate::io::archive::{ZipFileLoader, ZipFileSaver};
use crate::io::tasks::{DeferredTasks, ReadBoxes, WriteIds};
use crate::io::Error;
use crate::state::property::{BoolContainer, Combo, PropertyKind};
use crate::state::{Asset, BoxNode, Property, PropertyPath, PropertyValue, Scene};

const BOXES: &str = "boxes.xml";
const ASSETS: &str = "assets/";
/// Deepest nesting of property containers accepted on read.
const MAX_PROPERTY_DEPTH: usize = 64;

fn scene_path(scene_index: usize) -> String {
    format!("scenes/{scene_index}/")
}

pub struct XmlExporter<'a, W: Write + Seek> {
    saver: &'a mut ZipFileSaver<W>,
    /// Folder of the scene within the archive, with trailing slash.
    path: String,
    ids: &'a WriteIds,
    compress: bool,
    /// Asset entries written so far, relative to `path`.
    assets: hashbrown::HashSet<String>,
}
impl<'a, W: Write + Seek> XmlExporter<'a, W> {
    pub fn new(
        saver: &'a mut ZipFileSaver<W>,
        scene_index: usize,
        ids: &'a WriteIds,
        compress: bool,
    ) -> Self {
        Self {
            saver,
            path: scene_path(scene_index),
            ids,
            compress,
            assets: hashbrown::HashSet::new(),
        }
    }
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
    /// Store `bytes` in the scene's asset folder. Returns the entry name relative to the scene folder.
    pub fn process_asset(&mut self, file: &str, bytes: &[u8]) -> Result<String, Error> {
        // Only ever a file name, never a path that could escape the folder.
        let file = file.replace(['/', '\\'], "_");
        let mut relative = format!("{ASSETS}{file}");
        let mut duplicate = 0;
        while !self.assets.insert(relative.clone()) {
            duplicate += 1;
            relative = format!("{ASSETS}{duplicate}/{file}");
        }
        let name = format!("{}{relative}", self.path);
        self.saver.process(&name, self.compress, |stream| {
            stream.write_all(bytes)?;
            Ok(())
        })?;
        Ok(relative)
    }
    /// Write every box of `scene`, along with their assets.
    pub fn write_boxes(&mut self, scene: &Scene) -> Result<(), Error> {
        let mut root = Element::new("Boxes");
        for node in scene.boxes() {
            let id = self
                .ids
                .get(node.id())
                .ok_or_else(|| Error::Format(format!("{} was not numbered", node.id())))?;
            let mut element = Element::new("Box")
                .with_attribute("id", id.to_string())
                .with_attribute("name", node.name.as_str());
            if let Some(asset) = &node.asset {
                let relative = self.process_asset(&asset.file_name, &asset.bytes)?;
                element.set_attribute("file", asset.file_name.as_str());
                element.set_attribute("asset", relative);
            }
            for property in node.properties() {
                element.push(self.property_element(property));
            }
            root.push(element);
        }
        let text = root.to_xml()?;
        let name = format!("{}{BOXES}", self.path);
        self.saver.process_text(&name, self.compress, |out| {
            out.push_str(&text);
            Ok(())
        })
    }
    fn property_element(&self, property: &Property) -> Element {
        let kind: &'static str = property.value.kind().into();
        let mut element = Element::new(kind).with_attribute("name", property.name.as_str());
        match &property.value {
            PropertyValue::Bool(value) => element.set_attribute("value", value.to_string()),
            PropertyValue::Combo(combo) => {
                element.set_attribute("current", combo.current.to_string());
                for name in &combo.names {
                    element.push(Element::new("Option").with_attribute("name", name.as_str()));
                }
            }
            PropertyValue::Real(value) => element.set_attribute("value", value.to_string()),
            PropertyValue::Link(None) => (),
            PropertyValue::Link(Some(target)) => match self.ids.get(*target) {
                Some(id) => element.set_attribute("box", id.to_string()),
                None => log::warn!("link to {target}, which is not part of the document, dropped"),
            },
            PropertyValue::Container(container) => {
                element.set_attribute("checked", container.checked.to_string());
                for child in &container.children {
                    element.push(self.property_element(child));
                }
            }
        }
        element
    }
}

pub struct XmlImporter<'a> {
    path: String,
    boxes: &'a mut ReadBoxes,
    tasks: &'a mut DeferredTasks,
}
impl<'a> XmlImporter<'a> {
    pub fn new(scene_index: usize, boxes: &'a mut ReadBoxes, tasks: &'a mut DeferredTasks) -> Self {
        Self {
            path: scene_path(scene_index),
            boxes,
            tasks,
        }
    }
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
    /// Read an asset stored by [`XmlExporter::process_asset`].
    pub fn process_asset<R: Read + Seek>(
        &self,
        loader: &mut ZipFileLoader<R>,
        relative: &str,
    ) -> Result<Vec<u8>, Error> {
        loader.process(&format!("{}{relative}", self.path), |stream| {
            let mut bytes = Vec::new();
            stream.read_to_end(&mut bytes)?;
            Ok(bytes)
        })
    }
    /// Read the boxes of the scene into `scene`. Links are queued for resolution.
    pub fn read_boxes<R: Read + Seek>(
        &mut self,
        loader: &mut ZipFileLoader<R>,
        scene: &mut Scene,
    ) -> Result<(), Error> {
        let name = format!("{}{BOXES}", self.path);
        let text = loader.process_text(&name, |text| Ok(text.to_owned()))?;
        let root = Element::parse(&text)?;
        if root.name != "Boxes" {
            return Err(Error::Format(format!(
                "{name} holds {} instead of Boxes",
                root.name
            )));
        }
        for element in root.children_named("Box") {
            let read_id: u32 = required(element, "id")?;
            let asset = match element.attribute("asset") {
                Some(relative) => {
                    let bytes = self.process_asset(loader, relative)?;
                    let file_name = element
                        .attribute("file")
                        .or_else(|| relative.rsplit('/').next())
                        .unwrap_or(relative)
                        .to_owned();
                    Some(Asset { file_name, bytes })
                }
                None => None,
            };
            let mut links = Vec::new();
            let properties =
                read_properties(&element.children, &mut PropertyPath::new(), &mut links)?;

            let mut node = BoxNode::new(element.attribute("name").unwrap_or_default());
            node.asset = asset;
            for property in properties {
                node.push_property(property);
            }
            let id = scene.push_box(node);
            self.boxes.insert(read_id, scene.id(), id)?;
            for (path, target) in links {
                self.tasks.push_link(scene.id(), id, path, target);
            }
        }
        Ok(())
    }
}

/// Read property elements at `path`. Links are read as empty, and their targets pushed to `links`.
fn read_properties(
    elements: &[Element],
    path: &mut PropertyPath,
    links: &mut Vec<(PropertyPath, u32)>,
) -> Result<Vec<Property>, Error> {
    if path.len() > MAX_PROPERTY_DEPTH {
        return Err(Error::Format("properties nested too deeply".to_owned()));
    }
    let mut properties = Vec::with_capacity(elements.len());
    for (idx, element) in elements.iter().enumerate() {
        let kind = PropertyKind::from_str(&element.name)
            .map_err(|_| Error::Format(format!("Unknown property type {}", element.name)))?;
        let name = element.attribute("name").unwrap_or_default().to_owned();
        path.push(idx);
        let value = match kind {
            PropertyKind::Bool => PropertyValue::Bool(required(element, "value")?),
            PropertyKind::Combo => PropertyValue::Combo(Combo {
                names: element
                    .children_named("Option")
                    .map(|option| option.attribute("name").unwrap_or_default().to_owned())
                    .collect(),
                current: optional(element, "current")?.unwrap_or_default(),
            }),
            PropertyKind::Real => PropertyValue::Real(required(element, "value")?),
            PropertyKind::Link => {
                if let Some(target) = optional(element, "box")? {
                    links.push((path.clone(), target));
                }
                PropertyValue::Link(None)
            }
            PropertyKind::Container => PropertyValue::Container(BoolContainer {
                checked: optional(element, "checked")?.unwrap_or_default(),
                children: read_properties(&element.children, path, links)?,
            }),
        };
        path.pop();
        properties.push(Property { name, value });
    }
    Ok(properties)
}
