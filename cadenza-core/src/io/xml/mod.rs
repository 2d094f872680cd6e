//! # Zipped XML documents
//!
//! The archive holds a manifest, `document.xml`, describing bookmarks and scene settings:
//!
//! ```xml
//! <Document format-version="1">
//!   <ColorBookmarks><Color name="#ff0000"/></ColorBookmarks>
//!   <Scenes>
//!     <Scene resolution="1" name="Scene" frame="0" width="1920" height="1080" fps="24" clip="false" frameRange="0 200"/>
//!   </Scenes>
//! </Document>
//! ```
//!
//! Box graphs and their assets live beside it, one folder per scene, see [`exporter`].
//! Brush bookmarks are not part of this format.

use std::io::{Read, Seek, Write};
use std::str::FromStr;

use super::archive::{ZipFileLoader, ZipFileSaver};
use super::tasks::{DeferredTasks, ReadBoxes, WriteIds};
use super::Error;
use crate::color::Color;
use crate::state::{Document, Scene, SceneSettings};
use crate::util::FrameRange;

pub mod dom;
pub mod exporter;

use dom::Element;
use exporter::{XmlExporter, XmlImporter};

pub const MANIFEST: &str = "document.xml";

/// Revision of the manifest schema, stored as `format-version`.
#[derive(
    Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, strum::FromRepr, strum::Display,
)]
#[repr(u32)]
pub enum XmlVersion {
    Alpha = 0,
    /// Scenes carry `clip`.
    Beta = 1,
}
impl XmlVersion {
    pub const CURRENT: Self = Self::Beta;
    #[must_use]
    pub fn number(self) -> u32 {
        self as u32
    }
}

/// Parse attribute `key` of `element`. Absent or empty attributes are `None`.
pub(crate) fn optional<T: FromStr>(element: &Element, key: &str) -> Result<Option<T>, Error> {
    match element.attribute(key) {
        None | Some("") => Ok(None),
        Some(value) => value.parse().map(Some).map_err(|_| {
            Error::Format(format!("Invalid {key} {value:?} of {}", element.name))
        }),
    }
}
/// Parse attribute `key` of `element`, which must be present.
pub(crate) fn required<T: FromStr>(element: &Element, key: &str) -> Result<T, Error> {
    optional(element, key)?
        .ok_or_else(|| Error::Format(format!("Missing {key} of {}", element.name)))
}

/// Write `document` into the archive: the manifest, then each scene's boxes.
pub fn export_document<W: Write + Seek>(
    document: &Document,
    saver: &mut ZipFileSaver<W>,
    compress: bool,
) -> Result<(), Error> {
    if !document.brush_bookmarks().is_empty() {
        log::debug!(
            "{} brush bookmarks not stored in {}",
            document.brush_bookmarks().len(),
            saver.archive()
        );
    }
    let ids = WriteIds::from_document(document)?;

    let mut root = Element::new("Document")
        .with_attribute("format-version", XmlVersion::CURRENT.number().to_string());
    let mut colors = Element::new("ColorBookmarks");
    for color in document.color_bookmarks() {
        colors.push(Element::new("Color").with_attribute("name", color.argb_name()));
    }
    root.push(colors);
    let mut scenes = Element::new("Scenes");
    for scene in document.scenes() {
        scenes.push(scene_element(scene.settings()));
    }
    root.push(scenes);
    let manifest = root.to_xml()?;
    saver.process_text(MANIFEST, compress, |out| {
        out.push_str(&manifest);
        Ok(())
    })?;

    for (index, scene) in document.scenes().iter().enumerate() {
        XmlExporter::new(saver, index, &ids, compress).write_boxes(scene)?;
    }
    Ok(())
}

fn scene_element(settings: &SceneSettings) -> Element {
    Element::new("Scene")
        .with_attribute("resolution", settings.resolution.to_string())
        .with_attribute("name", settings.name.as_str())
        .with_attribute("frame", settings.current_frame.to_string())
        .with_attribute("width", settings.width.to_string())
        .with_attribute("height", settings.height.to_string())
        .with_attribute("fps", settings.fps.to_string())
        .with_attribute("clip", settings.clip_to_canvas.to_string())
        .with_attribute(
            "frameRange",
            format!("{} {}", settings.frame_range.min, settings.frame_range.max),
        )
}

/// Read a document from the archive.
///
/// # Errors
/// Any missing entry or malformed attribute fails the whole import, with a message naming the culprit.
pub fn import_document<R: Read + Seek>(loader: &mut ZipFileLoader<R>) -> Result<Document, Error> {
    let text = loader.process_text(MANIFEST, |text| Ok(text.to_owned()))?;
    let root = Element::parse(&text)?;
    if root.name != "Document" {
        return Err(Error::Format(format!(
            "{MANIFEST} holds {} instead of Document",
            root.name
        )));
    }
    let number: u32 = optional(&root, "format-version")?
        .ok_or_else(|| Error::Format("No format version specified".to_owned()))?;
    let version = XmlVersion::from_repr(number).ok_or_else(|| {
        Error::Unsupported(format!("format version {number} of {}", loader.archive()))
    })?;
    log::debug!("importing {} format {version}", loader.archive());

    let mut document = Document::new();
    if let Some(colors) = root.child("ColorBookmarks") {
        for color in colors.children_named("Color") {
            let Some(name) = color.attribute("name").filter(|name| !name.is_empty()) else {
                log::debug!("skipping unnamed color bookmark");
                continue;
            };
            let color = Color::from_name(name).map_err(|err| Error::Format(err.to_string()))?;
            document.push_color_bookmark(color);
        }
    }

    let mut boxes = ReadBoxes::default();
    let mut tasks = DeferredTasks::default();
    if let Some(scenes) = root.child("Scenes") {
        for (index, element) in scenes.children_named("Scene").enumerate() {
            let mut scene = Scene::new(SceneSettings::default());
            apply_scene_attributes(element, scene.settings_mut(), version)?;
            XmlImporter::new(index, &mut boxes, &mut tasks).read_boxes(loader, &mut scene)?;
            document.push_scene(scene);
        }
    }
    tasks.drain(&mut document, &boxes)?;
    Ok(document)
}

fn apply_scene_attributes(
    element: &Element,
    settings: &mut SceneSettings,
    version: XmlVersion,
) -> Result<(), Error> {
    if let Some(resolution) = optional(element, "resolution")? {
        settings.resolution = resolution;
    }
    if let Some(name) = element.attribute("name") {
        name.clone_into(&mut settings.name);
    }
    if let Some(frame) = optional(element, "frame")? {
        settings.current_frame = frame;
    }
    if let Some(width) = optional(element, "width")? {
        settings.width = width;
    }
    if let Some(height) = optional(element, "height")? {
        settings.height = height;
    }
    if let Some(fps) = optional(element, "fps")? {
        settings.fps = fps;
    }
    if version >= XmlVersion::Beta {
        if let Some(clip) = optional(element, "clip")? {
            settings.clip_to_canvas = clip;
        }
    }
    settings.frame_range = match element.attribute("frameRange") {
        Some(range) => parse_frame_range(range)?,
        None => FrameRange::DEFAULT,
    };
    if !settings.frame_range.is_ordered() {
        // Kept as-is, edits through the writers will refuse to produce another.
        log::warn!(
            "scene {:?} has inverted frame range {} {}",
            settings.name,
            settings.frame_range.min,
            settings.frame_range.max
        );
    }
    Ok(())
}

/// `"min max"`, separated by any number of spaces.
fn parse_frame_range(range: &str) -> Result<FrameRange, Error> {
    let invalid = || Error::Format(format!("Invalid frame range {range}"));
    let parts: Vec<&str> = range.split(' ').filter(|part| !part.is_empty()).collect();
    let [min, max] = parts[..] else {
        return Err(invalid());
    };
    let min = min.parse().map_err(|_| invalid())?;
    let max = max.parse().map_err(|_| invalid())?;
    Ok(FrameRange::new(min, max))
}
