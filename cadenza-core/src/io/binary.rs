//! # Binary documents
//!
//! Little endian throughout. A file is laid out as:
//!
//! ```text
//! magic "CDZADOC\0", u32 version
//! [SceneTable]          scene count, settings per scene, checkpoint
//! [Bookmarks]           colors, brushes, checkpoint
//! [DocumentGradients]   legacy gradients, checkpoint
//! scene count, then per scene:
//!     [!SceneTable]     settings
//!     [SceneGradients]  legacy gradients
//!     boxes, checkpoint
//! ```
//!
//! Bracketed sections only exist in versions where [`Field::present_in`] says so.
//! Boxes are numbered densely across the whole document in the order they are written, and links store that
//! number, or -1 for no link.

use std::io::{Read, Write};

use az::CheckedAs;

use super::stream::{ReadStream, WriteStream};
use super::tasks::{DeferredTasks, ReadBoxes, WriteIds};
use super::version::{Field, Version};
use super::Error;
use crate::color::Color;
use crate::state::property::{BoolContainer, Combo, PropertyKind};
use crate::state::{
    Asset, BoxNode, BrushRef, Document, Property, PropertyPath, PropertyValue, Scene,
    SceneSettings,
};
use crate::util::FrameRange;

pub const MAGIC: [u8; 8] = *b"CDZADOC\0";
const NO_LINK: i32 = -1;
/// Deepest nesting of property containers accepted on read.
const MAX_PROPERTY_DEPTH: usize = 64;

/// Write at the newest version.
pub fn write_document(document: &Document, writer: impl Write) -> Result<(), Error> {
    write_document_version(document, writer, Version::CURRENT)
}

/// Write in the layout of an older version. Data the version can't represent is dropped.
pub fn write_document_version(
    document: &Document,
    writer: impl Write,
    version: Version,
) -> Result<(), Error> {
    if version != Version::CURRENT {
        log::debug!("writing legacy version {version}");
    }
    let mut stream = WriteStream::new(writer, version);
    stream.write_raw(&MAGIC)?;
    stream.write_u32(version.number())?;

    let ids = WriteIds::from_document(document)?;
    let scenes = document.scenes();
    if stream.has(Field::SceneTable) {
        stream.write_len(scenes.len())?;
        for scene in scenes {
            write_settings(&mut stream, scene.settings())?;
        }
        stream.write_checkpoint()?;
    }
    if stream.has(Field::Bookmarks) {
        write_bookmarks(&mut stream, document)?;
        stream.write_checkpoint()?;
    }
    if stream.has(Field::DocumentGradients) {
        // Gradients are no longer part of documents.
        stream.write_len(0)?;
        stream.write_checkpoint()?;
    }
    stream.write_len(scenes.len())?;
    for scene in scenes {
        if !stream.has(Field::SceneTable) {
            write_settings(&mut stream, scene.settings())?;
        }
        if stream.has(Field::SceneGradients) {
            stream.write_len(0)?;
        }
        write_boxes(&mut stream, scene, &ids)?;
        stream.write_checkpoint()?;
    }
    Ok(())
}

fn write_bookmarks<W: Write>(
    stream: &mut WriteStream<W>,
    document: &Document,
) -> Result<(), Error> {
    let colors = document.color_bookmarks();
    stream.write_len(colors.len())?;
    for color in colors {
        if stream.has(Field::BookmarkAlpha) {
            stream.write_raw(bytemuck::bytes_of(color))?;
        } else {
            stream.write_raw(&[color.r, color.g, color.b])?;
        }
    }
    let brushes = document.brush_bookmarks();
    stream.write_len(brushes.len())?;
    for brush in brushes {
        stream.write_string(&brush.collection)?;
        stream.write_string(&brush.name)?;
    }
    Ok(())
}

fn write_settings<W: Write>(
    stream: &mut WriteStream<W>,
    settings: &SceneSettings,
) -> Result<(), Error> {
    stream.write_string(&settings.name)?;
    stream.write_u32(settings.width)?;
    stream.write_u32(settings.height)?;
    stream.write_real(settings.fps)?;
    stream.write_real(settings.resolution)?;
    stream.write_i32(settings.frame_range.min)?;
    stream.write_i32(settings.frame_range.max)?;
    stream.write_i32(settings.current_frame)?;
    if stream.has(Field::ClipToCanvas) {
        stream.write_bool(settings.clip_to_canvas)?;
    }
    Ok(())
}

fn write_boxes<W: Write>(
    stream: &mut WriteStream<W>,
    scene: &Scene,
    ids: &WriteIds,
) -> Result<(), Error> {
    stream.write_len(scene.boxes().len())?;
    for node in scene.boxes() {
        stream.write_string(&node.name)?;
        stream.write_bool(node.asset.is_some())?;
        if let Some(asset) = &node.asset {
            stream.write_string(&asset.file_name)?;
            stream.write_bytes(&asset.bytes)?;
        }
        write_properties(stream, node.properties(), ids)?;
    }
    Ok(())
}

fn write_properties<W: Write>(
    stream: &mut WriteStream<W>,
    properties: &[Property],
    ids: &WriteIds,
) -> Result<(), Error> {
    stream.write_len(properties.len())?;
    for property in properties {
        stream.write_string(&property.name)?;
        stream.write_u8(property.value.kind() as u8)?;
        match &property.value {
            PropertyValue::Bool(value) => stream.write_bool(*value)?,
            PropertyValue::Combo(combo) => {
                stream.write_len(combo.names.len())?;
                for name in &combo.names {
                    stream.write_string(name)?;
                }
                stream.write_i32(combo.current)?;
            }
            PropertyValue::Real(value) => stream.write_real(*value)?,
            PropertyValue::Link(target) => {
                let id = match target.map(|target| (target, ids.get(target))) {
                    None => NO_LINK,
                    Some((_, Some(id))) => id
                        .checked_as()
                        .ok_or_else(|| Error::Format(format!("box id {id} out of range")))?,
                    Some((target, None)) => {
                        log::warn!("link to {target}, which is not part of the document, dropped");
                        NO_LINK
                    }
                };
                stream.write_i32(id)?;
            }
            PropertyValue::Container(container) => {
                stream.write_bool(container.checked)?;
                write_properties(stream, &container.children, ids)?;
            }
        }
    }
    Ok(())
}

/// Read a document of any supported version.
///
/// # Errors
/// * [`Error::Format`] if this is not a document, or is malformed.
/// * [`Error::Unsupported`] if it was written by a newer version.
/// * [`Error::Checkpoint`] naming the section where the reader lost track.
pub fn read_document(reader: impl Read) -> Result<Document, Error> {
    let mut header = ReadStream::new(reader, Version::Initial);
    let magic = header
        .read_raw::<8>()
        .map_err(|_| Error::Format("not a document, file too short".to_owned()))?;
    if magic != MAGIC {
        return Err(Error::Format("not a document, bad magic".to_owned()));
    }
    let number = header.read_u32()?;
    let version = Version::from_number(number).ok_or_else(|| {
        if number > Version::CURRENT.number() {
            Error::Unsupported(format!(
                "file version {number} is newer than the supported {}",
                Version::CURRENT.number()
            ))
        } else {
            Error::Format(format!("invalid file version {number}"))
        }
    })?;
    log::debug!("reading document version {version}");
    let mut stream = ReadStream::new(header.into_inner(), version);
    read_body(&mut stream)
}

fn read_body<R: Read>(stream: &mut ReadStream<R>) -> Result<Document, Error> {
    let mut document = Document::new();
    if stream.has(Field::SceneTable) {
        let count = stream.read_len()?;
        for _ in 0..count {
            let settings = read_settings(stream)?;
            document.push_scene(Scene::new(settings));
        }
        stream.read_checkpoint("Error reading scene table")?;
    }
    if stream.has(Field::Bookmarks) {
        read_bookmarks(stream, &mut document)?;
        stream.read_checkpoint("Error reading bookmarks")?;
    }
    if stream.has(Field::DocumentGradients) {
        skip_gradients(stream)?;
        stream.read_checkpoint("Error reading gradients")?;
    }

    let mut boxes = ReadBoxes::default();
    let mut tasks = DeferredTasks::default();
    let num_scenes = stream.read_len()?;
    for i in 0..num_scenes {
        let scene = if stream.has(Field::SceneTable) {
            // Scenes were created by the table, fill in the matching one.
            let existing = document.scenes().len();
            let scene = match existing.checked_sub(num_scenes) {
                Some(first) => document.scenes_mut().get_mut(first + i),
                None => None,
            };
            scene.ok_or_else(|| {
                Error::Format(format!(
                    "scene {i} of {num_scenes} missing, only {existing} in the table"
                ))
            })?
        } else {
            let settings = read_settings(stream)?;
            let id = document.push_scene(Scene::new(settings));
            document
                .scene_mut(id)
                .ok_or_else(|| Error::Format("scene vanished".to_owned()))?
        };
        if stream.has(Field::SceneGradients) {
            skip_gradients(stream)?;
        }
        read_boxes(stream, scene, &mut boxes, &mut tasks)?;
        stream.read_checkpoint("Error reading scene")?;
    }

    tasks.drain(&mut document, &boxes)?;
    Ok(document)
}

fn read_bookmarks<R: Read>(
    stream: &mut ReadStream<R>,
    document: &mut Document,
) -> Result<(), Error> {
    let colors = stream.read_len()?;
    for _ in 0..colors {
        let color = if stream.has(Field::BookmarkAlpha) {
            let [r, g, b, a] = stream.read_raw::<4>()?;
            Color::rgba(r, g, b, a)
        } else {
            let [r, g, b] = stream.read_raw::<3>()?;
            Color::rgb(r, g, b)
        };
        if !document.push_color_bookmark(color) {
            log::warn!("duplicate color bookmark {color} ignored");
        }
    }
    let brushes = stream.read_len()?;
    for _ in 0..brushes {
        let collection = stream.read_string()?;
        let name = stream.read_string()?;
        document.push_brush_bookmark(BrushRef { collection, name });
    }
    Ok(())
}

/// Gradients used to live in documents and scenes. They are read and thrown away.
fn skip_gradients<R: Read>(stream: &mut ReadStream<R>) -> Result<(), Error> {
    let count = stream.read_len()?;
    for _ in 0..count {
        let stops = stream.read_len()?;
        for _ in 0..stops {
            // Position, color
            let _ = stream.read_f32()?;
            let _ = stream.read_raw::<4>()?;
        }
    }
    if count != 0 {
        log::warn!("discarded {count} legacy gradients");
    }
    Ok(())
}

fn read_settings<R: Read>(stream: &mut ReadStream<R>) -> Result<SceneSettings, Error> {
    let name = stream.read_string()?;
    let width = stream.read_u32()?;
    let height = stream.read_u32()?;
    let fps = stream.read_real()?;
    let resolution = stream.read_real()?;
    let frame_range = FrameRange::new(stream.read_i32()?, stream.read_i32()?);
    let current_frame = stream.read_i32()?;
    let clip_to_canvas = if stream.has(Field::ClipToCanvas) {
        stream.read_bool()?
    } else {
        false
    };
    if !frame_range.is_ordered() {
        log::warn!(
            "scene {name:?} has inverted frame range {} {}",
            frame_range.min,
            frame_range.max
        );
    }
    Ok(SceneSettings {
        name,
        width,
        height,
        fps,
        resolution,
        frame_range,
        current_frame,
        clip_to_canvas,
    })
}

fn read_boxes<R: Read>(
    stream: &mut ReadStream<R>,
    scene: &mut Scene,
    boxes: &mut ReadBoxes,
    tasks: &mut DeferredTasks,
) -> Result<(), Error> {
    let count = stream.read_len()?;
    for _ in 0..count {
        let read_id: u32 = boxes
            .len()
            .checked_as()
            .ok_or_else(|| Error::Format("too many boxes".to_owned()))?;
        let name = stream.read_string()?;
        let asset = if stream.read_bool()? {
            Some(Asset {
                file_name: stream.read_string()?,
                bytes: stream.read_bytes()?,
            })
        } else {
            None
        };
        let mut links = Vec::new();
        let properties = read_properties(stream, &mut PropertyPath::new(), &mut links)?;

        let mut node = BoxNode::new(name);
        node.asset = asset;
        for property in properties {
            node.push_property(property);
        }
        let id = scene.push_box(node);
        boxes.insert(read_id, scene.id(), id)?;
        for (path, target) in links {
            tasks.push_link(scene.id(), id, path, target);
        }
    }
    Ok(())
}

/// Read a list of properties at `path`. Links are read as empty, and their targets pushed to `links`.
fn read_properties<R: Read>(
    stream: &mut ReadStream<R>,
    path: &mut PropertyPath,
    links: &mut Vec<(PropertyPath, u32)>,
) -> Result<Vec<Property>, Error> {
    if path.len() > MAX_PROPERTY_DEPTH {
        return Err(Error::Format("properties nested too deeply".to_owned()));
    }
    let count = stream.read_len()?;
    let mut properties = Vec::new();
    for idx in 0..count {
        let name = stream.read_string()?;
        let tag = stream.read_u8()?;
        let kind = PropertyKind::from_repr(tag)
            .ok_or_else(|| Error::Format(format!("unknown type {tag} of property {name:?}")))?;
        path.push(idx);
        let value = match kind {
            PropertyKind::Bool => PropertyValue::Bool(stream.read_bool()?),
            PropertyKind::Combo => {
                let len = stream.read_len()?;
                let mut names = Vec::new();
                for _ in 0..len {
                    names.push(stream.read_string()?);
                }
                let current = stream.read_i32()?;
                PropertyValue::Combo(Combo { names, current })
            }
            PropertyKind::Real => PropertyValue::Real(stream.read_real()?),
            PropertyKind::Link => {
                match stream.read_i32()? {
                    NO_LINK => (),
                    id => {
                        let id = id
                            .checked_as()
                            .ok_or_else(|| Error::Format(format!("invalid box id {id}")))?;
                        links.push((path.clone(), id));
                    }
                }
                PropertyValue::Link(None)
            }
            PropertyKind::Container => {
                let checked = stream.read_bool()?;
                let children = read_properties(stream, path, links)?;
                PropertyValue::Container(BoolContainer { checked, children })
            }
        };
        path.pop();
        properties.push(Property { name, value });
    }
    Ok(properties)
}
