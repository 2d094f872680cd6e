//! # Document files
//!
//! Documents are stored in one of two formats:
//! * [`binary`], a compact versioned stream. See [`version`] for how old files stay readable.
//! * [`xml`], a zip archive holding an XML manifest, one box graph per scene, and embedded assets.
//!
//! Both formats defer resolution of links between boxes until every box has been read, see [`tasks`].
//! A failed load returns an error and no document, there is never a partially loaded document.

use std::path::Path;

use crate::state::Document;

pub mod archive;
pub mod binary;
pub mod stream;
pub mod tasks;
pub mod version;
pub mod xml;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The file is not structured as expected.
    #[error("{0}")]
    Format(String),
    /// A checkpoint did not match, the reader lost track of the structure of the file.
    #[error("{0}")]
    Checkpoint(&'static str),
    /// An archive entry could not be opened, read, or written.
    #[error("{0}")]
    Resource(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("cancelled")]
    Cancelled,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Xml(#[from] quick_xml::Error),
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
}
impl From<quick_xml::events::attributes::AttrError> for Error {
    fn from(value: quick_xml::events::attributes::AttrError) -> Self {
        Self::Xml(value.into())
    }
}
impl From<quick_xml::escape::EscapeError> for Error {
    fn from(value: quick_xml::escape::EscapeError) -> Self {
        Self::Xml(value.into())
    }
}

/// The on-disk formats, chosen by file extension.
#[derive(Copy, Clone, PartialEq, Eq, Debug, strum::Display)]
pub enum FileFormat {
    /// `.cdz`
    Binary,
    /// `.cdx`
    ZippedXml,
}
impl FileFormat {
    pub const BINARY_EXTENSION: &'static str = "cdz";
    pub const ZIPPED_XML_EXTENSION: &'static str = "cdx";
    pub fn from_path(path: &Path) -> Result<Self, Error> {
        let extension = path
            .extension()
            .and_then(std::ffi::OsStr::to_str)
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some(Self::BINARY_EXTENSION) => Ok(Self::Binary),
            Some(Self::ZIPPED_XML_EXTENSION) => Ok(Self::ZippedXml),
            _ => Err(Error::Unsupported(format!(
                "unrecognized file type {}",
                path.display()
            ))),
        }
    }
}

/// Read a document from `path`, in the format its extension names.
pub fn load(path: &Path) -> Result<Document, Error> {
    let format = FileFormat::from_path(path)?;
    log::debug!("loading {} as {format}", path.display());
    let mut document = match format {
        FileFormat::Binary => {
            let file = std::fs::File::open(path)?;
            binary::read_document(std::io::BufReader::new(file))?
        }
        FileFormat::ZippedXml => {
            let mut loader = archive::XmlZipFileLoader::open(path)?;
            xml::import_document(&mut *loader)?
        }
    };
    document.path = Some(path.to_owned());
    Ok(document)
}

/// Write `document` to `path`, in the format its extension names. An existing file is replaced.
///
/// `compress` applies to archive entries and is ignored for the binary format.
pub fn save(document: &Document, path: &Path, compress: bool) -> Result<(), Error> {
    use std::io::Write;

    let format = FileFormat::from_path(path)?;
    log::debug!("saving {} as {format}", path.display());
    match format {
        FileFormat::Binary => {
            let file = std::fs::File::create(path)?;
            let mut writer = std::io::BufWriter::new(file);
            binary::write_document(document, &mut writer)?;
            writer.flush()?;
        }
        FileFormat::ZippedXml => {
            let mut saver = archive::XmlZipFileSaver::create(path)?;
            xml::export_document(document, &mut *saver, compress)?;
            saver.finish()?;
        }
    }
    Ok(())
}

/// A document using every feature of the formats, for round trip tests.
#[cfg(test)]
pub(crate) mod fixture {
    use crate::color::Color;
    use crate::state::property::{self, BoolContainer, Combo};
    use crate::state::{
        Asset, BoxNode, BrushRef, Document, Property, PropertyValue, Scene, SceneSettings,
    };
    use crate::util::FrameRange;

    pub fn sample() -> Document {
        let mut document = Document::new();
        document.push_color_bookmark(Color::rgb(255, 0, 0));
        document.push_color_bookmark(Color::rgba(0, 0, 255, 128));
        document.push_brush_bookmark(BrushRef {
            collection: "Default".to_owned(),
            name: "Pencil".to_owned(),
        });

        let mut intro = Scene::new(SceneSettings {
            name: "Intro & <Title>".to_owned(),
            width: 640,
            height: 480,
            fps: 30.0,
            resolution: 0.5,
            frame_range: FrameRange::new(10, 90),
            current_frame: 12,
            clip_to_canvas: true,
        });
        let circle =
            intro.push_box(BoxNode::new("circle").with_property("opacity", PropertyValue::Real(0.1)));
        intro.push_box(
            BoxNode::new("follower")
                .with_property("target", PropertyValue::Link(Some(circle)))
                .with_property(
                    "effects",
                    PropertyValue::Container(BoolContainer {
                        checked: true,
                        children: vec![
                            Property::new("blur", PropertyValue::Bool(false)),
                            Property::new(
                                "mode",
                                PropertyValue::Combo(Combo {
                                    names: vec!["add".to_owned(), "multiply".to_owned()],
                                    current: 1,
                                }),
                            ),
                        ],
                    }),
                )
                .with_asset(Asset {
                    file_name: "image.png".to_owned(),
                    bytes: vec![0x89, b'P', b'N', b'G', 0, 1, 2],
                }),
        );
        document.push_scene(intro);

        let mut empty = Scene::new(SceneSettings::default());
        empty.push_box(BoxNode::new("lonely").with_property("target", PropertyValue::Link(None)));
        document.push_scene(empty);
        document
    }

    /// One entry per box: name, asset, properties with links cleared, and names of the linked boxes.
    pub type BoxSummary = (String, Option<Asset>, Vec<Property>, Vec<String>);

    /// Everything about the scenes that survives a round trip, with runtime ids replaced by names.
    pub fn summarize(document: &Document) -> Vec<(SceneSettings, Vec<BoxSummary>)> {
        document
            .scenes()
            .iter()
            .map(|scene| {
                let boxes = scene
                    .boxes()
                    .iter()
                    .map(|node| {
                        let mut properties = node.properties().to_vec();
                        property::visit_mut(&mut properties, &mut |p| {
                            if let PropertyValue::Link(link) = &mut p.value {
                                *link = None;
                            }
                        });
                        let links = node
                            .links()
                            .into_iter()
                            .filter_map(|id| scene.node(id))
                            .map(|linked| linked.name.clone())
                            .collect();
                        (node.name.clone(), node.asset.clone(), properties, links)
                    })
                    .collect();
                (scene.settings().clone(), boxes)
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::{fixture, load, save, Error, FileFormat};
    use std::path::{Path, PathBuf};

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("cadenza-{}-{name}", std::process::id()))
    }

    #[test]
    fn save_load_files() {
        let document = fixture::sample();
        for name in ["doc.cdz", "doc.cdx"] {
            let path = temp_path(name);
            save(&document, &path, true).unwrap();
            // Saving again replaces the file.
            save(&document, &path, false).unwrap();
            let read = load(&path).unwrap();
            std::fs::remove_file(&path).unwrap();
            assert_eq!(read.path.as_deref(), Some(path.as_path()));
            assert_eq!(read.color_bookmarks(), document.color_bookmarks());
            assert_eq!(fixture::summarize(&read), fixture::summarize(&document));
        }
        assert!(load(&temp_path("missing.cdz")).is_err());
    }
    #[test]
    fn relative_asset_paths() {
        let path = temp_path("paths.cdx");
        let directory = path.parent().unwrap().to_owned();
        let saver = super::archive::XmlZipFileSaver::create(&path).unwrap();
        let inside = directory.join("images").join("cat.png");
        assert_eq!(
            saver.abs_path_to_rel_path(&inside),
            Path::new("images").join("cat.png")
        );
        let outside = Path::new("/elsewhere/dog.png");
        if !outside.starts_with(&directory) {
            assert_eq!(saver.abs_path_to_rel_path(outside), outside);
        }
        saver.finish().unwrap();

        let loader = super::archive::XmlZipFileLoader::open(&path).unwrap();
        assert_eq!(
            loader.rel_path_to_abs_path(Path::new("images/cat.png")),
            directory.join("images/cat.png")
        );
        assert_eq!(loader.rel_path_to_abs_path(&inside), inside);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn formats_by_extension() {
        assert_eq!(
            FileFormat::from_path(Path::new("a/b.cdz")).unwrap(),
            FileFormat::Binary
        );
        assert_eq!(
            FileFormat::from_path(Path::new("b.CDX")).unwrap(),
            FileFormat::ZippedXml
        );
        assert!(matches!(
            FileFormat::from_path(Path::new("b.png")),
            Err(Error::Unsupported(_))
        ));
        assert!(FileFormat::from_path(Path::new("noext")).is_err());
    }
}
