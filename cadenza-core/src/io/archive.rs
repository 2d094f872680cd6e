//! # Zip archives
//!
//! Each entry is written or read within a single call, which guarantees the entry is closed on every exit
//! path. A failing callback leaves the archive usable, without the half-written entry.

use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use zip::write::SimpleFileOptions;

use super::Error;

/// Requests cancellation of a save from anywhere. Honored between entries, never mid-entry.
#[derive(Clone, Default, Debug)]
pub struct Canceller(Arc<AtomicBool>);
impl Canceller {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

pub struct ZipFileSaver<W: Write + Seek> {
    writer: zip::ZipWriter<W>,
    /// Name of the archive, for messages.
    archive: String,
    canceller: Canceller,
    entries: usize,
}
impl<W: Write + Seek> ZipFileSaver<W> {
    pub fn new(writer: W, archive: impl Into<String>) -> Self {
        Self {
            writer: zip::ZipWriter::new(writer),
            archive: archive.into(),
            canceller: Canceller::default(),
            entries: 0,
        }
    }
    #[must_use]
    pub fn archive(&self) -> &str {
        &self.archive
    }
    /// A handle that cancels this save before its next entry.
    #[must_use]
    pub fn canceller(&self) -> Canceller {
        self.canceller.clone()
    }
    pub fn cancel(&self) {
        self.canceller.cancel();
    }
    /// Number of entries successfully written.
    #[must_use]
    pub fn entries(&self) -> usize {
        self.entries
    }
    /// Write one entry named `name` with the bytes `write` emits.
    ///
    /// # Errors
    /// * [`Error::Cancelled`] if cancellation was requested, before the entry is opened.
    /// * [`Error::Resource`] naming the entry and the archive if it could not be opened, or if `write` failed.
    ///   In the latter case the entry is discarded.
    ///
    /// # Panics
    /// If `write` panics. The entry is discarded first, so the saver stays usable.
    pub fn process(
        &mut self,
        name: &str,
        compress: bool,
        write: impl FnOnce(&mut dyn Write) -> Result<(), Error>,
    ) -> Result<(), Error> {
        if self.canceller.is_cancelled() {
            log::debug!("save of {} cancelled before {name}", self.archive);
            return Err(Error::Cancelled);
        }
        let method = if compress {
            zip::CompressionMethod::Deflated
        } else {
            zip::CompressionMethod::Stored
        };
        let options = SimpleFileOptions::default().compression_method(method);
        self.writer.start_file(name, options).map_err(|err| {
            log::error!("{err}");
            Error::Resource(format!("Could not open {name} in {}", self.archive))
        })?;

        let written =
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| write(&mut self.writer)));
        let written = match written {
            Ok(written) => written,
            Err(panic) => {
                // The open entry must not be committed by whatever the saver does next.
                if let Err(abort) = self.writer.abort_file() {
                    log::error!("failed to discard {name}: {abort}");
                }
                std::panic::resume_unwind(panic)
            }
        };
        match written {
            Ok(()) => {
                self.entries += 1;
                log::trace!("wrote {name} to {}", self.archive);
                Ok(())
            }
            Err(err) => {
                if let Err(abort) = self.writer.abort_file() {
                    log::error!("failed to discard {name}: {abort}");
                }
                Err(Error::Resource(format!(
                    "Could not write {name} to {}: {err}",
                    self.archive
                )))
            }
        }
    }
    /// [`Self::process`], for entries built as text.
    pub fn process_text(
        &mut self,
        name: &str,
        compress: bool,
        write: impl FnOnce(&mut String) -> Result<(), Error>,
    ) -> Result<(), Error> {
        self.process(name, compress, |stream| {
            let mut text = String::new();
            write(&mut text)?;
            stream.write_all(text.as_bytes())?;
            Ok(())
        })
    }
    /// Write the central directory, returning the underlying writer.
    pub fn finish(self) -> Result<W, Error> {
        let archive = self.archive;
        self.writer
            .finish()
            .map_err(|err| Error::Resource(format!("Could not finish {archive}: {err}")))
    }
}

pub struct ZipFileLoader<R: Read + Seek> {
    archive: zip::ZipArchive<R>,
    name: String,
}
impl<R: Read + Seek> ZipFileLoader<R> {
    pub fn new(reader: R, name: impl Into<String>) -> Result<Self, Error> {
        let name = name.into();
        let archive = zip::ZipArchive::new(reader)
            .map_err(|err| Error::Resource(format!("Could not open archive {name}: {err}")))?;
        Ok(Self { archive, name })
    }
    #[must_use]
    pub fn archive(&self) -> &str {
        &self.name
    }
    #[must_use]
    pub fn contains(&self, entry: &str) -> bool {
        self.archive.index_for_name(entry).is_some()
    }
    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.archive.file_names()
    }
    /// Read the entry named `name` through `read`.
    ///
    /// # Errors
    /// [`Error::Resource`] naming the entry and the archive if the entry does not exist or `read` failed.
    pub fn process<T>(
        &mut self,
        name: &str,
        read: impl FnOnce(&mut dyn Read) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let mut entry = self.archive.by_name(name).map_err(|err| {
            log::debug!("{err}");
            Error::Resource(format!("Could not open {name} in {}", self.name))
        })?;
        read(&mut entry).map_err(|err| {
            Error::Resource(format!("Could not read {name} from {}: {err}", self.name))
        })
    }
    /// [`Self::process`], for UTF-8 entries.
    pub fn process_text<T>(
        &mut self,
        name: &str,
        read: impl FnOnce(&str) -> Result<T, Error>,
    ) -> Result<T, Error> {
        self.process(name, |stream| {
            let mut text = String::new();
            stream.read_to_string(&mut text)?;
            read(&text)
        })
    }
}

/// A [`ZipFileSaver`] writing to a file on disk.
pub struct XmlZipFileSaver {
    saver: ZipFileSaver<std::io::BufWriter<std::fs::File>>,
    directory: PathBuf,
}
impl XmlZipFileSaver {
    /// Create the archive at `path`, replacing any existing file.
    pub fn create(path: &Path) -> Result<Self, Error> {
        let open_err =
            || Error::Resource(format!("Could not open file for writing '{}'.", path.display()));
        if path.exists() {
            std::fs::remove_file(path).map_err(|err| {
                log::error!("removing {}: {err}", path.display());
                open_err()
            })?;
        }
        let file = std::fs::File::create(path).map_err(|err| {
            log::error!("creating {}: {err}", path.display());
            open_err()
        })?;
        Ok(Self {
            saver: ZipFileSaver::new(std::io::BufWriter::new(file), path.display().to_string()),
            directory: parent_directory(path),
        })
    }
    /// Express `path` relative to the directory holding the archive, so that the archive can be moved
    /// together with the files it references. Paths outside that directory are kept absolute.
    #[must_use]
    pub fn abs_path_to_rel_path(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.directory)
            .map_or_else(|_| path.to_owned(), Path::to_owned)
    }
    pub fn finish(self) -> Result<(), Error> {
        let mut writer = self.saver.finish()?;
        writer.flush()?;
        Ok(())
    }
}
impl std::ops::Deref for XmlZipFileSaver {
    type Target = ZipFileSaver<std::io::BufWriter<std::fs::File>>;
    fn deref(&self) -> &Self::Target {
        &self.saver
    }
}
impl std::ops::DerefMut for XmlZipFileSaver {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.saver
    }
}

/// A [`ZipFileLoader`] reading a file on disk.
pub struct XmlZipFileLoader {
    loader: ZipFileLoader<std::io::BufReader<std::fs::File>>,
    directory: PathBuf,
}
impl XmlZipFileLoader {
    pub fn open(path: &Path) -> Result<Self, Error> {
        let file = std::fs::File::open(path).map_err(|err| {
            log::error!("opening {}: {err}", path.display());
            Error::Resource(format!("Could not open file for reading '{}'.", path.display()))
        })?;
        Ok(Self {
            loader: ZipFileLoader::new(std::io::BufReader::new(file), path.display().to_string())?,
            directory: parent_directory(path),
        })
    }
    /// Inverse of [`XmlZipFileSaver::abs_path_to_rel_path`].
    #[must_use]
    pub fn rel_path_to_abs_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_owned()
        } else {
            self.directory.join(path)
        }
    }
}
impl std::ops::Deref for XmlZipFileLoader {
    type Target = ZipFileLoader<std::io::BufReader<std::fs::File>>;
    fn deref(&self) -> &Self::Target {
        &self.loader
    }
}
impl std::ops::DerefMut for XmlZipFileLoader {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.loader
    }
}

fn parent_directory(path: &Path) -> PathBuf {
    path.parent().map(Path::to_owned).unwrap_or_default()
}
