//! Little-endian primitive streams, tagged with the format version being read or written.

use std::io::{Read, Write};

use az::CheckedAs;

use super::version::{Field, Version};
use super::Error;

/// Written between sections. Reading anything else means the reader lost sync with the file.
pub const CHECKPOINT: u32 = 0x5CA1_AB1E;

pub struct WriteStream<W> {
    inner: W,
    version: Version,
}
impl<W: Write> WriteStream<W> {
    pub fn new(inner: W, version: Version) -> Self {
        Self { inner, version }
    }
    #[must_use]
    pub fn version(&self) -> Version {
        self.version
    }
    /// Whether `field` is part of the version being written.
    #[must_use]
    pub fn has(&self, field: Field) -> bool {
        field.present_in(self.version)
    }
    pub fn write_raw(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.inner.write_all(bytes)?;
        Ok(())
    }
    pub fn write_u8(&mut self, value: u8) -> Result<(), Error> {
        self.write_raw(&[value])
    }
    pub fn write_bool(&mut self, value: bool) -> Result<(), Error> {
        self.write_u8(value.into())
    }
    pub fn write_u32(&mut self, value: u32) -> Result<(), Error> {
        self.write_raw(&value.to_le_bytes())
    }
    pub fn write_i32(&mut self, value: i32) -> Result<(), Error> {
        self.write_raw(&value.to_le_bytes())
    }
    pub fn write_f32(&mut self, value: f32) -> Result<(), Error> {
        self.write_raw(&value.to_le_bytes())
    }
    pub fn write_f64(&mut self, value: f64) -> Result<(), Error> {
        self.write_raw(&value.to_le_bytes())
    }
    /// `f64`, or `f32` in versions predating [`Field::WideReals`].
    pub fn write_real(&mut self, value: f64) -> Result<(), Error> {
        if self.has(Field::WideReals) {
            self.write_f64(value)
        } else {
            // Narrowing is the point, older readers expect single precision.
            self.write_f32(value as f32)
        }
    }
    /// A `u32` count of items, failing if it doesn't fit.
    pub fn write_len(&mut self, len: usize) -> Result<(), Error> {
        let len: u32 = len
            .checked_as()
            .ok_or_else(|| Error::Format(format!("{len} items is too many to store")))?;
        self.write_u32(len)
    }
    /// Length-prefixed bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.write_len(bytes.len())?;
        self.write_raw(bytes)
    }
    /// Length-prefixed UTF-8.
    pub fn write_string(&mut self, value: &str) -> Result<(), Error> {
        self.write_bytes(value.as_bytes())
    }
    pub fn write_checkpoint(&mut self) -> Result<(), Error> {
        self.write_u32(CHECKPOINT)
    }
    pub fn into_inner(self) -> W {
        self.inner
    }
}

pub struct ReadStream<R> {
    inner: R,
    version: Version,
}
impl<R: Read> ReadStream<R> {
    pub fn new(inner: R, version: Version) -> Self {
        Self { inner, version }
    }
    #[must_use]
    pub fn version(&self) -> Version {
        self.version
    }
    #[must_use]
    pub fn has(&self, field: Field) -> bool {
        field.present_in(self.version)
    }
    pub fn read_raw<const N: usize>(&mut self) -> Result<[u8; N], Error> {
        let mut bytes = [0; N];
        self.inner.read_exact(&mut bytes)?;
        Ok(bytes)
    }
    pub fn read_u8(&mut self) -> Result<u8, Error> {
        Ok(self.read_raw::<1>()?[0])
    }
    pub fn read_bool(&mut self) -> Result<bool, Error> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(Error::Format(format!("invalid boolean {other}"))),
        }
    }
    pub fn read_u32(&mut self) -> Result<u32, Error> {
        self.read_raw().map(u32::from_le_bytes)
    }
    pub fn read_i32(&mut self) -> Result<i32, Error> {
        self.read_raw().map(i32::from_le_bytes)
    }
    pub fn read_f32(&mut self) -> Result<f32, Error> {
        self.read_raw().map(f32::from_le_bytes)
    }
    pub fn read_f64(&mut self) -> Result<f64, Error> {
        self.read_raw().map(f64::from_le_bytes)
    }
    pub fn read_real(&mut self) -> Result<f64, Error> {
        if self.has(Field::WideReals) {
            self.read_f64()
        } else {
            self.read_f32().map(f64::from)
        }
    }
    pub fn read_len(&mut self) -> Result<usize, Error> {
        let len = self.read_u32()?;
        len.checked_as()
            .ok_or_else(|| Error::Format(format!("length {len} too large")))
    }
    pub fn read_bytes(&mut self) -> Result<Vec<u8>, Error> {
        let len = self.read_len()?;
        // Don't trust the length for preallocation, a corrupt file could claim gigabytes.
        let mut bytes = Vec::new();
        (&mut self.inner).take(len as u64).read_to_end(&mut bytes)?;
        if bytes.len() != len {
            return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
        }
        Ok(bytes)
    }
    pub fn read_string(&mut self) -> Result<String, Error> {
        String::from_utf8(self.read_bytes()?)
            .map_err(|_| Error::Format("string is not valid UTF-8".to_owned()))
    }
    /// Expect a checkpoint, failing with `section` as the message otherwise.
    pub fn read_checkpoint(&mut self, section: &'static str) -> Result<(), Error> {
        match self.read_u32() {
            Ok(CHECKPOINT) => Ok(()),
            Ok(_) | Err(Error::Io(_)) => Err(Error::Checkpoint(section)),
            Err(other) => Err(other),
        }
    }
    pub fn into_inner(self) -> R {
        self.inner
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn reals_follow_version() {
        let mut narrow = WriteStream::new(Vec::new(), Version::Initial);
        narrow.write_real(0.5).unwrap();
        assert_eq!(narrow.into_inner().len(), 4);

        let mut wide = WriteStream::new(Vec::new(), Version::CURRENT);
        wide.write_real(0.1).unwrap();
        let bytes = wide.into_inner();
        assert_eq!(bytes.len(), 8);
        let mut read = ReadStream::new(bytes.as_slice(), Version::CURRENT);
        assert_eq!(read.read_real().unwrap(), 0.1);
    }
    #[test]
    fn truncated_string() {
        let mut write = WriteStream::new(Vec::new(), Version::CURRENT);
        write.write_string("hello").unwrap();
        let mut bytes = write.into_inner();
        bytes.truncate(6);
        let mut read = ReadStream::new(bytes.as_slice(), Version::CURRENT);
        assert!(matches!(read.read_string(), Err(Error::Io(_))));
    }
    #[test]
    fn checkpoints() {
        let mut write = WriteStream::new(Vec::new(), Version::CURRENT);
        write.write_checkpoint().unwrap();
        write.write_u32(7).unwrap();
        let bytes = write.into_inner();
        let mut read = ReadStream::new(bytes.as_slice(), Version::CURRENT);
        read.read_checkpoint("first").unwrap();
        assert!(matches!(
            read.read_checkpoint("second"),
            Err(Error::Checkpoint("second"))
        ));
        // Running out of data is a desync too.
        assert!(matches!(
            read.read_checkpoint("third"),
            Err(Error::Checkpoint("third"))
        ));
    }
}
