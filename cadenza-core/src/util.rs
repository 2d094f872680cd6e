//! Utility types, used throughout the crate.

/// An inclusive range of whole frames.
///
/// Construction does not reorder the bounds. Files may legitimately contain `min > max`,
/// and it is up to the mutation API to reject such ranges when a user sets them.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct FrameRange {
    pub min: i32,
    pub max: i32,
}
impl FrameRange {
    /// The range given to new scenes, and to scenes read from manifests without a range.
    pub const DEFAULT: Self = Self { min: 0, max: 200 };
    #[must_use]
    pub const fn new(min: i32, max: i32) -> Self {
        Self { min, max }
    }
    /// `min <= max`
    #[must_use]
    pub fn is_ordered(&self) -> bool {
        self.min <= self.max
    }
    /// Number of frames covered, zero if inverted.
    #[must_use]
    pub fn len(&self) -> u32 {
        if self.is_ordered() {
            self.max.abs_diff(self.min).saturating_add(1)
        } else {
            0
        }
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    #[must_use]
    pub fn contains(&self, frame: i32) -> bool {
        (self.min..=self.max).contains(&frame)
    }
}
impl Default for FrameRange {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PositiveError {
    #[error("not finite")]
    NotFinite,
    #[error("not greater than zero")]
    NotPositive,
}

/// Checks that `value` is finite and strictly greater than zero, as fps and resolution must be.
pub fn positive(value: f64) -> Result<f64, PositiveError> {
    if !value.is_finite() {
        Err(PositiveError::NotFinite)
    } else if value <= 0.0 {
        Err(PositiveError::NotPositive)
    } else {
        Ok(value)
    }
}

#[cfg(test)]
mod test {
    use super::{positive, FrameRange, PositiveError};
    #[test]
    fn frame_range_len() {
        assert_eq!(FrameRange::DEFAULT.len(), 201);
        assert_eq!(FrameRange::new(5, 5).len(), 1);
        // Inverted ranges are representable, but empty.
        assert!(FrameRange::new(10, 5).is_empty());
        assert!(!FrameRange::new(10, 5).contains(7));
    }
    #[test]
    fn positive_values() {
        assert_eq!(positive(24.0), Ok(24.0));
        assert_eq!(positive(0.0), Err(PositiveError::NotPositive));
        assert_eq!(positive(f64::NAN), Err(PositiveError::NotFinite));
    }
}
