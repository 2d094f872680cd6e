//! # Format versions
//!
//! The binary format evolves append-only. Every change bumps [`Version`], and every field that did not exist
//! forever is listed in [`FIELD_TABLE`] with the version it appeared or disappeared at. Readers and writers
//! ask [`Field::present_in`] rather than comparing version numbers themselves.

/// A historical revision of the binary format.
#[derive(
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Debug,
    strum::FromRepr,
    strum::Display,
    strum::EnumIter,
)]
#[repr(u32)]
pub enum Version {
    Initial = 1,
    /// Color and brush bookmarks.
    Bookmarks = 2,
    ClipToCanvas = 3,
    /// Scene settings moved to a table ahead of the body, so every scene exists before any box is read.
    SceneTable = 4,
    /// Reals stored as `f64` instead of `f32`.
    WideReals = 5,
    /// Gradients moved from the document into each scene.
    GradientsInScenes = 6,
    /// Color bookmarks carry alpha.
    BookmarkAlpha = 7,
}
impl Version {
    pub const CURRENT: Self = Self::BookmarkAlpha;
    #[must_use]
    pub fn number(self) -> u32 {
        self as u32
    }
    #[must_use]
    pub fn from_number(number: u32) -> Option<Self> {
        Self::from_repr(number)
    }
}

/// Something stored in some, but not all, versions of the format.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, strum::EnumIter)]
pub enum Field {
    Bookmarks,
    /// Legacy document-level gradient list.
    DocumentGradients,
    /// Legacy per-scene gradient list.
    SceneGradients,
    ClipToCanvas,
    SceneTable,
    WideReals,
    BookmarkAlpha,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Gate {
    /// Present from this version onward.
    Since(Version),
    /// Present in every version before this one.
    Until(Version),
}
impl Gate {
    #[must_use]
    pub fn admits(self, version: Version) -> bool {
        match self {
            Self::Since(since) => version >= since,
            Self::Until(until) => version < until,
        }
    }
}

pub const FIELD_TABLE: &[(Field, Gate)] = &[
    (Field::Bookmarks, Gate::Since(Version::Bookmarks)),
    (Field::DocumentGradients, Gate::Until(Version::GradientsInScenes)),
    (Field::SceneGradients, Gate::Since(Version::GradientsInScenes)),
    (Field::ClipToCanvas, Gate::Since(Version::ClipToCanvas)),
    (Field::SceneTable, Gate::Since(Version::SceneTable)),
    (Field::WideReals, Gate::Since(Version::WideReals)),
    (Field::BookmarkAlpha, Gate::Since(Version::BookmarkAlpha)),
];

impl Field {
    #[must_use]
    pub fn gate(self) -> Gate {
        FIELD_TABLE
            .iter()
            .find_map(|&(field, gate)| (field == self).then_some(gate))
            // Every field is in the table, checked by test.
            .unwrap_or(Gate::Since(Version::Initial))
    }
    #[must_use]
    pub fn present_in(self, version: Version) -> bool {
        self.gate().admits(version)
    }
}

#[cfg(test)]
mod test {
    use super::{Field, Version, FIELD_TABLE};
    use strum::IntoEnumIterator;

    #[test]
    fn table_complete() {
        for field in Field::iter() {
            assert_eq!(
                FIELD_TABLE.iter().filter(|(f, _)| *f == field).count(),
                1,
                "{field:?} must have exactly one gate"
            );
        }
    }
    #[test]
    fn versions_dense() {
        // Numbers are stored in files, so they must never be reassigned.
        for (expected, version) in (1..).zip(Version::iter()) {
            assert_eq!(version.number(), expected);
            assert_eq!(Version::from_number(expected), Some(version));
        }
        assert_eq!(Version::iter().last(), Some(Version::CURRENT));
        assert_eq!(Version::from_number(0), None);
    }
    #[test]
    fn gates() {
        assert!(!Field::Bookmarks.present_in(Version::Initial));
        assert!(Field::Bookmarks.present_in(Version::Bookmarks));
        assert!(Field::DocumentGradients.present_in(Version::WideReals));
        assert!(!Field::DocumentGradients.present_in(Version::GradientsInScenes));
        assert!(Field::SceneGradients.present_in(Version::CURRENT));
    }
}
