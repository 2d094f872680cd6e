/// A straight-alpha, 8 bit per channel sRGB color, as stored in bookmarks.
#[repr(C)]
#[derive(Copy, Clone, PartialEq, Eq, Hash, bytemuck::Pod, bytemuck::Zeroable, Debug)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}
impl Color {
    pub const TRANSPARENT: Self = Self::rgba(0, 0, 0, 0);
    pub const WHITE: Self = Self::rgb(255, 255, 255);
    pub const BLACK: Self = Self::rgb(0, 0, 0);
    #[must_use]
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }
    #[must_use]
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::rgba(r, g, b, 255)
    }
    #[must_use]
    pub fn with_alpha(self, a: u8) -> Self {
        Self { a, ..self }
    }
    /// The `#rrggbb` name of this color. Alpha is not represented.
    #[must_use]
    pub fn name(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
    /// `#rrggbb` when opaque, `#aarrggbb` otherwise.
    #[must_use]
    pub fn argb_name(&self) -> String {
        if self.a == 255 {
            self.name()
        } else {
            format!("#{:02x}{}", self.a, &self.name()[1..])
        }
    }
    /// Parse `#rgb`, `#rrggbb` or `#aarrggbb`. Case insensitive.
    pub fn from_name(name: &str) -> Result<Self, ColorParseError> {
        let hex = name
            .strip_prefix('#')
            .ok_or_else(|| ColorParseError(name.to_owned()))?;
        let err = || ColorParseError(name.to_owned());
        if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(err());
        }
        let byte_at = |idx: usize| u8::from_str_radix(&hex[idx..idx + 2], 16).map_err(|_| err());
        match hex.len() {
            3 => {
                // Each nibble is doubled, #abc == #aabbcc
                let nibble = |idx: usize| {
                    u8::from_str_radix(&hex[idx..=idx], 16)
                        .map(|n| n * 17)
                        .map_err(|_| err())
                };
                Ok(Self::rgb(nibble(0)?, nibble(1)?, nibble(2)?))
            }
            6 => Ok(Self::rgb(byte_at(0)?, byte_at(2)?, byte_at(4)?)),
            8 => Ok(Self::rgba(byte_at(2)?, byte_at(4)?, byte_at(6)?, byte_at(0)?)),
            _ => Err(err()),
        }
    }
}
impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid color name {:?}", .0)]
pub struct ColorParseError(pub String);

#[cfg(test)]
mod test {
    use super::Color;
    #[test]
    fn names() {
        assert_eq!(Color::rgb(255, 0, 16).name(), "#ff0010");
        assert_eq!(Color::from_name("#FF0010"), Ok(Color::rgb(255, 0, 16)));
        assert_eq!(Color::from_name("#f0a"), Ok(Color::rgb(255, 0, 170)));
        assert_eq!(
            Color::from_name("#80ff0010"),
            Ok(Color::rgba(255, 0, 16, 128))
        );
        assert!(Color::from_name("ff0010").is_err());
        assert!(Color::from_name("#ff00").is_err());
        assert!(Color::from_name("#gg0010").is_err());
    }
    #[test]
    fn alpha_names() {
        assert_eq!(Color::rgb(1, 2, 3).argb_name(), "#010203");
        let translucent = Color::rgba(1, 2, 3, 0x40);
        assert_eq!(translucent.argb_name(), "#40010203");
        assert_eq!(Color::from_name(&translucent.argb_name()), Ok(translucent));
    }
}
