use cadenza_core::cache::MemorySettings;

const DOCUMENTATION: &str = r#"# Cadenza settings. You may edit this file, but be aware that formatting and comments will not
# be preserved. Missing keys take their default values.

# [memory]
# Free memory thresholds, in bytes, below which cached frames are evicted.
# low_free_bytes, very_low_free_bytes, critical_free_bytes
# How often free memory is checked in each state, in milliseconds.
# normal_interval_ms, low_interval_ms, very_low_interval_ms

# [archive]
# Deflate entries of .cdx archives.
# compress = true

"#;

#[must_use]
pub fn preferences_dir() -> Option<std::path::PathBuf> {
    let mut base_dir = dirs::preference_dir()?;
    base_dir.push(env!("CARGO_PKG_NAME"));
    Some(base_dir)
}

#[derive(Clone, PartialEq, Eq, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ArchiveSettings {
    pub compress: bool,
}
impl Default for ArchiveSettings {
    fn default() -> Self {
        Self { compress: true }
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Settings {
    pub memory: MemorySettings,
    pub archive: ArchiveSettings,
}
impl Settings {
    const FILENAME: &'static str = "settings.toml";
    #[must_use]
    pub fn path() -> Option<std::path::PathBuf> {
        let mut path = preferences_dir()?;
        path.push(Self::FILENAME);
        Some(path)
    }
    /// Read the user's settings, or defaults if there are none or they are malformed.
    #[must_use]
    pub fn load() -> Self {
        match Self::path() {
            None => {
                log::warn!("No preferences dir found, using default settings.");
                Self::default()
            }
            Some(path) => Self::load_or_default(&path),
        }
    }
    #[must_use]
    fn load_or_default(path: &std::path::Path) -> Self {
        if !path.exists() {
            log::debug!("{} not found, using default settings", path.display());
            return Self::default();
        }
        let settings: anyhow::Result<Self> = try_block::try_block! {
            let string = std::fs::read_to_string(path)?;
            let settings: Self = toml::from_str(&string)?;
            Ok(settings)
        };
        settings.unwrap_or_else(|e| {
            log::warn!("Failed to load {}, using defaults:\n{e:?}", path.display());
            Self::default()
        })
    }
    pub fn to_toml(&self) -> anyhow::Result<String> {
        let string = toml::ser::to_string_pretty(self)?;
        Ok(DOCUMENTATION.to_owned() + &string)
    }
    pub fn save(&self) -> anyhow::Result<std::path::PathBuf> {
        let mut preferences =
            preferences_dir().ok_or_else(|| anyhow::anyhow!("No preferences dir found"))?;
        // Not recursive. If the preferences dir itself is missing, leave it be.
        let _ = std::fs::DirBuilder::new().create(&preferences);

        preferences.push(Self::FILENAME);
        std::fs::write(&preferences, self.to_toml()?)?;
        Ok(preferences)
    }
}
