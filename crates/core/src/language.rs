//! Language codes

use std::fmt;

use serde::{Deserialize, Serialize};

/// ISO 639-1 language code, normalized to lowercase without region
/// (`"es-MX"` becomes `"es"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Language(String);

impl Language {
    pub fn new(code: impl AsRef<str>) -> Self {
        let code = code.as_ref().trim();
        let primary = code.split(['-', '_']).next().unwrap_or(code);
        Self(primary.to_ascii_lowercase())
    }

    pub fn english() -> Self {
        Self::new("en")
    }

    pub fn code(&self) -> &str {
        &self.0
    }

    /// English display name for well-known codes
    pub fn display_name(&self) -> &str {
        match self.0.as_str() {
            "en" => "English",
            "es" => "Spanish",
            "fr" => "French",
            "de" => "German",
            "it" => "Italian",
            "pt" => "Portuguese",
            "hi" => "Hindi",
            "ja" => "Japanese",
            "zh" => "Chinese",
            other => other,
        }
    }
}

impl Default for Language {
    fn default() -> Self {
        Self::english()
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Language {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
