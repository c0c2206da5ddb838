//! Languages supported on the phone line

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Call language, pinned for the lifetime of a session.
///
/// Serialized as the BCP-47 tag the speech services expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Language {
    #[default]
    #[serde(rename = "te-IN")]
    Telugu,
    #[serde(rename = "hi-IN")]
    Hindi,
    #[serde(rename = "en-IN")]
    English,
}

impl Language {
    /// Every supported language
    pub const ALL: [Language; 3] = [Language::Telugu, Language::Hindi, Language::English];

    /// BCP-47 tag used by the speech services
    pub fn tag(&self) -> &'static str {
        match self {
            Language::Telugu => "te-IN",
            Language::Hindi => "hi-IN",
            Language::English => "en-IN",
        }
    }

    /// English name
    pub fn name(&self) -> &'static str {
        match self {
            Language::Telugu => "Telugu",
            Language::Hindi => "Hindi",
            Language::English => "English",
        }
    }

    /// Parse a language tag leniently.
    ///
    /// Accepts full tags (`te-IN`, `hi_in`), bare codes (`te`) and names (`telugu`).
    pub fn from_tag(tag: &str) -> Option<Self> {
        let normalized = tag.trim().to_ascii_lowercase().replace('_', "-");
        let primary = normalized.split('-').next().unwrap_or_default();

        match primary {
            "te" | "telugu" => Some(Language::Telugu),
            "hi" | "hindi" => Some(Language::Hindi),
            "en" | "english" => Some(Language::English),
            _ => None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

impl FromStr for Language {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Language::from_tag(s).ok_or_else(|| Error::UnsupportedLanguage(s.to_string()))
    }
}
