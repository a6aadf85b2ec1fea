//! Outline manager settings.
//!
//! # Responsibility
//! - Hold caller-provided knobs (display locale, TOC label width).
//! - Parse and validate settings supplied as JSON.
//!
//! # Invariants
//! - `locale` is a lowercase language tag such as `en` or `pt-BR`.
//! - `toc_title_max_chars` leaves room for at least one character plus `…`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};

static LOCALE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z]{2,3}(-[A-Za-z0-9]{2,8})*$").expect("valid locale regex")
});

pub const DEFAULT_LOCALE: &str = "en";
pub const DEFAULT_TOC_TITLE_MAX_CHARS: usize = 30;

/// Settings rejected during parsing or validation.
#[derive(Debug)]
pub enum SettingsError {
    Parse(serde_json::Error),
    InvalidLocale(String),
    TitleWidthTooSmall(usize),
}

impl Display for SettingsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "invalid outline settings: {err}"),
            Self::InvalidLocale(locale) => write!(f, "invalid locale `{locale}`"),
            Self::TitleWidthTooSmall(width) => {
                write!(f, "toc_title_max_chars must be at least 2, got {width}")
            }
        }
    }
}

impl Error for SettingsError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            _ => None,
        }
    }
}

/// Settings consumed by `BookManager`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutlineSettings {
    /// Display locale; part of every tree cache key.
    pub locale: String,
    /// Maximum characters of a table-of-contents title, ellipsis included.
    pub toc_title_max_chars: usize,
}

impl Default for OutlineSettings {
    fn default() -> Self {
        Self {
            locale: DEFAULT_LOCALE.to_string(),
            toc_title_max_chars: DEFAULT_TOC_TITLE_MAX_CHARS,
        }
    }
}

impl OutlineSettings {
    /// Parses settings from JSON; absent fields take defaults.
    pub fn from_json(raw: &str) -> Result<Self, SettingsError> {
        let settings: Self = serde_json::from_str(raw).map_err(SettingsError::Parse)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if !LOCALE_RE.is_match(&self.locale) {
            return Err(SettingsError::InvalidLocale(self.locale.clone()));
        }
        if self.toc_title_max_chars < 2 {
            return Err(SettingsError::TitleWidthTooSmall(self.toc_title_max_chars));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{OutlineSettings, SettingsError};

    #[test]
    fn empty_object_uses_defaults() {
        let settings = OutlineSettings::from_json("{}").unwrap();
        assert_eq!(settings, OutlineSettings::default());
        assert_eq!(settings.toc_title_max_chars, 30);
    }

    #[test]
    fn parses_region_locale() {
        let settings =
            OutlineSettings::from_json(r#"{"locale": "pt-BR", "toc_title_max_chars": 40}"#)
                .unwrap();
        assert_eq!(settings.locale, "pt-BR");
        assert_eq!(settings.toc_title_max_chars, 40);
    }

    #[test]
    fn rejects_bad_locale_and_unknown_fields() {
        assert!(matches!(
            OutlineSettings::from_json(r#"{"locale": "EN us"}"#),
            Err(SettingsError::InvalidLocale(_))
        ));
        assert!(matches!(
            OutlineSettings::from_json(r#"{"colour": "red"}"#),
            Err(SettingsError::Parse(_))
        ));
    }

    #[test]
    fn rejects_tiny_title_width() {
        assert!(matches!(
            OutlineSettings::from_json(r#"{"toc_title_max_chars": 1}"#),
            Err(SettingsError::TitleWidthTooSmall(1))
        ));
    }
}
