use std::str::FromStr;

use crate::error::ConfigError;

pub(crate) const DEFAULT_MAX_DIMENSION: u32 = 150;
pub(crate) const DEFAULT_MAX_CONCURRENCY: usize = 4;
const DEFAULT_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Which dot of the object key separates the stem from the extension
/// when deriving the thumbnail key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum KeySplit {
    /// Stem ends at the first dot, extension starts after the last one:
    /// `photo.v2.png` becomes `photo-thumbnail.png`.
    #[default]
    FirstDot,
    /// Stem ends at the last dot: `photo.v2.png` becomes `photo.v2-thumbnail.png`.
    LastDot,
}

impl FromStr for KeySplit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first" => Ok(KeySplit::FirstDot),
            "last" => Ok(KeySplit::LastDot),
            other => Err(format!("expected \"first\" or \"last\", got {other:?}")),
        }
    }
}

/// Settings resolved once when the process starts.
#[derive(Debug, Clone)]
pub(crate) struct Config {
    pub upload_bucket: Option<String>,
    pub thumbnail_bucket: String,
    pub max_dimension: u32,
    /// Lower-cased suffixes including the leading dot, e.g. `.jpg`.
    pub allowed_extensions: Vec<String>,
    pub key_split: KeySplit,
    pub max_concurrency: usize,
}

impl Config {
    pub(crate) fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let thumbnail_bucket = var("THUMBNAIL_CONTAINER")
            .ok_or(ConfigError::Missing("THUMBNAIL_CONTAINER"))?;

        let max_dimension = match var("MAX_DIMENSION") {
            Some(raw) => parse_positive("MAX_DIMENSION", &raw)?,
            None => DEFAULT_MAX_DIMENSION,
        };

        let max_concurrency = match var("MAX_CONCURRENCY") {
            Some(raw) => parse_positive("MAX_CONCURRENCY", &raw)?,
            None => DEFAULT_MAX_CONCURRENCY,
        };

        let allowed_extensions = match var("ALLOWED_EXTENSIONS") {
            Some(raw) => {
                let parsed = parse_extensions(&raw);
                if parsed.is_empty() {
                    return Err(ConfigError::Invalid {
                        name: "ALLOWED_EXTENSIONS",
                        value: raw,
                        reason: "no extensions listed".to_string(),
                    });
                }
                parsed
            }
            None => parse_extensions(&DEFAULT_EXTENSIONS.join(",")),
        };

        let key_split = match var("THUMBNAIL_KEY_SPLIT") {
            Some(raw) => raw.parse::<KeySplit>().map_err(|reason| ConfigError::Invalid {
                name: "THUMBNAIL_KEY_SPLIT",
                value: raw.clone(),
                reason,
            })?,
            None => KeySplit::default(),
        };

        Ok(Config {
            upload_bucket: var("UPLOAD_CONTAINER"),
            thumbnail_bucket,
            max_dimension,
            allowed_extensions,
            key_split,
            max_concurrency,
        })
    }
}

fn parse_positive<T>(name: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Default,
    T::Err: std::fmt::Display,
{
    let invalid = |reason: String| ConfigError::Invalid {
        name,
        value: raw.to_string(),
        reason,
    };
    let value: T = raw.trim().parse().map_err(|e: T::Err| invalid(e.to_string()))?;
    if value <= T::default() {
        return Err(invalid("must be greater than zero".to_string()));
    }
    Ok(value)
}

fn parse_extensions(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .map(|ext| format!(".{ext}"))
        .collect()
}
