use percent_encoding::percent_decode_str;

use crate::config::KeySplit;
use crate::error::ThumbnailError;

pub(crate) const THUMBNAIL_SUFFIX: &str = "-thumbnail";

/// Decodes an object key as delivered in S3 notifications, where spaces
/// arrive as `+` and everything else is percent-escaped.
pub(crate) fn decode_object_key(raw: &str) -> Result<String, ThumbnailError> {
    // `+` must be replaced before unescaping so that `%2B` survives as a literal plus.
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| ThumbnailError::InvalidKeyEncoding(raw.to_string()))
}

/// `allowed` holds lower-cased suffixes with their leading dot.
pub(crate) fn has_allowed_extension(key: &str, allowed: &[String]) -> bool {
    let lowered = key.to_lowercase();
    allowed.iter().any(|ext| lowered.ends_with(ext.as_str()))
}

pub(crate) fn thumbnail_key(key: &str, split: KeySplit) -> String {
    match split {
        KeySplit::FirstDot => match (key.find('.'), key.rfind('.')) {
            (Some(first), Some(last)) => {
                format!("{}{THUMBNAIL_SUFFIX}.{}", &key[..first], &key[last + 1..])
            }
            _ => format!("{key}{THUMBNAIL_SUFFIX}"),
        },
        KeySplit::LastDot => match key.rsplit_once('.') {
            Some((stem, ext)) => format!("{stem}{THUMBNAIL_SUFFIX}.{ext}"),
            None => format!("{key}{THUMBNAIL_SUFFIX}"),
        },
    }
}

/// Extension of the key, used as a format hint when the bytes cannot be sniffed.
pub(crate) fn extension(key: &str) -> Option<&str> {
    key.rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty() && !ext.contains('/'))
}
