//! Minimal HLS playlist parsing for the headless engine.
//!
//! Supports:
//! - Multivariant (master) playlists with `#EXT-X-STREAM-INF`
//! - Media playlists (VOD and live)
//! - Quoted attribute values
//! - Relative and absolute URIs

use std::collections::HashMap;

use thiserror::Error;
use url::Url;

use crate::config::StartLevel;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaylistError {
    #[error("missing #EXTM3U header")]
    MissingHeader,

    #[error("no playable variants")]
    NoVariants,

    #[error("no segments")]
    NoSegments,

    #[error("invalid URI {uri}: {reason}")]
    InvalidUri { uri: String, reason: String },
}

/// One rendition listed in a master playlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    pub bandwidth: u64,
    pub height: u32,
    pub codecs: Option<String>,
    pub uri: Url,
}

/// One media segment.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub sequence: u64,
    pub duration: f64,
    pub uri: Url,
}

/// A parsed media playlist.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaPlaylist {
    pub segments: Vec<Segment>,
    pub is_live: bool,
    pub target_duration: f64,
    pub media_sequence: u64,
}

/// `true` if `content` lists variants rather than segments.
pub fn is_master(content: &str) -> bool {
    content.contains("#EXT-X-STREAM-INF:")
}

fn check_header(content: &str) -> Result<(), PlaylistError> {
    let first = content.trim_start_matches('\u{feff}').lines().next();
    if first.map(str::trim) == Some("#EXTM3U") {
        Ok(())
    } else {
        Err(PlaylistError::MissingHeader)
    }
}

/// Parse a master playlist. Variants come back sorted by bandwidth,
/// highest first.
pub fn parse_master(content: &str, base: &Url) -> Result<Vec<Variant>, PlaylistError> {
    check_header(content)?;

    let mut variants = Vec::new();
    let mut lines = content.lines().map(str::trim).peekable();

    while let Some(line) = lines.next() {
        let Some(rest) = line.strip_prefix("#EXT-X-STREAM-INF:") else {
            continue;
        };
        let attrs = parse_attributes(rest);
        let bandwidth = attrs
            .get("BANDWIDTH")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let height = attrs
            .get("RESOLUTION")
            .and_then(|r| r.split('x').nth(1))
            .and_then(|h| h.parse().ok())
            .unwrap_or(0);
        let codecs = attrs.get("CODECS").cloned();

        // skip blank lines and comments between the tag and its URI
        while lines
            .peek()
            .is_some_and(|l| l.is_empty() || (l.starts_with('#') && !l.starts_with("#EXT")))
        {
            lines.next();
        }
        match lines.peek() {
            Some(uri) if !uri.starts_with('#') => {
                let uri = resolve_uri(base, uri)?;
                lines.next();
                variants.push(Variant {
                    bandwidth,
                    height,
                    codecs,
                    uri,
                });
            }
            _ => {}
        }
    }

    if variants.is_empty() {
        return Err(PlaylistError::NoVariants);
    }
    variants.sort_by(|a, b| b.bandwidth.cmp(&a.bandwidth));
    Ok(variants)
}

/// Parse a media playlist.
pub fn parse_media(content: &str, base: &Url) -> Result<MediaPlaylist, PlaylistError> {
    check_header(content)?;

    let mut segments = Vec::new();
    let mut is_live = true;
    let mut media_sequence = 0u64;
    let mut target_duration = 10.0f64;
    let mut current_duration = None;

    for line in content.lines().map(str::trim) {
        if line.starts_with("#EXT-X-ENDLIST") {
            is_live = false;
        } else if let Some(rest) = line.strip_prefix("#EXT-X-MEDIA-SEQUENCE:") {
            media_sequence = rest.parse().unwrap_or(0);
        } else if let Some(rest) = line.strip_prefix("#EXT-X-TARGETDURATION:") {
            target_duration = rest.parse().unwrap_or(10.0);
        } else if let Some(rest) = line.strip_prefix("#EXTINF:") {
            current_duration = rest.split(',').next().and_then(|d| d.trim().parse().ok());
        } else if !line.starts_with('#') && !line.is_empty() {
            segments.push(Segment {
                sequence: media_sequence + segments.len() as u64,
                duration: current_duration.take().unwrap_or(target_duration),
                uri: resolve_uri(base, line)?,
            });
        }
    }

    if segments.is_empty() {
        return Err(PlaylistError::NoSegments);
    }

    Ok(MediaPlaylist {
        segments,
        is_live,
        target_duration,
        media_sequence,
    })
}

/// Pick the variant to start with.
pub fn select_variant(variants: &[Variant], level: StartLevel) -> Option<&Variant> {
    match level {
        StartLevel::Highest => variants.iter().max_by_key(|v| v.bandwidth),
        StartLevel::Lowest => variants.iter().min_by_key(|v| v.bandwidth),
    }
}

/// Parse `KEY=VALUE,KEY="quoted,value"` attribute lists.
///
/// Commas inside quotes belong to the value; entries without `=` are
/// skipped.
pub fn parse_attributes(attr_str: &str) -> HashMap<String, String> {
    let mut entries = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    for (i, c) in attr_str.char_indices() {
        match c {
            '"' => quoted = !quoted,
            ',' if !quoted => {
                entries.push(&attr_str[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    entries.push(&attr_str[start..]);

    entries
        .into_iter()
        .filter_map(|entry| entry.split_once('='))
        .map(|(key, value)| (key.trim(), value.trim()))
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| {
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value);
            (key.to_string(), value.to_string())
        })
        .collect()
}

fn resolve_uri(base: &Url, uri: &str) -> Result<Url, PlaylistError> {
    base.join(uri).map_err(|e| PlaylistError::InvalidUri {
        uri: uri.to_string(),
        reason: e.to_string(),
    })
}
