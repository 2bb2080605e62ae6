//! Source → delivery target inference.
//!
//! A source either already names an HLS manifest, or names a progressive
//! file whose adaptive renditions live by convention in a sibling folder:
//!
//! ```text
//! https://cdn/courses/5/video-1.mp4
//! https://cdn/courses/5/hls/video-1/video-1.m3u8
//! ```

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use url::Url;

use crate::config::ResolverConfig;
use crate::state::FailureMemory;

static MANIFEST_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\.m3u8$").expect("static regex"));

/// Delivery mode of a resolved target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Manifest,
    Progressive,
}

/// Where the element should be pointed for a given source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ResolvedTarget {
    /// Adaptive manifest, optionally backed by a progressive file.
    Manifest {
        url: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        fallback: Option<String>,
    },
    /// Progressive file, bound directly.
    Progressive { url: String },
}

impl ResolvedTarget {
    pub fn kind(&self) -> TargetKind {
        match self {
            Self::Manifest { .. } => TargetKind::Manifest,
            Self::Progressive { .. } => TargetKind::Progressive,
        }
    }

    pub fn url(&self) -> &str {
        match self {
            Self::Manifest { url, .. } | Self::Progressive { url } => url,
        }
    }

    pub fn fallback(&self) -> Option<&str> {
        match self {
            Self::Manifest { fallback, .. } => fallback.as_deref(),
            Self::Progressive { .. } => None,
        }
    }
}

/// URL-pattern inference configured from [`ResolverConfig`].
#[derive(Debug, Clone)]
pub struct TargetResolver {
    progressive: Option<Regex>,
    subfolder: String,
    manifest_name: String,
    base: Option<Url>,
}

impl TargetResolver {
    pub fn new(config: &ResolverConfig) -> Result<Self> {
        let extensions: Vec<String> = config
            .progressive_extensions
            .iter()
            .map(|e| regex::escape(e.trim_start_matches('.')))
            .filter(|e| !e.is_empty())
            .collect();
        let progressive = if extensions.is_empty() {
            None
        } else {
            let pattern = format!(r"(?i)\.({})$", extensions.join("|"));
            let regex = Regex::new(&pattern)
                .with_context(|| format!("invalid progressive extension pattern: {pattern}"))?;
            Some(regex)
        };

        let base = config
            .base_url
            .as_deref()
            .map(|b| Url::parse(b).with_context(|| format!("invalid base_url: {b}")))
            .transpose()?;

        Ok(Self {
            progressive,
            subfolder: config.adaptive_subfolder.trim_matches('/').to_string(),
            manifest_name: config.manifest_name.clone(),
            base,
        })
    }

    /// Absolute form of `source`, joined to the base URL when relative.
    pub fn absolutize(&self, source: &str) -> Option<Url> {
        match Url::parse(source) {
            Ok(url) => Some(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                self.base.as_ref().and_then(|b| b.join(source).ok())
            }
            Err(_) => None,
        }
    }

    pub fn is_manifest(&self, source: &str) -> bool {
        MANIFEST_PATH.is_match(path_of(source))
    }

    pub fn is_progressive(&self, source: &str) -> bool {
        self.progressive
            .as_ref()
            .is_some_and(|re| re.is_match(path_of(source)))
    }

    /// Conventional manifest location for a progressive source.
    pub fn derive_manifest(&self, source: &str) -> Option<String> {
        if !self.is_progressive(source) {
            return None;
        }
        let mut url = self.absolutize(source)?;
        if url.cannot_be_a_base() {
            return None;
        }

        let path = url.path().to_string();
        let (dir, file) = path.rsplit_once('/')?;
        let (stem, _ext) = file.rsplit_once('.')?;
        if stem.is_empty() {
            return None;
        }

        let manifest = self.manifest_name.replace("{name}", stem);
        let derived = if self.subfolder.is_empty() {
            format!("{dir}/{stem}/{manifest}")
        } else {
            format!("{dir}/{}/{stem}/{manifest}", self.subfolder)
        };
        url.set_path(&derived);
        url.set_query(None);
        url.set_fragment(None);
        Some(url.into())
    }

    /// Pick the delivery target for `source`.
    ///
    /// Sources recorded in `failures` never resolve to a manifest again.
    pub fn resolve(&self, source: &str, failures: &FailureMemory) -> ResolvedTarget {
        let absolute = self
            .absolutize(source)
            .map_or_else(|| source.to_string(), String::from);

        if self.is_manifest(source) {
            return ResolvedTarget::Manifest {
                url: absolute,
                fallback: None,
            };
        }

        if failures.contains(source) {
            return ResolvedTarget::Progressive { url: absolute };
        }

        match self.derive_manifest(source) {
            Some(url) => ResolvedTarget::Manifest {
                url,
                fallback: Some(absolute),
            },
            None => ResolvedTarget::Progressive { url: absolute },
        }
    }
}

/// Path component of a URL-ish string, without query or fragment.
fn path_of(source: &str) -> &str {
    let end = source.find(['?', '#']).unwrap_or(source.len());
    &source[..end]
}
