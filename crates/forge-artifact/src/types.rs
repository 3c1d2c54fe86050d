//! Artifact references and inputs
//!
//! An [`ArtifactRef`] is an indirect pointer to stored bytes. It records
//! which tier holds them and the locator to use within that tier. Stages
//! never read bytes through a ref directly; they go through
//! [`crate::ArtifactTiering::resolve`].

use crate::error::StoreError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Content type used when nothing better is known
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Storage tier holding an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArtifactTier {
    /// Durable blob store
    Durable,
    /// Short-lived in-process cache
    Fallback,
}

impl fmt::Display for ArtifactTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactTier::Durable => f.write_str("durable"),
            ArtifactTier::Fallback => f.write_str("fallback"),
        }
    }
}

/// Key under which raw input `index` of a run is uploaded
#[inline]
#[must_use]
pub fn raw_key(run_id: impl fmt::Display, index: usize) -> String {
    format!("raw/{run_id}/image-{index}")
}

/// Key under which raw input `index` of a run is cached when the durable
/// store is unavailable
#[inline]
#[must_use]
pub fn fallback_key(run_id: impl fmt::Display, index: usize) -> String {
    format!("base64-{run_id}-{index}")
}

/// Indirect pointer to stored bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// Tier-independent name (`raw/{run}/image-{n}`)
    pub logical_key: String,
    /// Tier holding the bytes
    pub tier: ArtifactTier,
    /// Durable-store key or fallback-cache key
    pub locator: String,
    /// MIME type of the stored bytes
    pub content_type: String,
    /// Expiry of the fallback entry; `None` for durable refs
    pub expires_at: Option<DateTime<Utc>>,
}

impl ArtifactRef {
    /// Create durable ref
    #[inline]
    #[must_use]
    pub fn durable(
        logical_key: impl Into<String>,
        locator: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            logical_key: logical_key.into(),
            tier: ArtifactTier::Durable,
            locator: locator.into(),
            content_type: content_type.into(),
            expires_at: None,
        }
    }

    /// Create fallback ref
    #[inline]
    #[must_use]
    pub fn fallback(
        logical_key: impl Into<String>,
        locator: impl Into<String>,
        content_type: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            logical_key: logical_key.into(),
            tier: ArtifactTier::Fallback,
            locator: locator.into(),
            content_type: content_type.into(),
            expires_at: Some(expires_at),
        }
    }

    /// Check if stored in the fallback tier
    #[inline]
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        self.tier == ArtifactTier::Fallback
    }

    /// Check if the fallback entry has outlived its TTL at `now`
    #[inline]
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Raw image as supplied by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageInput {
    /// Already-decoded bytes
    Bytes {
        /// Image bytes
        data: Vec<u8>,
        /// MIME type, sniffed when empty
        content_type: String,
    },
    /// Base64 text, optionally as a `data:` URI
    Encoded(String),
}

impl ImageInput {
    /// Create from raw bytes, sniffing the content type
    #[must_use]
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self::Bytes {
            data,
            content_type: String::new(),
        }
    }

    /// Create from base64 text or a `data:` URI
    #[inline]
    #[must_use]
    pub fn encoded(text: impl Into<String>) -> Self {
        Self::Encoded(text.into())
    }

    /// Decode into bytes and a content type
    ///
    /// # Errors
    /// `StoreError::Undecodable` for invalid base64 or empty payloads.
    pub fn decode(&self) -> Result<(Vec<u8>, String), StoreError> {
        let (data, declared) = match self {
            ImageInput::Bytes { data, content_type } => (data.clone(), content_type.clone()),
            ImageInput::Encoded(text) => decode_text(text)?,
        };

        if data.is_empty() {
            return Err(StoreError::Undecodable("empty payload".to_string()));
        }

        let content_type = if declared.is_empty() {
            sniff_content_type(&data).to_string()
        } else {
            declared
        };
        Ok((data, content_type))
    }
}

fn decode_text(text: &str) -> Result<(Vec<u8>, String), StoreError> {
    let text = text.trim();
    let (declared, payload) = match text.strip_prefix("data:") {
        Some(rest) => {
            let (meta, payload) = rest
                .split_once(',')
                .ok_or_else(|| StoreError::Undecodable("data URI without payload".to_string()))?;
            let mime = meta.split(';').next().unwrap_or_default();
            (mime.to_string(), payload)
        }
        None => (String::new(), text),
    };

    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    let data = STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| StoreError::Undecodable(e.to_string()))?;
    Ok((data, declared))
}

/// Guess an image MIME type from magic bytes
#[must_use]
pub fn sniff_content_type(data: &[u8]) -> &'static str {
    match data {
        [0x89, b'P', b'N', b'G', ..] => "image/png",
        [0xFF, 0xD8, 0xFF, ..] => "image/jpeg",
        [b'G', b'I', b'F', b'8', ..] => "image/gif",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "image/webp",
        _ => OCTET_STREAM,
    }
}

/// Bytes-or-pointer view of an artifact
///
/// Durable artifacts resolve to a URL that downstream tools fetch
/// themselves; fallback artifacts resolve to the inlined bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedArtifact {
    /// Publicly reachable location of a durable object
    Pointer {
        /// Object URL
        url: String,
    },
    /// Bytes held in the fallback cache
    Inline {
        /// Cached bytes
        bytes: Arc<[u8]>,
        /// MIME type
        content_type: String,
    },
}

impl ResolvedArtifact {
    /// Image source usable by tools: a URL or a `data:` URI
    #[must_use]
    pub fn image_source(&self) -> String {
        match self {
            ResolvedArtifact::Pointer { url } => url.clone(),
            ResolvedArtifact::Inline {
                bytes,
                content_type,
            } => format!("data:{content_type};base64,{}", STANDARD.encode(bytes)),
        }
    }

    /// Length of the inlined payload, if any
    #[inline]
    #[must_use]
    pub fn inline_len(&self) -> Option<usize> {
        match self {
            ResolvedArtifact::Pointer { .. } => None,
            ResolvedArtifact::Inline { bytes, .. } => Some(bytes.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const PNG_HEADER: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    #[test]
    fn key_layout() {
        assert_eq!(raw_key("01RUN", 2), "raw/01RUN/image-2");
        assert_eq!(fallback_key("01RUN", 2), "base64-01RUN-2");
    }

    #[test]
    fn fallback_ref_expiry() {
        let now = Utc::now();
        let r = ArtifactRef::fallback("raw/r/image-0", "base64-r-0", "image/png", now);
        assert!(r.is_fallback());
        assert!(r.is_expired(now));
        assert!(!r.is_expired(now - Duration::seconds(1)));

        let d = ArtifactRef::durable("raw/r/image-0", "raw/r/image-0", "image/png");
        assert!(!d.is_expired(now + Duration::days(365)));
    }

    #[test]
    fn decode_bytes_sniffs_type() {
        let input = ImageInput::from_bytes(PNG_HEADER.to_vec());
        let (data, ct) = input.decode().unwrap();
        assert_eq!(data.len(), 8);
        assert_eq!(ct, "image/png");
    }

    #[test]
    fn decode_data_uri() {
        let uri = format!("data:image/jpeg;base64,{}", STANDARD.encode([0xFF, 0xD8, 0xFF, 0xE0]));
        let (data, ct) = ImageInput::encoded(uri).decode().unwrap();
        assert_eq!(data, vec![0xFF, 0xD8, 0xFF, 0xE0]);
        assert_eq!(ct, "image/jpeg");
    }

    #[test]
    fn decode_plain_base64_with_whitespace() {
        let text = format!(" {}\n", STANDARD.encode(PNG_HEADER));
        let (_, ct) = ImageInput::encoded(text).decode().unwrap();
        assert_eq!(ct, "image/png");
    }

    #[test]
    fn decode_rejects_garbage_and_empty() {
        assert!(matches!(
            ImageInput::encoded("%%%not base64%%%").decode(),
            Err(StoreError::Undecodable(_))
        ));
        assert!(matches!(
            ImageInput::from_bytes(Vec::new()).decode(),
            Err(StoreError::Undecodable(_))
        ));
        assert!(ImageInput::encoded("data:image/png;base64").decode().is_err());
    }

    #[test]
    fn inline_resolves_to_data_uri() {
        let resolved = ResolvedArtifact::Inline {
            bytes: Arc::from(&PNG_HEADER[..]),
            content_type: "image/png".into(),
        };
        assert!(resolved.image_source().starts_with("data:image/png;base64,"));
        assert_eq!(resolved.inline_len(), Some(8));

        let pointer = ResolvedArtifact::Pointer {
            url: "memory://images/raw/r/image-0".into(),
        };
        assert_eq!(pointer.image_source(), "memory://images/raw/r/image-0");
    }
}
