//! Core frame types for framefeed.
//!
//! A [`FrameResult`] is the outcome of one fetch attempt. It is consumed
//! immediately by the display manager and never stored.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a fetch attempt produced no frame.
///
/// Every variant is recoverable: the next poll tick is the retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchFailure {
    /// The request never got a response (DNS, refused connection, TLS, ...).
    #[error("transport error: {0}")]
    Transport(String),

    /// The endpoint answered with a non-2xx status.
    #[error("endpoint returned status {0}")]
    Status(u16),

    /// The response body could not be read.
    #[error("failed to read response body: {0}")]
    Body(String),

    /// The fetch did not complete within the configured timeout.
    #[error("fetch timed out after {0} ms")]
    Timeout(u64),

    /// The payload could not be materialized into a displayable frame.
    #[error("payload is not a displayable image: {0}")]
    Decode(String),
}

impl FetchFailure {
    /// Short machine-friendly label, used as a log field.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Status(_) => "status",
            Self::Body(_) => "body",
            Self::Timeout(_) => "timeout",
            Self::Decode(_) => "decode",
        }
    }

    /// Whether the endpoint rejected our credential.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Status(401 | 403))
    }
}

/// The outcome of one fetch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameResult {
    /// Raw payload from a successful response.
    Bytes(Bytes),
    /// The attempt failed; nothing should be published.
    Failed(FetchFailure),
}

impl FrameResult {
    /// Whether this result carries a payload.
    #[must_use]
    pub fn is_bytes(&self) -> bool {
        matches!(self, Self::Bytes(_))
    }
}

impl From<FetchFailure> for FrameResult {
    fn from(failure: FetchFailure) -> Self {
        Self::Failed(failure)
    }
}

/// Image container formats we can hand to a renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameFormat {
    /// JPEG / JFIF.
    Jpeg,
    /// PNG.
    Png,
    /// GIF87a / GIF89a.
    Gif,
    /// RIFF WebP.
    Webp,
    /// Windows bitmap.
    Bmp,
}

impl FrameFormat {
    /// Identify the format from the payload's leading magic bytes.
    #[must_use]
    pub fn sniff(data: &[u8]) -> Option<Self> {
        match data {
            [0xFF, 0xD8, 0xFF, ..] => Some(Self::Jpeg),
            [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, ..] => Some(Self::Png),
            [b'G', b'I', b'F', b'8', b'7' | b'9', b'a', ..] => Some(Self::Gif),
            [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some(Self::Webp),
            [b'B', b'M', ..] if data.len() >= 26 => Some(Self::Bmp),
            _ => None,
        }
    }

    /// MIME type for this format.
    #[must_use]
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::Webp => "image/webp",
            Self::Bmp => "image/bmp",
        }
    }

    /// Conventional file extension.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Webp => "webp",
            Self::Bmp => "bmp",
        }
    }
}

impl std::fmt::Display for FrameFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}
