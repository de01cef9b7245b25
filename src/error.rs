use std::fmt;

use thiserror::Error;

use crate::events::Eye;

/// Failure anywhere between a picked image and a presented stereo card.
#[derive(Debug, Error)]
pub enum PresentationError {
    /// The picked item could not be read.
    #[error("{eye} eye image is unavailable: {source}")]
    Unavailable {
        eye: Eye,
        #[source]
        source: std::io::Error,
    },

    /// The picked item resolved to nothing.
    #[error("{eye} eye image is missing")]
    MissingImage { eye: Eye },

    /// The bytes are not a decodable image.
    #[error("{eye} eye image could not be decoded: {source}")]
    Decode {
        eye: Eye,
        #[source]
        source: image::ImageError,
    },

    /// Resolving or decoding did not finish in time.
    #[error("{eye} eye image did not load within {timeout_ms} ms")]
    Timeout { eye: Eye, timeout_ms: u64 },

    /// The load task itself died before reporting.
    #[error("image loading was interrupted: {reason}")]
    Interrupted { reason: String },

    /// The material template is missing or corrupt.
    #[error("material template '{path}' could not be loaded: {reason}")]
    AssetLoad { path: String, reason: String },

    /// A material parameter rejected its value.
    #[error("material parameter '{name}' could not be set: {reason}")]
    Parameter { name: String, reason: String },

    /// The left image is too small to span a plane.
    #[error("a {width}x{height} image yields an empty plane")]
    EmptyPlane { width: u32, height: u32 },

    /// The bitmap could not become a texture.
    #[error("texture for the {eye} eye was rejected: {reason}")]
    TextureCreation { eye: Eye, reason: String },
}

/// Coarse failure classes surfaced to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Picker,
    Decode,
    AssetLoad,
    TextureCreation,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureKind::Picker => "image unavailable",
            FailureKind::Decode => "image not decodable",
            FailureKind::AssetLoad => "material unavailable",
            FailureKind::TextureCreation => "texture rejected",
        };
        f.write_str(label)
    }
}

impl PresentationError {
    pub fn kind(&self) -> FailureKind {
        match self {
            PresentationError::Unavailable { .. }
            | PresentationError::MissingImage { .. }
            | PresentationError::Timeout { .. }
            | PresentationError::Interrupted { .. } => FailureKind::Picker,
            PresentationError::Decode { .. } => FailureKind::Decode,
            PresentationError::AssetLoad { .. } | PresentationError::Parameter { .. } => {
                FailureKind::AssetLoad
            }
            PresentationError::TextureCreation { .. } | PresentationError::EmptyPlane { .. } => {
                FailureKind::TextureCreation
            }
        }
    }

    pub(crate) fn asset(path: impl Into<String>, reason: impl fmt::Display) -> Self {
        PresentationError::AssetLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// What the session keeps of a failure: enough to show and dismiss it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentationFailed {
    pub kind: FailureKind,
    pub message: String,
}

impl From<&PresentationError> for PresentationFailed {
    fn from(err: &PresentationError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<PresentationError> for PresentationFailed {
    fn from(err: PresentationError) -> Self {
        Self::from(&err)
    }
}

impl fmt::Display for PresentationFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}
