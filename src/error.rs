use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::core_modules::utils::image_helper::OutputFormat;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("image payload is empty")]
    Empty,
    #[error("unrecognized image format")]
    UnknownFormat,
    #[error("failed to decode image: {0}")]
    Decode(#[source] image::ImageError),
    #[error("failed to encode image as {format}: {source}")]
    Encode {
        format: OutputFormat,
        #[source]
        source: image::ImageError,
    },
}

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("datagram of {len} bytes is shorter than the 4-byte header")]
    TooShort { len: usize },
    #[error("datagram of {len} bytes exceeds the {max}-byte limit")]
    Oversized { len: usize, max: usize },
    #[error("no acknowledgement within {0:?}")]
    Timeout(std::time::Duration),
    #[error("unexpected acknowledgement: {0:?}")]
    UnexpectedReply(String),
    #[error("socket error: {0}")]
    Io(#[from] io::Error),
}

impl ProtocolError {
    /// Framing errors that make a datagram unusable before any decoding happens.
    pub fn is_malformed_request(&self) -> bool {
        matches!(self, ProtocolError::TooShort { .. } | ProtocolError::Oversized { .. })
    }
}

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("invalid output name {0:?}")]
    InvalidName(String),
    #[error("output {0} not found")]
    NotFound(PathBuf),
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("encoder task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl OutputError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        if source.kind() == io::ErrorKind::NotFound {
            return OutputError::NotFound(path);
        }
        OutputError::Io { path, source }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Why a datagram was dropped or left unanswered.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("malformed request: {0}")]
    MalformedRequest(#[source] ProtocolError),
    #[error("decode failure: {0}")]
    DecodeFailure(#[source] CodecError),
    #[error("failed to persist result: {0}")]
    Persist(#[source] OutputError),
    #[error("failed to send acknowledgement: {0}")]
    Reply(#[source] io::Error),
    #[error("processing task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
