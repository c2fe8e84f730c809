use std::fmt;

use crate::LayerKind;

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    InvalidData(String),
    InvalidConfig(String),
    ShapeMismatch(String),
    InvalidLayerGraph(String),
    /// The cache or gradient entry at `layer` holds a different layer kind than its `LayerSpec`.
    CacheIndexMismatch {
        layer: usize,
        expected: LayerKind,
        found: LayerKind,
    },
    InvalidState(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidData(msg) => write!(f, "invalid data: {msg}"),
            Error::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            Error::ShapeMismatch(msg) => write!(f, "shape mismatch: {msg}"),
            Error::InvalidLayerGraph(msg) => write!(f, "invalid layer graph: {msg}"),
            Error::CacheIndexMismatch {
                layer,
                expected,
                found,
            } => write!(
                f,
                "cache index mismatch at layer {layer}: expected {expected}, found {found}"
            ),
            Error::InvalidState(msg) => write!(f, "invalid state: {msg}"),
        }
    }
}

impl std::error::Error for Error {}
