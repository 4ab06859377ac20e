use crate::codec::Layout;
use crate::schema::validate::FieldError;
use crate::schema::EntityKind;
use std::path::PathBuf;

/// Central error type for hmilink.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("config error: {0}")]
    Config(String),

    #[error("config file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("not connected")]
    NotConnected,

    #[error("no configuration loaded")]
    NotLoaded,

    #[error("{kind} index {index} out of range (len {len})")]
    IndexOutOfRange {
        kind: EntityKind,
        index: usize,
        len: usize,
    },

    #[error("{kind} collection has {found} entries, expected {expected}")]
    ShapeMismatch {
        kind: EntityKind,
        expected: usize,
        found: usize,
    },

    #[error("configuration invalid: {} error(s)", .0.len())]
    Invalid(Vec<FieldError>),

    #[error("grid must have at least one row and one column")]
    EmptyGrid,

    #[error("grid {rows}x{cols} does not fit the {layout} layout")]
    GridTooLarge { rows: u8, cols: u8, layout: Layout },

    #[error("wire value does not match the declared {0} layout")]
    LayoutMismatch(Layout),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("watcher error: {0}")]
    Watcher(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;
