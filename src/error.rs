use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("{field} has {count} alternatives, but the query grammar only supports conjunctions")]
    UnsupportedAlternation { field: &'static str, count: usize },

    #[error("missing required search field: {0}")]
    MissingField(&'static str),

    #[error("{field} is set but {parent} is not")]
    Orphan {
        field: &'static str,
        parent: &'static str,
    },

    #[error("{field} value {value:?} ends with `_`, which the expression language cannot encode")]
    UnencodableValue { field: &'static str, value: String },

    #[error("unknown query field: {0}")]
    UnknownField(String),

    #[error("malformed query expression at byte {position}: {reason}")]
    Syntax { position: usize, reason: String },

    #[error("unexpected query shape: {0}")]
    UnexpectedShape(String),

    #[error("search URL has no '#!' payload")]
    MissingMarker,

    #[error("payload is not valid UTF-8 after percent-decoding: {0}")]
    PercentDecoding(#[from] std::string::FromUtf8Error),

    #[error("payload JSON error: {0}")]
    Payload(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, QueryError>;
