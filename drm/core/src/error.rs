use thiserror::Error;

/**
    Errors from protection init data parsing.
*/
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InitDataError {
    #[error("init data is empty")]
    Empty,

    #[error("invalid base64: {0}")]
    InvalidBase64(String),

    #[error("malformed PSSH box at offset {offset}: {reason}")]
    Malformed { offset: usize, reason: String },
}

/**
    Error returned by `FromStr` implementations on enum types.
*/
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} '{value}'")]
pub struct ParseError {
    pub kind: &'static str,
    pub value: String,
}
