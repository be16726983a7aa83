use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("building '{name}' class '{class}': {reason}")]
    Build {
        name: String,
        class: String,
        reason: String,
    },

    #[error("queue #{qid}: {reason}")]
    Queue { qid: u16, reason: String },

    #[error("action '{name}': {reason}")]
    Action { name: String, reason: String },

    #[error("service error: {0}")]
    Service(String),
}

pub type Result<T> = std::result::Result<T, Error>;
