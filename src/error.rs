use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Prompt file not found: {}", .0.display())]
    PromptNotFound(PathBuf),

    #[error("Assistant command is empty; set it in .8x/config.json")]
    EmptyCommand,

    #[error("Cannot parse assistant command '{command}': {source}")]
    BadCommand {
        command: String,
        #[source]
        source: shell_words::ParseError,
    },

    #[error("Failed to run command '{program}': {source}")]
    AgentSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid spec folder name: {0}")]
    InvalidSpecName(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
