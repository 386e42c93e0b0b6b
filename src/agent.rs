use std::process::Command;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Something that can carry out a message and report an exit code.
///
/// Every call blocks until the work is finished.
pub trait Assistant {
    fn run(&mut self, message: &str) -> Result<i32>;
}

impl<F> Assistant for F
where
    F: FnMut(&str) -> Result<i32>,
{
    fn run(&mut self, message: &str) -> Result<i32> {
        self(message)
    }
}

/// Runs an external assistant program, e.g. `opencode run <message>`.
///
/// The configured command line is split with shell quoting rules; the
/// message is passed as a single trailing argument. Standard streams are
/// inherited.
#[derive(Debug, Clone)]
pub struct CommandAssistant {
    program: String,
    args: Vec<String>,
}

impl CommandAssistant {
    pub fn new(command_line: &str) -> Result<Self> {
        let mut parts = shell_words::split(command_line)
            .map_err(|source| Error::BadCommand {
                command: command_line.to_string(),
                source,
            })?
            .into_iter();
        let program = parts.next().ok_or(Error::EmptyCommand)?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl Assistant for CommandAssistant {
    fn run(&mut self, message: &str) -> Result<i32> {
        debug!(program = %self.program, args = ?self.args, message_len = message.len(), "spawning assistant");

        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(message)
            .status()
            .map_err(|source| Error::AgentSpawn {
                program: self.program.clone(),
                source,
            })?;

        // Killed by a signal: no code, treat as a plain failure.
        let code = status.code().unwrap_or(1);
        info!(program = %self.program, code, "assistant exited");
        Ok(code)
    }
}
