use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

/// Read `<prompts_dir>/<name>.md`.
pub fn load_prompt(prompts_dir: &Path, name: &str) -> Result<String> {
    let prompt_file = prompts_dir.join(format!("{}.md", name));
    match fs::read_to_string(&prompt_file) {
        Ok(text) => Ok(text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(Error::PromptNotFound(prompt_file))
        }
        Err(e) => Err(e.into()),
    }
}

/// Prompt text used as a prefix: trailing whitespace trimmed, blank line appended.
pub fn preamble(prompt: &str) -> String {
    format!("{}\n\n", prompt.trim_end())
}
