use std::fs;
use std::path::Path;
use tracing::{debug, warn};

use crate::agent::Assistant;

pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// How a validation run ended. Every outcome has already been reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    /// The file parsed, after `repairs` repair requests.
    Valid { repairs: u32 },
    /// The assistant never wrote the file.
    Missing,
    /// Still invalid after `repairs` repair requests.
    Exhausted { repairs: u32 },
    /// The assistant could not be started for a repair.
    RepairFailed { repairs: u32 },
}

pub fn repair_prompt(output_path: &Path, error: &serde_json::Error) -> String {
    format!(
        "The file at {path} contains invalid JSON.\n\
         Error: {error}\n\n\
         Read the file, fix ONLY the JSON syntax error, and save it back to {path}. \
         Do not change the content, only fix the formatting to make it valid JSON.",
        path = output_path.display(),
        error = error,
    )
}

/// Check that `output_path` holds syntactically valid JSON, asking the
/// assistant to repair it up to `max_retries` times. Only syntax is checked
/// here; the plan shape is checked when steps are extracted.
pub fn validate_spec_json(
    output_path: &Path,
    assistant: &mut dyn Assistant,
    max_retries: u32,
) -> ValidationOutcome {
    let mut repairs = 0;
    loop {
        let raw = match fs::read_to_string(output_path) {
            Ok(raw) => raw,
            Err(e) => {
                debug!(path = %output_path.display(), error = %e, "spec.json unreadable");
                println!("spec.json was not created at {}", output_path.display());
                return ValidationOutcome::Missing;
            }
        };

        let error = match serde_json::from_str::<serde_json::Value>(&raw) {
            Ok(_) => {
                println!("spec.json is valid.");
                return ValidationOutcome::Valid { repairs };
            }
            Err(e) => e,
        };

        println!(
            "\nspec.json has invalid JSON (attempt {}/{}): {}",
            repairs + 1,
            max_retries + 1,
            error
        );
        if repairs >= max_retries {
            println!("Max retries reached. Please fix the JSON manually.");
            return ValidationOutcome::Exhausted { repairs };
        }

        println!("Attempting auto-fix...\n");
        repairs += 1;
        match assistant.run(&repair_prompt(output_path, &error)) {
            Ok(code) => debug!(code, repairs, "repair attempt finished"),
            Err(e) => {
                warn!(error = %e, "repair attempt could not start");
                println!("{}", e);
                return ValidationOutcome::RepairFailed { repairs };
            }
        }
    }
}
