//! The four `8x` workflows: quick-plan, deep-plan, implement and review.

use chrono::Utc;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::agent::Assistant;
use crate::config::{Config, Mode};
use crate::dispatch::{dispatch_steps, DispatchOutcome};
use crate::error::Result;
use crate::plan::{extract_criteria, load_steps};
use crate::progress::format_duration;
use crate::prompts::{load_prompt, preamble};
use crate::specs::{ask_spec_name, folder_name, select_spec, SPEC_FILE};
use crate::validate::{validate_spec_json, ValidationOutcome, DEFAULT_MAX_RETRIES};

pub fn plan_message(system_prompt: &str, task: &str, output_path: &Path) -> String {
    format!(
        "{}\n\n\
         Task: {}\n\n\
         Explore the codebase, then produce the plan.\n\
         Save the JSON output to: {}",
        system_prompt,
        task,
        output_path.display()
    )
}

/// Create the spec folder, have the assistant write `spec.json`, then
/// validate it. The planning run's own exit code is not a verdict; the
/// JSON check is.
pub fn run_plan<R: BufRead, W: Write>(
    config: &Config,
    mode: Mode,
    task: &str,
    assistant: &mut dyn Assistant,
    input: &mut R,
    output: &mut W,
) -> Result<ValidationOutcome> {
    let spec_path = ask_spec_name(&config.specs_dir, task, input, output)?;
    let system_prompt = load_prompt(&config.prompts_dir, mode.as_str())?;
    let output_path = spec_path.join(SPEC_FILE);

    writeln!(output, "\nPlanning ({})...", mode)?;
    writeln!(output, "Output: {}\n", output_path.display())?;
    output.flush()?;

    let started = Utc::now();
    let code = assistant.run(&plan_message(&system_prompt, task, &output_path))?;
    if code != 0 {
        warn!(code, %mode, "planning run exited nonzero, validating output anyway");
    }

    let outcome = validate_spec_json(&output_path, assistant, DEFAULT_MAX_RETRIES);
    let elapsed = format_duration(Utc::now() - started);
    writeln!(output, "\n{} completed in {}", mode, elapsed)?;
    Ok(outcome)
}

fn select<R: BufRead, W: Write>(
    config: &Config,
    input: &mut R,
    output: &mut W,
) -> Result<Option<PathBuf>> {
    let spec = select_spec(&config.specs_dir, input, output)?;
    if let Some(spec) = &spec {
        writeln!(output, "\nSelected: {}", folder_name(spec))?;
        output.flush()?;
    }
    Ok(spec)
}

/// Pick a spec and run its steps one at a time. `None` means nothing was
/// dispatched (no selection, or no usable steps); the reason was printed.
pub fn run_implement<R: BufRead, W: Write>(
    config: &Config,
    assistant: &mut dyn Assistant,
    input: &mut R,
    output: &mut W,
) -> Result<Option<DispatchOutcome>> {
    let Some(spec) = select(config, input, output)? else {
        return Ok(None);
    };

    let prefix = preamble(&load_prompt(&config.prompts_dir, Mode::Implement.as_str())?);

    let Some(steps) = load_steps(&spec) else {
        return Ok(None);
    };
    writeln!(output, "Found {} step(s).", steps.len())?;
    output.flush()?;
    info!(spec = %spec.display(), steps = steps.len(), "dispatching plan");

    let outcome = dispatch_steps(&steps, &prefix, assistant)?;
    Ok(Some(outcome))
}

pub fn review_message(preamble: &str, criteria_json: &str) -> String {
    format!("{}Acceptance Criteria:\n{}", preamble, criteria_json)
}

/// Pick a spec and hand its acceptance criteria to the assistant in one call.
/// Returns the assistant's exit code, or `None` if nothing was sent.
pub fn run_review<R: BufRead, W: Write>(
    config: &Config,
    assistant: &mut dyn Assistant,
    input: &mut R,
    output: &mut W,
) -> Result<Option<i32>> {
    let Some(spec) = select(config, input, output)? else {
        return Ok(None);
    };

    let prefix = preamble(&load_prompt(&config.prompts_dir, Mode::Review.as_str())?);

    let criteria = match extract_criteria(&spec) {
        Ok(criteria) => criteria,
        Err(e) => {
            writeln!(output, "{}", e)?;
            return Ok(None);
        }
    };
    writeln!(output, "Found {} acceptance criteria.", criteria.len())?;
    output.flush()?;

    let criteria_json = serde_json::to_string_pretty(&criteria)?;
    let code = assistant.run(&review_message(&prefix, &criteria_json))?;
    if code != 0 {
        writeln!(output, "Review failed with exit code {}. Stopping.", code)?;
    }
    Ok(Some(code))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::fs;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn project() -> (TempDir, Config) {
        let dir = TempDir::new().unwrap();
        let config = Config::for_root(dir.path());
        fs::create_dir_all(&config.prompts_dir).unwrap();
        for name in ["quick-plan", "deep-plan", "implement", "review"] {
            fs::write(
                config.prompts_dir.join(format!("{}.md", name)),
                format!("{} prompt\n", name),
            )
            .unwrap();
        }
        (dir, config)
    }

    fn add_spec(config: &Config, name: &str, contents: &str) -> PathBuf {
        let path = config.specs_dir.join(name);
        fs::create_dir_all(&path).unwrap();
        fs::write(path.join(SPEC_FILE), contents).unwrap();
        path
    }

    #[test]
    fn test_plan_writes_to_slug_folder_and_validates() {
        let (_dir, config) = project();
        let mut messages = Vec::new();
        let mut agent = |message: &str| -> Result<i32> {
            messages.push(message.to_string());
            let path = message.rsplit("Save the JSON output to: ").next().unwrap();
            fs::write(path, r#"{"plan":{"steps":[]}}"#).unwrap();
            Ok(0)
        };
        let mut input = Cursor::new("\n");
        let mut output = Vec::new();

        let outcome = run_plan(
            &config,
            Mode::QuickPlan,
            "Fix the Login Bug",
            &mut agent,
            &mut input,
            &mut output,
        )
        .unwrap();

        assert_eq!(outcome, ValidationOutcome::Valid { repairs: 0 });
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("quick-plan prompt\n\n\nTask: Fix the Login Bug"));
        assert!(config
            .specs_dir
            .join("fix-the-login-bug")
            .join(SPEC_FILE)
            .exists());
        let shown = String::from_utf8(output).unwrap();
        assert!(shown.contains("Planning (quick-plan)..."));
        assert!(shown.contains("quick-plan completed in"));
    }

    #[test]
    fn test_plan_failure_code_still_validates() {
        let (_dir, config) = project();
        let mut calls = 0;
        let mut agent = |_: &str| -> Result<i32> {
            calls += 1;
            Ok(1)
        };
        let mut input = Cursor::new("\n");
        let mut output = Vec::new();

        let outcome = run_plan(
            &config,
            Mode::DeepPlan,
            "task",
            &mut agent,
            &mut input,
            &mut output,
        )
        .unwrap();

        assert_eq!(outcome, ValidationOutcome::Missing);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_plan_without_prompt_is_fatal() {
        let dir = TempDir::new().unwrap();
        let config = Config::for_root(dir.path());
        let mut agent = |_: &str| -> Result<i32> { panic!("must not run") };
        let mut input = Cursor::new("\n");
        let mut output = Vec::new();

        let err = run_plan(
            &config,
            Mode::QuickPlan,
            "task",
            &mut agent,
            &mut input,
            &mut output,
        )
        .unwrap_err();
        assert!(matches!(err, Error::PromptNotFound(_)));
    }

    #[test]
    fn test_implement_dispatches_staged_plan() {
        let (_dir, config) = project();
        add_spec(
            &config,
            "feature",
            r#"{"plan":{"stages":[{"title":"S1","steps":[{"title":"a"},{"title":"b"}]}]}}"#,
        );
        let mut messages = Vec::new();
        let mut agent = |message: &str| -> Result<i32> {
            messages.push(message.to_string());
            Ok(0)
        };
        let mut input = Cursor::new("\n");
        let mut output = Vec::new();

        let outcome = run_implement(&config, &mut agent, &mut input, &mut output).unwrap();

        assert_eq!(outcome, Some(DispatchOutcome::Completed { steps: 2 }));
        assert!(messages[0].starts_with("implement prompt\n\nStep Title: a"));
        let shown = String::from_utf8(output).unwrap();
        assert!(shown.contains("Selected: feature"));
        assert!(shown.contains("Found 2 step(s)."));
    }

    #[test]
    fn test_implement_with_bad_plan_dispatches_nothing() {
        let (_dir, config) = project();
        add_spec(&config, "broken", r#"{"plan":{}}"#);
        let mut agent = |_: &str| -> Result<i32> { panic!("must not run") };
        let mut input = Cursor::new("\n");
        let mut output = Vec::new();

        let outcome = run_implement(&config, &mut agent, &mut input, &mut output).unwrap();
        assert_eq!(outcome, None);
    }

    #[test]
    fn test_implement_with_invalid_choice() {
        let (_dir, config) = project();
        add_spec(&config, "only", r#"{"plan":{"steps":[]}}"#);
        let mut agent = |_: &str| -> Result<i32> { panic!("must not run") };
        let mut input = Cursor::new("7\n");
        let mut output = Vec::new();

        let outcome = run_implement(&config, &mut agent, &mut input, &mut output).unwrap();
        assert_eq!(outcome, None);
        assert!(String::from_utf8(output).unwrap().contains("Invalid choice: 7"));
    }

    #[test]
    fn test_review_sends_criteria() {
        let (_dir, config) = project();
        add_spec(
            &config,
            "feature",
            r#"{"plan":{"steps":[],"acceptance_criteria":[{"title":"Login works","requirement":"200 on POST /login"}]}}"#,
        );
        let mut messages = Vec::new();
        let mut agent = |message: &str| -> Result<i32> {
            messages.push(message.to_string());
            Ok(4)
        };
        let mut input = Cursor::new("\n");
        let mut output = Vec::new();

        let code = run_review(&config, &mut agent, &mut input, &mut output).unwrap();

        assert_eq!(code, Some(4));
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("review prompt\n\nAcceptance Criteria:\n["));
        assert!(messages[0].contains("\"requirement\": \"200 on POST /login\""));
        let shown = String::from_utf8(output).unwrap();
        assert!(shown.contains("Found 1 acceptance criteria."));
        assert!(shown.contains("Review failed with exit code 4. Stopping."));
    }
}
