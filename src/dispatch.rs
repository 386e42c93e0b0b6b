use chrono::Utc;
use std::io::IsTerminal;
use tracing::info;

use crate::agent::Assistant;
use crate::error::Result;
use crate::plan::Step;
use crate::progress::{format_duration, render_step_progress, StepState, StepStatus};

const PROGRESS_COLS: usize = 80;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Every step exited with code 0.
    Completed { steps: usize },
    /// Step `step` (1-based) exited with `code`; later steps were not run.
    Halted { step: usize, code: i32 },
}

/// The message sent for one step. Every field appears even when empty.
pub fn build_step_message(preamble: &str, step: &Step) -> String {
    let field = |value: &Option<String>| value.as_deref().unwrap_or("").to_string();
    format!(
        "{}\n\n\
         Step Title: {}\n\
         Goal: {}\n\n\
         Context:\n{}\n\n\
         Instructions:\n{}\n\n\
         Verification:\n{}\n",
        preamble.trim_end(),
        field(&step.title),
        field(&step.goal),
        field(&step.context),
        field(&step.instructions),
        field(&step.verification),
    )
}

/// `Step 2/5 (Stage title): Step title`
pub fn step_label(index: usize, count: usize, step: &Step) -> String {
    let mut label = format!("Step {}/{}", index, count);
    if let Some(stage) = &step.stage_title {
        label = format!("{} ({})", label, stage);
    }
    format!("{}: {}", label, step.title())
}

/// Run `steps` in order, one assistant call each, stopping at the first
/// nonzero exit code. Nothing is undone when a step fails.
pub fn dispatch_steps(
    steps: &[Step],
    preamble: &str,
    assistant: &mut dyn Assistant,
) -> Result<DispatchOutcome> {
    let color = std::io::stdout().is_terminal();
    let mut states: Vec<StepState> = steps
        .iter()
        .map(|step| StepState::pending(step.title(), step.stage_title.as_deref()))
        .collect();

    for (idx, step) in steps.iter().enumerate() {
        println!("\n{}", step_label(idx + 1, steps.len(), step));
        states[idx].status = StepStatus::Running;

        let started = Utc::now();
        let code = assistant.run(&build_step_message(preamble, step))?;
        states[idx].duration = Some(format_duration(Utc::now() - started));
        info!(step = idx + 1, code, "step finished");

        if code != 0 {
            states[idx].status = StepStatus::Failed;
            print_progress(&states, color);
            println!("Step failed with exit code {}. Stopping.", code);
            return Ok(DispatchOutcome::Halted {
                step: idx + 1,
                code,
            });
        }

        states[idx].status = StepStatus::Done;
        print_progress(&states, color);
    }

    Ok(DispatchOutcome::Completed { steps: steps.len() })
}

fn print_progress(states: &[StepState], color: bool) {
    for line in render_step_progress(states, PROGRESS_COLS, color) {
        println!("{}", line);
    }
}
