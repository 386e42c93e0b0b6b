use anyhow::Context;
use clap::{ArgGroup, Parser};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use eightx::commands::{run_implement, run_plan, run_review};
use eightx::dispatch::DispatchOutcome;
use eightx::{CommandAssistant, Config, Mode};

#[derive(Parser)]
#[command(
    name = "8x",
    about = "8x planning CLI - Plan, Implement, Review",
    version
)]
#[command(group(
    ArgGroup::new("mode")
        .required(true)
        .args(["quick_plan", "deep_plan", "implement", "review"])
))]
struct Cli {
    /// Quick plan for a straightforward task
    #[arg(long, value_name = "TASK")]
    quick_plan: Option<String>,

    /// Deep plan for complex, multi-stage work
    #[arg(long, value_name = "TASK")]
    deep_plan: Option<String>,

    /// Run implementation for a spec
    #[arg(long)]
    implement: bool,

    /// Run QA review for a spec
    #[arg(long)]
    review: bool,

    /// Project root holding specs/, src/prompts/ and .8x/ (default: current directory)
    #[arg(long, env = "EIGHTX_ROOT")]
    root: Option<PathBuf>,

    /// Override the specs directory
    #[arg(long)]
    specs_dir: Option<PathBuf>,

    /// Override the prompt template directory
    #[arg(long)]
    prompts_dir: Option<PathBuf>,

    /// Log debug details to stderr
    #[arg(long, short)]
    verbose: bool,
}

impl Cli {
    fn mode(&self) -> Mode {
        if self.quick_plan.is_some() {
            Mode::QuickPlan
        } else if self.deep_plan.is_some() {
            Mode::DeepPlan
        } else if self.implement {
            Mode::Implement
        } else {
            Mode::Review
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

// Codes outside 1..=255 collapse to 1.
fn failure_status(code: i32) -> u8 {
    u8::try_from(code).ok().filter(|c| *c != 0).unwrap_or(1)
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(failure_status(code))
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let root = match &cli.root {
        Some(root) => root.clone(),
        None => std::env::current_dir().context("failed to get current directory")?,
    };
    let mut config = Config::load(&root);
    if let Some(dir) = &cli.specs_dir {
        config.specs_dir = dir.clone();
    }
    if let Some(dir) = &cli.prompts_dir {
        config.prompts_dir = dir.clone();
    }

    let mode = cli.mode();
    let mut assistant = CommandAssistant::new(config.commands.for_mode(mode))
        .with_context(|| format!("invalid {} command", mode))?;

    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut output = io::stdout();

    match mode {
        Mode::QuickPlan | Mode::DeepPlan => {
            let task = cli
                .quick_plan
                .as_deref()
                .or(cli.deep_plan.as_deref())
                .unwrap_or_default()
                .trim();
            if task.is_empty() {
                anyhow::bail!("a task description is required for --{}", mode);
            }
            run_plan(&config, mode, task, &mut assistant, &mut input, &mut output)?;
            Ok(ExitCode::SUCCESS)
        }
        Mode::Implement => {
            match run_implement(&config, &mut assistant, &mut input, &mut output)? {
                Some(DispatchOutcome::Completed { .. }) => Ok(ExitCode::SUCCESS),
                Some(DispatchOutcome::Halted { code, .. }) => Ok(exit_code(code)),
                None => Ok(ExitCode::FAILURE),
            }
        }
        Mode::Review => match run_review(&config, &mut assistant, &mut input, &mut output)? {
            Some(0) => Ok(ExitCode::SUCCESS),
            Some(code) => Ok(exit_code(code)),
            None => Ok(ExitCode::FAILURE),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exactly_one_mode_is_required() {
        assert!(Cli::try_parse_from(["8x"]).is_err());
        assert!(Cli::try_parse_from(["8x", "--implement", "--review"]).is_err());
        assert!(Cli::try_parse_from(["8x", "--quick-plan", "a", "--deep-plan", "b"]).is_err());
    }

    #[test]
    fn test_mode_selection() {
        let cli = Cli::try_parse_from(["8x", "--quick-plan", "Fix the bug"]).unwrap();
        assert_eq!(cli.mode(), Mode::QuickPlan);
        assert_eq!(cli.quick_plan.as_deref(), Some("Fix the bug"));

        let cli = Cli::try_parse_from(["8x", "--deep-plan", "Rework auth"]).unwrap();
        assert_eq!(cli.mode(), Mode::DeepPlan);

        let cli = Cli::try_parse_from(["8x", "--implement"]).unwrap();
        assert_eq!(cli.mode(), Mode::Implement);

        let cli = Cli::try_parse_from(["8x", "--review", "--verbose"]).unwrap();
        assert_eq!(cli.mode(), Mode::Review);
        assert!(cli.verbose);
    }

    #[test]
    fn test_exit_code_mapping() {
        assert_eq!(failure_status(3), 3);
        assert_eq!(failure_status(255), 255);
        assert_eq!(failure_status(-1), 1);
        assert_eq!(failure_status(512), 1);
    }
}
