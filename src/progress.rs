use chrono::Duration;
use yansi::{Condition, Paint};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Pending,
    Running,
    Done,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepState {
    pub title: String,
    pub stage_title: Option<String>,
    pub status: StepStatus,
    pub duration: Option<String>,
}

impl StepState {
    pub fn pending(title: &str, stage_title: Option<&str>) -> Self {
        Self {
            title: title.to_string(),
            stage_title: stage_title.map(str::to_string),
            status: StepStatus::Pending,
            duration: None,
        }
    }
}

fn condition(color: bool) -> Condition {
    if color {
        Condition::ALWAYS
    } else {
        Condition::NEVER
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

/// One separator line followed by one line per step.
pub fn render_step_progress(steps: &[StepState], cols: usize, color: bool) -> Vec<String> {
    let mut lines = Vec::with_capacity(steps.len() + 1);
    let when = condition(color);
    lines.push("─".repeat(cols).dim().whenever(when).to_string());

    let max_title = 20.max(cols.saturating_sub(10));
    for step in steps {
        let title = truncate(&step.title, max_title);
        let (icon, title_text) = match step.status {
            StepStatus::Done => ("✔".green().whenever(when).to_string(), title),
            StepStatus::Running => (
                "▸".cyan().whenever(when).to_string(),
                title.bold().whenever(when).to_string(),
            ),
            StepStatus::Failed => (
                "✘".red().whenever(when).to_string(),
                title.red().whenever(when).to_string(),
            ),
            StepStatus::Pending => (
                "○".dim().whenever(when).to_string(),
                title.dim().whenever(when).to_string(),
            ),
        };

        let suffix = match (&step.duration, step.status) {
            (Some(d), status) if status != StepStatus::Pending => {
                format!(" ({})", d).dim().whenever(when).to_string()
            }
            _ => String::new(),
        };

        let prefix = match &step.stage_title {
            Some(stage) => format!(
                "  {} {} ",
                icon,
                format!("[{}]", stage).dim().whenever(when)
            ),
            None => format!("  {} ", icon),
        };

        lines.push(format!("{}{}{}", prefix, title_text, suffix));
    }

    lines
}

/// `45s`, `1m23s`, `1h02m03s`.
pub fn format_duration(elapsed: Duration) -> String {
    let total = elapsed.num_seconds().max(0);
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    if hours > 0 {
        format!("{}h{:02}m{:02}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m{:02}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
