use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const DEFAULT_COMMAND: &str = "opencode run";
pub const CONFIG_DIR: &str = ".8x";
pub const CONFIG_FILE: &str = "config.json";

/// Which workflow a command line belongs to. Also names the prompt template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    QuickPlan,
    DeepPlan,
    Implement,
    Review,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::QuickPlan => "quick-plan",
            Mode::DeepPlan => "deep-plan",
            Mode::Implement => "implement",
            Mode::Review => "review",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Assistant command line per mode. The message is appended as the last argument.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AgentCommands {
    pub quick_plan_command: String,
    pub deep_plan_command: String,
    pub implement_command: String,
    pub review_command: String,
}

impl Default for AgentCommands {
    fn default() -> Self {
        Self {
            quick_plan_command: DEFAULT_COMMAND.to_string(),
            deep_plan_command: DEFAULT_COMMAND.to_string(),
            implement_command: DEFAULT_COMMAND.to_string(),
            review_command: DEFAULT_COMMAND.to_string(),
        }
    }
}

impl AgentCommands {
    pub fn for_mode(&self, mode: Mode) -> &str {
        match mode {
            Mode::QuickPlan => &self.quick_plan_command,
            Mode::DeepPlan => &self.deep_plan_command,
            Mode::Implement => &self.implement_command,
            Mode::Review => &self.review_command,
        }
    }

    /// Overlay string-valued known keys from a parsed config file.
    fn merge(&mut self, data: &Map<String, Value>) {
        let slots: [(&str, &mut String); 4] = [
            ("quick_plan_command", &mut self.quick_plan_command),
            ("deep_plan_command", &mut self.deep_plan_command),
            ("implement_command", &mut self.implement_command),
            ("review_command", &mut self.review_command),
        ];
        for (key, slot) in slots {
            if let Some(Value::String(command)) = data.get(key) {
                *slot = command.clone();
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub specs_dir: PathBuf,
    pub prompts_dir: PathBuf,
    pub commands: AgentCommands,
}

impl Config {
    /// Default layout under a project root: `specs/` and `src/prompts/`.
    pub fn for_root(root: &Path) -> Self {
        Self {
            specs_dir: root.join("specs"),
            prompts_dir: root.join("src").join("prompts"),
            commands: AgentCommands::default(),
        }
    }

    /// Defaults, then `~/.8x/config.json`, then `<root>/.8x/config.json`.
    pub fn load(root: &Path) -> Self {
        let global = home::home_dir().map(|home| home.join(CONFIG_DIR).join(CONFIG_FILE));
        Self::load_from(root, global.as_deref())
    }

    pub fn load_from(root: &Path, global_config: Option<&Path>) -> Self {
        let mut config = Self::for_root(root);
        let project_config = root.join(CONFIG_DIR).join(CONFIG_FILE);

        for path in global_config.into_iter().chain(Some(project_config.as_path())) {
            if let Some(data) = read_config_file(path) {
                debug!(path = %path.display(), "merging config");
                config.commands.merge(&data);
            }
        }

        config
    }
}

fn read_config_file(path: &Path) -> Option<Map<String, Value>> {
    let contents = fs::read_to_string(path).ok()?;
    match serde_json::from_str::<Value>(&contents) {
        Ok(Value::Object(map)) => Some(map),
        Ok(_) => {
            warn!(path = %path.display(), "config is not a JSON object, ignoring");
            None
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "config is not valid JSON, ignoring");
            None
        }
    }
}
