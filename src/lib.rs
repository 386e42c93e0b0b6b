pub mod agent;
pub mod commands;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod image_gen;
pub mod plan;
pub mod progress;
pub mod prompts;
pub mod specs;
pub mod validate;

pub use agent::{Assistant, CommandAssistant};
pub use config::{Config, Mode};
pub use error::{Error, Result};
pub use plan::{extract_steps, Plan, PlanError, Step};
