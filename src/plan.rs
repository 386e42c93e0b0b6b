//! Plan documents (`spec.json`) and their normalisation into ordered steps.
//!
//! A plan is either flat (`plan.steps`) or staged (`plan.stages[].steps`).
//! Both shapes are reduced to one flat list; steps coming from a stage carry
//! that stage's title in `stage_title`.

use serde::Serialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::specs::SPEC_FILE;

#[derive(Error, Debug)]
pub enum PlanError {
    #[error("spec.json not found at {}", .0.display())]
    NotFound(PathBuf),

    #[error("spec.json could not be read: {0}")]
    Io(#[from] std::io::Error),

    #[error("spec.json has invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("spec.json is missing a plan object")]
    MissingPlan,

    #[error("spec.json plan must include steps or stages")]
    MissingStepsOrStages,

    #[error("spec.json plan must include acceptance_criteria or stages")]
    MissingCriteria,

    #[error("spec.json {0}")]
    InvalidCriteria(&'static str),
}

/// The two accepted plan shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    Flat { steps: Vec<Value> },
    Staged { stages: Vec<Value> },
}

impl Plan {
    /// Decide the plan shape. `steps` takes precedence when both keys hold arrays.
    pub fn from_document(document: &Value) -> Result<Self, PlanError> {
        let plan = plan_object(document)?;
        if let Some(Value::Array(steps)) = plan.get("steps") {
            return Ok(Plan::Flat { steps: steps.clone() });
        }
        if let Some(Value::Array(stages)) = plan.get("stages") {
            return Ok(Plan::Staged { stages: stages.clone() });
        }
        Err(PlanError::MissingStepsOrStages)
    }

    /// Flatten into the ordered step sequence. Non-object entries are dropped.
    pub fn into_steps(self) -> Vec<Step> {
        match self {
            Plan::Flat { steps } => steps.iter().filter_map(Step::from_value).collect(),
            Plan::Staged { stages } => {
                let mut out = Vec::new();
                for stage in stages.iter().filter_map(Value::as_object) {
                    let Some(Value::Array(steps)) = stage.get("steps") else {
                        continue;
                    };
                    let stage_title = stage.get("title").and_then(Value::as_str);
                    for mut step in steps.iter().filter_map(Step::from_value) {
                        if step.stage_title.is_none() && !step.extra.contains_key("stage_title") {
                            step.stage_title = stage_title.map(str::to_string);
                        }
                        out.push(step);
                    }
                }
                out
            }
        }
    }
}

/// One unit of work handed to the assistant.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct Step {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage_title: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Step {
    fn from_value(value: &Value) -> Option<Self> {
        let mut fields = value.as_object()?.clone();
        Some(Self {
            title: take_string(&mut fields, "title"),
            goal: take_string(&mut fields, "goal"),
            context: take_string(&mut fields, "context"),
            instructions: take_string(&mut fields, "instructions"),
            verification: take_string(&mut fields, "verification"),
            stage_title: take_string(&mut fields, "stage_title"),
            extra: fields,
        })
    }

    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or("")
    }
}

/// An acceptance criterion checked during review.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct Criterion {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requirement: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage_title: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Criterion {
    fn from_object(object: &Map<String, Value>) -> Self {
        let mut fields = object.clone();
        Self {
            title: take_string(&mut fields, "title"),
            requirement: take_string(&mut fields, "requirement"),
            stage_title: take_string(&mut fields, "stage_title"),
            extra: fields,
        }
    }
}

// Named fields only count when they hold strings; anything else stays in `extra`.
fn take_string(fields: &mut Map<String, Value>, key: &str) -> Option<String> {
    match fields.get(key) {
        Some(Value::String(_)) => match fields.remove(key) {
            Some(Value::String(s)) => Some(s),
            _ => None,
        },
        _ => None,
    }
}

fn plan_object(document: &Value) -> Result<&Map<String, Value>, PlanError> {
    document
        .as_object()
        .and_then(|root| root.get("plan"))
        .and_then(Value::as_object)
        .ok_or(PlanError::MissingPlan)
}

/// Read and parse `<spec_dir>/spec.json`.
pub fn read_spec_document(spec_dir: &Path) -> Result<Value, PlanError> {
    let spec_file = spec_dir.join(SPEC_FILE);
    let raw = match fs::read_to_string(&spec_file) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(PlanError::NotFound(spec_file))
        }
        Err(e) => return Err(e.into()),
    };
    Ok(serde_json::from_str(&raw)?)
}

/// Ordered steps of the plan in `<spec_dir>/spec.json`. Never touches the file.
pub fn extract_steps(spec_dir: &Path) -> Result<Vec<Step>, PlanError> {
    let document = read_spec_document(spec_dir)?;
    Ok(Plan::from_document(&document)?.into_steps())
}

/// Like [`extract_steps`], but reports the failure on stdout and returns `None`.
pub fn load_steps(spec_dir: &Path) -> Option<Vec<Step>> {
    match extract_steps(spec_dir) {
        Ok(steps) => Some(steps),
        Err(e) => {
            println!("{}", e);
            None
        }
    }
}

/// Acceptance criteria from `plan.acceptance_criteria` or from each stage.
pub fn extract_criteria(spec_dir: &Path) -> Result<Vec<Criterion>, PlanError> {
    let document = read_spec_document(spec_dir)?;
    let plan = plan_object(&document)?;

    if let Some(Value::Array(items)) = plan.get("acceptance_criteria") {
        return items
            .iter()
            .map(|item| {
                item.as_object().map(Criterion::from_object).ok_or(
                    PlanError::InvalidCriteria("plan acceptance_criteria must be a list of objects"),
                )
            })
            .collect();
    }

    if let Some(Value::Array(stages)) = plan.get("stages") {
        let mut criteria = Vec::new();
        for stage in stages {
            let stage = stage
                .as_object()
                .ok_or(PlanError::InvalidCriteria("plan stages must be a list of objects"))?;
            let Some(Value::Array(items)) = stage.get("acceptance_criteria") else {
                return Err(PlanError::InvalidCriteria(
                    "stage acceptance_criteria must be a list",
                ));
            };
            let stage_title = stage.get("title").and_then(Value::as_str);
            for item in items {
                let object = item.as_object().ok_or(PlanError::InvalidCriteria(
                    "stage acceptance_criteria must be a list of objects",
                ))?;
                let mut criterion = Criterion::from_object(object);
                if criterion.stage_title.is_none()
                    && !criterion.extra.contains_key("stage_title")
                {
                    criterion.stage_title = stage_title.map(str::to_string);
                }
                criteria.push(criterion);
            }
        }
        return Ok(criteria);
    }

    Err(PlanError::MissingCriteria)
}
