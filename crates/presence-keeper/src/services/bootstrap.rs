//! Bootstrap (join) pipeline.
//!
//! The join sequence is data: an ordered list of named steps, each either
//! required or optional, and each optionally producing a value (read from
//! the step's JSON response by pointer) or consuming values produced by
//! earlier steps. Consumed values are sent as request parameters named after
//! their slot.
//!
//! A failing required step aborts the join. A failing optional step is
//! logged and skipped. Producing steps must be required, so a consumed value
//! is always present by the time its consumer runs.
//!
//! Execution is separated from HTTP through [`StepExecutor`].

use crate::config::resolve_url;
use crate::errors::PkError;
use crate::models::ExternalIdentity;
use async_trait::async_trait;
use common::secret::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

/// Name of the step that announces presence during a join.
pub const REPORT_STEP: &str = "report_presence";

/// Slot name of the join token in the default pipeline.
pub const TOKEN_SLOT: &str = "token";

/// Parameter names every step request already carries; slots may not reuse them.
pub const RESERVED_PARAMS: [&str; 4] = ["cid", "uid", "callback", "_"];

/// HTTP method of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StepMethod {
    Get,
    Post,
}

/// A value a step extracts from its response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducedValue {
    /// Slot name under which later steps consume the value.
    pub slot: String,

    /// JSON pointer into the decoded response, e.g. `/data/token`.
    pub pointer: String,
}

/// One step of the join sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapStep {
    pub name: String,
    pub method: StepMethod,
    pub url: String,

    #[serde(default)]
    pub required: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub produces: Option<ProducedValue>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub consumes: Vec<String>,
}

/// Pipeline validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("pipeline has no steps")]
    Empty,

    #[error("duplicate step name '{0}'")]
    DuplicateStep(String),

    #[error("step '{step}' consumes '{slot}' which no earlier step produces")]
    UnresolvedSlot { step: String, slot: String },

    #[error("step '{0}' produces a value and must be required")]
    OptionalProducer(String),

    #[error("step '{step}' produces slot '{slot}' which collides with a request parameter")]
    ReservedSlot { step: String, slot: String },

    #[error("pipeline JSON is invalid: {0}")]
    InvalidJson(String),
}

/// Validated, ordered join sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapPipeline {
    steps: Vec<BootstrapStep>,
}

impl BootstrapPipeline {
    /// Build a pipeline, validating step names and value flow.
    pub fn new(steps: Vec<BootstrapStep>) -> Result<Self, PipelineError> {
        if steps.is_empty() {
            return Err(PipelineError::Empty);
        }

        let mut names = HashSet::new();
        let mut produced = HashSet::new();

        for step in &steps {
            if !names.insert(step.name.as_str()) {
                return Err(PipelineError::DuplicateStep(step.name.clone()));
            }

            for slot in &step.consumes {
                if !produced.contains(slot.as_str()) {
                    return Err(PipelineError::UnresolvedSlot {
                        step: step.name.clone(),
                        slot: slot.clone(),
                    });
                }
            }

            if let Some(value) = &step.produces {
                if !step.required {
                    return Err(PipelineError::OptionalProducer(step.name.clone()));
                }
                if RESERVED_PARAMS.contains(&value.slot.as_str()) {
                    return Err(PipelineError::ReservedSlot {
                        step: step.name.clone(),
                        slot: value.slot.clone(),
                    });
                }
                produced.insert(value.slot.as_str());
            }
        }

        Ok(Self { steps })
    }

    /// Parse a JSON array of steps, resolving relative URLs against `base_url`.
    pub fn from_json(json: &str, base_url: &str) -> Result<Self, PipelineError> {
        let mut steps: Vec<BootstrapStep> =
            serde_json::from_str(json).map_err(|e| PipelineError::InvalidJson(e.to_string()))?;

        for step in &mut steps {
            step.url = resolve_url(base_url, &step.url);
        }

        Self::new(steps)
    }

    /// The default join sequence: room metadata, token issuance, join
    /// action, membership refresh, presence report.
    pub fn default_for(base_url: &str) -> Self {
        let step = |name: &str, method: StepMethod, path: &str| BootstrapStep {
            name: name.to_string(),
            method,
            url: resolve_url(base_url, path),
            required: false,
            produces: None,
            consumes: Vec::new(),
        };

        let steps = vec![
            step("room_info", StepMethod::Get, "/Chatroom/getRoomInfo"),
            BootstrapStep {
                required: true,
                produces: Some(ProducedValue {
                    slot: TOKEN_SLOT.to_string(),
                    pointer: "/data/token".to_string(),
                }),
                ..step("issue_token", StepMethod::Get, "/Chatroom/getToken")
            },
            BootstrapStep {
                consumes: vec![TOKEN_SLOT.to_string()],
                ..step("join", StepMethod::Post, "/Chatroom/join")
            },
            step(
                "refresh_membership",
                StepMethod::Get,
                "/Chatroom/refreshMembers",
            ),
            step(REPORT_STEP, StepMethod::Post, "/Chatroom/reportOnline"),
        ];

        Self { steps }
    }

    pub fn steps(&self) -> &[BootstrapStep] {
        &self.steps
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name.as_str()).collect()
    }
}

/// Inputs shared by every step of one join.
pub struct StepContext<'a> {
    pub room_id: &'a str,
    pub credential: &'a SecretString,
    pub identity: &'a ExternalIdentity,
}

/// Result of a completed join.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinOutcome {
    /// Values produced by steps, by slot.
    pub values: HashMap<String, String>,

    /// Steps that succeeded, in order.
    pub completed_steps: Vec<String>,

    /// Optional steps that failed and were skipped.
    pub failed_steps: Vec<String>,
}

impl JoinOutcome {
    /// Whether the presence report step succeeded during the join.
    pub fn reported(&self) -> bool {
        self.completed_steps.iter().any(|s| s == REPORT_STEP)
    }
}

/// Performs a single step against the upstream.
///
/// Implementations return the decoded response payload, or an error when
/// the transport fails or the upstream signals an application error.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    async fn execute_step(
        &self,
        step: &BootstrapStep,
        ctx: &StepContext<'_>,
        inputs: &[(String, String)],
    ) -> Result<Value, PkError>;
}

/// Run every step of `pipeline` in order.
#[instrument(skip_all, name = "pk.bootstrap.run", fields(room_id = %ctx.room_id))]
pub async fn run_pipeline<E>(
    pipeline: &BootstrapPipeline,
    executor: &E,
    ctx: &StepContext<'_>,
) -> Result<JoinOutcome, PkError>
where
    E: StepExecutor + ?Sized,
{
    let mut outcome = JoinOutcome::default();

    for step in pipeline.steps() {
        let inputs = step_inputs(step, &outcome.values)?;

        let result = executor
            .execute_step(step, ctx, &inputs)
            .await
            .and_then(|value| extract_produced(step, &value));

        match result {
            Ok(produced) => {
                if let Some((slot, value)) = produced {
                    outcome.values.insert(slot, value);
                }
                debug!(target: "pk.bootstrap", step = %step.name, "Bootstrap step completed");
                outcome.completed_steps.push(step.name.clone());
            }
            Err(e) if step.required => {
                error!(
                    target: "pk.bootstrap",
                    step = %step.name,
                    error = %e,
                    "Required bootstrap step failed, aborting join"
                );
                return Err(e);
            }
            Err(e) => {
                warn!(
                    target: "pk.bootstrap",
                    step = %step.name,
                    error = %e,
                    "Optional bootstrap step failed, continuing"
                );
                outcome.failed_steps.push(step.name.clone());
            }
        }
    }

    info!(
        target: "pk.bootstrap",
        completed = outcome.completed_steps.len(),
        skipped = outcome.failed_steps.len(),
        "Join sequence finished"
    );

    Ok(outcome)
}

fn step_inputs(
    step: &BootstrapStep,
    values: &HashMap<String, String>,
) -> Result<Vec<(String, String)>, PkError> {
    step.consumes
        .iter()
        .map(|slot| match values.get(slot) {
            Some(value) => Ok((slot.clone(), value.clone())),
            None => {
                // Unreachable for validated pipelines.
                error!(target: "pk.bootstrap", step = %step.name, slot = %slot, "Consumed value missing");
                Err(PkError::Internal)
            }
        })
        .collect()
}

fn extract_produced(
    step: &BootstrapStep,
    value: &Value,
) -> Result<Option<(String, String)>, PkError> {
    let Some(produces) = &step.produces else {
        return Ok(None);
    };

    let extracted = match value.pointer(&produces.pointer) {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => {
            return Err(PkError::Parse(format!(
                "step '{}' response has no value at {}",
                step.name, produces.pointer
            )))
        }
    };

    Ok(Some((produces.slot.clone(), extracted)))
}
