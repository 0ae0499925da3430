//! Type-specific repair of Flow documents through the language model.
//!
//! Strategies differ only in the rule template they embed; the prompt skeleton
//! and response cleanup are shared. A repair that cannot produce a usable
//! document returns `None` and the caller decides what that means for the run.

use tracing::{debug, instrument, warn};

use crate::core::response::clean_model_output;
use crate::core::types::{FlowType, RepairPhase};
use crate::io::model::Model;
use crate::io::prompt::{PromptEngine, RepairPrompt};

/// One repair strategy per flow type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairStrategy {
    Screen,
    Autolaunched,
    RecordTriggered,
    Scheduled,
    Generic,
}

impl RepairStrategy {
    pub fn for_flow_type(flow_type: FlowType) -> Self {
        match flow_type {
            FlowType::Screen => RepairStrategy::Screen,
            FlowType::Autolaunched => RepairStrategy::Autolaunched,
            FlowType::RecordTriggered => RepairStrategy::RecordTriggered,
            FlowType::Scheduled => RepairStrategy::Scheduled,
            FlowType::Generic => RepairStrategy::Generic,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            RepairStrategy::Screen => "screen-flow-repair",
            RepairStrategy::Autolaunched => "autolaunched-flow-repair",
            RepairStrategy::RecordTriggered => "record-triggered-flow-repair",
            RepairStrategy::Scheduled => "scheduled-flow-repair",
            RepairStrategy::Generic => "generic-flow-repair",
        }
    }

    fn flow_label(self) -> &'static str {
        match self {
            RepairStrategy::Screen => "Screen",
            RepairStrategy::Autolaunched => "Auto-Launched",
            RepairStrategy::RecordTriggered => "Record-Triggered",
            RepairStrategy::Scheduled => "Scheduled",
            RepairStrategy::Generic => "(type undetermined)",
        }
    }

    fn rules_template(self) -> &'static str {
        match self {
            RepairStrategy::Screen => "screen",
            RepairStrategy::Autolaunched => "autolaunched",
            RepairStrategy::RecordTriggered => "record_triggered",
            RepairStrategy::Scheduled => "scheduled",
            RepairStrategy::Generic => "generic",
        }
    }
}

/// Everything a strategy needs to attempt one repair.
#[derive(Debug, Clone)]
pub struct RepairRequest<'a> {
    pub flow_type: FlowType,
    pub document: &'a str,
    pub errors: &'a [String],
    pub phase: RepairPhase,
    /// 1-indexed attempt number within the phase.
    pub attempt: u32,
}

/// Abstraction over repair backends. Tests use recording repairers that
/// replay scripted documents.
pub trait Repairer {
    /// Name of the strategy used for `flow_type`, for the audit log.
    fn strategy_name(&self, flow_type: FlowType) -> &'static str {
        RepairStrategy::for_flow_type(flow_type).name()
    }

    /// Attempt a repair. `None` when no usable document came back.
    fn repair(&self, request: &RepairRequest<'_>) -> Option<String>;
}

/// Repairer backed by a [`Model`].
pub struct RepairDispatcher<M: Model> {
    model: M,
    prompts: PromptEngine,
}

impl<M: Model> RepairDispatcher<M> {
    pub fn new(model: M) -> Self {
        Self {
            model,
            prompts: PromptEngine::new(),
        }
    }

    /// Render the prompt a request would send, without calling the model.
    pub fn prompt_for(&self, request: &RepairRequest<'_>) -> anyhow::Result<String> {
        let strategy = RepairStrategy::for_flow_type(request.flow_type);
        self.prompts.render_repair(&RepairPrompt {
            flow_label: strategy.flow_label(),
            rules_template: strategy.rules_template(),
            document: request.document,
            errors: request.errors,
            phase: request.phase.label(),
            attempt: request.attempt,
        })
    }
}

impl<M: Model> Repairer for RepairDispatcher<M> {
    #[instrument(skip_all, fields(flow_type = %request.flow_type, phase = %request.phase, attempt = request.attempt))]
    fn repair(&self, request: &RepairRequest<'_>) -> Option<String> {
        if !self.model.is_available() {
            warn!("repair model unavailable");
            return None;
        }
        let prompt = match self.prompt_for(request) {
            Ok(prompt) => prompt,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "failed to render repair prompt");
                return None;
            }
        };
        let raw = match self.model.complete(&prompt) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "repair model call failed");
                return None;
            }
        };
        let cleaned = clean_model_output(&raw);
        if cleaned.is_none() {
            warn!("repair model returned no usable text");
        }
        debug!(chars = cleaned.as_ref().map_or(0, String::len), "repair complete");
        cleaned
    }
}
