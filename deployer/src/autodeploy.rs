//! The validate, repair, deploy and poll loop for one Flow document.
//!
//! A run moves through two bounded retry phases. The structure phase repairs
//! local well-formedness problems until the document validates. The deploy
//! phase submits the document, polls the server, and feeds reported component
//! failures back into the repairer. Every transition is appended to the flow's
//! audit log, and every document the run works on is snapshotted.
//!
//! Terminal outcomes are data ([`Terminal`]); the loop itself never fails.

use std::fmt;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use tracing::{instrument, warn};

use crate::core::budget::{AttemptBudget, poll_window};
use crate::core::classifier;
use crate::core::flow_name::validate_flow_name;
use crate::core::types::{DeployStatus, FlowType, RepairPhase, SnapshotKind};
use crate::core::validator::validate;
use crate::exit_codes;
use crate::io::archive::build_archive;
use crate::io::audit_log::AuditLog;
use crate::io::config::DeployerConfig;
use crate::io::metadata::MetadataClient;
use crate::io::transport::SoapTransport;
use crate::repair::{RepairRequest, Repairer};

/// Poll progress is logged every this many cycles.
const PROGRESS_EVERY: u32 = 4;

/// Error recorded when the server reports failure without any detail.
pub const UNKNOWN_DEPLOY_FAILURE: &str = "Unknown deployment failure";

/// The document to deploy and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployRequest {
    pub flow_name: String,
    pub document: String,
    /// Validate on the server without committing.
    pub check_only: bool,
}

impl DeployRequest {
    pub fn new(flow_name: &str, document: String, check_only: bool) -> Result<Self> {
        validate_flow_name(flow_name)?;
        Ok(Self {
            flow_name: flow_name.to_string(),
            document,
            check_only,
        })
    }
}

/// Loop limits and pacing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopSettings {
    pub api_version: String,
    /// Ceiling for each of the two repair budgets.
    pub max_iterations: u32,
    pub poll_interval: Duration,
    pub max_poll_cycles: u32,
}

impl LoopSettings {
    pub fn from_config(cfg: &DeployerConfig) -> Self {
        Self {
            api_version: cfg.api_version.clone(),
            max_iterations: cfg.max_iterations,
            poll_interval: cfg.poll_interval(),
            max_poll_cycles: cfg.max_poll_cycles,
        }
    }
}

/// Why a run ended in failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// The structure budget ran out and the document still does not validate.
    StructureUnrepaired,
    /// The repairer produced nothing usable.
    RepairUnavailable { phase: RepairPhase },
    /// Packaging or the `deploy` call failed.
    SubmissionError,
    /// A `checkDeployStatus` call failed.
    StatusCheckError,
    /// The deploy budget ran out and the server still rejects the document.
    MaxDeployAttempts,
    /// A deploy-phase repair returned a document that fails local validation.
    FixProducedInvalidDocument,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::StructureUnrepaired => f.write_str("XML structure could not be repaired"),
            FailureReason::RepairUnavailable { phase } => {
                write!(f, "repair unavailable during {phase}")
            }
            FailureReason::SubmissionError => f.write_str("deployment submission failed"),
            FailureReason::StatusCheckError => f.write_str("deployment status check failed"),
            FailureReason::MaxDeployAttempts => f.write_str("maximum deployment attempts reached"),
            FailureReason::FixProducedInvalidDocument => {
                f.write_str("deployment fix produced an invalid document")
            }
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminal {
    Success {
        deploy_id: String,
        check_only: bool,
    },
    Failed {
        reason: FailureReason,
        errors: Vec<String>,
    },
    /// Polling ran out of cycles before the server reported completion.
    TimedOut {
        deploy_id: String,
        last_state: Option<String>,
        waited: Duration,
    },
}

/// Summary of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub flow_name: String,
    pub flow_type: FlowType,
    pub terminal: Terminal,
    /// Structure-phase repairs requested.
    pub structure_fixes: u32,
    /// Deploy-phase repairs requested, including rejected ones.
    pub deploy_fixes: u32,
    /// `deploy` calls made.
    pub submissions: u32,
    /// The current document when the run ended.
    pub final_document: String,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.terminal, Terminal::Success { .. })
    }

    pub fn exit_code(&self) -> i32 {
        match self.terminal {
            Terminal::Success { .. } => exit_codes::OK,
            Terminal::Failed { .. } => exit_codes::FAILED,
            Terminal::TimedOut { .. } => exit_codes::TIMED_OUT,
        }
    }
}

enum Phase {
    StructureFix,
    Deploy,
    DeployFix { errors: Vec<String> },
    Done(Terminal),
}

struct Run<'a, R: Repairer, T: SoapTransport> {
    settings: &'a LoopSettings,
    repairer: &'a R,
    client: &'a MetadataClient<'a, T>,
    log: &'a AuditLog,
    flow_name: &'a str,
    check_only: bool,
    flow_type: FlowType,
    document: String,
    structure_budget: AttemptBudget,
    deploy_budget: AttemptBudget,
    submissions: u32,
    /// Server state seen by the latest poll of the current deployment.
    last_state: Option<String>,
}

/// Drive one document to a terminal state.
#[instrument(skip_all, fields(flow = %request.flow_name, check_only = request.check_only))]
pub fn run_auto_deploy<R: Repairer, T: SoapTransport>(
    request: DeployRequest,
    settings: &LoopSettings,
    repairer: &R,
    client: &MetadataClient<'_, T>,
    log: &AuditLog,
) -> RunOutcome {
    let DeployRequest {
        flow_name,
        document,
        check_only,
    } = request;

    let mode = if check_only {
        "validation only (checkOnly)"
    } else {
        "deploy"
    };
    note(log, &format!("=== AUTO-DEPLOY START: {flow_name} [{mode}] ==="));

    let (flow_type, rule) = classifier::explain(&document);
    note(log, &format!("Detected flow type: {flow_type} (rule: {rule})"));
    note(
        log,
        &format!("Repair strategy: {}", repairer.strategy_name(flow_type)),
    );

    let mut run = Run {
        settings,
        repairer,
        client,
        log,
        flow_name: &flow_name,
        check_only,
        flow_type,
        document,
        structure_budget: AttemptBudget::new(settings.max_iterations),
        deploy_budget: AttemptBudget::new(settings.max_iterations),
        submissions: 0,
        last_state: None,
    };
    run.snapshot(SnapshotKind::Original, 0);

    let mut phase = Phase::StructureFix;
    let terminal = loop {
        phase = match phase {
            Phase::StructureFix => run.structure_fix(),
            Phase::Deploy => run.deploy(),
            Phase::DeployFix { errors } => run.deploy_fix(errors),
            Phase::Done(terminal) => break terminal,
        };
    };

    let outcome = RunOutcome {
        flow_name: flow_name.clone(),
        flow_type,
        terminal,
        structure_fixes: run.structure_budget.used(),
        deploy_fixes: run.deploy_budget.used(),
        submissions: run.submissions,
        final_document: run.document,
    };
    note(log, &summary(&outcome));
    if let Terminal::Failed { errors, .. } = &outcome.terminal {
        note_errors(log, errors);
    }
    outcome
}

impl<R: Repairer, T: SoapTransport> Run<'_, R, T> {
    fn structure_fix(&mut self) -> Phase {
        let report = validate(&self.document);
        if report.is_ok() {
            self.note("Local validation passed");
            return Phase::Deploy;
        }
        self.note(&format!(
            "Local validation failed (structure fixes used {}/{}) with {} error(s)",
            self.structure_budget.used(),
            self.structure_budget.max(),
            report.errors.len()
        ));
        note_errors(self.log, &report.errors);

        let Some(attempt) = self.structure_budget.consume() else {
            return Phase::Done(Terminal::Failed {
                reason: FailureReason::StructureUnrepaired,
                errors: report.errors,
            });
        };
        let Some(fixed) = self.request_repair(RepairPhase::XmlStructure, &report.errors, attempt) else {
            return Phase::Done(Terminal::Failed {
                reason: FailureReason::RepairUnavailable {
                    phase: RepairPhase::XmlStructure,
                },
                errors: report.errors,
            });
        };
        self.document = fixed;
        self.snapshot(SnapshotKind::XmlFix, attempt);
        Phase::StructureFix
    }

    fn deploy(&mut self) -> Phase {
        self.submissions += 1;
        self.last_state = None;
        self.note(&format!(
            "Submitting deployment #{} (checkOnly={})",
            self.submissions, self.check_only
        ));

        let archive = match build_archive(self.flow_name, &self.document, &self.settings.api_version) {
            Ok(archive) => archive,
            Err(err) => return self.fail(FailureReason::SubmissionError, format!("{err:#}")),
        };
        let deploy_id = match self.client.submit(&archive, self.check_only) {
            Ok(id) => id,
            Err(err) => return self.fail(FailureReason::SubmissionError, err.to_string()),
        };
        self.note(&format!("Deployment submitted: {deploy_id}"));

        let status = match self.poll(&deploy_id) {
            Ok(Some(status)) => status,
            Ok(None) => return self.time_out(deploy_id),
            Err(phase) => return phase,
        };

        if status.success {
            self.note("DEPLOYMENT SUCCESS!");
            if self.check_only {
                self.note("(Validation only - not actually deployed)");
            }
            return Phase::Done(Terminal::Success {
                deploy_id,
                check_only: self.check_only,
            });
        }

        let errors = if status.errors.is_empty() {
            vec![UNKNOWN_DEPLOY_FAILURE.to_string()]
        } else {
            status.errors
        };
        self.note(&format!(
            "Deployment failed (state: {}) with {} error(s)",
            status.state.as_deref().unwrap_or("unknown"),
            errors.len()
        ));
        note_errors(self.log, &errors);
        Phase::DeployFix { errors }
    }

    /// Poll until the server reports completion. `Ok(None)` when cycles run out.
    fn poll(&mut self, deploy_id: &str) -> std::result::Result<Option<DeployStatus>, Phase> {
        for cycle in 1..=self.settings.max_poll_cycles {
            thread::sleep(self.settings.poll_interval);
            let status = match self.client.poll_once(deploy_id) {
                Ok(status) => status,
                Err(err) => return Err(self.fail(FailureReason::StatusCheckError, err.to_string())),
            };
            if status.done {
                return Ok(Some(status));
            }
            if cycle % PROGRESS_EVERY == 0 {
                let waited = self.settings.poll_interval.saturating_mul(cycle);
                self.note(&format!(
                    "Still processing... ({}s, state: {})",
                    waited.as_secs(),
                    status.state.as_deref().unwrap_or("unknown")
                ));
            }
            self.last_state = status.state;
        }
        Ok(None)
    }

    fn time_out(&mut self, deploy_id: String) -> Phase {
        let waited = poll_window(self.settings.poll_interval, self.settings.max_poll_cycles);
        self.note(&format!(
            "Deployment {deploy_id} still not complete after {} polls ({}s)",
            self.settings.max_poll_cycles,
            waited.as_secs()
        ));
        Phase::Done(Terminal::TimedOut {
            deploy_id,
            last_state: self.last_state.take(),
            waited,
        })
    }

    fn deploy_fix(&mut self, errors: Vec<String>) -> Phase {
        let Some(attempt) = self.deploy_budget.consume() else {
            return Phase::Done(Terminal::Failed {
                reason: FailureReason::MaxDeployAttempts,
                errors,
            });
        };
        let Some(fixed) = self.request_repair(RepairPhase::SalesforceDeployment, &errors, attempt) else {
            return Phase::Done(Terminal::Failed {
                reason: FailureReason::RepairUnavailable {
                    phase: RepairPhase::SalesforceDeployment,
                },
                errors,
            });
        };

        let report = validate(&fixed);
        if !report.is_ok() {
            self.note(&format!("Deployment fix {attempt} is not well-formed; not resubmitting"));
            note_errors(self.log, &report.errors);
            return Phase::Done(Terminal::Failed {
                reason: FailureReason::FixProducedInvalidDocument,
                errors: report.errors,
            });
        }
        self.document = fixed;
        self.snapshot(SnapshotKind::DeployFix, attempt);
        Phase::Deploy
    }

    fn request_repair(&self, phase: RepairPhase, errors: &[String], attempt: u32) -> Option<String> {
        let budget = match phase {
            RepairPhase::XmlStructure => self.structure_budget,
            RepairPhase::SalesforceDeployment => self.deploy_budget,
        };
        self.note(&format!(
            "Requesting {phase} repair {attempt}/{} using {}",
            budget.max(),
            self.repairer.strategy_name(self.flow_type)
        ));
        let fixed = self.repairer.repair(&RepairRequest {
            flow_type: self.flow_type,
            document: &self.document,
            errors,
            phase,
            attempt,
        });
        if fixed.is_none() {
            self.note(&format!("{phase} repair {attempt} returned no document"));
        }
        fixed
    }

    fn fail(&self, reason: FailureReason, error: String) -> Phase {
        self.note(&format!("{reason}: {error}"));
        Phase::Done(Terminal::Failed {
            reason,
            errors: vec![error],
        })
    }

    fn snapshot(&self, kind: SnapshotKind, iteration: u32) {
        match self.log.save_snapshot(kind, iteration, &self.document) {
            Ok(path) => self.note(&format!("Saved snapshot {}", path.display())),
            Err(err) => warn!(error = %format!("{err:#}"), "failed to save snapshot"),
        }
    }

    fn note(&self, message: &str) {
        note(self.log, message);
    }
}

/// Append to the audit log. A failing log never stops the run.
fn note(log: &AuditLog, message: &str) {
    if let Err(err) = log.append(message) {
        warn!(error = %format!("{err:#}"), "failed to append audit log entry");
    }
}

/// One entry per error, numbered from 1.
fn note_errors(log: &AuditLog, errors: &[String]) {
    for (idx, error) in errors.iter().enumerate() {
        note(log, &format!("   Error {}: {error}", idx + 1));
    }
}

fn summary(outcome: &RunOutcome) -> String {
    let counters = format!(
        "flow type {}, structure fixes {}, deploy fixes {}, submissions {}",
        outcome.flow_type, outcome.structure_fixes, outcome.deploy_fixes, outcome.submissions
    );
    match &outcome.terminal {
        Terminal::Success {
            deploy_id,
            check_only,
        } => {
            let what = if *check_only { "VALIDATED" } else { "DEPLOYED" };
            format!("=== RESULT: SUCCESS ({what}, id {deploy_id}); {counters} ===")
        }
        Terminal::Failed { reason, errors } => format!(
            "=== RESULT: FAILED ({reason}, {} error(s)); {counters} ===",
            errors.len()
        ),
        Terminal::TimedOut {
            deploy_id,
            last_state,
            waited,
        } => format!(
            "=== RESULT: TIMED OUT (id {deploy_id}, last state {}, waited {}s); {counters} ===",
            last_state.as_deref().unwrap_or("unknown"),
            waited.as_secs()
        ),
    }
}
