//! Shared deterministic types for the deployer core.
//!
//! These types define stable contracts between core components. They must not
//! depend on external state or I/O.

use std::fmt;

/// Structural category of a Flow document. Selects the repair strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowType {
    Screen,
    Autolaunched,
    RecordTriggered,
    Scheduled,
    Generic,
}

impl FlowType {
    pub const ALL: [FlowType; 5] = [
        FlowType::Screen,
        FlowType::Autolaunched,
        FlowType::RecordTriggered,
        FlowType::Scheduled,
        FlowType::Generic,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FlowType::Screen => "screen",
            FlowType::Autolaunched => "autolaunched",
            FlowType::RecordTriggered => "record-triggered",
            FlowType::Scheduled => "scheduled",
            FlowType::Generic => "generic",
        }
    }
}

impl fmt::Display for FlowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which retry phase requested a repair. The label is part of the repair prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairPhase {
    /// Local well-formedness and declaration problems.
    XmlStructure,
    /// Problems reported by the Metadata API after a deployment attempt.
    SalesforceDeployment,
}

impl RepairPhase {
    pub fn label(self) -> &'static str {
        match self {
            RepairPhase::XmlStructure => "XML_STRUCTURE",
            RepairPhase::SalesforceDeployment => "SALESFORCE_DEPLOYMENT",
        }
    }
}

impl fmt::Display for RepairPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Outcome of a local validation pass. Empty `errors` means the document is valid.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationReport {
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// One observation of a deployment's progress, as returned by a status poll.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeployStatus {
    pub done: bool,
    pub success: bool,
    /// Server-side state (`Queued`, `InProgress`, `Succeeded`, `Failed`, ...).
    pub state: Option<String>,
    /// Component failures, or generic messages when no component failed.
    pub errors: Vec<String>,
}

/// Deployment options that travel in the `deploy` envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeployOptions {
    /// Validate on the server without committing the change.
    pub check_only: bool,
    pub rollback_on_error: bool,
    pub allow_missing_files: bool,
    pub auto_update_package: bool,
    pub single_package: bool,
}

impl DeployOptions {
    pub fn new(check_only: bool) -> Self {
        Self {
            check_only,
            rollback_on_error: true,
            allow_missing_files: false,
            auto_update_package: false,
            single_package: true,
        }
    }
}

/// Snapshot kinds written to the log directory, one per document replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotKind {
    Original,
    XmlFix,
    DeployFix,
}

impl SnapshotKind {
    pub fn prefix(self) -> &'static str {
        match self {
            SnapshotKind::Original => "original_",
            SnapshotKind::XmlFix => "xml_fix_",
            SnapshotKind::DeployFix => "deploy_fix_",
        }
    }
}
