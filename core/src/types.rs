//! Shared primitive types used across the entire pipeline.

use chrono::{DateTime, Utc};

/// A stable, unique identifier for a risk record (`RISK-001`, ...).
pub type RiskId = String;

/// Identifier of a key risk indicator definition.
pub type KriId = String;

/// Identifier of a control tracked for effectiveness.
pub type ControlId = String;

/// The canonical workflow run identifier.
pub type RunId = String;

/// Wall-clock instant carried on reports, alerts and control checks.
pub type Timestamp = DateTime<Utc>;
