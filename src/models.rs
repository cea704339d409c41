// =============================================================================
// models.rs — WHAT A CARRIER TELLS US, AND WHAT WE TELL THE USER
// =============================================================================
//
// A carrier adapter hands back a `TrackingResult`: identifiers, route, a
// handful of summary fields, and three ordered lists (containers, historical
// events, planned moves). Different carriers fill in wildly different subsets
// of these. The reconciliation engine turns a pile of them into
// `TrackedShipment`s, one per physical shipment.
//
// Every optional text field is `Option<String>`, and `Some("")` counts as
// empty. Carriers love sending empty strings.
// =============================================================================

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::dates;

/// True when the field carries actual text.
pub fn is_filled(field: &Option<String>) -> bool {
    field.as_deref().map(|s| !s.trim().is_empty()).unwrap_or(false)
}

/// One carrier's answer for one tracking value. Immutable once an adapter
/// has returned it; the orchestrator only stamps `fetched_at`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TrackingResult {
    /// Which carrier produced this (e.g. "MSK", "COSCO").
    pub carrier: String,

    // --- identifiers ---
    /// Booking / bill-of-lading number.
    pub bl_no: Option<String>,
    /// The tracking number as the carrier echoed it back.
    pub tracking_no: Option<String>,

    // --- route ---
    /// Origin.
    pub place_of_receipt: Option<String>,
    pub port_of_loading: Option<String>,
    pub port_of_discharge: Option<String>,
    /// Final destination.
    pub place_of_delivery: Option<String>,
    pub transshipments: Option<String>,

    // --- summary ---
    pub container_count: Option<String>,
    pub gross_weight: Option<String>,
    pub measurement: Option<String>,
    pub manifest_quantity: Option<String>,
    pub on_board_date: Option<String>,
    pub service_mode: Option<String>,
    pub vessel_voyage: Option<String>,
    /// Raw carrier text; see `dates::parse_date` for the parsed form.
    pub eta: Option<String>,

    pub containers: Vec<Container>,
    pub events: Vec<Event>,
    pub planned_moves: Vec<PlannedMove>,

    /// Set by the orchestrator when the result wins a race.
    pub fetched_at: Option<DateTime<Utc>>,
}

impl TrackingResult {
    pub fn new(carrier: impl Into<String>) -> Self {
        Self {
            carrier: carrier.into(),
            ..Default::default()
        }
    }

    /// Nothing filled in beyond the carrier name. Adapters sometimes return
    /// these instead of "not found". A result carrying only a route or an
    /// ETA is still an answer.
    pub fn is_empty(&self) -> bool {
        [
            &self.bl_no,
            &self.tracking_no,
            &self.place_of_receipt,
            &self.port_of_loading,
            &self.port_of_discharge,
            &self.place_of_delivery,
            &self.transshipments,
            &self.container_count,
            &self.gross_weight,
            &self.measurement,
            &self.manifest_quantity,
            &self.on_board_date,
            &self.service_mode,
            &self.vessel_voyage,
            &self.eta,
        ]
        .into_iter()
        .all(|field| !is_filled(field))
            && self.containers.is_empty()
            && self.events.is_empty()
            && self.planned_moves.is_empty()
    }

    /// Identity candidate: bill of lading, then tracking number, then
    /// whatever the user typed.
    pub fn identity_for(&self, input: &str) -> String {
        self.bl_no
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or(self.tracking_no.as_deref().filter(|s| !s.trim().is_empty()))
            .unwrap_or(input)
            .trim()
            .to_string()
    }

    pub fn has_container(&self, container_no: &str) -> bool {
        self.containers
            .iter()
            .any(|c| c.container_no.eq_ignore_ascii_case(container_no))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Container {
    /// Unique within a result, and the join key across results.
    pub container_no: String,
    pub size_type: Option<String>,
    pub seal_no: Option<String>,
    pub status: Option<String>,
    pub location: Option<String>,
    pub date: Option<String>,
    pub vessel_voyage: Option<String>,
    pub latest_move: Option<String>,
}

impl Container {
    pub fn new(container_no: impl Into<String>) -> Self {
        Self {
            container_no: container_no.into(),
            ..Default::default()
        }
    }
}

/// A historical movement. `container_no == None` means the event belongs to
/// the shipment as a whole rather than one box.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Event {
    pub date: String,
    pub location: String,
    pub description: String,
    pub vessel_voyage: Option<String>,
    pub terminal: Option<String>,
    pub container_no: Option<String>,
}

impl Event {
    pub fn parsed_date(&self) -> Option<NaiveDate> {
        dates::parse_date(&self.date)
    }
}

/// A forward-looking leg. Kept apart from events on purpose: these have
/// not happened yet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlannedMove {
    pub eta: String,
    pub location: String,
    pub vessel_voyage: Option<String>,
}

/// One physical shipment as the user sees it, possibly stitched together
/// from several carriers' results.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedShipment {
    /// Bill of lading, tracking number, or raw input (in that order).
    pub id: String,
    /// What the user typed that first produced this shipment.
    pub input: String,
    pub result: TrackingResult,
    /// `None` when the carrier sent no ETA or one we could not read.
    pub eta: Option<NaiveDate>,
    pub inserted_at: DateTime<Utc>,
    pub last_fetched: DateTime<Utc>,
    /// Monotonic insertion order, the tie-breaker when sorting.
    #[serde(skip)]
    pub(crate) seq: u64,
}

impl TrackedShipment {
    /// Most recent event by normalized date. Events whose dates we cannot
    /// read never beat one we can.
    pub fn latest_event(&self) -> Option<&Event> {
        self.result
            .events
            .iter()
            .filter_map(|e| e.parsed_date().map(|d| (d, e)))
            .max_by_key(|(d, _)| *d)
            .map(|(_, e)| e)
            .or_else(|| self.result.events.last())
    }
}

impl fmt::Display for TrackedShipment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} via {} ({} containers, ETA {})",
            self.id,
            self.result.carrier,
            self.result.containers.len(),
            self.result.eta.as_deref().unwrap_or("unknown")
        )
    }
}

/// What an adapter is doing right now, as far as the orchestrator knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProgressStatus {
    Searching,
    Found,
    NoResult,
    Error,
}

impl fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressStatus::Searching => write!(f, "searching"),
            ProgressStatus::Found => write!(f, "found"),
            ProgressStatus::NoResult => write!(f, "no-result"),
            ProgressStatus::Error => write!(f, "error"),
        }
    }
}

/// Purely observational. Nothing about a lookup's outcome depends on
/// whether anyone reads these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterProgress {
    pub adapter_id: String,
    pub adapter_name: String,
    pub status: ProgressStatus,
    /// Error message for `Error`, otherwise `None`.
    pub detail: Option<String>,
}
