// =============================================================================
// reconcile.rs — ONE LIST TO RULE THEM ALL
// =============================================================================
//
// Results arrive in whatever order the lookups finish. Each one is folded
// into an ordered list of tracked shipments:
//
//   identity  = bl_no, else tracking_no, else the raw input
//   same id   -> same shipment
//   otherwise, any shared container number -> same shipment (first match
//              in list order). Containers are physical boxes; two results
//              with the same box are the same shipment, whatever their
//              paperwork says.
//   otherwise -> new shipment
//
// After every change the list is re-sorted: shipments with a readable ETA
// first, earliest first; everything else after, in insertion order.
//
// The engine is owned by exactly one session and mutated from one task,
// so there are no locks in here.
// =============================================================================

use std::cmp::Ordering;

use chrono::Utc;
use tracing::{debug, info};

use crate::dates;
use crate::merge::merge_results;
use crate::models::{is_filled, TrackedShipment, TrackingResult};

/// What happened to an incoming result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Created { id: String },
    Merged { id: String, previous_id: String },
}

impl IngestOutcome {
    pub fn id(&self) -> &str {
        match self {
            IngestOutcome::Created { id } | IngestOutcome::Merged { id, .. } => id,
        }
    }
}

#[derive(Debug, Default)]
pub struct ReconciliationEngine {
    shipments: Vec<TrackedShipment>,
    next_seq: u64,
}

impl ReconciliationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one (input, result) pair into the collection.
    pub fn ingest(&mut self, input: &str, result: TrackingResult) -> IngestOutcome {
        let candidate = result.identity_for(input);
        let now = Utc::now();
        let fetched = result.fetched_at.unwrap_or(now);

        let outcome = match self.resolve(&candidate, &result) {
            Some(idx) => {
                let shipment = &mut self.shipments[idx];
                let merged = merge_results(&shipment.result, &result);
                let previous_id = shipment.id.clone();

                if let Some(bl_no) = merged.bl_no.as_deref().filter(|s| !s.trim().is_empty()) {
                    shipment.id = bl_no.trim().to_string();
                }
                shipment.eta = dates::parse_optional(merged.eta.as_deref());
                shipment.result = merged;
                shipment.last_fetched = fetched;

                debug!(
                    id = %shipment.id,
                    previous_id = %previous_id,
                    input,
                    "Merged result into existing shipment"
                );
                IngestOutcome::Merged {
                    id: shipment.id.clone(),
                    previous_id,
                }
            }
            None => {
                let seq = self.next_seq;
                self.next_seq += 1;
                let eta = dates::parse_optional(result.eta.as_deref());
                if eta.is_none() && is_filled(&result.eta) {
                    debug!(raw_eta = ?result.eta, "ETA not parseable, shipment sorts as undated");
                }

                info!(id = %candidate, input, carrier = %result.carrier, "New tracked shipment");
                self.shipments.push(TrackedShipment {
                    id: candidate.clone(),
                    input: input.trim().to_string(),
                    result,
                    eta,
                    inserted_at: now,
                    last_fetched: fetched,
                    seq,
                });
                IngestOutcome::Created { id: candidate }
            }
        };

        self.sort();
        outcome
    }

    /// Explicit removal. The only way a shipment ever leaves the list.
    pub fn remove(&mut self, id: &str) -> Option<TrackedShipment> {
        let idx = self
            .shipments
            .iter()
            .position(|s| s.id.eq_ignore_ascii_case(id))?;
        info!(id, "Shipment removed");
        Some(self.shipments.remove(idx))
    }

    pub fn shipments(&self) -> &[TrackedShipment] {
        &self.shipments
    }

    pub fn get(&self, id: &str) -> Option<&TrackedShipment> {
        self.shipments.iter().find(|s| s.id.eq_ignore_ascii_case(id))
    }

    pub fn len(&self) -> usize {
        self.shipments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shipments.is_empty()
    }

    fn resolve(&self, candidate: &str, incoming: &TrackingResult) -> Option<usize> {
        if let Some(idx) = self
            .shipments
            .iter()
            .position(|s| s.id.eq_ignore_ascii_case(candidate))
        {
            return Some(idx);
        }

        self.shipments.iter().position(|s| {
            incoming
                .containers
                .iter()
                .filter(|c| !c.container_no.trim().is_empty())
                .any(|c| s.result.has_container(c.container_no.trim()))
        })
    }

    fn sort(&mut self) {
        self.shipments.sort_by(compare_shipments);
    }
}

fn compare_shipments(a: &TrackedShipment, b: &TrackedShipment) -> Ordering {
    match (a.eta, b.eta) {
        (Some(x), Some(y)) => x.cmp(&y).then(a.seq.cmp(&b.seq)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.seq.cmp(&b.seq),
    }
}
