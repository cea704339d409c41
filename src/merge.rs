// =============================================================================
// merge.rs — TWO CARRIERS, ONE SHIPMENT
// =============================================================================
//
// When two results describe the same physical shipment we keep one and let
// the other fill in its blanks.
//
// Which one is "base" is decided by a blunt heuristic: count how many of
// exactly these five fields are populated
//
//     bl_no, port_of_loading, place_of_receipt,
//     port_of_discharge, place_of_delivery
//
// and the higher count wins. Ties go to the result we already had. The field
// list is load-bearing; swapping in "similar" fields changes merge outcomes.
//
// After that:
//   - scalar fields: base keeps what it has, other only fills empty slots
//   - containers: union by container number, base's values win per field
//   - events / planned moves: longer list wins outright, never interleaved
// =============================================================================

use std::collections::HashMap;

use crate::models::{is_filled, Container, TrackingResult};

/// How many of the five route/identity fields are populated.
pub fn completeness_score(result: &TrackingResult) -> usize {
    [
        &result.bl_no,
        &result.port_of_loading,
        &result.place_of_receipt,
        &result.port_of_discharge,
        &result.place_of_delivery,
    ]
    .into_iter()
    .filter(|field| is_filled(field))
    .count()
}

/// Merge `incoming` into `existing`. Ties in score favour `existing`.
pub fn merge_results(existing: &TrackingResult, incoming: &TrackingResult) -> TrackingResult {
    let (base, other) = if completeness_score(incoming) > completeness_score(existing) {
        (incoming, existing)
    } else {
        (existing, incoming)
    };

    let mut merged = base.clone();
    fill_scalars(&mut merged, other);
    merged.containers = union_containers(&base.containers, &other.containers);

    if other.events.len() > base.events.len() {
        merged.events = other.events.clone();
    }
    if other.planned_moves.len() > base.planned_moves.len() {
        merged.planned_moves = other.planned_moves.clone();
    }
    if merged.fetched_at.is_none() {
        merged.fetched_at = other.fetched_at;
    }

    merged
}

fn fill(slot: &mut Option<String>, donor: &Option<String>) {
    if !is_filled(slot) && is_filled(donor) {
        slot.clone_from(donor);
    }
}

fn fill_scalars(merged: &mut TrackingResult, other: &TrackingResult) {
    if merged.carrier.trim().is_empty() {
        merged.carrier.clone_from(&other.carrier);
    }

    fill(&mut merged.bl_no, &other.bl_no);
    fill(&mut merged.tracking_no, &other.tracking_no);

    fill(&mut merged.place_of_receipt, &other.place_of_receipt);
    fill(&mut merged.port_of_loading, &other.port_of_loading);
    fill(&mut merged.port_of_discharge, &other.port_of_discharge);
    fill(&mut merged.place_of_delivery, &other.place_of_delivery);
    fill(&mut merged.transshipments, &other.transshipments);

    fill(&mut merged.container_count, &other.container_count);
    fill(&mut merged.gross_weight, &other.gross_weight);
    fill(&mut merged.measurement, &other.measurement);
    fill(&mut merged.manifest_quantity, &other.manifest_quantity);
    fill(&mut merged.on_board_date, &other.on_board_date);
    fill(&mut merged.service_mode, &other.service_mode);
    fill(&mut merged.vessel_voyage, &other.vessel_voyage);
    fill(&mut merged.eta, &other.eta);
}

/// Field-by-field: base's non-empty values, else other's.
fn merge_container(base: &Container, other: &Container) -> Container {
    let mut merged = base.clone();
    fill(&mut merged.size_type, &other.size_type);
    fill(&mut merged.seal_no, &other.seal_no);
    fill(&mut merged.status, &other.status);
    fill(&mut merged.location, &other.location);
    fill(&mut merged.date, &other.date);
    fill(&mut merged.vessel_voyage, &other.vessel_voyage);
    fill(&mut merged.latest_move, &other.latest_move);
    merged
}

/// Other's containers first, base's overlaid on top. One entry per
/// container number, in first-seen order.
fn union_containers(base: &[Container], other: &[Container]) -> Vec<Container> {
    let mut union: Vec<Container> = Vec::with_capacity(base.len() + other.len());
    let mut index: HashMap<String, usize> = HashMap::new();

    for container in other {
        let key = container.container_no.trim().to_uppercase();
        if index.contains_key(&key) {
            continue;
        }
        index.insert(key, union.len());
        union.push(container.clone());
    }

    for container in base {
        let key = container.container_no.trim().to_uppercase();
        match index.get(&key) {
            Some(&slot) => {
                let merged = merge_container(container, &union[slot]);
                union[slot] = merged;
            }
            None => {
                index.insert(key, union.len());
                union.push(container.clone());
            }
        }
    }

    union
}
