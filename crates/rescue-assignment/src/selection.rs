//! Distance scoring and deterministic candidate choice.

use std::collections::HashSet;

use rescue_core::{Coordinate, EmergencyResponder, Hospital, Location, distance_km};

/// Outcome of one reservation attempt against the nearest candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection<T> {
    /// The candidate was reserved.
    Selected(T),
    /// The candidate changed since it was read. It is excluded from the next
    /// round.
    Conflict { id: String, actual: String },
    /// Every candidate has been tried.
    Exhausted,
}

/// Anything the engine can rank by distance.
pub trait Candidate {
    fn candidate_id(&self) -> &str;
    fn candidate_location(&self) -> &Location;
}

impl Candidate for Hospital {
    fn candidate_id(&self) -> &str {
        &self.id
    }

    fn candidate_location(&self) -> &Location {
        &self.location
    }
}

impl Candidate for EmergencyResponder {
    fn candidate_id(&self) -> &str {
        &self.id
    }

    fn candidate_location(&self) -> &Location {
        &self.location
    }
}

/// Returns the candidate nearest to `origin` together with its distance,
/// skipping `excluded` ids.
///
/// Every candidate within `tie_tolerance_km` of the minimum distance counts
/// as equally near, and the smallest id among them wins. The result does not
/// depend on the order of `candidates`.
pub fn nearest<'a, T: Candidate>(
    origin: Coordinate,
    candidates: &'a [T],
    excluded: &HashSet<String>,
    tie_tolerance_km: f64,
) -> Option<(&'a T, f64)> {
    let scored: Vec<(&T, f64)> = candidates
        .iter()
        .filter(|c| !excluded.contains(c.candidate_id()))
        .map(|c| (c, distance_km(origin, c.candidate_location().coordinate())))
        .filter(|(_, d)| d.is_finite())
        .collect();

    let min = scored.iter().map(|(_, d)| *d).reduce(f64::min)?;
    let cutoff = min + tie_tolerance_km.max(0.0);

    scored
        .into_iter()
        .filter(|(_, d)| *d <= cutoff)
        .min_by(|(a, _), (b, _)| a.candidate_id().cmp(b.candidate_id()))
}
