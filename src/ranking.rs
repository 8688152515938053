//! Eligibility filtering and candidate ordering.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::model::{Master, MasterId, Order};
use crate::scoring::{Score, score};

/// An eligible master with the score that placed it.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub master: Master,
    pub score: Score,
}

/// True if `master` may be offered `order` at all.
pub fn is_eligible(master: &Master, order: &Order, previously_offered: &HashSet<MasterId>) -> bool {
    master.is_accepting_work()
        && master.specializes_in(&order.device_type)
        && !previously_offered.contains(&master.id)
}

/// Rank `masters` for `order`, best first.
///
/// Masters already offered this order (in any status) are skipped. Ties
/// fall back to ascending master id so the order is reproducible. An empty
/// result means no candidate remains.
pub fn rank(
    order: &Order,
    masters: impl IntoIterator<Item = Master>,
    previously_offered: &HashSet<MasterId>,
    now: DateTime<Utc>,
) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = masters
        .into_iter()
        .filter(|m| is_eligible(m, order, previously_offered))
        .map(|master| {
            let score = score(&master, order.location, now);
            Candidate { master, score }
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.score
            .total
            .total_cmp(&a.score.total)
            .then_with(|| a.master.id.cmp(&b.master.id))
    });

    candidates
}
