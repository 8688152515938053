//! Candidate scoring.
//!
//! Each term is capped before summation and the total is not
//! re-normalized, so bonuses can lift a score above 1.0. The result always
//! lies in `[0, MAX_SCORE]`.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::geo::haversine_m;
use crate::model::{GeoPoint, Master, Subscription};

pub const RATING_WEIGHT: f64 = 0.25;
pub const EXPERIENCE_WEIGHT: f64 = 0.15;
pub const DISTANCE_WEIGHT: f64 = 0.25;
pub const LOAD_WEIGHT: f64 = 0.15;
pub const PREMIUM_BONUS: f64 = 0.10;
pub const PROMOTION_CAP: f64 = 0.10;

/// Completed orders at which the experience term saturates.
pub const EXPERIENCE_SATURATION: f64 = 100.0;
/// Distance at which the distance term reaches zero.
pub const DISTANCE_HORIZON_M: f64 = 50_000.0;
/// Active orders at which the load term reaches zero.
pub const LOAD_CEILING: f64 = 5.0;
pub const MAX_RATING: f64 = 5.0;

/// Upper bound on any score.
pub const MAX_SCORE: f64 = 1.2;

/// A master's score for one order, with its parts for logging.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Score {
    pub total: f64,
    pub rating: f64,
    pub experience: f64,
    pub distance: f64,
    pub load: f64,
    pub premium: f64,
    pub promotion: f64,
    /// Metres to the order, when both ends have coordinates.
    pub distance_m: Option<f64>,
}

/// Score `master` for an order at `order_location`.
///
/// Missing or non-finite inputs get the partial credit of a missing value;
/// this never fails.
///
/// Promotions count per kind: two active `TopListing` rows add 0.05, not
/// 0.10. The promotion sum is capped at [`PROMOTION_CAP`].
pub fn score(master: &Master, order_location: Option<GeoPoint>, now: DateTime<Utc>) -> Score {
    let rating = finite_or_zero(master.rating).clamp(0.0, MAX_RATING) / MAX_RATING * RATING_WEIGHT;

    let experience =
        (f64::from(master.completed_orders) / EXPERIENCE_SATURATION).min(1.0) * EXPERIENCE_WEIGHT;

    let distance_m = match (order_location, master.location) {
        (Some(order), Some(here)) => Some(haversine_m(order, here)).filter(|d| d.is_finite()),
        _ => None,
    };
    let distance = match distance_m {
        Some(d) => (1.0 - d / DISTANCE_HORIZON_M).clamp(0.0, 1.0) * DISTANCE_WEIGHT,
        None => DISTANCE_WEIGHT / 2.0,
    };

    let load = (1.0 - f64::from(master.active_orders) / LOAD_CEILING).max(0.0) * LOAD_WEIGHT;

    let premium = match master.subscription {
        Subscription::Premium => PREMIUM_BONUS,
        Subscription::Basic => 0.0,
    };

    // A kind counts once no matter how many rows carry it.
    let active_kinds: BTreeSet<_> = master
        .promotions
        .iter()
        .filter(|p| p.is_active_at(now))
        .map(|p| p.kind)
        .collect();
    let promotion = active_kinds
        .iter()
        .map(|k| k.bonus())
        .sum::<f64>()
        .min(PROMOTION_CAP);

    let total = rating + experience + distance + load + premium + promotion;

    Score {
        total: total.clamp(0.0, MAX_SCORE),
        rating,
        experience,
        distance,
        load,
        premium,
        promotion,
        distance_m,
    }
}

fn finite_or_zero(x: f64) -> f64 {
    if x.is_finite() { x } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Promotion, PromotionKind};
    use chrono::Duration;

    const EPS: f64 = 1e-9;

    #[test]
    fn bare_master_gets_distance_half_credit_and_full_load() {
        let m = Master::new("bare");
        let s = score(&m, None, Utc::now());
        assert!((s.distance - 0.125).abs() < EPS);
        assert!((s.load - 0.15).abs() < EPS);
        assert!((s.total - 0.275).abs() < EPS);
        assert_eq!(s.distance_m, None);
    }

    #[test]
    fn expired_promotions_do_not_count() {
        let now = Utc::now();
        let mut m = Master::new("promo");
        m.promotions = vec![
            Promotion {
                kind: PromotionKind::Featured,
                expires_at: Some(now - Duration::hours(1)),
            },
            Promotion {
                kind: PromotionKind::Highlighted,
                expires_at: None,
            },
        ];
        let s = score(&m, None, now);
        assert!((s.promotion - 0.03).abs() < EPS);
    }

    #[test]
    fn duplicate_promotion_kinds_count_once() {
        let now = Utc::now();
        let mut m = Master::new("dup");
        m.promotions = vec![
            Promotion {
                kind: PromotionKind::TopListing,
                expires_at: None,
            };
            3
        ];
        assert!((score(&m, None, now).promotion - 0.05).abs() < EPS);
    }
}
