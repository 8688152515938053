//! Scoring bounds and candidate ordering.

use std::collections::HashSet;

use chrono::{Duration, Utc};
use repair_dispatch::geo::haversine_m;
use repair_dispatch::model::*;
use repair_dispatch::ranking::rank;
use repair_dispatch::scoring::{MAX_SCORE, score};

const EPS: f64 = 1e-9;

fn order() -> Order {
    Order::new("dishwasher", "leaks", "Client").at(59.93, 30.33)
}

fn master_at(lat: f64, lon: f64) -> Master {
    let mut m = Master::new("m");
    m.location = Some(GeoPoint {
        latitude: lat,
        longitude: lon,
    });
    m.specializations = vec!["dishwasher".to_string()];
    m
}

#[test]
fn score_stays_within_bounds_for_extreme_inputs() {
    let now = Utc::now();
    let order = order();
    let ratings = [f64::NAN, f64::NEG_INFINITY, -3.0, 0.0, 2.5, 5.0, 9.0, f64::INFINITY];
    let completed = [0, 1, 100, 5_000, u32::MAX];
    let active = [0, 2, 5, 50, u32::MAX];
    let locations = [
        None,
        Some((59.93, 30.33)),
        Some((-59.93, -149.67)),
        Some((f64::NAN, 0.0)),
    ];

    for &rating in &ratings {
        for &done in &completed {
            for &load in &active {
                for loc in &locations {
                    for premium in [false, true] {
                        let mut m = Master::new("grid");
                        m.rating = rating;
                        m.completed_orders = done;
                        m.active_orders = load;
                        m.location = loc.map(|(latitude, longitude)| GeoPoint {
                            latitude,
                            longitude,
                        });
                        if premium {
                            m.subscription = Subscription::Premium;
                        }
                        m.promotions = vec![
                            Promotion {
                                kind: PromotionKind::Featured,
                                expires_at: None,
                            },
                            Promotion {
                                kind: PromotionKind::TopListing,
                                expires_at: None,
                            },
                        ];

                        let s = score(&m, order.location, now);
                        assert!(s.total.is_finite(), "{m:?} -> {s:?}");
                        assert!((0.0..=MAX_SCORE).contains(&s.total), "{m:?} -> {s:?}");
                        assert!(s.promotion <= 0.10 + EPS);
                    }
                }
            }
        }
    }
}

#[test]
fn distance_term_falls_off_linearly_to_fifty_km() {
    let now = Utc::now();
    let order = order();
    let here = score(&master_at(59.93, 30.33), order.location, now);
    assert!((here.distance - 0.25).abs() < EPS);
    assert_eq!(here.distance_m, Some(0.0));

    // Roughly 25 km due north.
    let mid = master_at(59.93 + 0.2248, 30.33);
    let d = haversine_m(order.location.unwrap(), mid.location.unwrap());
    let s = score(&mid, order.location, now);
    assert!((s.distance - (1.0 - d / 50_000.0) * 0.25).abs() < EPS);
    assert!((s.distance - 0.125).abs() < 0.001);

    let far = score(&master_at(55.75, 37.61), order.location, now);
    assert_eq!(far.distance, 0.0);
}

#[test]
fn promotions_are_capped_and_expired_ones_ignored() {
    let now = Utc::now();
    let mut m = master_at(59.93, 30.33);
    m.promotions = vec![
        Promotion {
            kind: PromotionKind::Featured,
            expires_at: Some(now + Duration::days(1)),
        },
        Promotion {
            kind: PromotionKind::Highlighted,
            expires_at: Some(now - Duration::seconds(1)),
        },
    ];
    assert!((score(&m, None, now).promotion - 0.07).abs() < EPS);

    m.promotions.push(Promotion {
        kind: PromotionKind::TopListing,
        expires_at: None,
    });
    assert!((score(&m, None, now).promotion - 0.10).abs() < EPS);
}

#[test]
fn rank_orders_by_score_then_id() {
    let now = Utc::now();
    let order = order();

    // 0.9, 0.7 and 0.5 at the order's location.
    let mut a = master_at(59.93, 30.33);
    a.rating = 5.0;
    a.completed_orders = 100;
    a.subscription = Subscription::Premium;
    let mut b = master_at(59.93, 30.33);
    b.rating = 3.0;
    b.completed_orders = 100;
    let mut c = master_at(59.93, 30.33);
    c.rating = 2.0;

    let ranked = rank(&order, [c.clone(), a.clone(), b.clone()], &HashSet::new(), now);
    let ids: Vec<MasterId> = ranked.iter().map(|r| r.master.id).collect();
    assert_eq!(ids, vec![a.id, b.id, c.id]);
    assert!((ranked[0].score.total - 0.9).abs() < EPS);
    assert!((ranked[1].score.total - 0.7).abs() < EPS);
    assert!((ranked[2].score.total - 0.5).abs() < EPS);

    // Equal scores: lower id first, whatever the input order.
    let mut twin = c.clone();
    twin.id = MasterId::new();
    let (lo, hi) = if twin.id < c.id { (twin.id, c.id) } else { (c.id, twin.id) };
    for input in [vec![c.clone(), twin.clone()], vec![twin.clone(), c.clone()]] {
        let ranked = rank(&order, input, &HashSet::new(), now);
        assert_eq!(ranked[0].master.id, lo);
        assert_eq!(ranked[1].master.id, hi);
    }
}

#[test]
fn rank_drops_previously_offered_masters() {
    let now = Utc::now();
    let order = order();
    let a = master_at(59.93, 30.33);
    let b = master_at(59.94, 30.33);
    let offered: HashSet<MasterId> = [a.id].into_iter().collect();

    let ranked = rank(&order, [a, b.clone()], &offered, now);
    assert_eq!(ranked.len(), 1);
    assert_eq!(ranked[0].master.id, b.id);
}
