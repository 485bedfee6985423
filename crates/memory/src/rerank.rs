/// Profile-driven reranking of raw nearest-neighbor hits.
///
/// Per hit:
/// 1. clamp similarity into `[0, 1]` and drop it if below `min_sim`
/// 2. `decay = 0.5 ^ (age_days / half_life_days)` when a half-life is set
/// 3. `effective = similarity * decay`
/// 4. `recency = max(0, 1 - age / window)` when `recency_weight > 0`
/// 5. `score = effective + recency_weight * recency`
///
/// The floor looks at raw similarity only, so recency tuning can reorder
/// relevant hits but never admit irrelevant ones.
use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use crate::{
    profiles::RetrievalProfile,
    types::{RankedHit, RawHit},
};

const SECS_PER_DAY: f64 = 86_400.0;

/// Rerank against the current time.
pub fn rerank(
    raw_hits: Vec<RawHit>,
    profile: &RetrievalProfile,
    k_override: Option<usize>,
) -> Vec<RankedHit> {
    rerank_at(raw_hits, profile, k_override, Utc::now())
}

/// Rerank with every age measured against the single instant `now`.
pub fn rerank_at(
    raw_hits: Vec<RawHit>,
    profile: &RetrievalProfile,
    k_override: Option<usize>,
    now: DateTime<Utc>,
) -> Vec<RankedHit> {
    let k = profile.effective_k(k_override);

    let mut kept: Vec<RankedHit> = raw_hits
        .into_iter()
        .filter_map(|hit| score_hit(hit, profile, now))
        .collect();

    kept.sort_by(compare_ranked);
    kept.truncate(k);
    kept
}

fn score_hit(hit: RawHit, profile: &RetrievalProfile, now: DateTime<Utc>) -> Option<RankedHit> {
    let similarity = clamp_similarity(hit.similarity);
    if similarity < profile.min_sim {
        return None;
    }

    let age_secs = hit.created_at.map(|t| age_secs(t, now));
    let effective = similarity * decay_weight(age_secs, profile.decay_half_life_days);
    let recency = if profile.recency_weight > 0.0 {
        recency_norm(age_secs, profile.recency_window_secs)
    } else {
        0.0
    };
    let score = effective + profile.recency_weight * recency;

    Some(RankedHit {
        id: hit.id,
        content: hit.content,
        metadata: hit.metadata,
        created_at: hit.created_at,
        similarity,
        score,
    })
}

/// Values slightly outside `[0, 1]` come from float error in the distance
/// computation; NaN is treated as no similarity.
pub fn clamp_similarity(sim: f64) -> f64 {
    if sim.is_nan() { 0.0 } else { sim.clamp(0.0, 1.0) }
}

/// Seconds between `created_at` and `now`; timestamps in the future count as
/// brand new.
fn age_secs(created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let millis = now.signed_duration_since(created_at).num_milliseconds();
    (millis.max(0) as f64) / 1000.0
}

/// Exponential decay weight in `(0, 1]`. Undated hits are not decayed.
pub fn decay_weight(age_secs: Option<f64>, half_life_days: Option<f64>) -> f64 {
    match (age_secs, half_life_days) {
        (Some(age), Some(half_life)) if half_life > 0.0 => {
            0.5f64.powf((age / SECS_PER_DAY) / half_life)
        },
        _ => 1.0,
    }
}

/// Linear ramp from 1.0 (brand new) down to 0.0 at the window edge. Undated
/// hits get no recency boost.
pub fn recency_norm(age_secs: Option<f64>, window_secs: u64) -> f64 {
    let Some(age) = age_secs else {
        return 0.0;
    };
    if window_secs == 0 {
        return 0.0;
    }
    (1.0 - age / window_secs as f64).max(0.0)
}

/// Score descending, then raw similarity descending. The id comparison only
/// makes the order total, so the output does not depend on input order.
fn compare_ranked(a: &RankedHit, b: &RankedHit) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.similarity.total_cmp(&a.similarity))
        .then_with(|| a.id.cmp(&b.id))
}
