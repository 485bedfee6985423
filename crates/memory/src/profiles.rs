/// Retrieval profiles: named bundles of retrieval and reranking parameters.
///
/// The registry is built once (defaults plus optional startup overrides) and
/// is read-only afterwards. Lookups hand out owned copies, so per-call tweaks
/// such as a `k` override never touch the shared table.
use std::{collections::HashMap, sync::LazyLock};

use {
    serde::{Deserialize, Serialize},
    tracing::{debug, warn},
};

const DAY_SECS: u64 = 24 * 3600;

/// Profile used when the requested mode is absent or unknown.
pub const DEFAULT_MODE: &str = "strict";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalProfile {
    pub name: String,
    /// Number of results returned to the caller.
    pub k: usize,
    /// Minimum number of candidates fetched before reranking.
    pub oversample: usize,
    /// Floor on raw similarity; hits below it are dropped.
    pub min_sim: f64,
    /// Weight of the linear recency boost added to the score.
    pub recency_weight: f64,
    /// Age at which the recency boost reaches zero.
    pub recency_window_secs: u64,
    /// Half-life of the exponential similarity decay, if any.
    pub decay_half_life_days: Option<f64>,
}

impl RetrievalProfile {
    pub fn strict() -> Self {
        Self {
            name: "strict".into(),
            k: 12,
            oversample: 60,
            min_sim: 0.45,
            recency_weight: 0.0,
            recency_window_secs: 7 * DAY_SECS,
            decay_half_life_days: None,
        }
    }

    pub fn fuzzy() -> Self {
        Self {
            name: "fuzzy".into(),
            k: 24,
            oversample: 80,
            min_sim: 0.20,
            recency_weight: 0.0,
            recency_window_secs: 7 * DAY_SECS,
            decay_half_life_days: None,
        }
    }

    pub fn recency() -> Self {
        Self {
            name: "recency".into(),
            k: 16,
            oversample: 80,
            min_sim: 0.30,
            recency_weight: 0.18,
            recency_window_secs: 7 * DAY_SECS,
            decay_half_life_days: Some(7.0),
        }
    }

    /// `k_override` when positive, otherwise the profile's own `k`.
    pub fn effective_k(&self, k_override: Option<usize>) -> usize {
        match k_override {
            Some(k) if k > 0 => k,
            _ => self.k,
        }
    }

    /// Candidates to request from the store: reranking and the similarity
    /// floor run after retrieval, so ask for at least three times the final
    /// result count.
    pub fn effective_oversample(&self, k_override: Option<usize>) -> usize {
        self.oversample
            .max(self.effective_k(k_override).saturating_mul(3))
    }

    /// Return a copy with the given overrides applied.
    pub fn with_override(&self, o: &ProfileOverride) -> Self {
        let mut p = self.clone();
        if let Some(k) = o.k {
            p.k = k;
        }
        if let Some(v) = o.oversample {
            p.oversample = v;
        }
        if let Some(v) = o.min_sim {
            p.min_sim = v;
        }
        if let Some(v) = o.recency_weight {
            p.recency_weight = v;
        }
        if let Some(v) = o.recency_window_secs {
            p.recency_window_secs = v;
        }
        if let Some(v) = o.decay_half_life_days {
            p.decay_half_life_days = (v > 0.0).then_some(v);
        }
        p
    }
}

/// Partial profile used for startup tuning. `decay_half_life_days <= 0`
/// disables decay.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileOverride {
    pub k: Option<usize>,
    pub oversample: Option<usize>,
    pub min_sim: Option<f64>,
    pub recency_weight: Option<f64>,
    pub recency_window_secs: Option<u64>,
    pub decay_half_life_days: Option<f64>,
}

/// Read-only table of named profiles.
#[derive(Debug, Clone)]
pub struct ProfileRegistry {
    profiles: HashMap<String, RetrievalProfile>,
}

impl Default for ProfileRegistry {
    fn default() -> Self {
        let profiles = [
            RetrievalProfile::strict(),
            RetrievalProfile::fuzzy(),
            RetrievalProfile::recency(),
        ]
        .into_iter()
        .map(|p| (p.name.clone(), p))
        .collect();
        Self { profiles }
    }
}

impl ProfileRegistry {
    /// Defaults with startup overrides applied. Overrides naming an unknown
    /// profile are ignored.
    pub fn with_overrides<'a>(
        overrides: impl IntoIterator<Item = (&'a str, &'a ProfileOverride)>,
    ) -> Self {
        let mut registry = Self::default();
        for (name, o) in overrides {
            let key = name.to_ascii_lowercase();
            match registry.profiles.get(&key) {
                Some(base) => {
                    let tuned = base.with_override(o);
                    debug!(profile = %key, ?tuned, "applied profile override");
                    registry.profiles.insert(key, tuned);
                },
                None => warn!(profile = %name, "ignoring override for unknown retrieval profile"),
            }
        }
        registry
    }

    /// Resolve `mode` (case-insensitive) to an owned profile, falling back to
    /// "strict" for `None` or unrecognized names.
    pub fn get(&self, mode: Option<&str>) -> RetrievalProfile {
        let key = mode
            .map(|m| m.trim().to_ascii_lowercase())
            .unwrap_or_else(|| DEFAULT_MODE.to_string());
        self.profiles
            .get(&key)
            .or_else(|| self.profiles.get(DEFAULT_MODE))
            .cloned()
            .unwrap_or_else(RetrievalProfile::strict)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.profiles.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

static DEFAULT_REGISTRY: LazyLock<ProfileRegistry> = LazyLock::new(ProfileRegistry::default);

/// Look up a profile in the built-in default table.
pub fn get_profile(mode: Option<&str>) -> RetrievalProfile {
    DEFAULT_REGISTRY.get(mode)
}
