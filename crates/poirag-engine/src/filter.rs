//! Conditional noise filter.
//!
//! Some POI types are almost never what a query is about (public toilets,
//! ATM kiosks) and only dilute the candidate set. They are dropped by
//! default, but an explicit ask wins: a question about restrooms gets
//! restrooms.

use poirag_core::models::{Poi, QueryPlan};

/// Categories and name fragments dropped unless explicitly requested.
const BLOCKLIST: &[&str] = &[
    "公共厕所",
    "洗手间",
    "卫生间",
    "厕所",
    "自动提款机",
    "ATM",
    "配电房",
    "垃圾站",
];

/// Question or category fragments that lift a blocklist entry.
const EXEMPTION_TRIGGERS: &[(&str, &[&str])] = &[
    ("厕所", &["公共厕所", "洗手间", "卫生间", "厕所"]),
    ("洗手间", &["公共厕所", "洗手间", "卫生间", "厕所"]),
    ("卫生间", &["公共厕所", "洗手间", "卫生间", "厕所"]),
    ("toilet", &["公共厕所", "洗手间", "卫生间", "厕所"]),
    ("取钱", &["自动提款机", "ATM"]),
    ("提款", &["自动提款机", "ATM"]),
    ("atm", &["自动提款机", "ATM"]),
];

fn exempted(plan: &QueryPlan) -> Vec<&'static str> {
    let question = plan.raw_question.to_lowercase();
    let mut lifted = Vec::new();
    for (trigger, entries) in EXEMPTION_TRIGGERS {
        let asked = question.contains(trigger)
            || plan.categories.iter().any(|c| c.contains(trigger));
        if asked {
            for &entry in *entries {
                if !lifted.contains(&entry) {
                    lifted.push(entry);
                }
            }
        }
    }
    lifted
}

fn blocked(poi: &Poi, lifted: &[&str]) -> bool {
    BLOCKLIST.iter().any(|entry| {
        if lifted.contains(entry) {
            return false;
        }
        poi.name.contains(entry)
            || poi.category_mid.contains(entry)
            || poi.category_small.contains(entry)
    })
}

/// Drop blocklisted POIs that the plan did not ask for. Returns the kept set
/// and how many were removed.
pub fn apply_blocklist(pois: Vec<Poi>, plan: &QueryPlan) -> (Vec<Poi>, usize) {
    let lifted = exempted(plan);
    let before = pois.len();
    let kept: Vec<Poi> = pois.into_iter().filter(|p| !blocked(p, &lifted)).collect();
    let removed = before - kept.len();
    if removed > 0 {
        tracing::debug!(removed, "blocklist removed low-value candidates");
    }
    (kept, removed)
}
