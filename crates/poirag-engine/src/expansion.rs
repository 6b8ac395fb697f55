//! Expansion search: what to try when a query comes back empty.
//!
//! Strategies are ordered from least to most aggressive and applied as plan
//! rewrites; the executor re-runs the fetch after each rewrite. At most
//! `max_attempts` rewrites run, and the radius never exceeds the hard cap.

use crate::ontology;
use poirag_core::config::ExpansionConfig;
use poirag_core::models::result::ExpansionSuggestion;
use poirag_core::models::QueryPlan;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpansionStrategy {
    /// Double the search radius, capped at the configured maximum.
    DoubleRadius,
    /// Lift each category to its taxonomy parent.
    GeneralizeCategories,
    /// Radius doubling and generalization together.
    Both,
    /// Last resort: search the area without any category constraint.
    DropCategories,
}

impl ExpansionStrategy {
    pub fn label(&self) -> &'static str {
        match self {
            Self::DoubleRadius => "double_radius",
            Self::GeneralizeCategories => "generalize_categories",
            Self::Both => "radius_and_generalize",
            Self::DropCategories => "drop_categories",
        }
    }
}

/// Strategies applicable to this plan, in the order they should be tried.
pub fn strategies_for(plan: &QueryPlan, config: &ExpansionConfig) -> Vec<ExpansionStrategy> {
    let radius_headroom = plan.radius_m < config.max_radius_m;
    let generalizable = ontology::can_generalize(&plan.categories);

    let mut out = Vec::new();
    if radius_headroom {
        out.push(ExpansionStrategy::DoubleRadius);
    }
    if generalizable {
        out.push(ExpansionStrategy::GeneralizeCategories);
    }
    if radius_headroom && generalizable {
        out.push(ExpansionStrategy::Both);
    }
    if !plan.categories.is_empty() {
        out.push(ExpansionStrategy::DropCategories);
    }
    out
}

/// Rewrite the plan under a strategy. The input plan is left untouched so a
/// later strategy starts from the original request, not a previous rewrite.
pub fn apply(
    strategy: ExpansionStrategy,
    plan: &QueryPlan,
    config: &ExpansionConfig,
) -> QueryPlan {
    let mut adjusted = plan.clone();
    match strategy {
        ExpansionStrategy::DoubleRadius => {
            adjusted.radius_m = (plan.radius_m * 2.0).min(config.max_radius_m);
        }
        ExpansionStrategy::GeneralizeCategories => {
            adjusted.categories = ontology::generalize_categories(&plan.categories);
        }
        ExpansionStrategy::Both => {
            adjusted.radius_m = (plan.radius_m * 2.0).min(config.max_radius_m);
            adjusted.categories = ontology::generalize_categories(&plan.categories);
        }
        ExpansionStrategy::DropCategories => {
            adjusted.categories.clear();
        }
    }
    adjusted
}

/// Structured advice for the caller after every attempted strategy failed.
pub fn suggestion(attempted: &[ExpansionStrategy], plan: &QueryPlan) -> ExpansionSuggestion {
    let final_radius_m = attempted
        .iter()
        .filter(|s| {
            matches!(
                s,
                ExpansionStrategy::DoubleRadius | ExpansionStrategy::Both
            )
        })
        .fold(plan.radius_m, |r, _| r * 2.0)
        .min(10_000.0);
    ExpansionSuggestion {
        attempted_strategies: attempted.iter().map(|s| s.label().to_string()).collect(),
        final_radius_m,
        generalized_categories: ontology::generalize_categories(&plan.categories),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_order_least_aggressive_first() {
        let plan = QueryPlan::poi_search()
            .radius(1_000.0)
            .categories(vec!["咖啡厅".to_string()]);
        let strategies = strategies_for(&plan, &ExpansionConfig::default());
        assert_eq!(
            strategies,
            vec![
                ExpansionStrategy::DoubleRadius,
                ExpansionStrategy::GeneralizeCategories,
                ExpansionStrategy::Both,
                ExpansionStrategy::DropCategories,
            ]
        );
    }

    #[test]
    fn test_radius_at_cap_skips_doubling() {
        let plan = QueryPlan::poi_search()
            .radius(10_000.0)
            .categories(vec!["咖啡厅".to_string()]);
        let strategies = strategies_for(&plan, &ExpansionConfig::default());
        assert!(!strategies.contains(&ExpansionStrategy::DoubleRadius));
        assert!(!strategies.contains(&ExpansionStrategy::Both));
    }

    #[test]
    fn test_apply_doubles_and_caps() {
        let config = ExpansionConfig::default();
        let plan = QueryPlan::poi_search().radius(6_000.0);
        let adjusted = apply(ExpansionStrategy::DoubleRadius, &plan, &config);
        assert_eq!(adjusted.radius_m, config.max_radius_m);
    }

    #[test]
    fn test_apply_starts_from_original_plan() {
        let config = ExpansionConfig::default();
        let plan = QueryPlan::poi_search()
            .radius(1_000.0)
            .categories(vec!["咖啡厅".to_string()]);

        let first = apply(ExpansionStrategy::DoubleRadius, &plan, &config);
        assert_eq!(first.radius_m, 2_000.0);
        assert_eq!(first.categories, plan.categories);

        let second = apply(ExpansionStrategy::GeneralizeCategories, &plan, &config);
        assert_eq!(second.radius_m, 1_000.0);
        assert_eq!(second.categories, vec!["餐饮服务".to_string()]);
    }

    #[test]
    fn test_uncategorized_plan_offers_radius_only() {
        let plan = QueryPlan::poi_search().radius(500.0);
        let strategies = strategies_for(&plan, &ExpansionConfig::default());
        assert_eq!(strategies, vec![ExpansionStrategy::DoubleRadius]);
    }

    #[test]
    fn test_suggestion_reports_attempts() {
        let plan = QueryPlan::poi_search()
            .radius(1_000.0)
            .categories(vec!["咖啡厅".to_string()]);
        let attempted = [
            ExpansionStrategy::DoubleRadius,
            ExpansionStrategy::GeneralizeCategories,
        ];
        let advice = suggestion(&attempted, &plan);
        assert_eq!(
            advice.attempted_strategies,
            vec!["double_radius", "generalize_categories"]
        );
        assert_eq!(advice.final_radius_m, 2_000.0);
        assert_eq!(advice.generalized_categories, vec!["餐饮服务".to_string()]);
    }
}
