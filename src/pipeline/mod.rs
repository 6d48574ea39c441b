//! Sequential phases over the ledgers.
//!
//! Each phase reads the ledger written by the stage before it, processes its
//! worklist one TestCase at a time and writes its own ledger. A failure inside
//! one TestCase becomes an annotation on that TestCase's record.

mod comparison;
mod evaluation;
mod verification;

pub use comparison::{
    compare_ledger, run_comparison, BatchSummary, ComparisonReport, CorrelationEntry,
    MetricComparison, COMPARED_METRICS,
};
pub use evaluation::{EvaluationPhase, JavaMeasurer, MeasureJob, Measurer};
pub use verification::VerificationPhase;

use crate::config::{Config, FilterConfig};
use crate::resolver::ProjectResolver;

/// Apply the class filter and the limit, keeping ledger order.
pub fn select_worklist<'a, T>(
    items: impl IntoIterator<Item = &'a T>,
    filter: &FilterConfig,
    class_of: impl Fn(&T) -> &str,
) -> Vec<&'a T>
where
    T: 'a,
{
    let selected = items
        .into_iter()
        .filter(|item| filter.accepts(class_of(item)));
    match filter.limit {
        Some(limit) => selected.take(limit).collect(),
        None => selected.collect(),
    }
}

/// A resolver over the configured project roots, with an empty cache.
pub fn resolver_for(config: &Config) -> ProjectResolver {
    let roots = config
        .projects
        .roots
        .iter()
        .map(|root| config.resolve(root))
        .collect();
    ProjectResolver::new(roots, config.projects.fallback_search_depth)
}
