//! Grouped statistical rollups of salary observations.
//!
//! Each function operates on a slice of observation references so that nested breakdowns can
//! regroup a subset without copying.

use crate::models::{
    CurrencyBreakdown, GroupBreakdown, GroupField, SalaryObservation, SourceBreakdown, TopGroup,
};
use crate::statistics::{to_output, Accumulator};

use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Default number of entries in a top-N ranking.
pub const TOP_N: usize = 5;

/// Group observations by a field, ordered ascending by value.
///
/// # Arguments
///
/// * `observations`: Observations to group
/// * `field`: Field to group by
/// * `skip_blank`: Whether to exclude observations with an empty or whitespace value
fn group_by<'a>(
    observations: &[&'a SalaryObservation],
    field: GroupField,
    skip_blank: bool,
) -> BTreeMap<&'a str, Vec<&'a SalaryObservation>> {
    let mut groups: BTreeMap<&str, Vec<&SalaryObservation>> = BTreeMap::new();
    for observation in observations.iter().copied() {
        let value = field.value(observation);
        if skip_blank && value.trim().is_empty() {
            continue;
        }
        groups.entry(value).or_default().push(observation);
    }
    groups
}

/// Count and mean total compensation per source, ordered by source name.
pub fn source_breakdown(observations: &[&SalaryObservation]) -> Vec<SourceBreakdown> {
    group_by(observations, GroupField::Source, false)
        .into_iter()
        .map(|(source, group)| {
            let total_compensation: Accumulator =
                group.iter().map(|o| o.total_compensation).collect();
            SourceBreakdown {
                source: source.to_string(),
                observations: group.len() as u64,
                avg_total_compensation: to_output(total_compensation.mean()),
            }
        })
        .collect()
}

/// Statistics per currency, ordered by currency code.
///
/// Values in different currencies are never combined.
pub fn currency_breakdown(observations: &[&SalaryObservation]) -> Vec<CurrencyBreakdown> {
    group_by(observations, GroupField::Currency, false)
        .into_iter()
        .map(|(currency, group)| {
            let mut base_salary_min = Accumulator::default();
            let mut base_salary_max = Accumulator::default();
            let mut total_compensation = Accumulator::default();
            for observation in &group {
                base_salary_min.add(observation.base_salary_min);
                base_salary_max.add(observation.base_salary_max);
                total_compensation.add(observation.total_compensation);
            }
            CurrencyBreakdown {
                currency: currency.to_string(),
                observations: group.len() as u64,
                base_salary_min: base_salary_min.stats(),
                base_salary_max: base_salary_max.stats(),
                total_compensation: total_compensation.stats(),
                sources: source_breakdown(&group),
            }
        })
        .collect()
}

/// Per-currency statistics for each non-blank value of a field, ordered by value.
pub fn group_breakdown(
    observations: &[&SalaryObservation],
    field: GroupField,
) -> Vec<GroupBreakdown> {
    group_by(observations, field, true)
        .into_iter()
        .map(|(value, group)| GroupBreakdown {
            value: value.to_string(),
            observations: group.len() as u64,
            currencies: currency_breakdown(&group),
        })
        .collect()
}

/// Rank the non-blank values of a field by mean total compensation.
///
/// Values are ordered by descending mean, then ascending value. Groups without any total
/// compensation are ranked last.
///
/// # Arguments
///
/// * `observations`: Observations to rank
/// * `field`: Field to group by
/// * `limit`: Maximum number of entries to return
pub fn top_groups(
    observations: &[&SalaryObservation],
    field: GroupField,
    limit: usize,
) -> Vec<TopGroup> {
    let mut groups: hashbrown::HashMap<&str, (u64, Accumulator)> = hashbrown::HashMap::new();
    for observation in observations.iter().copied() {
        let value = field.value(observation);
        if value.trim().is_empty() {
            continue;
        }
        let (count, total_compensation) = groups.entry(value).or_default();
        *count += 1;
        total_compensation.add(observation.total_compensation);
    }

    let mut ranked = groups
        .into_iter()
        .map(|(value, (count, total_compensation))| (value, count, total_compensation.mean()))
        .collect::<Vec<_>>();
    ranked.sort_by(|(value_a, _, mean_a), (value_b, _, mean_b)| {
        let by_mean = match (mean_a, mean_b) {
            (Some(a), Some(b)) => b.cmp(a),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        by_mean.then_with(|| value_a.cmp(value_b))
    });

    ranked
        .into_iter()
        .take(limit)
        .map(|(value, count, mean)| TopGroup {
            value: value.to_string(),
            observations: count,
            avg_total_compensation: to_output(mean),
        })
        .collect()
}
