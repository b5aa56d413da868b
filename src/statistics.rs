//! Statistical primitives over fixed-point salary values.
//!
//! All arithmetic is performed on [Decimal] values. Results are rounded half-up (away from zero)
//! to [DECIMAL_PLACES] and only converted to floating point when emitted.

use crate::models::{MeasureStats, Percentiles};

use num_traits::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Number of fractional digits in emitted statistics.
pub const DECIMAL_PLACES: u32 = 2;

/// Round a value half-up to [DECIMAL_PLACES].
pub fn round_half_up(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
}

/// Round an optional statistic and convert it for output.
///
/// Returns `None` when the statistic is undefined.
pub fn to_output(value: Option<Decimal>) -> Option<f64> {
    value.map(round_half_up).and_then(|value| value.to_f64())
}

/// Running count, sum, minimum and maximum of one measure.
///
/// Missing (`None`) values are ignored, as an SQL aggregate ignores NULL.
#[derive(Clone, Debug, Default)]
pub struct Accumulator {
    count: u64,
    sum: Decimal,
    min: Option<Decimal>,
    max: Option<Decimal>,
}

impl Accumulator {
    /// Add a value to the accumulator.
    pub fn add(&mut self, value: Option<Decimal>) {
        let Some(value) = value else {
            return;
        };
        self.count += 1;
        self.sum += value;
        self.min = Some(self.min.map_or(value, |min| min.min(value)));
        self.max = Some(self.max.map_or(value, |max| max.max(value)));
    }

    /// Number of non-missing values added.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Unrounded arithmetic mean, or `None` if no values were added.
    pub fn mean(&self) -> Option<Decimal> {
        if self.count == 0 {
            return None;
        }
        self.sum.checked_div(Decimal::from(self.count))
    }

    /// Rounded minimum, maximum and mean.
    pub fn stats(&self) -> MeasureStats {
        MeasureStats {
            min: to_output(self.min),
            max: to_output(self.max),
            avg: to_output(self.mean()),
        }
    }
}

impl FromIterator<Option<Decimal>> for Accumulator {
    fn from_iter<I: IntoIterator<Item = Option<Decimal>>>(iter: I) -> Self {
        let mut accumulator = Self::default();
        iter.into_iter().for_each(|value| accumulator.add(value));
        accumulator
    }
}

/// Compute a percentile of a sorted list by linear interpolation between order statistics.
///
/// For a list of length `n`, the rank is `k = (n - 1) * percentile`. When `k` is integral the
/// order statistic at `k` is returned, otherwise the result is interpolated between the order
/// statistics at `floor(k)` and `ceil(k)` with weight `k - floor(k)`.
///
/// Returns `None` for an empty list.
///
/// # Arguments
///
/// * `sorted`: Values sorted in ascending order
/// * `percentile`: Percentile in the range [0, 1]
pub fn percentile(sorted: &[Decimal], percentile: Decimal) -> Option<Decimal> {
    let last = sorted.len().checked_sub(1)?;
    let rank = Decimal::from(last) * percentile.clamp(Decimal::ZERO, Decimal::ONE);
    let lower_rank = rank.floor();
    let upper_rank = rank.ceil();
    let lower = *sorted.get(lower_rank.to_usize()?)?;
    if lower_rank == upper_rank {
        return Some(lower);
    }
    let upper = *sorted.get(upper_rank.to_usize()?)?;
    let weight = rank - lower_rank;
    Some(lower + (upper - lower) * weight)
}

/// Compute the rounded quartiles of a list of values.
///
/// The values are sorted in place.
pub fn quartiles(values: &mut [Decimal]) -> Percentiles {
    values.sort_unstable();
    Percentiles {
        p25: to_output(percentile(values, Decimal::new(25, 2))),
        median: to_output(percentile(values, Decimal::new(50, 2))),
        p75: to_output(percentile(values, Decimal::new(75, 2))),
    }
}
