//! Latency-sample compression.
//!
//! Raw duration buffers are compressed into a single [`CompressedTiming`]
//! block (mean plus the 50/75/90/95/99 percentiles) once they fill, keeping
//! per-operation memory bounded no matter how long the reporting window runs.

use std::collections::BTreeMap;

use appshield_common::unix_ms;
use serde::Serialize;

/// The percentiles reported for every compressed block.
pub const REPORTED_PERCENTILES: [u8; 5] = [50, 75, 90, 95, 99];

/// A statistical summary replacing a buffer of raw latency samples.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressedTiming {
    #[serde(rename = "averageInMS")]
    pub average_in_ms: f64,
    /// Percentile label ("50".."99") to value in milliseconds.
    pub percentiles: BTreeMap<String, f64>,
    /// Unix milliseconds when the block was produced.
    pub compressed_at: i64,
}

/// Index of percentile `p` in a sorted sample list of length `count`:
/// `ceil(count * p / 100) - 1`, clamped to the valid range. `p == 0` maps to
/// index 0.
pub fn percentile_index(count: usize, p: u8) -> usize {
    if count == 0 || p == 0 {
        return 0;
    }
    let rank = (count * p as usize).div_ceil(100);
    rank.saturating_sub(1).min(count - 1)
}

/// Calculates the requested percentiles over `values`. Returns `None` for an
/// empty input; statistics are best-effort and must never panic into the
/// caller's request.
pub fn calculate(percentiles: &[u8], values: &[f64]) -> Option<Vec<f64>> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    Some(
        percentiles
            .iter()
            .map(|&p| sorted[percentile_index(sorted.len(), p)])
            .collect(),
    )
}

/// Compresses a sample buffer into one timing block.
pub fn compress(samples: &[f64]) -> Option<CompressedTiming> {
    let values = calculate(&REPORTED_PERCENTILES, samples)?;
    let average = samples.iter().sum::<f64>() / samples.len() as f64;
    Some(CompressedTiming {
        average_in_ms: average,
        percentiles: REPORTED_PERCENTILES
            .iter()
            .zip(values)
            .map(|(p, v)| (p.to_string(), v))
            .collect(),
        compressed_at: unix_ms(),
    })
}
