//! Weighted categorical sampling.
//!
//! Two flavours, matching how the generators describe their mixes:
//!   - cumulative: weights are absolute probabilities. A single roll walks the
//!     running sum; any residual mass below 1.0 lands on the last entry.
//!   - normalized: weights are relative and scaled by their total.

use crate::{
    error::{GenError, GenResult},
    rng::StreamRng,
};
use serde::{Deserialize, Serialize};

/// One entry of a weighted distribution as it appears in config files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Weighted<T> {
    pub value: T,
    pub weight: f64,
}

impl<T> Weighted<T> {
    pub fn new(value: T, weight: f64) -> Self {
        Self { value, weight }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Cumulative,
    Normalized,
}

/// A validated, ready-to-sample categorical distribution.
#[derive(Debug, Clone)]
pub struct WeightedTable<T> {
    entries: Vec<Weighted<T>>,
    total: f64,
    mode: Mode,
}

impl<T> WeightedTable<T> {
    /// Absolute probabilities; the total must not exceed 1.0.
    pub fn cumulative(name: &str, entries: Vec<Weighted<T>>) -> GenResult<Self> {
        let total = validate(name, &entries)?;
        if total > 1.0 + 1e-9 {
            return Err(GenError::InvalidDistribution {
                name: name.to_string(),
                reason: format!("weights sum to {total:.4}, above 1.0"),
            });
        }
        Ok(Self {
            entries,
            total,
            mode: Mode::Cumulative,
        })
    }

    /// Relative weights, scaled by their total.
    pub fn normalized(name: &str, entries: Vec<Weighted<T>>) -> GenResult<Self> {
        let total = validate(name, &entries)?;
        Ok(Self {
            entries,
            total,
            mode: Mode::Normalized,
        })
    }

    /// Draw one value. Consumes exactly one roll from `rng`.
    pub fn sample(&self, rng: &mut StreamRng) -> &T {
        let roll = match self.mode {
            Mode::Cumulative => rng.next_f64(),
            Mode::Normalized => rng.next_f64() * self.total,
        };
        let mut cumulative = 0.0;
        for entry in &self.entries {
            cumulative += entry.weight;
            if roll < cumulative {
                return &entry.value;
            }
        }
        // Validation guarantees at least one entry.
        &self.entries[self.entries.len() - 1].value
    }
}

fn validate<T>(name: &str, entries: &[Weighted<T>]) -> GenResult<f64> {
    let invalid = |reason: String| GenError::InvalidDistribution {
        name: name.to_string(),
        reason,
    };
    if entries.is_empty() {
        return Err(invalid("no entries".into()));
    }
    let mut total = 0.0;
    for (i, entry) in entries.iter().enumerate() {
        if !entry.weight.is_finite() || entry.weight < 0.0 {
            return Err(invalid(format!("entry {i} has weight {}", entry.weight)));
        }
        total += entry.weight;
    }
    if total <= 0.0 {
        return Err(invalid("weights sum to zero".into()));
    }
    Ok(total)
}
