//! Generator trait.
//!
//! RULE: Every dataset generator implements EventGenerator.
//! The engine hands each generator its own deterministic stream;
//! a generator never creates an RNG of its own.

use crate::{
    error::GenResult,
    export::{CsvSchema, TimedRow},
    rng::{StreamRng, StreamSlot},
};
use serde::Serialize;

/// The contract every dataset generator must fulfill.
pub trait EventGenerator {
    /// Output row type, written with a fixed CSV schema.
    type Row: CsvSchema + TimedRow + Serialize;

    /// Counts reported back to the caller after a run.
    type Summary;

    /// Unique stable name for this generator.
    fn name(&self) -> &'static str;

    /// The stream slot this generator draws from.
    fn slot(&self) -> StreamSlot;

    /// Produce all rows, in emission order.
    fn generate(&self, rng: &mut StreamRng) -> GenResult<(Vec<Self::Row>, Self::Summary)>;
}
