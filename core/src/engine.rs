//! The generation engine.
//!
//! RULES:
//!   - One master seed per run; each generator draws from its own stream.
//!   - Generators never see each other's streams, so adding or changing
//!     one dataset never shifts another.
//!   - Rows come back in emission order; sorting happens at export.

use crate::{
    cohort::{CohortGenerator, CohortSummary},
    config::GeneratorConfig,
    error::GenResult,
    event::{FunnelEventRow, RetentionEventRow},
    export,
    funnel::{FunnelGenerator, FunnelSummary},
    generator::EventGenerator,
    rng::RngBank,
};
use std::path::Path;

/// The output of one generator run.
#[derive(Debug, Clone)]
pub struct Dataset<R, S> {
    pub seed: u64,
    pub generator: &'static str,
    pub rows: Vec<R>,
    pub summary: S,
}

impl<R, S> Dataset<R, S>
where
    R: export::CsvSchema + export::TimedRow + serde::Serialize,
{
    /// Serialize rows to CSV. Returns the number of rows written.
    pub fn write_csv(&self, path: &Path) -> GenResult<usize> {
        export::write_csv(path, &self.rows)
    }

    /// The CSV text of this dataset, as written by `write_csv`.
    pub fn to_csv_bytes(&self) -> GenResult<Vec<u8>> {
        let mut buf = Vec::new();
        export::write_rows(&mut buf, &self.rows)?;
        Ok(buf)
    }
}

pub type FunnelDataset = Dataset<FunnelEventRow, FunnelSummary>;
pub type RetentionDataset = Dataset<RetentionEventRow, CohortSummary>;

pub struct Engine {
    rng_bank: RngBank,
}

impl Engine {
    pub fn new(seed: u64) -> Self {
        Self {
            rng_bank: RngBank::new(seed),
        }
    }

    pub fn seed(&self) -> u64 {
        self.rng_bank.master_seed()
    }

    /// Run a single generator on its own stream.
    pub fn run<G: EventGenerator>(&self, generator: &G) -> GenResult<Dataset<G::Row, G::Summary>> {
        let mut rng = self.rng_bank.for_stream(generator.slot());
        log::debug!(
            "engine: running '{}' on stream '{}' (seed {})",
            generator.name(),
            rng.name,
            self.seed()
        );
        let (rows, summary) = generator.generate(&mut rng)?;
        Ok(Dataset {
            seed: self.seed(),
            generator: generator.name(),
            rows,
            summary,
        })
    }

    /// Build and run the funnel generator from config.
    pub fn funnel(config: &GeneratorConfig) -> GenResult<FunnelDataset> {
        let generator = FunnelGenerator::new(config.funnel.clone())?;
        Engine::new(config.funnel.seed).run(&generator)
    }

    /// Build and run the retention-cohort generator from config.
    pub fn retention(config: &GeneratorConfig) -> GenResult<RetentionDataset> {
        let generator = CohortGenerator::new(config.retention.clone())?;
        Engine::new(config.retention.seed).run(&generator)
    }
}
