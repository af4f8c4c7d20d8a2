//! escaly-core: synthetic product-analytics event logs and their SQL reports.
//!
//! Two generators share one engine: a signup-to-report activation funnel
//! and a weekly retention cohort of organisations. Their CSV output feeds
//! the analysis pipelines in [`analysis`].

pub mod analysis;
pub mod attributes;
pub mod clock;
pub mod cohort;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod export;
pub mod funnel;
pub mod generator;
pub mod report;
pub mod rng;
pub mod sampler;
pub mod store;
pub mod types;
