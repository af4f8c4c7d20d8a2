//! escaly: synthetic event-log generator and SQL report runner.
//!
//! Usage:
//!   escaly funnel --n-users 1500 --seed 42 --out mock_data.csv
//!   escaly retention --accounts 80 --weeks 12 --out data/events.csv
//!   escaly funnel-report --csv mock_data.csv
//!   escaly retention-report --csv data/events.csv --figs-dir figs
//!   escaly query --csv mock_data.csv queries/*.sql

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use escaly_core::{
    analysis::{self, RetentionReport, FUNNEL_TABLE},
    config::GeneratorConfig,
    engine::{Engine, FunnelDataset, RetentionDataset},
    report,
    store::{AnalysisStore, QueryResult},
};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "escaly", version, about = "Synthetic product-analytics event logs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate the activation-funnel event log.
    Funnel {
        #[arg(long)]
        n_users: Option<usize>,
        #[arg(long)]
        seed: Option<u64>,
        /// First signup day (YYYY-MM-DD, UTC).
        #[arg(long)]
        start: Option<NaiveDate>,
        /// Last signup day (YYYY-MM-DD, UTC).
        #[arg(long)]
        end: Option<NaiveDate>,
        #[arg(long, default_value = "mock_data.csv")]
        out: PathBuf,
        /// JSON file with generator settings; flags override it.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Generate the retention-cohort event log.
    Retention {
        #[arg(long)]
        accounts: Option<usize>,
        #[arg(long)]
        weeks: Option<u32>,
        #[arg(long)]
        start_date: Option<NaiveDate>,
        #[arg(long)]
        signup_span_days: Option<u32>,
        #[arg(long)]
        multi_share: Option<f64>,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long, default_value = "data/events.csv")]
        out: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Run SQL files against a CSV and print each result as Markdown.
    Query {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long, default_value = FUNNEL_TABLE)]
        table: String,
        #[arg(required = true)]
        sql_files: Vec<PathBuf>,
    },
    /// Run the bundled funnel queries against a funnel CSV.
    FunnelReport {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Build the retention matrix and curve data from a retention CSV.
    RetentionReport {
        #[arg(long)]
        csv: PathBuf,
        /// Directory of *.sql scripts to run instead of the bundled pipeline.
        #[arg(long)]
        sql_dir: Option<PathBuf>,
        #[arg(long, default_value = "figs")]
        figs_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::init();

    match Cli::parse().command {
        Command::Funnel {
            n_users,
            seed,
            start,
            end,
            out,
            config,
        } => {
            let mut cfg = load_config(config.as_deref())?;
            let funnel = &mut cfg.funnel;
            if let Some(n) = n_users {
                funnel.n_users = n;
            }
            if let Some(s) = seed {
                funnel.seed = s;
            }
            if let Some(d) = start {
                funnel.start = d;
            }
            if let Some(d) = end {
                funnel.end = d;
            }
            let dataset = Engine::funnel(&cfg).context("funnel generation failed")?;
            dataset
                .write_csv(&out)
                .with_context(|| format!("cannot write {}", out.display()))?;
            print_funnel_summary(&dataset, &out);
        }
        Command::Retention {
            accounts,
            weeks,
            start_date,
            signup_span_days,
            multi_share,
            seed,
            out,
            config,
        } => {
            let mut cfg = load_config(config.as_deref())?;
            let retention = &mut cfg.retention;
            if let Some(n) = accounts {
                retention.accounts = n;
            }
            if let Some(w) = weeks {
                retention.weeks = w;
            }
            if let Some(d) = start_date {
                retention.start_date = d;
            }
            if let Some(span) = signup_span_days {
                retention.signup_span_days = span;
            }
            if let Some(share) = multi_share {
                retention.multi_share = share;
            }
            if let Some(s) = seed {
                retention.seed = s;
            }
            let dataset = Engine::retention(&cfg).context("retention generation failed")?;
            dataset
                .write_csv(&out)
                .with_context(|| format!("cannot write {}", out.display()))?;
            print_retention_summary(&dataset, &out);
        }
        Command::Query {
            csv,
            table,
            sql_files,
        } => run_query_files(&csv, &table, &sql_files)?,
        Command::FunnelReport { csv } => {
            let results = analysis::funnel_report(&csv)
                .with_context(|| format!("funnel report over {} failed", csv.display()))?;
            for (name, result) in results {
                println!("## {name}");
                println!();
                print_result(&result);
            }
        }
        Command::RetentionReport {
            csv,
            sql_dir,
            figs_dir,
        } => {
            let retention = RetentionReport::from_csv(&csv, sql_dir.as_deref())
                .with_context(|| format!("retention pipeline over {} failed", csv.display()))?;
            println!("=== RETENTION MATRIX ===");
            println!("{}", retention.matrix_markdown());
            if let Some(summary) = retention.readme_markdown() {
                println!("=== README SUMMARY (cohort-size weighted) ===");
                println!("{summary}");
            }
            let artifacts = retention
                .export(&figs_dir)
                .with_context(|| format!("cannot write into {}", figs_dir.display()))?;
            println!("  matrix: {}", artifacts.matrix_csv.display());
            if let Some(curve) = artifacts.curve_csv {
                println!("  curve:  {}", curve.display());
            }
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<GeneratorConfig> {
    match path {
        Some(p) => GeneratorConfig::load(p)
            .with_context(|| format!("cannot load config {}", p.display())),
        None => Ok(GeneratorConfig::default()),
    }
}

/// Each file is run on its own; a failure prints an error line and the
/// rest still run.
fn run_query_files(csv: &Path, table: &str, sql_files: &[PathBuf]) -> Result<()> {
    let store = AnalysisStore::in_memory()?;
    let loaded = store
        .load_csv(table, csv)
        .with_context(|| format!("cannot load {} into {table}", csv.display()))?;
    log::info!("loaded {loaded} rows into {table}");

    for path in sql_files {
        println!("## {}", path.display());
        println!();
        match store.run_query_file(path) {
            Ok(result) => print_result(&result),
            Err(e) => println!("ERROR: {e}\n"),
        }
    }
    Ok(())
}

fn print_result(result: &QueryResult) {
    if result.is_empty() {
        println!("(no rows)\n");
    } else {
        println!("{}", report::render_markdown(result));
    }
}

fn print_funnel_summary(dataset: &FunnelDataset, out: &Path) {
    let s = &dataset.summary;
    println!("=== FUNNEL SUMMARY ===");
    println!("  seed:               {}", dataset.seed);
    println!("  output:             {}", out.display());
    println!("  rows written:       {}", s.rows);
    println!("  signups:            {}", s.signups);
    println!("  selected scale:     {}", s.selected_scale);
    println!("  completed:          {}", s.completed_assessment);
    println!("  activated:          {}", s.activated);
    println!("  activation rate:    {:.1}%", s.activation_rate() * 100.0);
}

fn print_retention_summary(dataset: &RetentionDataset, out: &Path) {
    let s = &dataset.summary;
    println!("=== RETENTION SUMMARY ===");
    println!("  seed:               {}", dataset.seed);
    println!("  output:             {}", out.display());
    println!("  rows written:       {}", s.rows);
    println!("  orgs:               {}", s.orgs);
    println!("  multi-user orgs:    {}", s.multi_user_orgs);
    println!("  single-user orgs:   {}", s.single_user_orgs);
    println!("  signups:            {}", s.signups);
    println!("  assessments:        {}", s.assessments);
    println!("  reports:            {}", s.reports);
}
