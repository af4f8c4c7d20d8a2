//! SQL pipelines over generated datasets.
//!
//! The bundled SQL lives in `sql/` at the workspace root and is compiled
//! into the library, so the reports work without a checkout.

use crate::{
    error::{GenError, GenResult},
    report::{self, CurvePoint, RetentionRow, SegmentRetention},
    store::{read_sql_file, AnalysisStore, QueryResult},
};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Table the funnel CSV is loaded into.
pub const FUNNEL_TABLE: &str = "mock_events";
/// Table the retention CSV is loaded into.
pub const RETENTION_TABLE: &str = "events";
/// Final table of the retention pipeline.
pub const RETENTION_MATRIX: &str = "retention_matrix";

const FUNNEL_QUERIES: &[(&str, &str)] = &[
    ("funnel_steps", include_str!("../../sql/funnel/01_funnel_steps.sql")),
    (
        "activation_by_channel",
        include_str!("../../sql/funnel/02_activation_by_channel.sql"),
    ),
    (
        "activation_by_plan",
        include_str!("../../sql/funnel/03_activation_by_plan.sql"),
    ),
    ("time_to_report", include_str!("../../sql/funnel/04_time_to_report.sql")),
];

const RETENTION_SCRIPTS: &[(&str, &str)] = &[
    ("00_setup", include_str!("../../sql/retention/00_setup.sql")),
    (
        "01_user_weekly_activity",
        include_str!("../../sql/retention/01_user_weekly_activity.sql"),
    ),
    (
        "02_org_weekly_active",
        include_str!("../../sql/retention/02_org_weekly_active.sql"),
    ),
    (
        "03_team_segment_w4",
        include_str!("../../sql/retention/03_team_segment_w4.sql"),
    ),
    ("04_retention_long", include_str!("../../sql/retention/04_retention_long.sql")),
    (
        "05_retention_matrix",
        include_str!("../../sql/retention/05_retention_matrix.sql"),
    ),
];

/// A named piece of SQL, bundled or read from disk.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlSource {
    pub name: String,
    pub sql: String,
}

impl SqlSource {
    fn bundled(pairs: &[(&str, &str)]) -> Vec<Self> {
        pairs
            .iter()
            .map(|(name, sql)| Self {
                name: name.to_string(),
                sql: sql.to_string(),
            })
            .collect()
    }

    pub fn from_file(path: &Path) -> GenResult<Self> {
        let sql = read_sql_file(path)?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self { name, sql })
    }

    /// Every `*.sql` file in `dir`, ordered by file name.
    pub fn from_dir(dir: &Path) -> GenResult<Vec<Self>> {
        let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "sql"))
            .collect();
        if paths.is_empty() {
            return Err(GenError::SqlFileNotFound {
                path: dir.join("*.sql").display().to_string(),
            });
        }
        paths.sort();
        paths.iter().map(|p| Self::from_file(p)).collect()
    }
}

pub fn bundled_funnel_queries() -> Vec<SqlSource> {
    SqlSource::bundled(FUNNEL_QUERIES)
}

pub fn bundled_retention_scripts() -> Vec<SqlSource> {
    SqlSource::bundled(RETENTION_SCRIPTS)
}

/// Run each query independently. A failure is reported in place and does
/// not stop the remaining queries.
pub fn run_queries(
    store: &AnalysisStore,
    sources: &[SqlSource],
) -> Vec<(String, GenResult<QueryResult>)> {
    sources
        .iter()
        .map(|source| {
            let result = store.query(&source.sql);
            if let Err(e) = &result {
                log::warn!("analysis: query '{}' failed: {}", source.name, e);
            }
            (source.name.clone(), result)
        })
        .collect()
}

/// Load a funnel CSV and run the bundled funnel queries over it.
pub fn funnel_report(csv_path: &Path) -> GenResult<Vec<(String, QueryResult)>> {
    let store = AnalysisStore::in_memory()?;
    let rows = store.load_csv(FUNNEL_TABLE, csv_path)?;
    log::info!("analysis: loaded {} funnel rows", rows);
    run_queries(&store, &bundled_funnel_queries())
        .into_iter()
        .map(|(name, result)| result.map(|r| (name, r)))
        .collect()
}

/// Output of the retention pipeline.
#[derive(Debug, Clone)]
pub struct RetentionReport {
    pub matrix: QueryResult,
    pub cohorts: Vec<RetentionRow>,
    pub segments: Vec<SegmentRetention>,
}

/// Files written by [`RetentionReport::export`].
#[derive(Debug, Clone, PartialEq)]
pub struct RetentionArtifacts {
    pub matrix_csv: PathBuf,
    pub curve_csv: Option<PathBuf>,
}

impl RetentionReport {
    /// Run `scripts` in order against a store holding the `events` table,
    /// then read back `retention_matrix`.
    pub fn build(store: &AnalysisStore, scripts: &[SqlSource]) -> GenResult<Self> {
        if !store.table_exists(RETENTION_TABLE)? {
            return Err(GenError::MissingTable {
                name: RETENTION_TABLE.to_string(),
            });
        }
        for script in scripts {
            log::debug!("analysis: running {}", script.name);
            store.execute_script(&script.sql)?;
        }
        let matrix = store.select_all(RETENTION_MATRIX)?;
        let cohorts = report::parse_retention_matrix(&matrix)?;
        let segments = report::weighted_by_segment(&cohorts);
        log::info!(
            "analysis: retention matrix has {} cohorts across {} segments",
            cohorts.len(),
            segments.len()
        );
        Ok(Self {
            matrix,
            cohorts,
            segments,
        })
    }

    /// Load a retention CSV and run the bundled scripts, or those in
    /// `sql_dir` when given.
    pub fn from_csv(csv_path: &Path, sql_dir: Option<&Path>) -> GenResult<Self> {
        let store = AnalysisStore::in_memory()?;
        let rows = store.load_csv(RETENTION_TABLE, csv_path)?;
        log::info!("analysis: loaded {} retention rows", rows);
        let scripts = match sql_dir {
            Some(dir) => SqlSource::from_dir(dir)?,
            None => bundled_retention_scripts(),
        };
        Self::build(&store, &scripts)
    }

    pub fn matrix_markdown(&self) -> String {
        report::render_markdown(&self.matrix)
    }

    pub fn readme_markdown(&self) -> Option<String> {
        let summary = report::render_readme_summary(&self.segments);
        if summary.is_none() {
            log::warn!("analysis: no week 1/4/8/12 columns, skipping README summary");
        }
        summary
    }

    pub fn curve(&self) -> Vec<CurvePoint> {
        report::curve_points(&self.segments)
    }

    /// Write `retention_matrix.csv` and, when README weeks are present,
    /// `retention_curve.csv` into `figs_dir`.
    pub fn export(&self, figs_dir: &Path) -> GenResult<RetentionArtifacts> {
        let matrix_csv = figs_dir.join("retention_matrix.csv");
        report::write_result_csv(&matrix_csv, &self.matrix)?;

        let has_readme_weeks = report::README_WEEKS
            .iter()
            .any(|w| self.segments.iter().any(|s| s.at_week(*w).is_some()));
        let curve_csv = if has_readme_weeks {
            let path = figs_dir.join("retention_curve.csv");
            report::write_curve_csv(&path, &self.curve())?;
            Some(path)
        } else {
            log::warn!("analysis: no week 1/4/8/12 columns, skipping retention curve");
            None
        };

        Ok(RetentionArtifacts {
            matrix_csv,
            curve_csv,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_sql_is_present_and_ordered() {
        let scripts = bundled_retention_scripts();
        assert_eq!(scripts.len(), 6);
        assert!(scripts.windows(2).all(|w| w[0].name < w[1].name));
        assert!(scripts.iter().all(|s| !s.sql.trim().is_empty()));
        assert_eq!(bundled_funnel_queries()[0].name, "funnel_steps");
    }

    #[test]
    fn failing_query_does_not_stop_the_rest() {
        let store = AnalysisStore::in_memory().unwrap();
        let sources = vec![
            SqlSource {
                name: "broken".into(),
                sql: "SELECT * FROM nowhere".into(),
            },
            SqlSource {
                name: "ok".into(),
                sql: "SELECT 1 AS one;".into(),
            },
        ];
        let results = run_queries(&store, &sources);
        assert!(results[0].1.is_err());
        let ok = results[1].1.as_ref().unwrap();
        assert_eq!(ok.columns, vec!["one".to_string()]);
    }

    #[test]
    fn retention_pipeline_requires_events_table() {
        let store = AnalysisStore::in_memory().unwrap();
        let err = RetentionReport::build(&store, &bundled_retention_scripts()).unwrap_err();
        assert!(matches!(err, GenError::MissingTable { .. }));
    }

    #[test]
    fn sql_dir_is_read_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("02_b.sql"), "SELECT 2;").unwrap();
        fs::write(dir.path().join("01_a.sql"), "SELECT 1;").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        let sources = SqlSource::from_dir(dir.path()).unwrap();
        let names: Vec<&str> = sources.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["01_a", "02_b"]);
    }

    #[test]
    fn empty_sql_dir_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            SqlSource::from_dir(dir.path()),
            Err(GenError::SqlFileNotFound { .. })
        ));
    }
}
