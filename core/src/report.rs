//! Markdown tables and plot-ready series from query results.

use crate::{
    error::{GenError, GenResult},
    store::QueryResult,
};
use rusqlite::types::Value;
use serde::Serialize;
use std::{collections::BTreeMap, fs, path::Path};

/// Week columns quoted in the README summary.
pub const README_WEEKS: [u32; 4] = [1, 4, 8, 12];

pub fn format_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Integer(i) => i.to_string(),
        Value::Real(f) => f.to_string(),
        Value::Text(s) => s.clone(),
        Value::Blob(b) => format!("<{} bytes>", b.len()),
    }
}

fn is_numeric_column(result: &QueryResult, index: usize) -> bool {
    let mut any = false;
    for row in &result.rows {
        match row.get(index) {
            Some(Value::Integer(_)) | Some(Value::Real(_)) => any = true,
            Some(Value::Null) | None => {}
            Some(_) => return false,
        }
    }
    any
}

/// Render a pipe table. Numeric columns are right-aligned.
pub fn render_markdown(result: &QueryResult) -> String {
    let cell = |s: &str| s.replace('|', "\\|");
    let mut out = String::new();
    out.push_str("| ");
    out.push_str(
        &result
            .columns
            .iter()
            .map(|c| cell(c))
            .collect::<Vec<_>>()
            .join(" | "),
    );
    out.push_str(" |\n|");
    for i in 0..result.columns.len() {
        out.push_str(if is_numeric_column(result, i) { "---:|" } else { ":---|" });
    }
    out.push('\n');
    for row in &result.rows {
        let cells: Vec<String> = row.iter().map(|v| cell(&format_value(v))).collect();
        out.push_str("| ");
        out.push_str(&cells.join(" | "));
        out.push_str(" |\n");
    }
    out
}

/// Write a query result as CSV with a header row.
pub fn write_result_csv(path: &Path, result: &QueryResult) -> GenResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut csv = csv::Writer::from_path(path)?;
    csv.write_record(&result.columns)?;
    for row in &result.rows {
        csv.write_record(row.iter().map(format_value))?;
    }
    csv.flush()?;
    log::info!("report: wrote {}", path.display());
    Ok(())
}

// ── Retention matrix ───────────────────────────────────────────────

/// One cohort row of the retention matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct RetentionRow {
    pub signup_week: String,
    pub team_seg: String,
    pub cohort_size: i64,
    /// (week, percent of the cohort active), in column order.
    pub weeks: Vec<(u32, f64)>,
}

/// Cohort-size weighted retention for one team segment.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentRetention {
    pub team_seg: String,
    pub cohort_size: i64,
    pub points: Vec<(u32, f64)>,
}

impl SegmentRetention {
    pub fn at_week(&self, week: u32) -> Option<f64> {
        self.points.iter().find(|(w, _)| *w == week).map(|(_, pct)| *pct)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurvePoint {
    pub team_seg: String,
    pub week_n: u32,
    pub retention_pct: f64,
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Integer(i) => Some(*i as f64),
        Value::Real(f) => Some(*f),
        Value::Text(s) => s.parse().ok(),
        _ => None,
    }
}

fn week_column(name: &str) -> Option<u32> {
    name.strip_prefix('w')?.parse().ok()
}

/// Interpret a `retention_matrix` result. Week columns are those named
/// `w<N>`; `signup_week`, `team_seg` and `cohort_size` are required.
pub fn parse_retention_matrix(result: &QueryResult) -> GenResult<Vec<RetentionRow>> {
    let required = |name: &str| {
        result
            .column_index(name)
            .ok_or_else(|| GenError::config("retention_matrix", format!("missing column {name}")))
    };
    let seg_idx = required("team_seg")?;
    let size_idx = required("cohort_size")?;
    let week_idx = required("signup_week")?;
    let week_cols: Vec<(usize, u32)> = result
        .columns
        .iter()
        .enumerate()
        .filter_map(|(i, c)| week_column(c).map(|w| (i, w)))
        .collect();

    Ok(result
        .rows
        .iter()
        .map(|row| RetentionRow {
            signup_week: format_value(&row[week_idx]),
            team_seg: format_value(&row[seg_idx]),
            cohort_size: as_f64(&row[size_idx]).unwrap_or(0.0) as i64,
            weeks: week_cols
                .iter()
                .map(|&(i, w)| (w, as_f64(&row[i]).unwrap_or(0.0)))
                .collect(),
        })
        .collect())
}

/// `Σ(pct × cohort_size) / Σ cohort_size` per segment and week.
/// Segments come back sorted by name.
pub fn weighted_by_segment(rows: &[RetentionRow]) -> Vec<SegmentRetention> {
    let mut groups: BTreeMap<&str, Vec<&RetentionRow>> = BTreeMap::new();
    for row in rows {
        groups.entry(row.team_seg.as_str()).or_default().push(row);
    }

    groups
        .into_iter()
        .map(|(seg, group)| {
            let total: i64 = group.iter().map(|r| r.cohort_size).sum();
            let weeks: Vec<u32> = group[0].weeks.iter().map(|(w, _)| *w).collect();
            let points = weeks
                .iter()
                .enumerate()
                .map(|(i, &week)| {
                    let weighted: f64 = group
                        .iter()
                        .map(|r| r.weeks.get(i).map_or(0.0, |(_, pct)| *pct) * r.cohort_size as f64)
                        .sum();
                    let pct = if total > 0 { weighted / total as f64 } else { 0.0 };
                    (week, pct)
                })
                .collect();
            SegmentRetention {
                team_seg: seg.to_string(),
                cohort_size: total,
                points,
            }
        })
        .collect()
}

pub fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

/// README table of weighted retention by segment, or `None` when none of
/// the README week columns are present.
pub fn render_readme_summary(segments: &[SegmentRetention]) -> Option<String> {
    let weeks: Vec<u32> = README_WEEKS
        .iter()
        .copied()
        .filter(|w| segments.iter().any(|s| s.at_week(*w).is_some()))
        .collect();
    if weeks.is_empty() || segments.is_empty() {
        return None;
    }

    let mut columns = vec!["Cohort Type".to_string()];
    columns.extend(weeks.iter().map(|w| format!("Week {w}")));
    let rows = segments
        .iter()
        .map(|s| {
            let mut row = vec![Value::Text(s.team_seg.clone())];
            row.extend(
                weeks
                    .iter()
                    .map(|w| s.at_week(*w).map_or(Value::Null, |p| Value::Real(round1(p)))),
            );
            row
        })
        .collect();
    Some(render_markdown(&QueryResult { columns, rows }))
}

/// Plot series: one point per segment and week, sorted by segment then week.
pub fn curve_points(segments: &[SegmentRetention]) -> Vec<CurvePoint> {
    let mut points: Vec<CurvePoint> = segments
        .iter()
        .flat_map(|s| {
            s.points.iter().map(|&(week_n, retention_pct)| CurvePoint {
                team_seg: s.team_seg.clone(),
                week_n,
                retention_pct,
            })
        })
        .collect();
    points.sort_by(|a, b| a.team_seg.cmp(&b.team_seg).then(a.week_n.cmp(&b.week_n)));
    points
}

pub fn write_curve_csv(path: &Path, points: &[CurvePoint]) -> GenResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut csv = csv::Writer::from_path(path)?;
    for point in points {
        csv.serialize(point)?;
    }
    csv.flush()?;
    log::info!("report: wrote {} curve points to {}", points.len(), path.display());
    Ok(())
}
