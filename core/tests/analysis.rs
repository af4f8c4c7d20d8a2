//! SQL pipelines run end to end over freshly generated data.

use escaly_core::{
    analysis::{self, RetentionReport, RETENTION_TABLE},
    config::GeneratorConfig,
    engine::Engine,
    report,
    store::AnalysisStore,
};
use rusqlite::types::Value;
use std::fs;

fn int(value: &Value) -> i64 {
    match value {
        Value::Integer(i) => *i,
        Value::Real(f) => *f as i64,
        other => panic!("not a number: {other:?}"),
    }
}

#[test]
fn funnel_report_counts_shrink_step_by_step() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("mock_data.csv");
    let data = Engine::funnel(&GeneratorConfig::default_test()).unwrap();
    data.write_csv(&csv).unwrap();

    let results = analysis::funnel_report(&csv).unwrap();
    let names: Vec<&str> = results.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(
        names,
        vec!["funnel_steps", "activation_by_channel", "activation_by_plan", "time_to_report"]
    );

    let steps = &results[0].1;
    let users_col = steps.column_index("users").unwrap();
    let users: Vec<i64> = steps.rows.iter().map(|r| int(&r[users_col])).collect();
    assert_eq!(users.len(), 4);
    assert_eq!(users[0], data.summary.signups as i64);
    assert_eq!(users[3], data.summary.activated as i64);
    assert!(users.windows(2).all(|w| w[0] >= w[1]));

    let time = &results[3].1;
    let activated = int(&time.rows[0][time.column_index("activated_users").unwrap()]);
    assert_eq!(activated, data.summary.activated as i64);
}

#[test]
fn retention_pipeline_covers_every_org() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("events.csv");
    let data = Engine::retention(&GeneratorConfig::default_test()).unwrap();
    data.write_csv(&csv).unwrap();

    let report = RetentionReport::from_csv(&csv, None).unwrap();
    let expected_columns = [
        "signup_week", "team_seg", "cohort_size", "w0", "w1", "w2", "w3", "w4", "w6", "w8", "w12",
    ];
    assert_eq!(report.matrix.columns, expected_columns);

    let total: i64 = report.cohorts.iter().map(|c| c.cohort_size).sum();
    assert_eq!(total, data.summary.orgs as i64);
    for cohort in &report.cohorts {
        assert!(["multi_user", "single_user"].contains(&cohort.team_seg.as_str()));
        for (week, pct) in &cohort.weeks {
            assert!((0.0..=100.0).contains(pct), "week {week}: {pct}");
        }
    }

    let readme = report.readme_markdown().unwrap();
    assert!(readme.starts_with("| Cohort Type | Week 1 | Week 4 | Week 8 | Week 12 |"));

    let figs = dir.path().join("figs");
    let artifacts = report.export(&figs).unwrap();
    assert!(artifacts.matrix_csv.exists());
    let curve = fs::read_to_string(artifacts.curve_csv.unwrap()).unwrap();
    assert!(curve.starts_with("team_seg,week_n,retention_pct\n"));
}

#[test]
fn multi_user_segment_needs_two_active_users_early() {
    let store = AnalysisStore::in_memory().unwrap();
    let csv = "account_id,user_id,event_name,event_ts,report_id,assessment_id,scale_id\n\
a1,ua1_1,signup_completed,2025-05-05T09:00:00Z,,,\n\
a1,ua1_1,submit_assessment,2025-05-05T09:10:00Z,,as_a1_0_ua1_1,sc_cope\n\
a1,ua1_2,submit_assessment,2025-05-19T09:10:00Z,,as_a1_2_ua1_2,sc_cope\n\
a2,ua2_1,signup_completed,2025-05-07T09:00:00Z,,,\n\
a2,ua2_1,submit_assessment,2025-05-07T09:10:00Z,,as_a2_0_ua2_1,sc_cope\n\
a2,ua2_2,submit_assessment,2025-07-02T09:10:00Z,,as_a2_8_ua2_2,sc_cope\n";
    store.load_csv_reader(RETENTION_TABLE, csv.as_bytes()).unwrap();
    let report = RetentionReport::build(&store, &analysis::bundled_retention_scripts()).unwrap();

    assert_eq!(report.cohorts.len(), 2);
    let segs: Vec<(&str, &str)> = report
        .cohorts
        .iter()
        .map(|c| (c.signup_week.as_str(), c.team_seg.as_str()))
        .collect();
    // Both orgs signed up in the week starting Monday 2025-05-05.
    assert_eq!(segs, vec![("2025-05-05", "multi_user"), ("2025-05-05", "single_user")]);

    let single = &report.cohorts[1];
    let at = |w: u32| single.weeks.iter().find(|(wk, _)| *wk == w).unwrap().1;
    assert_eq!(at(0), 100.0);
    assert_eq!(at(1), 0.0);
    assert_eq!(at(8), 100.0);
}

#[test]
fn user_sql_files_run_against_loaded_table() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("mock_data.csv");
    Engine::funnel(&GeneratorConfig::default_test())
        .unwrap()
        .write_csv(&csv)
        .unwrap();
    let sql = dir.path().join("signups.sql");
    fs::write(
        &sql,
        "-- signups per channel\nSELECT channel, COUNT(*) AS n FROM mock_events \
         WHERE event = 'signup_completed' GROUP BY channel ORDER BY channel;\n",
    )
    .unwrap();

    let store = AnalysisStore::in_memory().unwrap();
    store.load_csv(analysis::FUNNEL_TABLE, &csv).unwrap();
    let result = store.run_query_file(&sql).unwrap();
    let total: i64 = result.rows.iter().map(|r| int(&r[1])).sum();
    assert_eq!(total, 200);

    let md = report::render_markdown(&result);
    assert!(md.starts_with("| channel | n |\n|:---|---:|\n"));
}
