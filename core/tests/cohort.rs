//! Retention-cohort generator behaviour.

use chrono::{Duration, NaiveDate, Timelike};
use escaly_core::{
    cohort::CohortGenerator,
    config::{GeneratorConfig, RetentionConfig},
    engine::Engine,
    event::{EventBuffer, RetentionEventName, RetentionEventRow},
    rng::{RngBank, StreamSlot},
    sampler::Weighted,
};
use std::collections::{BTreeMap, BTreeSet};

fn config() -> GeneratorConfig {
    GeneratorConfig::default_test()
}

fn signups(rows: &[RetentionEventRow]) -> BTreeMap<&str, &RetentionEventRow> {
    rows.iter()
        .filter(|r| r.event_name == RetentionEventName::SignupCompleted)
        .map(|r| (r.account_id.as_str(), r))
        .collect()
}

#[test]
fn every_org_signs_up_once_inside_the_window() {
    let cfg = config();
    let data = Engine::retention(&cfg).unwrap();
    let signups = signups(&data.rows);
    assert_eq!(signups.len(), 40);
    assert_eq!(data.summary.signups, 40);

    let first = cfg.retention.start_date;
    let last = first + Duration::days(21);
    for (account, row) in signups {
        assert!(account.starts_with('a'));
        assert_eq!(row.user_id, format!("u{account}_1"));
        let day = row.event_ts.date_naive();
        assert!(day >= first && day <= last, "{account} signed up on {day}");
        assert_eq!(row.event_ts.hour(), 9);
    }
}

#[test]
fn org_split_and_team_sizes_follow_config() {
    let generator = CohortGenerator::new(RetentionConfig::default()).unwrap();
    let mut rng = RngBank::new(7).for_stream(StreamSlot::Retention);
    let orgs = generator.build_orgs(&mut rng);
    assert_eq!(orgs.len(), 80);
    for org in &orgs {
        if org.is_multi {
            assert!((2..=5).contains(&org.users.len()), "{}", org.account_id);
        } else {
            assert_eq!(org.users.len(), 1);
        }
        let unique: BTreeSet<&String> = org.users.iter().collect();
        assert_eq!(unique.len(), org.users.len());
    }
    assert!(orgs.iter().any(|o| o.is_multi));
    assert!(orgs.iter().any(|o| !o.is_multi));
}

#[test]
fn single_user_share_of_one_keeps_founders_only() {
    let mut cfg = config();
    cfg.retention.multi_share = 0.0;
    let data = Engine::retention(&cfg).unwrap();
    assert_eq!(data.summary.multi_user_orgs, 0);
    for row in &data.rows {
        assert_eq!(row.user_id, format!("u{}_1", row.account_id));
    }
}

#[test]
fn zero_weeks_emits_only_week_zero() {
    let mut cfg = config();
    cfg.retention.weeks = 0;
    let data = Engine::retention(&cfg).unwrap();
    let signups = signups(&data.rows);
    for row in &data.rows {
        let signup_at = signups[row.account_id.as_str()].event_ts;
        assert!(row.event_ts - signup_at < Duration::days(7));
        if let Some(id) = &row.assessment_id {
            assert!(id.starts_with(&format!("as_{}_0_", row.account_id)));
        }
    }
}

#[test]
fn activity_lands_inside_its_week() {
    let data = Engine::retention(&config()).unwrap();
    let signups = signups(&data.rows);
    for row in data
        .rows
        .iter()
        .filter(|r| r.event_name != RetentionEventName::SignupCompleted)
    {
        let signup_at = signups[row.account_id.as_str()].event_ts;
        let assessment = row.assessment_id.as_deref().unwrap();
        // as_<account>_<week>_<user>
        let week: i64 = assessment
            .trim_start_matches(&format!("as_{}_", row.account_id))
            .split('_')
            .next()
            .and_then(|w| w.parse().ok())
            .unwrap();
        let offset = row.event_ts - (signup_at + Duration::weeks(week));
        match row.event_name {
            RetentionEventName::SubmitAssessment => {
                assert!(offset >= Duration::minutes(5) && offset <= Duration::minutes(120));
                assert!(row.report_id.is_none());
            }
            RetentionEventName::GenerateReport => {
                assert!(offset >= Duration::minutes(121) && offset <= Duration::minutes(220));
            }
            RetentionEventName::SignupCompleted => unreachable!(),
        }
        assert!(row.scale_id.is_some());
    }
}

#[test]
fn every_report_follows_its_assessment() {
    let data = Engine::retention(&config()).unwrap();
    let assessments: BTreeMap<&str, &RetentionEventRow> = data
        .rows
        .iter()
        .filter(|r| r.event_name == RetentionEventName::SubmitAssessment)
        .map(|r| (r.assessment_id.as_deref().unwrap(), r))
        .collect();
    assert_eq!(assessments.len(), data.summary.assessments, "assessment ids must be unique");

    for report in data
        .rows
        .iter()
        .filter(|r| r.event_name == RetentionEventName::GenerateReport)
    {
        let id = report.assessment_id.as_deref().unwrap();
        let assessment = assessments[id];
        assert_eq!(assessment.user_id, report.user_id);
        assert_eq!(assessment.scale_id, report.scale_id);
        assert!(report.event_ts > assessment.event_ts);
        let report_id = report.report_id.as_deref().unwrap();
        assert_eq!(report_id.trim_start_matches("r_"), id.trim_start_matches("as_"));
    }
}

#[test]
fn candidate_users_never_repeat() {
    let mut cfg = RetentionConfig::default();
    cfg.multi_share = 1.0;
    cfg.team_sizes = vec![Weighted::new(3, 1.0)];
    cfg.collaboration.secondary_probability = 1.0;
    cfg.collaboration.tertiary_probability = 1.0;
    let generator = CohortGenerator::new(cfg).unwrap();
    let mut rng = RngBank::new(11).for_stream(StreamSlot::Retention);

    let mut overlap_week_sizes = Vec::new();
    for org in generator.build_orgs(&mut rng) {
        for week in 0..=6 {
            let users = generator.candidate_users(&org, week, &mut rng);
            let unique: BTreeSet<&&str> = users.iter().collect();
            assert_eq!(unique.len(), users.len());
            assert_eq!(users[0], org.founder());
            match week {
                // secondary only, or tertiary only
                0 | 1 | 5 | 6 => assert_eq!(users.len(), 2, "{} week {week}", org.account_id),
                // secondary and tertiary are drawn independently and may coincide
                _ => {
                    assert!((2..=3).contains(&users.len()));
                    overlap_week_sizes.push(users.len());
                }
            }
        }
    }

    // Two independent picks among two teammates coincide about half the time.
    let collided = overlap_week_sizes.iter().filter(|&&n| n == 2).count();
    let share = collided as f64 / overlap_week_sizes.len() as f64;
    assert!((0.35..0.65).contains(&share), "collision share {share:.2}");
}

#[test]
fn start_date_is_respected() {
    let mut cfg = config();
    cfg.retention.start_date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    cfg.retention.signup_span_days = 0;
    let data = Engine::retention(&cfg).unwrap();
    for row in signups(&data.rows).values() {
        assert_eq!(row.event_ts.date_naive(), cfg.retention.start_date);
    }
}

#[test]
fn multi_user_orgs_stay_active_longer_and_activity_decays() {
    let mut cfg = RetentionConfig::default();
    cfg.accounts = 400;
    let generator = CohortGenerator::new(cfg).unwrap();
    let mut rng = RngBank::new(21).for_stream(StreamSlot::Retention);
    let orgs = generator.build_orgs(&mut rng);

    // (multi?, week) -> orgs with any assessment that week
    let mut active: BTreeMap<(bool, u32), BTreeSet<String>> = BTreeMap::new();
    for org in &orgs {
        let mut out: EventBuffer<RetentionEventRow> = EventBuffer::new();
        generator.walk_org(org, &mut rng, &mut out);
        for row in out.rows() {
            let Some(id) = row.assessment_id.as_deref() else {
                continue;
            };
            let week: u32 = id
                .trim_start_matches(&format!("as_{}_", org.account_id))
                .split('_')
                .next()
                .and_then(|w| w.parse().ok())
                .unwrap();
            active
                .entry((org.is_multi, week))
                .or_default()
                .insert(org.account_id.clone());
        }
    }

    let multi = orgs.iter().filter(|o| o.is_multi).count() as f64;
    let single = orgs.len() as f64 - multi;
    let rate = |is_multi: bool, weeks: std::ops::RangeInclusive<u32>| {
        let size = if is_multi { multi } else { single };
        let n = weeks.clone().count() as f64;
        let hits: usize = weeks
            .map(|w| active.get(&(is_multi, w)).map_or(0, |s| s.len()))
            .sum();
        hits as f64 / (size * n)
    };

    assert!(rate(true, 6..=12) > rate(false, 6..=12) + 0.2);
    assert!(rate(false, 0..=1) > rate(false, 8..=12) + 0.2);
    assert!(rate(true, 0..=1) > rate(true, 8..=12));
}
