//! Retention-cohort walker.
//!
//! Organizations are split into single-user and multi-user teams. Each org
//! is walked week by week from its signup: activity odds decay
//! geometrically, multi-user teams start higher and decay slower, and in the
//! early weeks extra team members may become active (collaboration onset).
//! Every active user-week yields one submit_assessment and sometimes a
//! generate_report.

use crate::{
    clock::{at_time, plus_minutes, week_start},
    config::{ActivityCurve, RetentionConfig},
    error::GenResult,
    event::{EventBuffer, EventFields, RetentionEventName, RetentionEventRow},
    generator::EventGenerator,
    rng::{StreamRng, StreamSlot},
    sampler::WeightedTable,
    types::{EntityId, WeekIndex},
};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq)]
pub struct OrgProfile {
    pub account_id: EntityId,
    pub signup_at: DateTime<Utc>,
    /// First entry is the founding user who signed the org up.
    pub users: Vec<EntityId>,
    pub is_multi: bool,
}

impl OrgProfile {
    pub fn founder(&self) -> &str {
        &self.users[0]
    }

    /// Team members other than the founder.
    pub fn teammates(&self) -> &[EntityId] {
        &self.users[1..]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CohortSummary {
    pub orgs: usize,
    pub multi_user_orgs: usize,
    pub single_user_orgs: usize,
    pub rows: usize,
    pub signups: usize,
    pub assessments: usize,
    pub reports: usize,
}

pub struct CohortGenerator {
    config: RetentionConfig,
    team_sizes: WeightedTable<u32>,
}

impl CohortGenerator {
    pub fn new(config: RetentionConfig) -> GenResult<Self> {
        config.validate()?;
        let team_sizes = WeightedTable::normalized("team_size", config.team_sizes.clone())?;
        Ok(Self { config, team_sizes })
    }

    pub fn config(&self) -> &RetentionConfig {
        &self.config
    }

    /// Create the base orgs: signups spread uniformly over the signup window,
    /// multi-user with probability `multi_share`, team size skewed to 2–3.
    pub fn build_orgs(&self, rng: &mut StreamRng) -> Vec<OrgProfile> {
        let cfg = &self.config;
        (1..=cfg.accounts)
            .map(|i| {
                let account_id = format!("a{i}");
                let day_offset = rng.range_inclusive(0, i64::from(cfg.signup_span_days));
                let signup_day = cfg.start_date + Duration::days(day_offset);
                let is_multi = rng.chance(cfg.multi_share);
                let size = if is_multi { *self.team_sizes.sample(rng) } else { 1 };
                let users = (1..=size).map(|j| format!("u{account_id}_{j}")).collect();
                OrgProfile {
                    signup_at: at_time(signup_day, cfg.activity_hour, 0, 0),
                    account_id,
                    users,
                    is_multi,
                }
            })
            .collect()
    }

    pub fn activity_curve(&self, org: &OrgProfile) -> ActivityCurve {
        if org.is_multi {
            self.config.multi_user
        } else {
            self.config.single_user
        }
    }

    /// Users who might be active in `week`: always the founder, plus a
    /// secondary teammate during collaboration onset and occasionally a
    /// tertiary one in larger teams. Both extra users are drawn from all
    /// teammates; a repeat draw collapses into one candidate.
    pub fn candidate_users<'a>(
        &self,
        org: &'a OrgProfile,
        week: WeekIndex,
        rng: &mut StreamRng,
    ) -> Vec<&'a str> {
        let collab = &self.config.collaboration;
        let mut candidates: Vec<&str> = vec![org.founder()];
        if !org.is_multi || org.teammates().is_empty() {
            return candidates;
        }

        if week <= collab.onset_last_week && rng.chance(collab.secondary_probability) {
            candidates.push(rng.pick(org.teammates()).as_str());
        }

        if org.users.len() >= collab.tertiary_min_team_size
            && week >= collab.tertiary_first_week
            && rng.chance(collab.tertiary_probability)
        {
            let tertiary = rng.pick(org.teammates()).as_str();
            if !candidates.contains(&tertiary) {
                candidates.push(tertiary);
            }
        }
        candidates
    }

    /// Emit every event of one org: its signup, then weeks `0..=weeks`.
    pub fn walk_org(
        &self,
        org: &OrgProfile,
        rng: &mut StreamRng,
        out: &mut EventBuffer<RetentionEventRow>,
    ) {
        let cfg = &self.config;
        out.emit(
            org.signup_at,
            RetentionEventName::SignupCompleted,
            &org.account_id,
            org.founder(),
            EventFields::default(),
        );

        let curve = self.activity_curve(org);
        for week in 0..=cfg.weeks {
            let p_active = curve.probability_at(week);
            let wk_start = week_start(org.signup_at, week);
            for user in self.candidate_users(org, week, rng) {
                if !rng.chance(p_active) {
                    continue;
                }
                let assessment_id = format!("as_{}_{week}_{user}", org.account_id);
                let scale_id = rng.pick(&cfg.scales).clone();
                let submitted_at = plus_minutes(
                    wk_start,
                    rng.range_inclusive(cfg.assessment_offset.min, cfg.assessment_offset.max),
                );
                out.emit(
                    submitted_at,
                    RetentionEventName::SubmitAssessment,
                    &org.account_id,
                    user,
                    EventFields::assessment(&scale_id, &assessment_id),
                );

                if rng.chance(cfg.report_probability) {
                    let reported_at = plus_minutes(
                        wk_start,
                        rng.range_inclusive(cfg.report_offset.min, cfg.report_offset.max),
                    );
                    let report_id = format!("r_{}_{week}_{user}", org.account_id);
                    out.emit(
                        reported_at,
                        RetentionEventName::GenerateReport,
                        &org.account_id,
                        user,
                        EventFields::assessment(&scale_id, &assessment_id).with_report(&report_id),
                    );
                }
            }
        }
    }
}

impl EventGenerator for CohortGenerator {
    type Row = RetentionEventRow;
    type Summary = CohortSummary;

    fn name(&self) -> &'static str {
        "retention"
    }

    fn slot(&self) -> StreamSlot {
        StreamSlot::Retention
    }

    fn generate(&self, rng: &mut StreamRng) -> GenResult<(Vec<RetentionEventRow>, CohortSummary)> {
        let orgs = self.build_orgs(rng);
        let mut out: EventBuffer<RetentionEventRow> = EventBuffer::new();
        for org in &orgs {
            self.walk_org(org, rng, &mut out);
        }

        let multi_user_orgs = orgs.iter().filter(|o| o.is_multi).count();
        let mut summary = CohortSummary {
            orgs: orgs.len(),
            multi_user_orgs,
            single_user_orgs: orgs.len() - multi_user_orgs,
            rows: out.len(),
            ..CohortSummary::default()
        };
        for row in out.rows() {
            match row.event_name {
                RetentionEventName::SignupCompleted => summary.signups += 1,
                RetentionEventName::SubmitAssessment => summary.assessments += 1,
                RetentionEventName::GenerateReport => summary.reports += 1,
            }
        }
        log::info!(
            "retention: {} orgs (multi: {}, single: {}), {} assessments, {} reports",
            summary.orgs,
            summary.multi_user_orgs,
            summary.single_user_orgs,
            summary.assessments,
            summary.reports
        );
        Ok((out.into_rows(), summary))
    }
}
