//! Activation-funnel walker.
//!
//! Each synthetic user signs up and then tries to step through
//!   signup_completed → select_scale → submit_assessment → generate_report
//! inside a single session. Every step has a conditional survival
//! probability; the final step's odds are scaled by the user's channel and
//! plan. A step whose timestamp falls outside the session window ends the
//! walk (or, for the optional started/in_progress pings, is simply skipped).

use crate::{
    attributes::{
        AssessmentStatus, AuthMethod, Channel, DeviceType, OnboardingVariant, PlanTier,
        ReportFormat,
    },
    clock::{at_time, plus_minutes, within_session},
    config::{FunnelConfig, MinuteRange, Segment},
    error::GenResult,
    event::{EventBuffer, EventFields, FunnelEventName, FunnelEventRow, UserContext},
    generator::EventGenerator,
    rng::{StreamRng, StreamSlot},
    sampler::{Weighted, WeightedTable},
    types::Minutes,
};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// A synthetic user and the attributes drawn for it at signup.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticUser {
    pub context: UserContext,
    pub signup_at: DateTime<Utc>,
    pub method: AuthMethod,
    pub is_email_verified: bool,
}

/// How far a user got, for summaries and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FunnelStage {
    SignedUp,
    SelectedScale,
    CompletedAssessment,
    Activated,
}

/// Per-step user counts of a generated funnel dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FunnelSummary {
    pub users: usize,
    pub rows: usize,
    pub signups: usize,
    pub selected_scale: usize,
    pub completed_assessment: usize,
    pub activated: usize,
}

impl FunnelSummary {
    pub fn record(&mut self, stage: FunnelStage) {
        self.users += 1;
        self.signups += 1;
        if stage >= FunnelStage::SelectedScale {
            self.selected_scale += 1;
        }
        if stage >= FunnelStage::CompletedAssessment {
            self.completed_assessment += 1;
        }
        if stage >= FunnelStage::Activated {
            self.activated += 1;
        }
    }

    /// Activated users as a share of signups.
    pub fn activation_rate(&self) -> f64 {
        if self.signups == 0 {
            return 0.0;
        }
        self.activated as f64 / self.signups as f64
    }
}

pub struct FunnelGenerator {
    config: FunnelConfig,
    channels: WeightedTable<Channel>,
    plans: WeightedTable<PlanTier>,
    devices: WeightedTable<DeviceType>,
    auth_methods: WeightedTable<AuthMethod>,
}

impl FunnelGenerator {
    pub fn new(config: FunnelConfig) -> GenResult<Self> {
        config.validate()?;
        let channels = WeightedTable::cumulative("channel", shares(&config.channels))?;
        let plans = WeightedTable::cumulative("plan_tier", shares(&config.plans))?;
        let devices = WeightedTable::cumulative("device_type", config.devices.clone())?;
        let auth_methods = WeightedTable::cumulative("auth_method", config.auth_methods.clone())?;
        Ok(Self {
            config,
            channels,
            plans,
            devices,
            auth_methods,
        })
    }

    pub fn config(&self) -> &FunnelConfig {
        &self.config
    }

    /// Activation odds for a user who completed an assessment:
    /// base odds scaled by the channel and plan multipliers, clamped.
    pub fn activation_probability(&self, channel: Channel, plan: PlanTier) -> f64 {
        let steps = &self.config.steps;
        let mut multiplier = 1.0;
        if let Some(seg) = self.config.channels.iter().find(|s| s.value == channel) {
            multiplier *= seg.activation_multiplier;
        }
        if let Some(seg) = self.config.plans.iter().find(|s| s.value == plan) {
            multiplier *= seg.activation_multiplier;
        }
        (steps.activate * multiplier).clamp(steps.activate_floor, steps.activate_ceiling)
    }

    /// Draw user number `index` (zero-based).
    pub fn draw_user(&self, index: usize, rng: &mut StreamRng) -> SyntheticUser {
        let cfg = &self.config;
        let span_days = (cfg.end - cfg.start).num_days();
        let day = cfg.start + Duration::days(rng.range_inclusive(0, span_days));
        let hour = rng.range_inclusive(
            i64::from(cfg.timing.signup_first_hour),
            i64::from(cfg.timing.signup_last_hour),
        );
        let minute = rng.range_inclusive(0, 59);
        let second = rng.range_inclusive(0, 59);
        let signup_at = at_time(day, hour as u32, minute as u32, second as u32);

        let channel = *self.channels.sample(rng);
        let plan_tier = *self.plans.sample(rng);
        let device_type = *self.devices.sample(rng);
        let locale = rng.pick(&cfg.locales).clone();
        let method = *self.auth_methods.sample(rng);
        let is_email_verified = method.verifies_email() || rng.chance(cfg.email_verified_rate);
        let variant = if cfg.onboarding_treatment_share > 0.0
            && rng.chance(cfg.onboarding_treatment_share)
        {
            OnboardingVariant::Treatment
        } else {
            OnboardingVariant::Control
        };
        let session_id = format!("s_{}", rng.hex_id(8));

        SyntheticUser {
            context: UserContext {
                user_id: format!("u_{index:05}"),
                account_id: format!("a_{index:05}"),
                session_id,
                channel,
                plan_tier,
                device_type,
                locale,
                variant,
            },
            signup_at,
            method,
            is_email_verified,
        }
    }

    /// Walk one user through the funnel, emitting into `out`.
    /// Returns the last stage the user reached.
    pub fn walk_user(
        &self,
        user: &SyntheticUser,
        rng: &mut StreamRng,
        out: &mut EventBuffer<FunnelEventRow>,
    ) -> FunnelStage {
        let cfg = &self.config;
        let ctx = &user.context;
        let mut session = Session::new(user.signup_at, cfg.timing.session_timeout);

        out.emit(
            user.signup_at,
            FunnelEventName::SignupCompleted,
            ctx,
            EventFields {
                utm: cfg.utm_tags.iter().find(|t| t.channel == ctx.channel).cloned(),
                method: Some(user.method),
                is_email_verified: Some(user.is_email_verified),
                ..EventFields::default()
            },
        );

        // ── select_scale ──────────────────────────────
        if !rng.chance(cfg.steps.select_scale) {
            return FunnelStage::SignedUp;
        }
        let scale_id = rng.pick(&cfg.scales).scale_id.clone();
        let Some(t_select) = session.step(cfg.timing.select_scale, rng) else {
            log::trace!("funnel: {} timed out before select_scale", ctx.user_id);
            return FunnelStage::SignedUp;
        };
        out.emit(t_select, FunnelEventName::SelectScale, ctx, EventFields::scale(&scale_id));

        // ── submit_assessment ─────────────────────────
        if !rng.chance(cfg.steps.complete_assessment) {
            return FunnelStage::SelectedScale;
        }
        let assessment_id = format!("as_{}", rng.hex_id(10));
        let progress = [
            (cfg.timing.assessment_started, AssessmentStatus::Started),
            (cfg.timing.assessment_in_progress, AssessmentStatus::InProgress),
        ];
        for (range, status) in progress {
            if let Some(at) = session.step(range, rng) {
                out.emit(
                    at,
                    FunnelEventName::SubmitAssessment,
                    ctx,
                    EventFields::assessment(&scale_id, &assessment_id).with_status(status),
                );
            }
        }
        let Some(t_complete) = session.step(cfg.timing.assessment_complete, rng) else {
            log::trace!("funnel: {} timed out before completing", ctx.user_id);
            return FunnelStage::SelectedScale;
        };
        out.emit(
            t_complete,
            FunnelEventName::SubmitAssessment,
            ctx,
            EventFields::assessment(&scale_id, &assessment_id).with_status(AssessmentStatus::Complete),
        );

        // ── generate_report (activation) ──────────────
        let p_activate = self.activation_probability(ctx.channel, ctx.plan_tier);
        if !rng.chance(p_activate) {
            return FunnelStage::CompletedAssessment;
        }
        let Some(t_report) = session.step(cfg.timing.report, rng) else {
            return FunnelStage::CompletedAssessment;
        };
        let report_id = format!("r_{}", rng.hex_id(10));
        let generation_ms = rng.range_inclusive(
            i64::from(cfg.generation_ms_min),
            i64::from(cfg.generation_ms_max),
        ) as u32;
        let format = if rng.chance(cfg.report_web_share) {
            ReportFormat::Web
        } else {
            ReportFormat::Pdf
        };
        out.emit(
            t_report,
            FunnelEventName::GenerateReport,
            ctx,
            EventFields {
                format: Some(format),
                generation_ms: Some(generation_ms),
                ..EventFields::assessment(&scale_id, &assessment_id).with_report(&report_id)
            },
        );
        FunnelStage::Activated
    }
}

impl EventGenerator for FunnelGenerator {
    type Row = FunnelEventRow;
    type Summary = FunnelSummary;

    fn name(&self) -> &'static str {
        "funnel"
    }

    fn slot(&self) -> StreamSlot {
        StreamSlot::Funnel
    }

    fn generate(&self, rng: &mut StreamRng) -> GenResult<(Vec<FunnelEventRow>, FunnelSummary)> {
        let mut out: EventBuffer<FunnelEventRow> = EventBuffer::new();
        let mut summary = FunnelSummary::default();
        for index in 0..self.config.n_users {
            let user = self.draw_user(index, rng);
            let stage = self.walk_user(&user, rng, &mut out);
            summary.record(stage);
        }
        summary.rows = out.len();
        if out.is_empty() {
            log::warn!("funnel: no users configured, dataset will hold the header only");
        }
        log::info!(
            "funnel: {} users, {} selected scale, {} completed, {} activated ({:.1}%)",
            summary.users,
            summary.selected_scale,
            summary.completed_assessment,
            summary.activated,
            summary.activation_rate() * 100.0
        );
        Ok((out.into_rows(), summary))
    }
}

/// Session-bounded step clock for one user.
///
/// Offsets are measured from session start and never move backwards:
/// a sampled offset below the previous step's offset is raised to it.
/// Step ranges overlap (report 9-30 min, complete 8-25 min), so sampling
/// each offset independently could place a report before its assessment.
/// The clamp piles that mass onto the previous step's time instead, which
/// pushes the time-to-report distribution later than independent draws.
struct Session {
    start: DateTime<Utc>,
    timeout: Minutes,
    last_offset: Minutes,
}

impl Session {
    fn new(start: DateTime<Utc>, timeout: Minutes) -> Self {
        Self {
            start,
            timeout,
            last_offset: 0,
        }
    }

    /// Sample the next step time; `None` when it lands outside the session.
    /// A rejected step does not advance the clock.
    fn step(&mut self, range: MinuteRange, rng: &mut StreamRng) -> Option<DateTime<Utc>> {
        let offset = rng.range_inclusive(range.min, range.max).max(self.last_offset);
        let at = plus_minutes(self.start, offset);
        if !within_session(self.start, at, self.timeout) {
            return None;
        }
        self.last_offset = offset;
        Some(at)
    }
}

fn shares<T: Clone>(segments: &[Segment<T>]) -> Vec<Weighted<T>> {
    segments
        .iter()
        .map(|s| Weighted::new(s.value.clone(), s.share))
        .collect()
}
