use crate::{
    attributes::{AuthMethod, Channel, DeviceType, PlanTier, ScaleRef, UtmTags},
    error::{GenError, GenResult},
    sampler::Weighted,
    types::Minutes,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ── Shared building blocks ─────────────────────────────────────────

/// Inclusive range of whole minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinuteRange {
    pub min: Minutes,
    pub max: Minutes,
}

impl MinuteRange {
    pub const fn new(min: Minutes, max: Minutes) -> Self {
        Self { min, max }
    }
}

/// A population share that also scales activation odds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment<T> {
    pub value: T,
    pub share: f64,
    #[serde(default = "unit_multiplier")]
    pub activation_multiplier: f64,
}

fn unit_multiplier() -> f64 {
    1.0
}

impl<T> Segment<T> {
    pub fn new(value: T, share: f64, activation_multiplier: f64) -> Self {
        Self {
            value,
            share,
            activation_multiplier,
        }
    }
}

// ── Funnel ─────────────────────────────────────────────────────────

/// Conditional survival probability of each funnel step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StepProbabilities {
    pub select_scale: f64,
    pub complete_assessment: f64,
    /// Base activation odds before channel/plan multipliers.
    pub activate: f64,
    pub activate_floor: f64,
    pub activate_ceiling: f64,
}

impl Default for StepProbabilities {
    fn default() -> Self {
        Self {
            select_scale: 0.83,
            complete_assessment: 0.60,
            activate: 0.27,
            activate_floor: 0.01,
            activate_ceiling: 0.95,
        }
    }
}

/// Offsets from signup, in minutes, sampled uniformly per step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FunnelTiming {
    pub select_scale: MinuteRange,
    pub assessment_started: MinuteRange,
    pub assessment_in_progress: MinuteRange,
    pub assessment_complete: MinuteRange,
    pub report: MinuteRange,
    pub session_timeout: Minutes,
    pub signup_first_hour: u32,
    pub signup_last_hour: u32,
}

impl Default for FunnelTiming {
    fn default() -> Self {
        Self {
            select_scale: MinuteRange::new(1, 5),
            assessment_started: MinuteRange::new(3, 10),
            assessment_in_progress: MinuteRange::new(5, 20),
            assessment_complete: MinuteRange::new(8, 25),
            report: MinuteRange::new(9, 30),
            session_timeout: 30,
            signup_first_hour: 8,
            signup_last_hour: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FunnelConfig {
    pub n_users: usize,
    pub seed: u64,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub channels: Vec<Segment<Channel>>,
    pub plans: Vec<Segment<PlanTier>>,
    pub devices: Vec<Weighted<DeviceType>>,
    pub auth_methods: Vec<Weighted<AuthMethod>>,
    pub locales: Vec<String>,
    pub scales: Vec<ScaleRef>,
    pub steps: StepProbabilities,
    pub timing: FunnelTiming,
    pub email_verified_rate: f64,
    pub report_web_share: f64,
    pub generation_ms_min: u32,
    pub generation_ms_max: u32,
    pub onboarding_treatment_share: f64,
    /// Campaign tags per channel, stamped on signups. Empty means every
    /// `utm_*` cell stays blank.
    pub utm_tags: Vec<UtmTags>,
}

impl Default for FunnelConfig {
    fn default() -> Self {
        Self {
            n_users: 1500,
            seed: 42,
            start: ymd(2025, 8, 1),
            end: ymd(2025, 9, 15),
            channels: vec![
                Segment::new(Channel::Organic, 0.40, 1.2),
                Segment::new(Channel::PaidSearch, 0.25, 0.7),
                Segment::new(Channel::Referral, 0.10, 1.1),
                Segment::new(Channel::Email, 0.15, 1.0),
                Segment::new(Channel::Direct, 0.10, 0.9),
            ],
            plans: vec![
                Segment::new(PlanTier::Free, 0.65, 0.85),
                Segment::new(PlanTier::Pro, 0.25, 1.1),
                Segment::new(PlanTier::Business, 0.05, 1.25),
            ],
            devices: vec![
                Weighted::new(DeviceType::Desktop, 0.70),
                Weighted::new(DeviceType::Mobile, 0.25),
                Weighted::new(DeviceType::Tablet, 0.05),
            ],
            auth_methods: vec![
                Weighted::new(AuthMethod::EmailPassword, 0.60),
                Weighted::new(AuthMethod::SsoGoogle, 0.30),
                Weighted::new(AuthMethod::SsoAzure, 0.10),
            ],
            locales: ["en-US", "es-ES", "ca-ES", "fr-FR"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            scales: vec![
                ScaleRef::new("sc_101", "GENCAT"),
                ScaleRef::new("sc_102", "Barthel"),
                ScaleRef::new("sc_103", "GHQ-12"),
                ScaleRef::new("sc_104", "Geriatric Depression Scale (GDS)"),
                ScaleRef::new("sc_105", "Mini-Mental State Examination (MMSE)"),
            ],
            steps: StepProbabilities::default(),
            timing: FunnelTiming::default(),
            email_verified_rate: 0.95,
            report_web_share: 0.8,
            generation_ms_min: 500,
            generation_ms_max: 4000,
            onboarding_treatment_share: 0.0,
            utm_tags: Vec::new(),
        }
    }
}

impl FunnelConfig {
    pub fn validate(&self) -> GenResult<()> {
        if self.start > self.end {
            return Err(GenError::InvalidDateRange {
                start: self.start.to_string(),
                end: self.end.to_string(),
            });
        }
        if self.locales.is_empty() {
            return Err(GenError::config("funnel.locales", "must not be empty"));
        }
        if self.scales.is_empty() {
            return Err(GenError::config("funnel.scales", "must not be empty"));
        }
        check_probability("funnel.steps.select_scale", self.steps.select_scale)?;
        check_probability("funnel.steps.complete_assessment", self.steps.complete_assessment)?;
        check_probability("funnel.steps.activate", self.steps.activate)?;
        check_probability("funnel.steps.activate_floor", self.steps.activate_floor)?;
        check_probability("funnel.steps.activate_ceiling", self.steps.activate_ceiling)?;
        if self.steps.activate_floor > self.steps.activate_ceiling {
            return Err(GenError::config(
                "funnel.steps.activate_floor",
                "must not exceed activate_ceiling",
            ));
        }
        check_probability("funnel.email_verified_rate", self.email_verified_rate)?;
        check_probability("funnel.report_web_share", self.report_web_share)?;
        check_probability(
            "funnel.onboarding_treatment_share",
            self.onboarding_treatment_share,
        )?;
        for segment in &self.channels {
            check_multiplier("funnel.channels.activation_multiplier", segment.activation_multiplier)?;
        }
        for segment in &self.plans {
            check_multiplier("funnel.plans.activation_multiplier", segment.activation_multiplier)?;
        }

        let t = &self.timing;
        check_range("funnel.timing.select_scale", t.select_scale)?;
        check_range("funnel.timing.assessment_started", t.assessment_started)?;
        check_range("funnel.timing.assessment_in_progress", t.assessment_in_progress)?;
        check_range("funnel.timing.assessment_complete", t.assessment_complete)?;
        check_range("funnel.timing.report", t.report)?;
        if t.session_timeout <= 0 {
            return Err(GenError::config("funnel.timing.session_timeout", "must be positive"));
        }
        if t.signup_first_hour > t.signup_last_hour || t.signup_last_hour > 23 {
            return Err(GenError::config(
                "funnel.timing.signup_last_hour",
                format!(
                    "signup hours {}..={} must be ordered and within a day",
                    t.signup_first_hour, t.signup_last_hour
                ),
            ));
        }
        if self.generation_ms_min > self.generation_ms_max {
            return Err(GenError::config(
                "funnel.generation_ms_min",
                "must not exceed generation_ms_max",
            ));
        }
        Ok(())
    }
}

// ── Retention ──────────────────────────────────────────────────────

/// Weekly activity probability `base × decay^week`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActivityCurve {
    pub base_probability: f64,
    pub weekly_decay: f64,
}

impl ActivityCurve {
    pub fn probability_at(&self, week: u32) -> f64 {
        let exponent = i32::try_from(week).unwrap_or(i32::MAX);
        self.base_probability * self.weekly_decay.powi(exponent)
    }
}

/// When and how often extra team members show up in a multi-user org.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollaborationConfig {
    /// Secondary users may join in weeks `0..=onset_last_week`.
    pub onset_last_week: u32,
    pub secondary_probability: f64,
    pub tertiary_first_week: u32,
    pub tertiary_probability: f64,
    pub tertiary_min_team_size: usize,
}

impl Default for CollaborationConfig {
    fn default() -> Self {
        Self {
            onset_last_week: 4,
            secondary_probability: 0.50,
            tertiary_first_week: 2,
            tertiary_probability: 0.25,
            tertiary_min_team_size: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub accounts: usize,
    pub weeks: u32,
    pub start_date: NaiveDate,
    pub signup_span_days: u32,
    pub multi_share: f64,
    pub seed: u64,
    pub single_user: ActivityCurve,
    pub multi_user: ActivityCurve,
    pub report_probability: f64,
    pub team_sizes: Vec<Weighted<u32>>,
    pub collaboration: CollaborationConfig,
    pub activity_hour: u32,
    pub assessment_offset: MinuteRange,
    pub report_offset: MinuteRange,
    pub scales: Vec<String>,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            accounts: 80,
            weeks: 12,
            start_date: ymd(2025, 5, 5),
            signup_span_days: 21,
            multi_share: 0.45,
            seed: 7,
            single_user: ActivityCurve {
                base_probability: 0.55,
                weekly_decay: 0.78,
            },
            multi_user: ActivityCurve {
                base_probability: 0.78,
                weekly_decay: 0.95,
            },
            report_probability: 0.65,
            team_sizes: vec![
                Weighted::new(2, 0.55),
                Weighted::new(3, 0.30),
                Weighted::new(4, 0.10),
                Weighted::new(5, 0.05),
            ],
            collaboration: CollaborationConfig::default(),
            activity_hour: 9,
            assessment_offset: MinuteRange::new(5, 120),
            report_offset: MinuteRange::new(121, 220),
            scales: ["sc_barthel", "sc_gencat", "sc_cope", "sc_quality_of_life"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl RetentionConfig {
    pub fn validate(&self) -> GenResult<()> {
        check_probability("retention.multi_share", self.multi_share)?;
        check_probability("retention.report_probability", self.report_probability)?;
        check_probability(
            "retention.single_user.base_probability",
            self.single_user.base_probability,
        )?;
        check_probability(
            "retention.multi_user.base_probability",
            self.multi_user.base_probability,
        )?;
        check_probability("retention.single_user.weekly_decay", self.single_user.weekly_decay)?;
        check_probability("retention.multi_user.weekly_decay", self.multi_user.weekly_decay)?;
        check_probability(
            "retention.collaboration.secondary_probability",
            self.collaboration.secondary_probability,
        )?;
        check_probability(
            "retention.collaboration.tertiary_probability",
            self.collaboration.tertiary_probability,
        )?;
        if self.team_sizes.iter().any(|w| w.value < 2) {
            return Err(GenError::config(
                "retention.team_sizes",
                "multi-user teams need at least 2 users",
            ));
        }
        if self.scales.is_empty() {
            return Err(GenError::config("retention.scales", "must not be empty"));
        }
        if self.activity_hour > 23 {
            return Err(GenError::config("retention.activity_hour", "must be within a day"));
        }
        check_range("retention.assessment_offset", self.assessment_offset)?;
        check_range("retention.report_offset", self.report_offset)?;
        Ok(())
    }
}

// ── Top level ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub funnel: FunnelConfig,
    pub retention: RetentionConfig,
}

impl GeneratorConfig {
    /// Load from a JSON file. Missing sections and fields keep their defaults.
    pub fn load(path: &Path) -> GenResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {}: {e}", path.display()))?;
        let config: GeneratorConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> GenResult<()> {
        self.funnel.validate()?;
        self.retention.validate()
    }

    /// Small populations for fast tests; distributions keep their defaults.
    pub fn default_test() -> Self {
        let mut config = Self::default();
        config.funnel.n_users = 200;
        config.retention.accounts = 40;
        config
    }
}

fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(NaiveDate::MIN)
}

fn check_probability(field: &str, p: f64) -> GenResult<()> {
    if !(0.0..=1.0).contains(&p) {
        return Err(GenError::config(field, format!("{p} is not a probability")));
    }
    Ok(())
}

fn check_multiplier(field: &str, m: f64) -> GenResult<()> {
    if !m.is_finite() || m < 0.0 {
        return Err(GenError::config(field, format!("{m} is not a valid multiplier")));
    }
    Ok(())
}

fn check_range(field: &str, range: MinuteRange) -> GenResult<()> {
    if range.min < 0 || range.min > range.max {
        return Err(GenError::config(
            field,
            format!("range {}..={} must be ordered and non-negative", range.min, range.max),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        GeneratorConfig::default().validate().unwrap();
        GeneratorConfig::default_test().validate().unwrap();
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "retention": {{ "accounts": 10, "multi_user": {{ "base_probability": 0.9, "weekly_decay": 0.99 }} }} }}"#
        )
        .unwrap();

        let config = GeneratorConfig::load(file.path()).unwrap();
        assert_eq!(config.retention.accounts, 10);
        assert_eq!(config.retention.weeks, 12);
        assert!((config.retention.multi_user.base_probability - 0.9).abs() < 1e-12);
        assert_eq!(config.funnel.n_users, 1500);
        assert_eq!(config.funnel.start, ymd(2025, 8, 1));
    }

    #[test]
    fn utm_tags_are_opt_in() {
        assert!(FunnelConfig::default().utm_tags.is_empty());
        let funnel: FunnelConfig = serde_json::from_str(
            r#"{ "utm_tags": [ { "channel": "email", "source": "newsletter", "medium": "email", "campaign": "drip" } ] }"#,
        )
        .unwrap();
        assert_eq!(funnel.utm_tags.len(), 1);
        assert_eq!(funnel.utm_tags[0].channel, Channel::Email);
        assert_eq!(funnel.n_users, 1500);
    }

    #[test]
    fn segments_default_to_unit_multiplier() {
        let seg: Segment<Channel> =
            serde_json::from_str(r#"{ "value": "paid_search", "share": 0.5 }"#).unwrap();
        assert_eq!(seg.value, Channel::PaidSearch);
        assert_eq!(seg.activation_multiplier, 1.0);
    }

    #[test]
    fn rejects_inverted_dates_and_ranges() {
        let mut config = FunnelConfig::default();
        config.end = ymd(2025, 7, 1);
        assert!(matches!(config.validate(), Err(GenError::InvalidDateRange { .. })));

        let mut config = FunnelConfig::default();
        config.timing.report = MinuteRange::new(30, 9);
        assert!(matches!(config.validate(), Err(GenError::InvalidConfig { .. })));

        let mut config = RetentionConfig::default();
        config.multi_share = 1.5;
        assert!(config.validate().is_err());

        let mut config = RetentionConfig::default();
        config.team_sizes = vec![Weighted::new(1, 1.0)];
        assert!(config.validate().is_err());
    }

    #[test]
    fn activity_curve_decays_geometrically() {
        let curve = ActivityCurve {
            base_probability: 0.78,
            weekly_decay: 0.95,
        };
        assert!((curve.probability_at(0) - 0.78).abs() < 1e-12);
        assert!((curve.probability_at(2) - 0.78 * 0.95 * 0.95).abs() < 1e-12);
        assert!(curve.probability_at(12) < curve.probability_at(11));
    }
}
