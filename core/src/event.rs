//! Event records and the buffer they are emitted into.
//!
//! RULE: Walkers never build rows by hand. They describe an event as
//! (timestamp, name, shared identifiers, optional fields) and the buffer
//! normalizes it into the fixed output schema.

use crate::{
    attributes::{
        AssessmentStatus, AuthMethod, Channel, DeviceType, OnboardingVariant, PlanTier,
        ReportFormat, UtmTags,
    },
    clock::serialize_iso,
    export::{CsvSchema, TimedRow},
    types::EntityId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Event names ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunnelEventName {
    SignupCompleted,
    SelectScale,
    SubmitAssessment,
    GenerateReport,
}

/// The canonical events of the team-adoption tracking plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionEventName {
    SignupCompleted,
    SubmitAssessment,
    GenerateReport,
}

// ── Emitter inputs ─────────────────────────────────────────────────

/// Identifiers and attributes repeated on every event of one funnel user.
#[derive(Debug, Clone, PartialEq)]
pub struct UserContext {
    pub user_id: EntityId,
    pub account_id: EntityId,
    pub session_id: EntityId,
    pub channel: Channel,
    pub plan_tier: PlanTier,
    pub device_type: DeviceType,
    pub locale: String,
    pub variant: OnboardingVariant,
}

/// Per-event optional values. Absent fields are written as empty cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventFields {
    pub scale_id: Option<String>,
    pub assessment_id: Option<String>,
    pub report_id: Option<String>,
    pub utm: Option<UtmTags>,
    pub method: Option<AuthMethod>,
    pub is_email_verified: Option<bool>,
    pub status: Option<AssessmentStatus>,
    pub format: Option<ReportFormat>,
    pub generation_ms: Option<u32>,
}

impl EventFields {
    pub fn scale(scale_id: &str) -> Self {
        Self {
            scale_id: Some(scale_id.to_string()),
            ..Self::default()
        }
    }

    pub fn assessment(scale_id: &str, assessment_id: &str) -> Self {
        Self {
            assessment_id: Some(assessment_id.to_string()),
            ..Self::scale(scale_id)
        }
    }

    pub fn with_status(mut self, status: AssessmentStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_report(mut self, report_id: &str) -> Self {
        self.report_id = Some(report_id.to_string());
        self
    }
}

// ── Rows ───────────────────────────────────────────────────────────

/// One row of the activation-funnel dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunnelEventRow {
    #[serde(serialize_with = "serialize_iso")]
    pub occurred_at: DateTime<Utc>,
    pub event: FunnelEventName,
    pub anonymous_id: String,
    pub user_id: EntityId,
    pub account_id: EntityId,
    pub session_id: EntityId,
    pub scale_id: Option<String>,
    pub assessment_id: Option<String>,
    pub report_id: Option<String>,
    pub channel: Channel,
    pub plan_tier: PlanTier,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub method: Option<AuthMethod>,
    pub is_email_verified: Option<bool>,
    pub status: Option<AssessmentStatus>,
    pub format: Option<ReportFormat>,
    pub generation_ms: Option<u32>,
    pub device_type: DeviceType,
    pub locale: String,
    pub exp_onboarding_flow: OnboardingVariant,
}

impl CsvSchema for FunnelEventRow {
    const HEADERS: &'static [&'static str] = &[
        "occurred_at",
        "event",
        "anonymous_id",
        "user_id",
        "account_id",
        "session_id",
        "scale_id",
        "assessment_id",
        "report_id",
        "channel",
        "plan_tier",
        "utm_source",
        "utm_medium",
        "utm_campaign",
        "method",
        "is_email_verified",
        "status",
        "format",
        "generation_ms",
        "device_type",
        "locale",
        "exp_onboarding_flow",
    ];
}

impl TimedRow for FunnelEventRow {
    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

/// One row of the retention-cohort dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetentionEventRow {
    pub account_id: EntityId,
    pub user_id: EntityId,
    pub event_name: RetentionEventName,
    #[serde(serialize_with = "serialize_iso")]
    pub event_ts: DateTime<Utc>,
    pub report_id: Option<String>,
    pub assessment_id: Option<String>,
    pub scale_id: Option<String>,
}

impl CsvSchema for RetentionEventRow {
    const HEADERS: &'static [&'static str] = &[
        "account_id",
        "user_id",
        "event_name",
        "event_ts",
        "report_id",
        "assessment_id",
        "scale_id",
    ];
}

impl TimedRow for RetentionEventRow {
    fn occurred_at(&self) -> DateTime<Utc> {
        self.event_ts
    }
}

// ── Buffer ─────────────────────────────────────────────────────────

/// Append-only output buffer for emitted rows, in emission order.
#[derive(Debug, Clone)]
pub struct EventBuffer<R> {
    rows: Vec<R>,
}

impl<R> Default for EventBuffer<R> {
    fn default() -> Self {
        Self { rows: Vec::new() }
    }
}

impl<R> EventBuffer<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, row: R) {
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[R] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<R> {
        self.rows
    }
}

impl EventBuffer<FunnelEventRow> {
    pub fn emit(
        &mut self,
        at: DateTime<Utc>,
        event: FunnelEventName,
        user: &UserContext,
        fields: EventFields,
    ) {
        let utm = fields.utm.as_ref();
        self.push(FunnelEventRow {
            occurred_at: at,
            event,
            anonymous_id: String::new(),
            user_id: user.user_id.clone(),
            account_id: user.account_id.clone(),
            session_id: user.session_id.clone(),
            scale_id: fields.scale_id,
            assessment_id: fields.assessment_id,
            report_id: fields.report_id,
            channel: user.channel,
            plan_tier: user.plan_tier,
            utm_source: utm.map(|u| u.source.clone()),
            utm_medium: utm.map(|u| u.medium.clone()),
            utm_campaign: utm.map(|u| u.campaign.clone()),
            method: fields.method,
            is_email_verified: fields.is_email_verified,
            status: fields.status,
            format: fields.format,
            generation_ms: fields.generation_ms,
            device_type: user.device_type,
            locale: user.locale.clone(),
            exp_onboarding_flow: user.variant,
        });
    }
}

impl EventBuffer<RetentionEventRow> {
    /// Only the assessment, report and scale identifiers of `fields`
    /// exist in the retention schema; anything else is dropped.
    pub fn emit(
        &mut self,
        at: DateTime<Utc>,
        event: RetentionEventName,
        account_id: &str,
        user_id: &str,
        fields: EventFields,
    ) {
        self.push(RetentionEventRow {
            account_id: account_id.to_string(),
            user_id: user_id.to_string(),
            event_name: event,
            event_ts: at,
            report_id: fields.report_id,
            assessment_id: fields.assessment_id,
            scale_id: fields.scale_id,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::at_time;
    use chrono::NaiveDate;

    fn user() -> UserContext {
        UserContext {
            user_id: "u_00001".into(),
            account_id: "a_00001".into(),
            session_id: "s_deadbeef".into(),
            channel: Channel::Email,
            plan_tier: PlanTier::Pro,
            device_type: DeviceType::Mobile,
            locale: "ca-ES".into(),
            variant: OnboardingVariant::Control,
        }
    }

    #[test]
    fn funnel_emit_copies_shared_identifiers() {
        let at = at_time(NaiveDate::from_ymd_opt(2025, 8, 1).unwrap(), 10, 0, 0);
        let mut buffer: EventBuffer<FunnelEventRow> = EventBuffer::new();
        buffer.emit(
            at,
            FunnelEventName::SignupCompleted,
            &user(),
            EventFields {
                utm: Some(UtmTags {
                    channel: Channel::Email,
                    source: "newsletter".into(),
                    medium: "email".into(),
                    campaign: "onboarding_drip".into(),
                }),
                method: Some(AuthMethod::EmailPassword),
                is_email_verified: Some(true),
                ..EventFields::default()
            },
        );
        buffer.emit(
            at,
            FunnelEventName::SubmitAssessment,
            &user(),
            EventFields::assessment("sc_101", "as_1").with_status(AssessmentStatus::Started),
        );

        assert_eq!(buffer.len(), 2);
        let signup = &buffer.rows()[0];
        assert_eq!(signup.session_id, "s_deadbeef");
        assert_eq!(signup.utm_medium.as_deref(), Some("email"));
        assert_eq!(signup.scale_id, None);

        let started = &buffer.rows()[1];
        assert_eq!(started.user_id, signup.user_id);
        assert_eq!(started.status, Some(AssessmentStatus::Started));
        assert_eq!(started.method, None);
        assert_eq!(started.utm_source, None);
        assert_eq!(started.assessment_id.as_deref(), Some("as_1"));
    }

    #[test]
    fn retention_emit_keeps_only_schema_fields() {
        let at = at_time(NaiveDate::from_ymd_opt(2025, 5, 5).unwrap(), 9, 0, 0);
        let mut buffer: EventBuffer<RetentionEventRow> = EventBuffer::new();
        buffer.emit(
            at,
            RetentionEventName::GenerateReport,
            "a1",
            "ua1_1",
            EventFields::assessment("sc_cope", "as_a1_0_ua1_1").with_report("r_a1_0_ua1_1"),
        );
        let row = &buffer.into_rows()[0];
        assert_eq!(row.event_name, RetentionEventName::GenerateReport);
        assert_eq!(row.report_id.as_deref(), Some("r_a1_0_ua1_1"));
        assert_eq!(row.scale_id.as_deref(), Some("sc_cope"));
    }

    #[test]
    fn schema_headers_match_row_width() {
        assert_eq!(FunnelEventRow::HEADERS.len(), 22);
        assert_eq!(RetentionEventRow::HEADERS.len(), 7);
    }
}
