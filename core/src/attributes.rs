//! Categorical attributes carried on synthetic users and events.

use serde::{Deserialize, Serialize};

/// Acquisition channel of a signup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Organic,
    PaidSearch,
    Referral,
    Email,
    Direct,
}

/// Campaign tags stamped on signups from one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtmTags {
    pub channel: Channel,
    pub source: String,
    pub medium: String,
    pub campaign: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    Free,
    Pro,
    Business,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Desktop,
    Mobile,
    Tablet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    EmailPassword,
    SsoGoogle,
    SsoAzure,
}

impl AuthMethod {
    /// SSO providers hand over an already verified address.
    pub fn verifies_email(&self) -> bool {
        !matches!(self, Self::EmailPassword)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
    Web,
    Pdf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentStatus {
    Started,
    InProgress,
    Complete,
}

/// Onboarding experiment arm recorded on every funnel row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingVariant {
    Control,
    Treatment,
}

/// An assessment scale from the product catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaleRef {
    pub scale_id: String,
    pub name: String,
}

impl ScaleRef {
    pub fn new(scale_id: &str, name: &str) -> Self {
        Self {
            scale_id: scale_id.into(),
            name: name.into(),
        }
    }
}
