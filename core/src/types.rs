//! Shared primitive types used across the generators.

/// A stable, unique identifier for any synthetic entity (user, account, session).
pub type EntityId = String;

/// A whole number of minutes, used for step offsets and session windows.
pub type Minutes = i64;

/// Zero-based week index relative to an organization's signup.
pub type WeekIndex = u32;
