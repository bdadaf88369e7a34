use std::fmt;
use std::ops::{Add, Sub};

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// Identifier wrapper for trade-in evaluations. Allocated once at intake
/// and never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EvaluationId(pub String);

impl EvaluationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for EvaluationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Position of an evaluation in the pipeline state machine.
///
/// The derived `Ord` follows pipeline order; conditional store writes rely
/// on it to guarantee stages never regress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvaluationStage {
    PendingUpload,
    ReportConcluded,
    Suggested,
}

impl EvaluationStage {
    pub const fn label(self) -> &'static str {
        match self {
            EvaluationStage::PendingUpload => "PENDING_UPLOAD",
            EvaluationStage::ReportConcluded => "REPORT_CONCLUDED",
            EvaluationStage::Suggested => "SUGGESTED",
        }
    }
}

impl fmt::Display for EvaluationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Exact currency amount in whole cents.
///
/// Serialized as a two-decimal number to match the wire schemas; kept as an
/// integer internally so budget comparisons are exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Money(i64);

impl Money {
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub const fn from_major(units: i64) -> Self {
        Self(units * 100)
    }

    pub const fn cents(self) -> i64 {
        self.0
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Absolute distance between two amounts, in cents.
    pub const fn distance(self, other: Money) -> i64 {
        (self.0 - other.0).abs()
    }

    pub fn try_from_decimal(value: f64) -> Result<Self, MoneyError> {
        if !value.is_finite() {
            return Err(MoneyError::NotFinite);
        }
        let cents = (value * 100.0).round();
        if cents > i64::MAX as f64 || cents < i64::MIN as f64 {
            return Err(MoneyError::OutOfRange);
        }
        Ok(Self(cents as i64))
    }

    pub fn as_decimal(self) -> f64 {
        self.0 as f64 / 100.0
    }
}

/// Amounts that cannot be represented as whole cents.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("amount is not a finite number")]
    NotFinite,
    #[error("amount does not fit in a cent-denominated 64-bit value")]
    OutOfRange,
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_decimal())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        Money::try_from_decimal(value).map_err(D::Error::custom)
    }
}

/// Categorical device condition derived from the report score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceCondition {
    Excellent,
    Good,
    Fair,
}

impl DeviceCondition {
    pub const fn from_score(score: u8) -> Self {
        if score >= 9 {
            DeviceCondition::Excellent
        } else if score >= 7 {
            DeviceCondition::Good
        } else {
            DeviceCondition::Fair
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            DeviceCondition::Excellent => "Excellent",
            DeviceCondition::Good => "Good",
            DeviceCondition::Fair => "Fair",
        }
    }
}

/// Finalized condition report. Attached to exactly one evaluation and
/// immutable once concluded; the store's conditional write enforces the
/// write-once rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub score: u8,
    pub condition: DeviceCondition,
    pub trade_value: Money,
}

/// Durable record of one evaluation, owned by the state store.
///
/// Serialized flat (report fields inline, `stage` as `status`) so the
/// change-feed image carries the same shape as the queue and table wire
/// schemas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub evaluation_id: EvaluationId,
    pub user_id: String,
    pub device_model: String,
    #[serde(rename = "s3_key_prefix")]
    pub upload_prefix: String,
    #[serde(rename = "status")]
    pub stage: EvaluationStage,
    #[serde(flatten)]
    pub report: Option<Report>,
    pub created_at: DateTime<Utc>,
}
