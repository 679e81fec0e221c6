use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for FRM32 submissions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubmissionId(pub String);

/// Tenant scope every read and write is bounded by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub String);

/// Identifier wrapper for the contractor under evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContractorId(pub String);

/// Stable identifier of one K2 criterion, e.g. `K2.3`.
///
/// Ordering follows the numeric question order: digit runs compare as
/// numbers, so `K2.10` sorts after `K2.9` instead of between `K2.1` and
/// `K2.2`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetricCode(pub String);

impl MetricCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Ord for MetricCode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Plain string order breaks ties (e.g. zero-padded digit runs) so
        // the ordering stays consistent with equality.
        natural_order(&self.0, &other.0).then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for MetricCode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn natural_order(lhs: &str, rhs: &str) -> Ordering {
    let mut lhs = lhs.as_bytes();
    let mut rhs = rhs.as_bytes();
    loop {
        match (lhs.first(), rhs.first()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(&l), Some(&r)) => {
                if l.is_ascii_digit() && r.is_ascii_digit() {
                    let (l_run, l_rest) = split_digit_run(lhs);
                    let (r_run, r_rest) = split_digit_run(rhs);
                    match compare_digit_runs(l_run, r_run) {
                        Ordering::Equal => {
                            lhs = l_rest;
                            rhs = r_rest;
                        }
                        unequal => return unequal,
                    }
                } else {
                    match l.cmp(&r) {
                        Ordering::Equal => {
                            lhs = &lhs[1..];
                            rhs = &rhs[1..];
                        }
                        unequal => return unequal,
                    }
                }
            }
        }
    }
}

fn split_digit_run(bytes: &[u8]) -> (&[u8], &[u8]) {
    let len = bytes.iter().take_while(|byte| byte.is_ascii_digit()).count();
    bytes.split_at(len)
}

fn compare_digit_runs(lhs: &[u8], rhs: &[u8]) -> Ordering {
    let lhs = strip_leading_zeros(lhs);
    let rhs = strip_leading_zeros(rhs);
    lhs.len().cmp(&rhs.len()).then_with(|| lhs.cmp(rhs))
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let zeros = bytes.iter().take_while(|byte| **byte == b'0').count();
    &bytes[zeros..]
}

/// The four score values an evaluator may assign to a K2 criterion.
///
/// Serialized as the bare number so the wire format matches the legacy
/// backend; anything outside {0, 3, 6, 10} fails to deserialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum ScoreValue {
    Zero,
    Three,
    Six,
    Ten,
}

impl ScoreValue {
    pub const ALLOWED: [u8; 4] = [0, 3, 6, 10];

    pub const fn points(self) -> u8 {
        match self {
            ScoreValue::Zero => 0,
            ScoreValue::Three => 3,
            ScoreValue::Six => 6,
            ScoreValue::Ten => 10,
        }
    }
}

impl From<ScoreValue> for u8 {
    fn from(value: ScoreValue) -> Self {
        value.points()
    }
}

/// Raised when a raw number is not one of the four allowed score values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("score must be one of 0, 3, 6 or 10 (got {0})")]
pub struct InvalidScore(pub i64);

impl TryFrom<u8> for ScoreValue {
    type Error = InvalidScore;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        ScoreValue::try_from(i64::from(value))
    }
}

impl TryFrom<i64> for ScoreValue {
    type Error = InvalidScore;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ScoreValue::Zero),
            3 => Ok(ScoreValue::Three),
            6 => Ok(ScoreValue::Six),
            10 => Ok(ScoreValue::Ten),
            other => Err(InvalidScore(other)),
        }
    }
}

/// Lifecycle of an evaluation submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Draft,
    Submitted,
    Reviewed,
}

impl SubmissionStatus {
    pub const fn label(self) -> &'static str {
        match self {
            SubmissionStatus::Draft => "draft",
            SubmissionStatus::Submitted => "submitted",
            SubmissionStatus::Reviewed => "reviewed",
        }
    }
}

/// One authoritative score decision for one K2 criterion within one submission.
///
/// The canned catalog comments are copied in at write time so later catalog
/// edits never rewrite what a past evaluation said.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub metric_code: MetricCode,
    pub score: ScoreValue,
    pub comment_en: String,
    pub comment_tr: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Raw score entry as supplied by a reviewer or the automated callback.
///
/// The score is deliberately an open integer here; the service validates it
/// against [`ScoreValue`] so a rejected batch can name the offending value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub metric_code: MetricCode,
    pub score: i64,
}

/// Advisory AI score suggestion attached to a submission.
///
/// Stored inline on the submission, never in the score ledger; a human must
/// separately upsert a score to make a suggestion authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiSuggestion {
    pub metric_code: MetricCode,
    pub suggested_score: ScoreValue,
    pub reasoning: String,
}

/// Intake payload for a new draft submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSubmission {
    pub contractor_id: ContractorId,
    pub contractor_name: String,
    pub evaluation_period: String,
    #[serde(default)]
    pub answers: BTreeMap<String, String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Already-authenticated caller identity handed down by the auth layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub user_id: String,
    pub role: CallerRole,
    pub tenant_id: TenantId,
}

impl CallerIdentity {
    pub fn can_review(&self) -> bool {
        matches!(self.role, CallerRole::Admin | CallerRole::Reviewer)
    }
}

/// Roles the core distinguishes; verification happens upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallerRole {
    Admin,
    Reviewer,
    Contractor,
    Service,
}

impl CallerRole {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Self::Admin),
            "reviewer" => Some(Self::Reviewer),
            "contractor" => Some(Self::Contractor),
            "service" | "service_role" => Some(Self::Service),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            CallerRole::Admin => "admin",
            CallerRole::Reviewer => "reviewer",
            CallerRole::Contractor => "contractor",
            CallerRole::Service => "service",
        }
    }
}
