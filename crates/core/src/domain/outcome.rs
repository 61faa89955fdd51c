use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::action::{ActionName, ActorRole};
use crate::domain::run::RunId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveMet {
    Yes,
    Partial,
    No,
}

impl ObjectiveMet {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Yes => "yes",
            Self::Partial => "partial",
            Self::No => "no",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "yes" => Some(Self::Yes),
            "partial" => Some(Self::Partial),
            "no" => Some(Self::No),
            _ => None,
        }
    }

    pub fn from_score(score: u8) -> Self {
        match score {
            80.. => Self::Yes,
            40..=79 => Self::Partial,
            _ => Self::No,
        }
    }
}

/// Per-run evaluation written once after the run completes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub run_id: RunId,
    pub role: ActorRole,
    pub total_steps: u32,
    pub succeeded_steps: u32,
    pub failed_steps: u32,
    pub denied_steps: u32,
    pub gates_approved: u32,
    pub gates_rejected: u32,
    pub gates_expired: u32,
    pub total_attempts: u32,
    pub quality_score: u8,
    pub objective_met: ObjectiveMet,
    pub latency_ms: Option<i64>,
    pub total_tokens: u64,
    pub total_cost_usd: Decimal,
    pub evaluated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OutcomeFilter {
    pub role: Option<ActorRole>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl OutcomeFilter {
    pub fn matches(&self, record: &OutcomeRecord) -> bool {
        self.role.map_or(true, |role| role == record.role)
            && self.since.map_or(true, |since| record.evaluated_at >= since)
            && self.until.map_or(true, |until| record.evaluated_at < until)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OutcomeStats {
    pub total_runs: u32,
    pub avg_quality_score: f64,
    pub success_rate: f64,
    pub partial_rate: f64,
    pub failure_rate: f64,
    pub approval_rejection_rate: f64,
    pub total_tokens: u64,
    pub total_cost_usd: Decimal,
}

/// Success rate of one action over a window of steps.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionEffectiveness {
    pub action: ActionName,
    pub attempts: u32,
    pub succeeded: u32,
    pub success_rate: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionRegression {
    pub action: ActionName,
    pub baseline_rate: f64,
    pub current_rate: f64,
    /// Drop in percentage points.
    pub drop: f64,
}
