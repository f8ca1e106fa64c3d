/// Usage accounting for the remote collaborators.
///
/// Collaborator responses disagree on field names (`input_tokens` vs
/// `prompt_tokens` and so on); `UsageCounters::from_response` normalizes
/// them into one shape. Pricing lookups are out of scope: callers get
/// raw counters and aggregate totals, nothing is converted to currency.
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Normalized token counters from one collaborator call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageCounters {
    pub prompt_tokens: u64,
    pub prompt_cached_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl UsageCounters {
    /// Normalize the `usage` object of a collaborator response.
    ///
    /// Accepts both field families (`input_tokens`/`output_tokens` and
    /// `prompt_tokens`/`completion_tokens`). A missing `total_tokens`
    /// defaults to prompt + completion.
    pub fn from_response(usage: Option<&Value>) -> Self {
        let Some(usage) = usage else {
            return Self::default();
        };
        let field = |names: &[&str]| {
            names
                .iter()
                .find_map(|name| usage.get(name).and_then(Value::as_u64))
                .unwrap_or(0)
        };
        let prompt_tokens = field(&["input_tokens", "prompt_tokens"]);
        let prompt_cached_tokens = field(&["input_tokens_cached", "prompt_tokens_cached"]);
        let completion_tokens = field(&["output_tokens", "completion_tokens"]);
        let total_tokens = usage
            .get("total_tokens")
            .and_then(Value::as_u64)
            .unwrap_or(prompt_tokens + completion_tokens);
        Self {
            prompt_tokens,
            prompt_cached_tokens,
            completion_tokens,
            total_tokens,
        }
    }

    /// Add another call's counters into this one.
    pub fn merge(&mut self, other: &UsageCounters) {
        self.prompt_tokens += other.prompt_tokens;
        self.prompt_cached_tokens += other.prompt_cached_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Cost record of one finished unit, written once when the unit is done.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnitCost {
    pub unit: String,
    pub usage: UsageCounters,
    pub images_generated: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credits_deducted: Option<f64>,
}

/// Run-level aggregate, shared between unit workers.
#[derive(Debug, Default)]
pub struct RunCost {
    inner: Mutex<RunTotals>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunTotals {
    pub units: usize,
    pub usage: UsageCounters,
    pub images_generated: u32,
    pub credits_deducted: f64,
}

impl RunCost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one unit's cost into the run totals.
    pub fn record(&self, unit_cost: &UnitCost) {
        let mut totals = self.inner.lock();
        totals.units += 1;
        totals.usage.merge(&unit_cost.usage);
        totals.images_generated += unit_cost.images_generated;
        totals.credits_deducted += unit_cost.credits_deducted.unwrap_or(0.0);
    }

    /// Current totals, copied out of the lock.
    pub fn totals(&self) -> RunTotals {
        self.inner.lock().clone()
    }
}
