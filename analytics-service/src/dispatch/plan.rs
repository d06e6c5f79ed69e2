use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    FlowShift,
    FlowDaily,
    QualityCompliance,
    BreachEvents,
    HumidityVsFlow,
    None,
}

impl Action {
    pub const ALL: [Action; 6] = [
        Action::FlowShift,
        Action::FlowDaily,
        Action::QualityCompliance,
        Action::BreachEvents,
        Action::HumidityVsFlow,
        Action::None,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::FlowShift => "flow_shift",
            Action::FlowDaily => "flow_daily",
            Action::QualityCompliance => "quality_compliance",
            Action::BreachEvents => "breach_events",
            Action::HumidityVsFlow => "humidity_vs_flow",
            Action::None => "none",
        }
    }

    /// Exact identifier match; anything else is `None`.
    pub fn parse(s: &str) -> Option<Action> {
        Self::ALL.into_iter().find(|a| a.as_str() == s)
    }
}

/// Bounds applied to planner-supplied parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlannerLimits {
    /// Used when the plan names no window; `None` means the whole dataset.
    pub default_range_days: Option<u32>,
    pub max_range_days: u32,
    pub max_min_duration_min: f64,
}

impl Default for PlannerLimits {
    fn default() -> Self {
        Self {
            default_range_days: None,
            max_range_days: 365,
            max_min_duration_min: 1440.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryParams {
    pub parameter: Option<String>,
    pub range_days: Option<u32>,
    pub min_duration_min: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedQuery {
    pub action: Action,
    pub params: QueryParams,
}

impl PlannedQuery {
    pub fn none() -> Self {
        Self {
            action: Action::None,
            params: QueryParams::default(),
        }
    }

    pub fn new(action: Action) -> Self {
        Self {
            action,
            params: QueryParams::default(),
        }
    }

    /// Interpret a decoded plan object. Never fails: a missing or unknown
    /// action becomes `none` and malformed parameters are dropped.
    pub fn from_value(value: &Value, limits: &PlannerLimits) -> Self {
        let Some(obj) = value.as_object() else {
            reject("plan", "not an object");
            return Self::none();
        };

        let action = match obj.get("action").and_then(Value::as_str) {
            Some(s) => Action::parse(s.trim()).unwrap_or_else(|| {
                reject("action", s);
                Action::None
            }),
            None => Action::None,
        };

        let empty = Map::new();
        let params = match obj.get("params") {
            Some(Value::Object(p)) => p,
            Some(Value::Null) | None => &empty,
            Some(_) => {
                reject("params", "not an object");
                &empty
            }
        };

        Self {
            action,
            params: QueryParams {
                parameter: parameter_param(params.get("parameter")),
                range_days: range_days_param(params.get("range_days"), limits),
                min_duration_min: min_duration_param(params.get("min_duration_min"), limits),
            },
        }
    }

    /// Pull the first JSON object out of free-form planner text.
    ///
    /// Markdown code fences and surrounding prose are tolerated; text with no
    /// decodable object yields the `none` plan.
    pub fn from_planner_text(text: &str, limits: &PlannerLimits) -> Self {
        match first_json_object(text) {
            Some(value) => Self::from_value(&value, limits),
            None => {
                reject("plan", "no JSON object in planner text");
                Self::none()
            }
        }
    }
}

pub(super) fn reject(field: &'static str, detail: &str) {
    metrics::counter!("planner_params_rejected_total", "field" => field).increment(1);
    tracing::warn!(field, detail, "planner value rejected");
}

fn clamped(field: &'static str) {
    metrics::counter!("planner_params_clamped_total", "field" => field).increment(1);
}

fn first_json_object(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let mut stream = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
    match stream.next() {
        Some(Ok(value)) if value.is_object() => Some(value),
        _ => None,
    }
}

fn parameter_param(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Null => None,
        Value::String(_) => None,
        other => {
            reject("parameter", &other.to_string());
            None
        }
    }
}

/// Numbers and numeric strings; planners often quote integers.
fn as_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    n.filter(|v| v.is_finite())
}

fn range_days_param(value: Option<&Value>, limits: &PlannerLimits) -> Option<u32> {
    let raw = match value {
        None | Some(Value::Null) => return limits.default_range_days,
        Some(v) => v,
    };
    let Some(days) = as_number(raw) else {
        reject("range_days", &raw.to_string());
        return limits.default_range_days;
    };
    let days = days.round();
    if days < 1.0 {
        reject("range_days", &raw.to_string());
        return limits.default_range_days;
    }
    let max = limits.max_range_days.max(1);
    if days > f64::from(max) {
        clamped("range_days");
        return Some(max);
    }
    Some(days as u32)
}

fn min_duration_param(value: Option<&Value>, limits: &PlannerLimits) -> Option<f64> {
    let raw = match value {
        None | Some(Value::Null) => return None,
        Some(v) => v,
    };
    let Some(minutes) = as_number(raw) else {
        reject("min_duration_min", &raw.to_string());
        return None;
    };
    let max = limits.max_min_duration_min.max(0.0);
    if !(0.0..=max).contains(&minutes) {
        clamped("min_duration_min");
    }
    Some(minutes.clamp(0.0, max))
}
