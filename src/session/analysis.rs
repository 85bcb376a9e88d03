//! Analysis result envelope, conceptual projects vs. equity research.
//!
//! The service returns one JSON envelope for every analysis, but the nested
//! reports differ by analysis flavour. The envelope is parsed once into an
//! [`AnalysisKind`] so the rest of the client only asks for fields the
//! flavour actually has.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Keys that are rendered as dedicated fields rather than sub-reports.
const ENVELOPE_KEYS: &[&str] = &[
    "project_name",
    "target_entity_name",
    "calculated_revenue",
    "calculated_cost",
    "estimated_cost_from_brief",
    "calculated_profit_loss",
    "currency",
    "summary_text",
    "processing_log",
    "raw_llm_output",
    "detailed_financial_analysis",
    "inputs_received",
    "error",
    "detail",
];

/// Headline figures of an analysis, as reported by the service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Financials {
    pub revenue: Option<Decimal>,
    /// Cost computed by the analysts.
    pub cost: Option<Decimal>,
    /// Cost taken from the user's brief when the analysts produced none.
    pub cost_from_brief: Option<Decimal>,
    pub profit_loss: Option<Decimal>,
    pub currency: Option<String>,
}

impl Financials {
    fn from_envelope(raw: &Value) -> Self {
        Self {
            revenue: decimal_field(raw, "calculated_revenue"),
            cost: decimal_field(raw, "calculated_cost"),
            cost_from_brief: decimal_field(raw, "estimated_cost_from_brief"),
            profit_loss: decimal_field(raw, "calculated_profit_loss"),
            currency: str_field(raw, "currency"),
        }
    }

    /// Display text for the cost metric, preferring the analysts' figure.
    pub fn cost_display(&self) -> String {
        match (self.cost, self.cost_from_brief) {
            (Some(cost), _) => format_amount(cost),
            (None, Some(brief)) => format!("{} (from brief)", format_amount(brief)),
            (None, None) => "N/A".to_string(),
        }
    }

    pub fn revenue_display(&self) -> String {
        self.revenue.map(format_amount).unwrap_or_else(|| "N/A".into())
    }

    pub fn profit_loss_display(&self) -> String {
        self.profit_loss
            .map(format_amount)
            .unwrap_or_else(|| "N/A".into())
    }
}

/// The financial analyst's detailed report attached to conceptual projects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalystReport {
    #[serde(default)]
    pub project_name: Option<String>,
    #[serde(default)]
    pub overall_summary_and_rationale: Option<String>,
    #[serde(default)]
    pub assumptions_made_by_fa: Option<Value>,
    #[serde(default)]
    pub viability_metrics: Option<Value>,
    #[serde(default)]
    pub projected_income_statement: Option<Value>,
    #[serde(default)]
    pub projected_cash_flow_statement: Option<Value>,
}

impl AnalystReport {
    /// Structured sections in display order, skipping absent ones.
    ///
    /// Statements show their `annual_breakdown` when the analyst gave one.
    pub fn sections(&self) -> Vec<(&'static str, &Value)> {
        [
            ("Assumptions", self.assumptions_made_by_fa.as_ref()),
            ("Viability metrics", self.viability_metrics.as_ref()),
            (
                "Projected income statement",
                annual_breakdown(self.projected_income_statement.as_ref()),
            ),
            (
                "Projected cash flow statement",
                annual_breakdown(self.projected_cash_flow_statement.as_ref()),
            ),
        ]
        .into_iter()
        .filter_map(|(title, value)| value.filter(|v| !v.is_null()).map(|v| (title, v)))
        .collect()
    }
}

fn annual_breakdown(statement: Option<&Value>) -> Option<&Value> {
    statement.map(|s| s.get("annual_breakdown").unwrap_or(s))
}

/// The error marker a failed analysis carries instead of figures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedAnalysis {
    pub error: String,
    pub detail: Option<String>,
}

impl FailedAnalysis {
    /// The most specific message available.
    pub fn message(&self) -> &str {
        self.detail.as_deref().unwrap_or(&self.error)
    }
}

/// Which flavour of analysis a result is.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisKind {
    /// Feasibility study of a new project (cafe, housing scheme, ...).
    Conceptual {
        financials: Financials,
        analyst_report: Option<AnalystReport>,
    },
    /// Research on an existing company, keyed by `target_entity_name`.
    EquityResearch {
        target_entity_name: String,
        financials: Financials,
    },
    /// The result carries an `error` marker.
    Failed(FailedAnalysis),
}

/// One analysis result, parsed from the service's JSON envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub struct AnalysisResult {
    kind: AnalysisKind,
    raw: Value,
}

impl From<Value> for AnalysisResult {
    fn from(raw: Value) -> Self {
        let kind = if let Some(error) = error_marker(&raw) {
            AnalysisKind::Failed(FailedAnalysis {
                error,
                detail: text_field(&raw, "detail"),
            })
        } else if let Some(target) = str_field(&raw, "target_entity_name") {
            AnalysisKind::EquityResearch {
                target_entity_name: target,
                financials: Financials::from_envelope(&raw),
            }
        } else {
            let analyst_report = raw
                .get("detailed_financial_analysis")
                .filter(|v| v.is_object())
                .and_then(|v| serde_json::from_value(v.clone()).ok());
            AnalysisKind::Conceptual {
                financials: Financials::from_envelope(&raw),
                analyst_report,
            }
        };
        Self { kind, raw }
    }
}

impl From<AnalysisResult> for Value {
    fn from(result: AnalysisResult) -> Self {
        result.raw
    }
}

impl AnalysisResult {
    pub fn kind(&self) -> &AnalysisKind {
        &self.kind
    }

    /// The JSON exactly as the service sent it.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn has_error_marker(&self) -> bool {
        matches!(self.kind, AnalysisKind::Failed(_))
    }

    pub fn failure(&self) -> Option<&FailedAnalysis> {
        match &self.kind {
            AnalysisKind::Failed(failed) => Some(failed),
            _ => None,
        }
    }

    pub fn financials(&self) -> Option<&Financials> {
        match &self.kind {
            AnalysisKind::Conceptual { financials, .. }
            | AnalysisKind::EquityResearch { financials, .. } => Some(financials),
            AnalysisKind::Failed(_) => None,
        }
    }

    pub fn analyst_report(&self) -> Option<&AnalystReport> {
        match &self.kind {
            AnalysisKind::Conceptual { analyst_report, .. } => analyst_report.as_ref(),
            _ => None,
        }
    }

    pub fn target_entity_name(&self) -> Option<&str> {
        match &self.kind {
            AnalysisKind::EquityResearch {
                target_entity_name, ..
            } => Some(target_entity_name),
            _ => None,
        }
    }

    pub fn project_name(&self) -> Option<String> {
        str_field(&self.raw, "project_name")
    }

    pub fn summary_text(&self) -> Option<String> {
        str_field(&self.raw, "summary_text")
    }

    pub fn raw_llm_output(&self) -> Option<String> {
        str_field(&self.raw, "raw_llm_output")
    }

    /// Processing log lines; non-string entries are rendered as JSON.
    pub fn processing_log(&self) -> Vec<String> {
        match self.raw.get("processing_log") {
            Some(Value::Array(entries)) => entries.iter().map(value_text).collect(),
            Some(Value::Null) | None => Vec::new(),
            Some(other) => vec![value_text(other)],
        }
    }

    /// Nested object-valued reports not covered by a dedicated accessor.
    pub fn sub_reports(&self) -> Vec<(&str, &Value)> {
        match &self.raw {
            Value::Object(map) => map
                .iter()
                .filter(|(key, value)| {
                    value.is_object() && !ENVELOPE_KEYS.contains(&key.as_str())
                })
                .map(|(key, value)| (key.as_str(), value))
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Format an amount with thousands separators and no decimals.
pub fn format_amount(amount: Decimal) -> String {
    let rounded = amount.round_dp(0);
    if rounded.is_zero() {
        return "0".to_string();
    }
    let digits = rounded.abs().trunc().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if rounded.is_sign_negative() {
        format!("-{grouped}")
    } else {
        grouped
    }
}

fn error_marker(raw: &Value) -> Option<String> {
    match raw.get("error")? {
        Value::Null | Value::Bool(false) => None,
        other => Some(value_text(other)),
    }
}

fn decimal_field(raw: &Value, key: &str) -> Option<Decimal> {
    match raw.get(key)? {
        Value::Number(n) => {
            let text = n.to_string();
            Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .ok()
        }
        Value::String(s) => Decimal::from_str(s.trim().replace(',', "").as_str()).ok(),
        _ => None,
    }
}

fn str_field(raw: &Value, key: &str) -> Option<String> {
    raw.get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Like [`str_field`] but renders structured values as JSON text.
fn text_field(raw: &Value, key: &str) -> Option<String> {
    match raw.get(key)? {
        Value::Null => None,
        other => Some(value_text(other)).filter(|s| !s.is_empty()),
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
