//! Remote-invocable query operations.
//!
//! A transport layer deserializes a [`QueryRequest`] from JSON, answers it
//! against an [`Observability`] context, and sends back the JSON value.
//! Parameters arrive untyped, so they are validated here: negative counts
//! and unknown level names are rejected as validation errors.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use toolscope_core::{LogLevel, MetricsSummary};

use crate::error::{ObserveError, Result};
use crate::facade::Observability;
use crate::formatter::Render;

/// A query from the transport layer.
///
/// ```json
/// {"query": "logs_view", "level": "ERROR", "tail_count": 20}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "query", rename_all = "snake_case")]
pub enum QueryRequest {
    /// One operation's aggregate, or all of them.
    MetricsSummary {
        /// Operation filter.
        #[serde(default)]
        operation: Option<String>,
    },
    /// Health snapshot.
    Status,
    /// Recent active-log entries.
    LogsView {
        /// Exact level filter.
        #[serde(default)]
        level: Option<String>,
        /// Number of entries (default 50).
        #[serde(default)]
        tail_count: Option<i64>,
    },
    /// Recent diagnoses.
    ErrorHistory {
        /// Number of diagnoses (default 10).
        #[serde(default)]
        count: Option<i64>,
    },
    /// The latest diagnosis.
    DiagnoseLast,
    /// The diagnostic rule table in match order.
    Rules {
        /// Category filter.
        #[serde(default)]
        category: Option<String>,
    },
}

impl QueryRequest {
    /// Parses a request from JSON text.
    ///
    /// # Errors
    /// Malformed requests are validation errors.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| ObserveError::validation(format!("malformed query: {e}")))
    }

    /// Answers the request.
    ///
    /// # Errors
    /// Returns a validation error for bad parameters, or an I/O error if the
    /// active log cannot be read.
    pub fn answer(&self, obs: &Observability) -> Result<Value> {
        match self {
            Self::MetricsSummary { operation } => {
                Ok(match obs.metrics_summary(operation.as_deref()) {
                    MetricsSummary::One(stat) => Value::Object(stat.render_machine()),
                    MetricsSummary::All(all) => Value::Object(
                        all.into_iter()
                            .map(|(op, stat)| (op, Value::Object(stat.render_machine())))
                            .collect(),
                    ),
                })
            }
            Self::Status => Ok(Value::Object(obs.status().render_machine())),
            Self::LogsView { level, tail_count } => {
                let level = level
                    .as_deref()
                    .map(str::parse::<LogLevel>)
                    .transpose()?;
                let tail_count = non_negative("tail_count", *tail_count)?;
                let entries: Vec<Value> = obs
                    .logs_view(level, tail_count)?
                    .iter()
                    .map(|e| Value::Object(e.render_machine()))
                    .collect();
                Ok(json!({ "count": entries.len(), "entries": entries }))
            }
            Self::ErrorHistory { count } => {
                let count = non_negative("count", *count)?;
                let diagnoses: Vec<Value> = obs
                    .error_history(count)
                    .iter()
                    .map(|d| Value::Object(d.render_machine()))
                    .collect();
                Ok(json!({ "count": diagnoses.len(), "diagnoses": diagnoses }))
            }
            Self::DiagnoseLast => Ok(json!({
                "diagnosis": obs
                    .diagnose_last()
                    .map_or(Value::Null, |d| Value::Object(d.render_machine())),
            })),
            Self::Rules { category } => {
                let rules = obs.rules(category.as_deref());
                Ok(json!({ "count": rules.len(), "rules": serde_json::to_value(&rules)? }))
            }
        }
    }
}

fn non_negative(name: &str, value: Option<i64>) -> Result<Option<usize>> {
    value
        .map(|v| {
            usize::try_from(v)
                .map_err(|_| ObserveError::validation(format!("{name} must not be negative, got {v}")))
        })
        .transpose()
}

/// Parses `request`, answers it, and serializes the answer.
///
/// # Errors
/// See [`QueryRequest::from_json`] and [`QueryRequest::answer`].
pub fn handle_query(obs: &Observability, request: &str) -> Result<String> {
    let request = QueryRequest::from_json(request)?;
    tracing::debug!(?request, "answering query");
    Ok(request.answer(obs)?.to_string())
}
