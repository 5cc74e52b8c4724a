//! Declarative shape checks for messages passed between stages.
//!
//! Each stage output is serialized and walked against a [`Shape`] before it
//! is handed on or written out. Objects are strict: a field the shape does
//! not declare is an error.

use adpulse_core::PipelineError;
use chrono::{DateTime, NaiveDate};
use serde::Serialize;
use serde_json::{json, Map, Value};

const STAGE_STATUSES: &[&str] = &["success", "failure", "partial"];
const CATEGORIES: &[&str] = &["creative", "audience", "platform", "budget", "seasonality"];
const METRICS: &[&str] = &["roas", "ctr", "cpc", "conversion_rate"];
const DIMENSIONS: &[&str] = &["campaign_name", "creative_type", "audience_type", "platform"];
const DIRECTIONS: &[&str] = &["increase", "decrease"];
const TREND_DIRECTIONS: &[&str] = &["increasing", "decreasing", "stable"];
const VALIDATION_STATUSES: &[&str] = &["confirmed", "rejected", "inconclusive"];

/// Hypothesis lists must hold between 3 and 5 items.
pub const MIN_LIST_ITEMS: usize = 3;
pub const MAX_LIST_ITEMS: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Any,
    Null,
    Bool,
    String,
    /// One of a fixed set of strings.
    Enum(&'static [&'static str]),
    /// Finite number within inclusive bounds.
    Number {
        min: Option<f64>,
        max: Option<f64>,
    },
    /// Non-negative integer.
    Count,
    /// RFC 3339 timestamp.
    Timestamp,
    /// `YYYY-MM-DD`.
    Date,
    Nullable(Box<Shape>),
    Array {
        items: Box<Shape>,
        min_items: usize,
        max_items: Option<usize>,
    },
    Object(Vec<Field>),
    /// Object with arbitrary keys and uniform values.
    Map(Box<Shape>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: &'static str,
    pub shape: Shape,
    pub required: bool,
}

impl Field {
    #[must_use]
    pub fn required(name: &'static str, shape: Shape) -> Self {
        Self {
            name,
            shape,
            required: true,
        }
    }

    #[must_use]
    pub fn optional(name: &'static str, shape: Shape) -> Self {
        Self {
            name,
            shape,
            required: false,
        }
    }
}

impl Shape {
    #[must_use]
    pub fn nullable(inner: Shape) -> Self {
        Shape::Nullable(Box::new(inner))
    }

    #[must_use]
    pub fn array(items: Shape) -> Self {
        Shape::Array {
            items: Box::new(items),
            min_items: 0,
            max_items: None,
        }
    }

    #[must_use]
    pub fn map(values: Shape) -> Self {
        Shape::Map(Box::new(values))
    }

    #[must_use]
    pub fn number() -> Self {
        Shape::Number {
            min: None,
            max: None,
        }
    }

    #[must_use]
    pub fn non_negative() -> Self {
        Shape::Number {
            min: Some(0.0),
            max: None,
        }
    }

    #[must_use]
    pub fn unit() -> Self {
        Shape::Number {
            min: Some(0.0),
            max: Some(1.0),
        }
    }
}

/// Check `value` against `shape`.
///
/// # Errors
///
/// Returns [`PipelineError::Validation`] naming the schema and the JSON path
/// of the first mismatch.
pub fn check(value: &Value, shape: &Shape, schema: &str) -> Result<(), PipelineError> {
    let mut path = String::from("$");
    walk(value, shape, &mut path).map_err(|reason| {
        tracing::warn!(schema, path = %path, reason = %reason, "schema check failed");
        PipelineError::validation(
            format!("Schema validation failed for {schema} at {path}: {reason}"),
            json!({ "schema": schema, "path": path, "reason": reason }),
        )
    })
}

/// Serialize `message` and check it against `shape`.
///
/// # Errors
///
/// Returns [`PipelineError::Validation`] when serialization fails or the
/// serialized form does not match.
pub fn check_message<T: Serialize>(
    message: &T,
    shape: &Shape,
    schema: &str,
) -> Result<Value, PipelineError> {
    let value = serde_json::to_value(message).map_err(|e| {
        PipelineError::validation(
            format!("Failed to serialize {schema}: {e}"),
            json!({ "schema": schema }),
        )
    })?;
    check(&value, shape, schema)?;
    Ok(value)
}

/// On error `path` is left pointing at the offending node.
fn walk(value: &Value, shape: &Shape, path: &mut String) -> Result<(), String> {
    match shape {
        Shape::Any => Ok(()),
        Shape::Null => expect(value.is_null(), "null", value),
        Shape::Bool => expect(value.is_boolean(), "a boolean", value),
        Shape::String => expect(value.is_string(), "a string", value),
        Shape::Enum(allowed) => match value.as_str() {
            Some(s) if allowed.contains(&s) => Ok(()),
            Some(s) => Err(format!("'{s}' is not one of {allowed:?}")),
            None => Err(format!("expected a string, found {}", kind(value))),
        },
        Shape::Number { min, max } => {
            let Some(n) = value.as_f64().filter(|n| n.is_finite()) else {
                return Err(format!("expected a number, found {}", kind(value)));
            };
            if let Some(min) = min.filter(|&m| n < m) {
                return Err(format!("{n} is below the minimum {min}"));
            }
            if let Some(max) = max.filter(|&m| n > m) {
                return Err(format!("{n} is above the maximum {max}"));
            }
            Ok(())
        }
        Shape::Count => expect(value.is_u64(), "a non-negative integer", value),
        Shape::Timestamp => match value.as_str() {
            Some(s) if DateTime::parse_from_rfc3339(s).is_ok() => Ok(()),
            _ => Err(format!("expected an RFC 3339 timestamp, found {value}")),
        },
        Shape::Date => match value.as_str() {
            Some(s) if NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok() => Ok(()),
            _ => Err(format!("expected a YYYY-MM-DD date, found {value}")),
        },
        Shape::Nullable(inner) => {
            if value.is_null() {
                Ok(())
            } else {
                walk(value, inner, path)
            }
        }
        Shape::Array {
            items,
            min_items,
            max_items,
        } => {
            let Some(array) = value.as_array() else {
                return Err(format!("expected an array, found {}", kind(value)));
            };
            if array.len() < *min_items {
                return Err(format!(
                    "expected at least {min_items} items, found {}",
                    array.len()
                ));
            }
            if let Some(max) = max_items.filter(|&m| array.len() > m) {
                return Err(format!("expected at most {max} items, found {}", array.len()));
            }
            for (i, item) in array.iter().enumerate() {
                descend(path, &format!("[{i}]"), |path| walk(item, items, path))?;
            }
            Ok(())
        }
        Shape::Object(fields) => {
            let Some(object) = value.as_object() else {
                return Err(format!("expected an object, found {}", kind(value)));
            };
            walk_object(object, fields, path)
        }
        Shape::Map(values) => {
            let Some(object) = value.as_object() else {
                return Err(format!("expected an object, found {}", kind(value)));
            };
            for (key, item) in object {
                descend(path, &format!(".{key}"), |path| walk(item, values, path))?;
            }
            Ok(())
        }
    }
}

fn walk_object(
    object: &Map<String, Value>,
    fields: &[Field],
    path: &mut String,
) -> Result<(), String> {
    if let Some(unknown) = object.keys().find(|k| !fields.iter().any(|f| f.name == k.as_str())) {
        return Err(format!("unexpected field '{unknown}'"));
    }
    for field in fields {
        match object.get(field.name) {
            Some(item) => {
                descend(path, &format!(".{}", field.name), |path| {
                    walk(item, &field.shape, path)
                })?;
            }
            None if field.required => {
                return Err(format!("missing required field '{}'", field.name));
            }
            None => {}
        }
    }
    Ok(())
}

/// Run `f` with `segment` pushed onto `path`, popping it again on success.
fn descend<F>(path: &mut String, segment: &str, f: F) -> Result<(), String>
where
    F: FnOnce(&mut String) -> Result<(), String>,
{
    let len = path.len();
    path.push_str(segment);
    f(path)?;
    path.truncate(len);
    Ok(())
}

fn expect(ok: bool, wanted: &str, value: &Value) -> Result<(), String> {
    if ok {
        Ok(())
    } else {
        Err(format!("expected {wanted}, found {}", kind(value)))
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Stage envelope with `payload` checked against `payload`.
#[must_use]
pub fn envelope_shape(payload: Shape) -> Shape {
    Shape::Object(vec![
        Field::required("agent_name", Shape::String),
        Field::required("timestamp", Shape::Timestamp),
        Field::required("execution_duration_ms", Shape::Count),
        Field::required("status", Shape::Enum(STAGE_STATUSES)),
        Field::required(
            "attempts",
            Shape::Number {
                min: Some(1.0),
                max: None,
            },
        ),
        Field::optional(
            "error",
            Shape::Object(vec![
                Field::required("error_type", Shape::String),
                Field::required("error_message", Shape::String),
                Field::optional("error_details", Shape::Any),
            ]),
        ),
        Field::optional("payload", payload),
    ])
}

fn totals_shape() -> Shape {
    Shape::Object(vec![
        Field::required("rows", Shape::Count),
        Field::required("spend", Shape::non_negative()),
        Field::required("revenue", Shape::non_negative()),
        Field::required("impressions", Shape::Count),
        Field::required("clicks", Shape::Count),
        Field::required("purchases", Shape::Count),
    ])
}

fn optional_rate() -> Shape {
    Shape::nullable(Shape::non_negative())
}

#[must_use]
pub fn summary_shape() -> Shape {
    let trend = Shape::Object(vec![
        Field::required("direction", Shape::Enum(TREND_DIRECTIONS)),
        Field::required("week_over_week_change", Shape::nullable(Shape::number())),
        Field::required("month_over_month_change", Shape::nullable(Shape::number())),
    ]);
    let segment = Shape::Object(vec![
        Field::required("segment", Shape::String),
        Field::required("totals", totals_shape()),
        Field::required("roas", optional_rate()),
        Field::required("ctr", optional_rate()),
        Field::required("cpc", optional_rate()),
        Field::required("conversion_rate", optional_rate()),
    ]);
    let quality = Shape::Object(vec![
        Field::required("rows_read", Shape::Count),
        Field::required("missing_values", Shape::map(Shape::Count)),
        Field::required("invalid_rows", Shape::Count),
        Field::required("invalid_dates", Shape::Count),
        Field::required(
            "invalid_date_examples",
            Shape::Array {
                items: Box::new(Shape::Object(vec![
                    Field::required("line", Shape::Count),
                    Field::required("value", Shape::String),
                ])),
                min_items: 0,
                max_items: Some(5),
            },
        ),
        Field::required("non_numeric_values", Shape::map(Shape::Count)),
        Field::required("constraint_violations", Shape::Count),
        Field::required("recomputed_derived", Shape::Count),
    ]);

    Shape::Object(vec![
        Field::required("total_rows", Shape::Count),
        Field::required(
            "date_range",
            Shape::nullable(Shape::Object(vec![
                Field::required("start", Shape::Date),
                Field::required("end", Shape::Date),
            ])),
        ),
        Field::required("total_spend", Shape::non_negative()),
        Field::required("total_revenue", Shape::non_negative()),
        Field::required("campaigns_count", Shape::Count),
        Field::required(
            "metrics",
            Shape::Object(vec![
                Field::required("overall_roas", optional_rate()),
                Field::required("overall_ctr", optional_rate()),
                Field::required("avg_cpc", optional_rate()),
                Field::required("conversion_rate", optional_rate()),
            ]),
        ),
        Field::required("trends", Shape::map(trend)),
        Field::required("segmentation", Shape::map(Shape::array(segment))),
        Field::required("data_quality", quality),
    ])
}

fn hypothesis_fields() -> Vec<Field> {
    vec![
        Field::required("hypothesis_id", Shape::String),
        Field::required("hypothesis_text", Shape::String),
        Field::required("category", Shape::Enum(CATEGORIES)),
        Field::required("confidence_score", Shape::unit()),
        Field::optional("evidence_used", Shape::array(Shape::String)),
        Field::optional("focus_metric", Shape::Enum(METRICS)),
        Field::optional(
            "segment",
            Shape::Object(vec![
                Field::required("dimension", Shape::Enum(DIMENSIONS)),
                Field::required("value", Shape::String),
            ]),
        ),
        Field::optional("expected_direction", Shape::Enum(DIRECTIONS)),
        Field::optional("supporting_observations", Shape::array(Shape::String)),
        Field::optional("validation_approach", Shape::String),
    ]
}

fn bounded_list(items: Shape) -> Shape {
    Shape::Array {
        items: Box::new(items),
        min_items: MIN_LIST_ITEMS,
        max_items: Some(MAX_LIST_ITEMS),
    }
}

#[must_use]
pub fn hypothesis_list_shape() -> Shape {
    bounded_list(Shape::Object(hypothesis_fields()))
}

#[must_use]
pub fn validated_list_shape() -> Shape {
    let significance = Shape::Object(vec![
        Field::required("test", Shape::String),
        Field::required("p_value", Shape::unit()),
        Field::required(
            "confidence_interval",
            Shape::Array {
                items: Box::new(Shape::number()),
                min_items: 2,
                max_items: Some(2),
            },
        ),
        Field::required("sample_size", Shape::Count),
        Field::required("reference_size", Shape::Count),
    ]);
    let evidence = Shape::Object(vec![
        Field::required(
            "metrics",
            Shape::array(Shape::Object(vec![
                Field::required("metric_name", Shape::String),
                Field::required("value", Shape::number()),
                Field::required("comparison_text", Shape::String),
            ])),
        ),
        Field::optional("statistical_significance", significance),
    ]);

    let mut fields = hypothesis_fields();
    fields.extend([
        Field::required("evidence", evidence),
        Field::required("validation_status", Shape::Enum(VALIDATION_STATUSES)),
        Field::required("adjusted_confidence_score", Shape::unit()),
        Field::required("validation_reasoning", Shape::String),
    ]);
    bounded_list(Shape::Object(fields))
}
