//! Strict validation of structured NLU answers.
//!
//! Every payload is checked for its required keys and field types before any of it
//! is used. A payload that fails validation is discarded as a whole.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::errors::ExtractionError;

type Object = Map<String, Value>;

/// A payload shape the NLU gateway is asked to fill.
pub trait ExtractionSchema: Sized {
    /// Keys that must be present. They may be `null`.
    const REQUIRED_KEYS: &'static [&'static str];

    fn from_object(object: &Object) -> Result<Self, ExtractionError>;
}

pub fn parse<T: ExtractionSchema>(raw: &str) -> Result<T, ExtractionError> {
    let object = json_object(raw)?;
    for key in T::REQUIRED_KEYS {
        if !object.contains_key(*key) {
            return Err(ExtractionError::MissingKey(*key));
        }
    }
    T::from_object(&object)
}

/// Parses the outermost `{ ... }` span, tolerating prose or code fences around it.
pub fn json_object(raw: &str) -> Result<Object, ExtractionError> {
    let start = raw.find('{').ok_or(ExtractionError::NoJsonObject)?;
    let end = raw.rfind('}').ok_or(ExtractionError::NoJsonObject)?;
    if end < start {
        return Err(ExtractionError::NoJsonObject);
    }

    match serde_json::from_str::<Value>(&raw[start..=end]) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(_) => Err(ExtractionError::NoJsonObject),
        Err(error) => Err(ExtractionError::InvalidJson(error.to_string())),
    }
}

fn text(object: &Object, key: &'static str) -> Result<Option<String>, ExtractionError> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => {
            let trimmed = value.trim();
            if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
                Ok(None)
            } else {
                Ok(Some(trimmed.to_string()))
            }
        }
        Some(_) => Err(ExtractionError::WrongType { key, expected: "string or null" }),
    }
}

fn flag(object: &Object, key: &'static str) -> Result<bool, ExtractionError> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(value)) => Ok(*value),
        Some(_) => Err(ExtractionError::WrongType { key, expected: "boolean or null" }),
    }
}

/// Ids arrive as numbers, numeric strings or `#12`.
fn identifier(object: &Object, key: &'static str) -> Result<Option<i64>, ExtractionError> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(number)) => number
            .as_i64()
            .map(Some)
            .ok_or(ExtractionError::WrongType { key, expected: "integer id" }),
        Some(Value::String(value)) => {
            let trimmed = value.trim().trim_start_matches('#');
            if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
                return Ok(None);
            }
            trimmed
                .parse::<i64>()
                .map(Some)
                .map_err(|_| ExtractionError::WrongType { key, expected: "integer id" })
        }
        Some(_) => Err(ExtractionError::WrongType { key, expected: "integer id" }),
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LeaveRequestFields {
    pub leave_type: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub reason: Option<String>,
    pub half_day: bool,
    /// Only honoured for HR callers submitting on someone's behalf.
    pub employee_name: Option<String>,
}

impl ExtractionSchema for LeaveRequestFields {
    const REQUIRED_KEYS: &'static [&'static str] =
        &["leave_type", "start_date", "end_date", "reason", "half_day"];

    fn from_object(object: &Object) -> Result<Self, ExtractionError> {
        Ok(Self {
            leave_type: text(object, "leave_type")?,
            start_date: text(object, "start_date")?,
            end_date: text(object, "end_date")?,
            reason: text(object, "reason")?,
            half_day: flag(object, "half_day")?,
            employee_name: text(object, "employee_name")?,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ApprovalFields {
    pub request_id: Option<i64>,
    pub employee_name: Option<String>,
    pub decision: Option<String>,
    pub comment: Option<String>,
}

impl ExtractionSchema for ApprovalFields {
    const REQUIRED_KEYS: &'static [&'static str] =
        &["request_id", "employee_name", "decision", "comment"];

    fn from_object(object: &Object) -> Result<Self, ExtractionError> {
        Ok(Self {
            request_id: identifier(object, "request_id")?,
            employee_name: text(object, "employee_name")?,
            decision: text(object, "decision")?.map(|value| value.to_ascii_lowercase()),
            comment: text(object, "comment")?,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CancellationFields {
    pub request_id: Option<i64>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub employee_name: Option<String>,
}

impl ExtractionSchema for CancellationFields {
    const REQUIRED_KEYS: &'static [&'static str] = &["request_id", "start_date", "end_date"];

    fn from_object(object: &Object) -> Result<Self, ExtractionError> {
        Ok(Self {
            request_id: identifier(object, "request_id")?,
            start_date: text(object, "start_date")?,
            end_date: text(object, "end_date")?,
            employee_name: text(object, "employee_name")?,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListingFields {
    pub status: Option<String>,
    pub employee_name: Option<String>,
    pub time_frame: Option<String>,
}

impl ExtractionSchema for ListingFields {
    const REQUIRED_KEYS: &'static [&'static str] = &["status", "employee_name", "time_frame"];

    fn from_object(object: &Object) -> Result<Self, ExtractionError> {
        Ok(Self {
            status: text(object, "status")?.map(|value| value.to_ascii_lowercase()),
            employee_name: text(object, "employee_name")?,
            time_frame: text(object, "time_frame")?,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DateRangeFields {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl ExtractionSchema for DateRangeFields {
    const REQUIRED_KEYS: &'static [&'static str] = &["start_date", "end_date"];

    fn from_object(object: &Object) -> Result<Self, ExtractionError> {
        Ok(Self { start_date: text(object, "start_date")?, end_date: text(object, "end_date")? })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReportFields {
    pub report_type: Option<String>,
    pub department: Option<String>,
    pub time_frame: Option<String>,
}

impl ExtractionSchema for ReportFields {
    const REQUIRED_KEYS: &'static [&'static str] = &["report_type", "department", "time_frame"];

    fn from_object(object: &Object) -> Result<Self, ExtractionError> {
        Ok(Self {
            report_type: text(object, "report_type")?.map(|value| value.to_ascii_lowercase()),
            department: text(object, "department")?,
            time_frame: text(object, "time_frame")?,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EmployeeUpdateFields {
    pub identifier: Option<String>,
    pub updates: BTreeMap<String, String>,
}

impl ExtractionSchema for EmployeeUpdateFields {
    const REQUIRED_KEYS: &'static [&'static str] = &["identifier", "updates"];

    fn from_object(object: &Object) -> Result<Self, ExtractionError> {
        let updates = match object.get("updates") {
            None | Some(Value::Null) => BTreeMap::new(),
            Some(Value::Object(fields)) => {
                let mut updates = BTreeMap::new();
                for (field, value) in fields {
                    let value = match value {
                        Value::String(value) => value.trim().to_string(),
                        Value::Number(number) => number.to_string(),
                        Value::Bool(flag) => flag.to_string(),
                        _ => {
                            return Err(ExtractionError::WrongType {
                                key: "updates",
                                expected: "object of scalar values",
                            })
                        }
                    };
                    updates.insert(field.trim().to_string(), value);
                }
                updates
            }
            Some(_) => {
                return Err(ExtractionError::WrongType { key: "updates", expected: "object" })
            }
        };

        Ok(Self { identifier: text(object, "identifier")?, updates })
    }
}
