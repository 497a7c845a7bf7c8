use chrono::{NaiveDate, NaiveTime};
use serde_json::Value;

pub fn require_str(params: &Value, key: &str) -> Result<String, String> {
    match params.get(key).and_then(|v| v.as_str()) {
        Some(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Some(_) => Err(format!("{} must not be empty", key)),
        None => Err(format!("missing {}", key)),
    }
}

/// Absent and explicit-null both read as None; a present value must be a
/// string. Values are trimmed, and an all-whitespace string reads as None.
pub fn opt_str(params: &Value, key: &str) -> Result<Option<String>, String> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => match v.as_str() {
            Some(s) => {
                let t = s.trim();
                if t.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(t.to_string()))
                }
            }
            None => Err(format!("{} must be a string", key)),
        },
    }
}

pub fn require_f64(params: &Value, key: &str) -> Result<f64, String> {
    match params.get(key).and_then(|v| v.as_f64()) {
        Some(v) => Ok(v),
        None => Err(format!("missing or non-numeric {}", key)),
    }
}

pub fn opt_f64(params: &Value, key: &str) -> Result<Option<f64>, String> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => match v.as_f64() {
            Some(n) => Ok(Some(n)),
            None => Err(format!("{} must be a number", key)),
        },
    }
}

pub fn opt_i64(params: &Value, key: &str) -> Result<Option<i64>, String> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => match v.as_i64() {
            Some(n) => Ok(Some(n)),
            None => Err(format!("{} must be an integer", key)),
        },
    }
}

pub fn check_percent(key: &str, value: f64) -> Result<(), String> {
    if (0.0..=100.0).contains(&value) {
        Ok(())
    } else {
        Err(format!("{} must be between 0 and 100", key))
    }
}

pub fn check_status(key: &str, value: &str, allowed: &[&str]) -> Result<(), String> {
    if allowed.contains(&value) {
        Ok(())
    } else {
        Err(format!("{} must be one of: {}", key, allowed.join(", ")))
    }
}

pub fn parse_date(key: &str, value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| format!("{} must be a YYYY-MM-DD date", key))
}

pub fn parse_time(key: &str, value: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .map_err(|_| format!("{} must be an HH:MM:SS time", key))
}
