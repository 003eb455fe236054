use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use serde_json::{Number, Value};

use crate::workflows::survey::domain::Question;

static EMAIL_PATTERN: OnceLock<Regex> = OnceLock::new();
static PHONE_PATTERN: OnceLock<Regex> = OnceLock::new();
static DATE_PATTERN: OnceLock<Regex> = OnceLock::new();

fn email_pattern() -> &'static Regex {
    EMAIL_PATTERN.get_or_init(|| {
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s.]+$").expect("regex for email addresses")
    })
}

fn phone_pattern() -> &'static Regex {
    PHONE_PATTERN.get_or_init(|| Regex::new(r"^\+7[0-9]{10}$").expect("regex for phone numbers"))
}

fn date_pattern() -> &'static Regex {
    DATE_PATTERN.get_or_init(|| Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}$").expect("regex for iso dates"))
}

const TRUE_TOKENS: [&str; 6] = ["true", "1", "yes", "y", "да", "д"];
const FALSE_TOKENS: [&str; 6] = ["false", "0", "no", "n", "нет", "н"];

pub(super) type RuleResult = Result<Value, String>;

/// `null` and blank strings mean "no answer" for every typed rule.
pub(super) fn is_blank(raw: &Value) -> bool {
    match raw {
        Value::Null => true,
        Value::String(text) => text.trim().is_empty(),
        _ => false,
    }
}

pub(super) fn text(question: &Question, raw: &Value) -> RuleResult {
    match raw {
        Value::Null => Ok(Value::Null),
        Value::String(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() && !question.required {
                Ok(Value::Null)
            } else {
                Ok(Value::String(trimmed.to_string()))
            }
        }
        _ => Err("expected a text value".to_string()),
    }
}

pub(super) fn email(raw: &Value) -> RuleResult {
    let candidate = expect_str(raw)?.trim().to_lowercase();
    if email_pattern().is_match(&candidate) {
        Ok(Value::String(candidate))
    } else {
        Err("invalid email address".to_string())
    }
}

pub(super) fn phone(raw: &Value) -> RuleResult {
    let candidate: String = expect_str(raw)?
        .chars()
        .filter(|ch| !matches!(ch, ' ' | '-' | '(' | ')'))
        .collect();
    if phone_pattern().is_match(&candidate) {
        Ok(Value::String(candidate))
    } else {
        Err("phone must be +7 followed by 10 digits".to_string())
    }
}

pub(super) fn date(question: &Question, raw: &Value, today: NaiveDate) -> RuleResult {
    let candidate = expect_str(raw)?.trim();
    if !date_pattern().is_match(candidate) {
        return Err("date must use the YYYY-MM-DD format".to_string());
    }
    let parsed = NaiveDate::parse_from_str(candidate, "%Y-%m-%d")
        .map_err(|_| "date does not exist".to_string())?;
    if question.config.not_in_future && parsed > today {
        return Err("date cannot be in the future".to_string());
    }
    Ok(Value::String(parsed.format("%Y-%m-%d").to_string()))
}

pub(super) fn boolean(raw: &Value) -> RuleResult {
    match raw {
        Value::Bool(flag) => Ok(Value::Bool(*flag)),
        Value::Number(number) if number.as_f64() == Some(1.0) => Ok(Value::Bool(true)),
        Value::Number(number) if number.as_f64() == Some(0.0) => Ok(Value::Bool(false)),
        Value::String(text) => parse_boolean(text)
            .map(Value::Bool)
            .ok_or_else(|| "expected yes or no".to_string()),
        _ => Err("expected yes or no".to_string()),
    }
}

/// Case-insensitive yes/no token lookup shared with the chat front-end.
pub(crate) fn parse_boolean(text: &str) -> Option<bool> {
    let token = text.trim().to_lowercase();
    if TRUE_TOKENS.contains(&token.as_str()) {
        Some(true)
    } else if FALSE_TOKENS.contains(&token.as_str()) {
        Some(false)
    } else {
        None
    }
}

pub(super) fn select_one(question: &Question, raw: &Value) -> RuleResult {
    let value = expect_str(raw)?;
    if question.has_option(value) {
        Ok(Value::String(value.to_string()))
    } else {
        Err(format!("unknown option '{value}'"))
    }
}

pub(super) fn select_many(question: &Question, raw: &Value) -> RuleResult {
    let Value::Array(items) = raw else {
        return Err("expected a list of options".to_string());
    };
    let mut selected: Vec<Value> = Vec::with_capacity(items.len());
    for item in items {
        let Value::String(value) = item else {
            return Err("expected a list of options".to_string());
        };
        if !question.has_option(value) {
            return Err(format!("unknown option '{value}'"));
        }
        if !selected.iter().any(|existing| existing == item) {
            selected.push(item.clone());
        }
    }
    Ok(Value::Array(selected))
}

pub(super) fn number(raw: &Value) -> RuleResult {
    match raw {
        Value::Number(_) => Ok(raw.clone()),
        Value::String(text) => text
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| "expected a number".to_string()),
        _ => Err("expected a number".to_string()),
    }
}

fn expect_str(raw: &Value) -> Result<&str, String> {
    match raw {
        Value::String(text) => Ok(text),
        _ => Err("expected a text value".to_string()),
    }
}
