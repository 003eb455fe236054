//! Boolean logic language used by visibility rules, step redirects, and
//! document requirements.
//!
//! Expressions arrive as JSON in the survey fixture and are parsed once into
//! [`Expression`]. Evaluation never fails: malformed shapes are rejected by
//! [`Expression::parse`] so a loaded survey can only hold well-formed trees.

use std::cmp::Ordering;

use serde_json::Value;

use super::domain::AnswerMap;

/// Parsed logic expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Constant; booleans evaluate to themselves, anything else by truthiness.
    Literal(Value),
    /// Truthiness of a single answer.
    Var(String),
    Compare {
        op: CompareOp,
        left: Operand,
        right: Operand,
    },
    All(Vec<Expression>),
    Any(Vec<Expression>),
    /// Negated disjunction of the operands.
    Not(Vec<Expression>),
}

/// Comparison operand resolved against the answer map at evaluation time.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Var(String),
    Expr(Box<Expression>),
    List(Vec<Operand>),
    Literal(Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    In,
    Gt,
    Ge,
    Lt,
    Le,
    Contains,
}

impl CompareOp {
    fn from_token(token: &str) -> Option<Self> {
        let op = match token.to_ascii_lowercase().as_str() {
            "==" | "eq" => Self::Eq,
            "!=" | "neq" => Self::Ne,
            "in" => Self::In,
            ">" | "gt" => Self::Gt,
            ">=" | "gte" => Self::Ge,
            "<" | "lt" => Self::Lt,
            "<=" | "lte" => Self::Le,
            "contains" => Self::Contains,
            _ => return None,
        };
        Some(op)
    }

    fn apply(self, left: &Value, right: &Value) -> bool {
        match self {
            Self::Eq => loose_eq(left, right),
            Self::Ne => !loose_eq(left, right),
            Self::In => is_member(left, right),
            Self::Contains => is_member(right, left),
            Self::Gt => compare(left, right) == Some(Ordering::Greater),
            Self::Ge => matches!(
                compare(left, right),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Self::Lt => compare(left, right) == Some(Ordering::Less),
            Self::Le => matches!(compare(left, right), Some(Ordering::Less | Ordering::Equal)),
        }
    }
}

/// Reasons an expression cannot be loaded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExpressionError {
    #[error("unsupported operator '{0}'")]
    UnknownOperator(String),
    #[error("operator '{op}' expects 2 operands, found {found}")]
    OperandCount { op: String, found: usize },
    #[error("variable name must be a string, found {0}")]
    InvalidVariable(String),
    #[error("expression object must have a single operator key, found [{0}]")]
    UnsupportedShape(String),
}

const COMBINATORS: [&str; 5] = ["all", "any", "and", "or", "not"];

impl Expression {
    /// Parse a JSON logic expression. `null` parses to a literal `true`.
    pub fn parse(raw: &Value) -> Result<Self, ExpressionError> {
        match raw {
            Value::Null => Ok(Self::Literal(Value::Bool(true))),
            Value::Array(items) => Ok(Self::All(parse_all(items)?)),
            Value::Object(map) => {
                if let Some(key) = COMBINATORS.iter().find(|key| map.contains_key(**key)) {
                    let operands = match &map[*key] {
                        Value::Array(items) => parse_all(items)?,
                        single => vec![Self::parse(single)?],
                    };
                    return Ok(match *key {
                        "all" | "and" => Self::All(operands),
                        "any" | "or" => Self::Any(operands),
                        _ => Self::Not(operands),
                    });
                }

                let mut entries = map.iter();
                let (key, operands) = match (entries.next(), entries.next()) {
                    (Some(entry), None) => entry,
                    _ => {
                        let keys: Vec<&str> = map.keys().map(String::as_str).collect();
                        return Err(ExpressionError::UnsupportedShape(keys.join(", ")));
                    }
                };
                if key == "var" {
                    return Ok(Self::Var(variable_name(operands)?));
                }

                let op = CompareOp::from_token(key)
                    .ok_or_else(|| ExpressionError::UnknownOperator(key.clone()))?;
                let resolved = match operands {
                    Value::Array(items) => items
                        .iter()
                        .map(Operand::parse)
                        .collect::<Result<Vec<_>, _>>()?,
                    single => vec![Operand::parse(single)?],
                };
                match <[Operand; 2]>::try_from(resolved) {
                    Ok([left, right]) => Ok(Self::Compare { op, left, right }),
                    Err(resolved) => Err(ExpressionError::OperandCount {
                        op: key.clone(),
                        found: resolved.len(),
                    }),
                }
            }
            Value::String(text) => match text.strip_prefix('$') {
                Some(name) => Ok(Self::Var(name.to_string())),
                None => Ok(Self::Literal(raw.clone())),
            },
            Value::Bool(_) | Value::Number(_) => Ok(Self::Literal(raw.clone())),
        }
    }

    /// Parse an optional gating expression; absent and `null` both mean "always".
    pub fn parse_optional(raw: Option<&Value>) -> Result<Option<Self>, ExpressionError> {
        match raw {
            None | Some(Value::Null) => Ok(None),
            Some(value) => Self::parse(value).map(Some),
        }
    }

    pub fn evaluate(&self, context: &AnswerMap) -> bool {
        match self {
            Self::Literal(value) => is_truthy(value),
            Self::Var(name) => context.get(name).map(is_truthy).unwrap_or(false),
            Self::Compare { op, left, right } => {
                op.apply(&left.resolve(context), &right.resolve(context))
            }
            Self::All(items) => items.iter().all(|item| item.evaluate(context)),
            Self::Any(items) => items.iter().any(|item| item.evaluate(context)),
            Self::Not(items) => !items.iter().any(|item| item.evaluate(context)),
        }
    }

    /// True when the expression is the constant `true`.
    pub fn is_always(&self) -> bool {
        matches!(self, Self::Literal(Value::Bool(true)))
    }

    /// Answer codes referenced anywhere in the tree.
    pub fn variables(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_variables(&mut names);
        names
    }

    /// `(variable, literal)` pairs where an answer is compared against a
    /// constant, including each constant of an `in` list.
    pub fn compared_literals(&self) -> Vec<(&str, &Value)> {
        let mut pairs = Vec::new();
        self.collect_literals(&mut pairs);
        pairs
    }

    fn collect_literals<'a>(&'a self, pairs: &mut Vec<(&'a str, &'a Value)>) {
        match self {
            Self::Literal(_) | Self::Var(_) => {}
            Self::Compare { left, right, .. } => {
                if let Operand::Var(name) = left {
                    right.push_literals(name, pairs);
                }
                if let Operand::Var(name) = right {
                    left.push_literals(name, pairs);
                }
                for side in [left, right] {
                    if let Operand::Expr(inner) = side {
                        inner.collect_literals(pairs);
                    }
                }
            }
            Self::All(items) | Self::Any(items) | Self::Not(items) => {
                for item in items {
                    item.collect_literals(pairs);
                }
            }
        }
    }

    fn collect_variables<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Self::Literal(_) => {}
            Self::Var(name) => names.push(name),
            Self::Compare { left, right, .. } => {
                left.collect_variables(names);
                right.collect_variables(names);
            }
            Self::All(items) | Self::Any(items) | Self::Not(items) => {
                for item in items {
                    item.collect_variables(names);
                }
            }
        }
    }
}

/// Evaluate an optional expression; an absent expression always holds.
pub fn evaluate(expression: Option<&Expression>, context: &AnswerMap) -> bool {
    expression.map_or(true, |expression| expression.evaluate(context))
}

impl Operand {
    fn parse(raw: &Value) -> Result<Self, ExpressionError> {
        match raw {
            Value::Object(map) if map.len() == 1 && map.contains_key("var") => {
                Ok(Self::Var(variable_name(&map["var"])?))
            }
            Value::Object(_) => Ok(Self::Expr(Box::new(Expression::parse(raw)?))),
            Value::Array(items) => Ok(Self::List(
                items.iter().map(Self::parse).collect::<Result<_, _>>()?,
            )),
            Value::String(text) if text.starts_with('$') => Ok(Self::Var(text[1..].to_string())),
            other => Ok(Self::Literal(other.clone())),
        }
    }

    fn resolve(&self, context: &AnswerMap) -> Value {
        match self {
            Self::Var(name) => context.get(name).cloned().unwrap_or(Value::Null),
            Self::Expr(expression) => Value::Bool(expression.evaluate(context)),
            Self::List(items) => Value::Array(items.iter().map(|item| item.resolve(context)).collect()),
            Self::Literal(value) => value.clone(),
        }
    }

    fn push_literals<'a>(&'a self, name: &'a str, pairs: &mut Vec<(&'a str, &'a Value)>) {
        match self {
            Self::Literal(value) => pairs.push((name, value)),
            Self::List(items) => {
                for item in items {
                    if let Self::Literal(value) = item {
                        pairs.push((name, value));
                    }
                }
            }
            Self::Var(_) | Self::Expr(_) => {}
        }
    }

    fn collect_variables<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Self::Var(name) => names.push(name),
            Self::Expr(expression) => expression.collect_variables(names),
            Self::List(items) => {
                for item in items {
                    item.collect_variables(names);
                }
            }
            Self::Literal(_) => {}
        }
    }
}

fn parse_all(items: &[Value]) -> Result<Vec<Expression>, ExpressionError> {
    items.iter().map(Expression::parse).collect()
}

fn variable_name(raw: &Value) -> Result<String, ExpressionError> {
    match raw {
        Value::String(name) => Ok(name.clone()),
        other => Err(ExpressionError::InvalidVariable(other.to_string())),
    }
}

/// `null`, `false`, zero, and empty strings/lists/objects are falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().map_or(false, |n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| loose_eq(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(key, x)| b.get(key).map_or(false, |y| loose_eq(x, y)))
        }
        _ => left == right,
    }
}

fn is_member(needle: &Value, haystack: &Value) -> bool {
    match (needle, haystack) {
        (_, Value::Array(items)) => items.iter().any(|item| loose_eq(needle, item)),
        (Value::String(part), Value::String(whole)) => whole.contains(part.as_str()),
        (Value::String(key), Value::Object(map)) => map.contains_key(key),
        _ => false,
    }
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(value: Value) -> AnswerMap {
        serde_json::from_value(value).expect("context object")
    }

    fn eval(raw: Value, context: &AnswerMap) -> bool {
        Expression::parse(&raw)
            .expect("expression parses")
            .evaluate(context)
    }

    #[test]
    fn null_and_booleans_evaluate_as_constants() {
        let empty = AnswerMap::new();
        assert!(eval(Value::Null, &empty));
        assert!(eval(json!(true), &empty));
        assert!(!eval(json!(false), &empty));
        assert!(evaluate(None, &empty));
    }

    #[test]
    fn combinators_follow_boolean_algebra() {
        let context = ctx(json!({ "a": true, "b": false }));
        assert!(!eval(json!({ "all": [{ "var": "a" }, { "var": "b" }] }), &context));
        assert!(eval(json!({ "or": [{ "var": "a" }, { "var": "b" }] }), &context));
        assert!(eval(json!({ "not": { "var": "b" } }), &context));
        assert!(!eval(json!({ "not": [{ "var": "b" }, { "var": "a" }] }), &context));
        assert!(!eval(json!([{ "var": "a" }, { "var": "b" }]), &context));
        assert!(eval(json!({ "and": [] }), &context));
        assert!(!eval(json!({ "any": [] }), &context));
    }

    #[test]
    fn var_uses_truthiness_and_missing_is_falsy() {
        let context = ctx(json!({ "empty": "", "zero": 0, "list": ["x"] }));
        assert!(!eval(json!({ "var": "empty" }), &context));
        assert!(!eval(json!({ "var": "zero" }), &context));
        assert!(eval(json!({ "var": "list" }), &context));
        assert!(!eval(json!({ "var": "missing" }), &context));
    }

    #[test]
    fn comparisons_resolve_variables_and_nested_expressions() {
        let context = ctx(json!({ "age": 17, "who": "parent", "agree": true }));
        assert!(eval(json!({ "<": [{ "var": "age" }, 18] }), &context));
        assert!(eval(json!({ ">=": [{ "var": "age" }, 17.0] }), &context));
        assert!(eval(json!({ "==": [{ "var": "agree" }, true] }), &context));
        assert!(eval(json!({ "!=": ["$who", "self"] }), &context));
        assert!(eval(
            json!({ "==": [{ "all": [{ "var": "agree" }] }, true] }),
            &context
        ));
        assert!(eval(json!({ "EQ": [{ "var": "who" }, "parent"] }), &context));
    }

    #[test]
    fn membership_mirrors_and_tolerates_type_mismatches() {
        let context = ctx(json!({ "who": "parent", "needs": ["wheelchair", "lift"], "n": 3 }));
        assert!(eval(
            json!({ "in": [{ "var": "who" }, ["parent", "guardian"]] }),
            &context
        ));
        assert!(eval(json!({ "contains": [{ "var": "needs" }, "lift"] }), &context));
        assert!(eval(json!({ "in": ["are", { "var": "who" }] }), &context));
        assert!(!eval(json!({ "in": [{ "var": "who" }, { "var": "n" }] }), &context));
        assert!(!eval(json!({ "contains": [{ "var": "n" }, 3] }), &context));
    }

    #[test]
    fn ordering_against_missing_values_is_false() {
        let context = AnswerMap::new();
        assert!(!eval(json!({ ">": [{ "var": "age" }, 18] }), &context));
        assert!(!eval(json!({ "<=": [{ "var": "age" }, 18] }), &context));
        assert!(!eval(json!({ "<": ["a", 1] }), &context));
    }

    #[test]
    fn constant_expressions_ignore_context() {
        let expression = Expression::parse(&json!({
            "any": [{ "==": [1, 1.0] }, { "in": ["x", ["y"]] }]
        }))
        .expect("parses");
        let first = ctx(json!({}));
        let second = ctx(json!({ "x": "y", "1": false }));
        assert!(expression.evaluate(&first));
        assert_eq!(expression.evaluate(&first), expression.evaluate(&second));
        assert!(expression.variables().is_empty());
    }

    #[test]
    fn malformed_shapes_are_rejected_at_parse_time() {
        assert_eq!(
            Expression::parse(&json!({ "~": [1, 2] })),
            Err(ExpressionError::UnknownOperator("~".to_string()))
        );
        assert!(matches!(
            Expression::parse(&json!({ "==": [1] })),
            Err(ExpressionError::OperandCount { found: 1, .. })
        ));
        assert!(matches!(
            Expression::parse(&json!({ "==": [1, 2], "!=": [1, 2] })),
            Err(ExpressionError::UnsupportedShape(_))
        ));
        assert!(matches!(
            Expression::parse(&json!({ "var": 5 })),
            Err(ExpressionError::InvalidVariable(_))
        ));
    }

    #[test]
    fn variables_lists_referenced_answers() {
        let expression = Expression::parse(&json!({
            "all": [{ "var": "a" }, { "in": ["$b", [{ "var": "c" }]] }]
        }))
        .expect("parses");
        assert_eq!(expression.variables(), vec!["a", "b", "c"]);
    }

    #[test]
    fn compared_literals_pair_answers_with_constants() {
        let expression = Expression::parse(&json!({ "any": [
            { ">": [{ "var": "q_household" }, 1] },
            { "in": [{ "var": "q_region" }, ["north", "south"]] },
            { "==": [{ "var": "a" }, { "var": "b" }] }
        ] }))
        .expect("expression parses");

        let pairs = expression.compared_literals();
        assert_eq!(
            pairs,
            vec![
                ("q_household", &json!(1)),
                ("q_region", &json!("north")),
                ("q_region", &json!("south")),
            ]
        );
    }
}
