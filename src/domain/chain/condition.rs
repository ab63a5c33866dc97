//! Condition model and evaluator

use std::cmp::Ordering;
use std::fmt;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::error::ChainError;
use super::variables::{ScopeId, VariableStore};

/// A boolean test over the variable store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "conditionType", rename_all = "camelCase")]
pub enum Condition {
    /// Compare two interpolated operands
    Simple(SimpleCondition),

    /// Substring test
    Contains(ContainsCondition),

    /// Regular expression test
    Regex(RegexCondition),

    /// Variable is present, non-null and not an empty string
    Exists(ExistsCondition),
}

/// Comparison operator for simple conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOperator {
    #[serde(rename = "==", alias = "equals", alias = "eq")]
    Equal,

    #[serde(rename = "!=", alias = "not_equals", alias = "ne")]
    NotEqual,

    #[serde(rename = ">", alias = "greater_than", alias = "gt")]
    GreaterThan,

    #[serde(rename = "<", alias = "less_than", alias = "lt")]
    LessThan,

    #[serde(rename = ">=", alias = "greater_than_or_equal", alias = "gte")]
    GreaterThanOrEqual,

    #[serde(rename = "<=", alias = "less_than_or_equal", alias = "lte")]
    LessThanOrEqual,
}

impl ComparisonOperator {
    fn accepts(&self, ordering: Option<Ordering>) -> bool {
        let Some(ordering) = ordering else {
            return matches!(self, Self::NotEqual);
        };

        match self {
            Self::Equal => ordering == Ordering::Equal,
            Self::NotEqual => ordering != Ordering::Equal,
            Self::GreaterThan => ordering == Ordering::Greater,
            Self::LessThan => ordering == Ordering::Less,
            Self::GreaterThanOrEqual => ordering != Ordering::Less,
            Self::LessThanOrEqual => ordering != Ordering::Greater,
        }
    }
}

impl fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::GreaterThan => ">",
            Self::LessThan => "<",
            Self::GreaterThanOrEqual => ">=",
            Self::LessThanOrEqual => "<=",
        };
        write!(f, "{}", symbol)
    }
}

/// How a simple comparison was decided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonMode {
    /// Both operands parsed as numbers
    Numeric,

    /// Fallback: lexicographic string comparison
    Text,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SimpleCondition {
    pub left: String,
    pub operator: ComparisonOperator,
    pub right: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContainsCondition {
    pub search_in: String,
    pub search_for: String,
    #[serde(default)]
    pub case_sensitive: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegexCondition {
    pub pattern: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub flags: String,
    pub test_string: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExistsCondition {
    #[serde(alias = "checkVariable")]
    pub variable: String,
}

impl ExistsCondition {
    /// Variable name with optional `{{ }}` wrapping removed
    pub fn variable_name(&self) -> &str {
        let trimmed = self.variable.trim();
        trimmed
            .strip_prefix("{{")
            .and_then(|s| s.strip_suffix("}}"))
            .map(str::trim)
            .unwrap_or(trimmed)
    }
}

/// Result of evaluating a condition, with details for observability
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub result: bool,
    pub details: Value,
}

impl Condition {
    pub fn simple(
        left: impl Into<String>,
        operator: ComparisonOperator,
        right: impl Into<String>,
    ) -> Self {
        Self::Simple(SimpleCondition {
            left: left.into(),
            operator,
            right: right.into(),
        })
    }

    pub fn contains(search_in: impl Into<String>, search_for: impl Into<String>) -> Self {
        Self::Contains(ContainsCondition {
            search_in: search_in.into(),
            search_for: search_for.into(),
            case_sensitive: false,
        })
    }

    pub fn regex(
        pattern: impl Into<String>,
        flags: impl Into<String>,
        test_string: impl Into<String>,
    ) -> Self {
        Self::Regex(RegexCondition {
            pattern: pattern.into(),
            flags: flags.into(),
            test_string: test_string.into(),
        })
    }

    pub fn exists(variable: impl Into<String>) -> Self {
        Self::Exists(ExistsCondition {
            variable: variable.into(),
        })
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Simple(_) => "simple",
            Self::Contains(_) => "contains",
            Self::Regex(_) => "regex",
            Self::Exists(_) => "exists",
        }
    }

    /// Static checks that do not need variables (regex compiles, names set)
    pub fn validate(&self) -> Result<(), ChainError> {
        match self {
            Self::Regex(c) => build_regex(&c.pattern, &c.flags).map(|_| ()),
            Self::Exists(c) if c.variable_name().is_empty() => Err(ChainError::configuration(
                "exists condition requires a variable name",
            )),
            _ => Ok(()),
        }
    }

    pub fn evaluate(&self, store: &VariableStore, scope: ScopeId) -> Result<Evaluation, ChainError> {
        match self {
            Self::Simple(c) => {
                let left = store.interpolate(scope, &c.left);
                let right = store.interpolate(scope, &c.right);
                let (result, mode) = compare(&left, c.operator, &right);

                Ok(Evaluation {
                    result,
                    details: json!({
                        "left": left,
                        "operator": c.operator.to_string(),
                        "right": right,
                        "comparison": mode,
                    }),
                })
            }
            Self::Contains(c) => {
                let haystack = store.interpolate(scope, &c.search_in);
                let needle = store.interpolate(scope, &c.search_for);

                let result = if c.case_sensitive {
                    haystack.contains(&needle)
                } else {
                    haystack.to_lowercase().contains(&needle.to_lowercase())
                };

                Ok(Evaluation {
                    result,
                    details: json!({
                        "searchFor": needle,
                        "caseSensitive": c.case_sensitive,
                    }),
                })
            }
            Self::Regex(c) => {
                let regex = build_regex(&c.pattern, &c.flags)?;
                let subject = store.interpolate(scope, &c.test_string);

                Ok(Evaluation {
                    result: regex.is_match(&subject),
                    details: json!({
                        "pattern": c.pattern,
                        "flags": c.flags,
                    }),
                })
            }
            Self::Exists(c) => {
                let name = c.variable_name();
                let result = match store.get(scope, name) {
                    None | Some(Value::Null) => false,
                    Some(Value::String(s)) => !s.is_empty(),
                    Some(_) => true,
                };

                Ok(Evaluation {
                    result,
                    details: json!({ "variable": name }),
                })
            }
        }
    }
}

/// Numeric comparison when both sides parse as finite numbers, otherwise
/// lexicographic string comparison.
pub fn compare(left: &str, operator: ComparisonOperator, right: &str) -> (bool, ComparisonMode) {
    match (parse_number(left), parse_number(right)) {
        (Some(l), Some(r)) => (operator.accepts(l.partial_cmp(&r)), ComparisonMode::Numeric),
        _ => (operator.accepts(Some(left.cmp(right))), ComparisonMode::Text),
    }
}

pub(crate) fn parse_number(value: &str) -> Option<f64> {
    let trimmed = value.trim();

    if trimmed.is_empty() {
        return None;
    }

    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Compile a pattern with JavaScript-style flags (`i`, `m`, `s`, `u`; `g`/`y` ignored)
pub fn build_regex(pattern: &str, flags: &str) -> Result<Regex, ChainError> {
    let mut builder = RegexBuilder::new(pattern);

    for flag in flags.chars() {
        match flag {
            'i' => {
                builder.case_insensitive(true);
            }
            'm' => {
                builder.multi_line(true);
            }
            's' => {
                builder.dot_matches_new_line(true);
            }
            'u' => {
                builder.unicode(true);
            }
            'g' | 'y' => {}
            other => {
                return Err(ChainError::configuration(format!(
                    "unsupported regex flag '{}'",
                    other
                )));
            }
        }
    }

    builder.build().map_err(|e| {
        ChainError::configuration(format!("invalid regex pattern '{}': {}", pattern, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store(values: Value) -> VariableStore {
        match values {
            Value::Object(map) => VariableStore::with_inputs(map),
            _ => VariableStore::new(),
        }
    }

    fn eval(condition: &Condition, values: Value) -> Evaluation {
        let store = store(values);
        condition.evaluate(&store, store.root()).unwrap()
    }

    #[test]
    fn test_simple_numeric_comparison() {
        let condition = Condition::simple("{{score}}", ComparisonOperator::GreaterThan, "9");
        let evaluation = eval(&condition, json!({"score": 10}));

        // Lexicographically "10" < "9"; numerically 10 > 9
        assert!(evaluation.result);
        assert_eq!(evaluation.details["comparison"], json!("numeric"));
    }

    #[test]
    fn test_simple_numeric_equality_ignores_formatting() {
        let condition = Condition::simple("{{n}}", ComparisonOperator::Equal, "1.0");
        assert!(eval(&condition, json!({"n": 1})).result);
    }

    #[test]
    fn test_simple_falls_back_to_text() {
        let condition = Condition::simple("{{status}}", ComparisonOperator::Equal, "open");
        let evaluation = eval(&condition, json!({"status": "open"}));

        assert!(evaluation.result);
        assert_eq!(evaluation.details["comparison"], json!("text"));

        let ordered = Condition::simple("apple", ComparisonOperator::LessThan, "banana");
        assert!(eval(&ordered, json!({})).result);

        let mixed = Condition::simple("10", ComparisonOperator::LessThan, "abc");
        let evaluation = eval(&mixed, json!({}));
        assert!(evaluation.result);
        assert_eq!(evaluation.details["comparison"], json!("text"));
    }

    #[test]
    fn test_all_operators_numeric() {
        use ComparisonOperator::*;

        assert!(compare("2", Equal, "2").0);
        assert!(compare("2", NotEqual, "3").0);
        assert!(compare("3", GreaterThan, "2").0);
        assert!(compare("2", LessThan, "3").0);
        assert!(compare("3", GreaterThanOrEqual, "3").0);
        assert!(compare("3", LessThanOrEqual, "3").0);
        assert!(!compare("4", LessThanOrEqual, "3").0);
    }

    #[test]
    fn test_empty_operands_compare_as_text() {
        let (result, mode) = compare("", ComparisonOperator::Equal, "");
        assert!(result);
        assert_eq!(mode, ComparisonMode::Text);
    }

    #[test]
    fn test_contains_defaults_to_case_insensitive() {
        let condition = Condition::contains("{{text}}", "URGENT");
        assert!(eval(&condition, json!({"text": "this is urgent!"})).result);
    }

    #[test]
    fn test_contains_case_sensitive() {
        let condition = Condition::Contains(ContainsCondition {
            search_in: "{{text}}".to_string(),
            search_for: "URGENT".to_string(),
            case_sensitive: true,
        });
        assert!(!eval(&condition, json!({"text": "this is urgent!"})).result);
    }

    #[test]
    fn test_regex_with_flags() {
        let condition = Condition::regex("^order-\\d+$", "i", "{{ref}}");
        assert!(eval(&condition, json!({"ref": "ORDER-42"})).result);
        assert!(!eval(&condition, json!({"ref": "invoice-42"})).result);
    }

    #[test]
    fn test_invalid_regex_is_configuration_error() {
        let condition = Condition::regex("([a-z", "", "abc");
        let store = VariableStore::new();

        let err = condition.evaluate(&store, store.root()).unwrap_err();
        assert!(matches!(err, ChainError::Configuration(_)));
        assert!(condition.validate().is_err());
    }

    #[test]
    fn test_unknown_regex_flag_rejected() {
        assert!(build_regex("a", "x").is_err());
        assert!(build_regex("a", "gimsuy").is_ok());
    }

    #[test]
    fn test_exists() {
        let condition = Condition::exists("email");

        assert!(eval(&condition, json!({"email": "a@b.c"})).result);
        assert!(!eval(&condition, json!({"email": ""})).result);
        assert!(!eval(&condition, json!({"email": null})).result);
        assert!(!eval(&condition, json!({})).result);
        assert!(eval(&condition, json!({"email": 0})).result);
    }

    #[test]
    fn test_exists_accepts_placeholder_syntax() {
        let condition = Condition::exists("{{ email }}");
        assert!(eval(&condition, json!({"email": "x"})).result);
    }

    #[test]
    fn test_deserialize_condition_types() {
        let simple: Condition = serde_json::from_value(json!({
            "conditionType": "simple",
            "left": "{{a}}",
            "operator": ">=",
            "right": "1"
        }))
        .unwrap();
        assert_eq!(simple.type_name(), "simple");

        let exists: Condition = serde_json::from_value(json!({
            "conditionType": "exists",
            "checkVariable": "a"
        }))
        .unwrap();
        assert_eq!(exists, Condition::exists("a"));

        let unknown: Result<Condition, _> =
            serde_json::from_value(json!({"conditionType": "fuzzy"}));
        assert!(unknown.is_err());
    }
}
