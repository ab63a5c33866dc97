//! Reductions applied to loop iteration results

use serde_json::{Number, Value};

use crate::domain::chain::Aggregation;

const DEFAULT_SEPARATOR: &str = ", ";

/// Reduce per-iteration results. No aggregation keeps the list as-is;
/// an empty list always aggregates to null.
pub fn aggregate(aggregation: Option<Aggregation>, results: &[Value], separator: Option<&str>) -> Value {
    if results.is_empty() {
        return Value::Null;
    }

    let Some(aggregation) = aggregation else {
        return Value::Array(results.to_vec());
    };

    match aggregation {
        Aggregation::Concat => Value::Array(
            results
                .iter()
                .flat_map(|r| match r {
                    Value::Array(items) => items.clone(),
                    other => vec![other.clone()],
                })
                .collect(),
        ),
        Aggregation::Join => {
            let joined: Vec<String> = results.iter().map(as_text).collect();
            Value::String(joined.join(separator.unwrap_or(DEFAULT_SEPARATOR)))
        }
        Aggregation::Sum => number_value(results.iter().map(as_number).sum()),
        Aggregation::Average => {
            let sum: f64 = results.iter().map(as_number).sum();
            number_value(sum / results.len() as f64)
        }
        Aggregation::Min => number_value(results.iter().map(as_number).fold(f64::INFINITY, f64::min)),
        Aggregation::Max => {
            number_value(results.iter().map(as_number).fold(f64::NEG_INFINITY, f64::max))
        }
        Aggregation::First => results[0].clone(),
        Aggregation::Last => results[results.len() - 1].clone(),
        Aggregation::Count => Value::from(results.len()),
        Aggregation::Unique => {
            let mut unique: Vec<Value> = Vec::new();
            for result in results {
                if !unique.contains(result) {
                    unique.push(result.clone());
                }
            }
            Value::Array(unique)
        }
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Non-numeric results count as zero
fn as_number(value: &Value) -> f64 {
    let n = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        Value::Bool(b) => f64::from(u8::from(*b)),
        _ => 0.0,
    };
    if n.is_finite() {
        n
    } else {
        0.0
    }
}

/// Integral results stay integers in JSON
fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn values(v: Value) -> Vec<Value> {
        v.as_array().cloned().unwrap_or_default()
    }

    #[test]
    fn test_empty_results_aggregate_to_null() {
        assert_eq!(aggregate(Some(Aggregation::Sum), &[], None), Value::Null);
        assert_eq!(aggregate(None, &[], None), Value::Null);
    }

    #[test]
    fn test_no_aggregation_keeps_results() {
        let results = values(json!([1, "a"]));
        assert_eq!(aggregate(None, &results, None), json!([1, "a"]));
    }

    #[test]
    fn test_numeric_reductions() {
        let results = values(json!([1, "2", 3.5, "x"]));

        assert_eq!(aggregate(Some(Aggregation::Sum), &results, None), json!(6.5));
        assert_eq!(aggregate(Some(Aggregation::Min), &results, None), json!(0));
        assert_eq!(aggregate(Some(Aggregation::Max), &results, None), json!(3.5));

        let ints = values(json!([2, 4]));
        assert_eq!(aggregate(Some(Aggregation::Sum), &ints, None), json!(6));
        assert_eq!(aggregate(Some(Aggregation::Average), &ints, None), json!(3));
    }

    #[test]
    fn test_concat_flattens_one_level() {
        let results = values(json!([[1, 2], 3, [[4]]]));
        assert_eq!(
            aggregate(Some(Aggregation::Concat), &results, None),
            json!([1, 2, 3, [4]])
        );
    }

    #[test]
    fn test_join_uses_separator() {
        let results = values(json!(["a", 1, {"k": true}]));
        assert_eq!(
            aggregate(Some(Aggregation::Join), &results, None),
            json!(r#"a, 1, {"k":true}"#)
        );
        assert_eq!(
            aggregate(Some(Aggregation::Join), &results[..2], Some("\n")),
            json!("a\n1")
        );
    }

    #[test]
    fn test_positional_and_set_reductions() {
        let results = values(json!(["b", "a", "b", 1]));

        assert_eq!(aggregate(Some(Aggregation::First), &results, None), json!("b"));
        assert_eq!(aggregate(Some(Aggregation::Last), &results, None), json!(1));
        assert_eq!(aggregate(Some(Aggregation::Count), &results, None), json!(4));
        assert_eq!(
            aggregate(Some(Aggregation::Unique), &results, None),
            json!(["b", "a", 1])
        );
    }
}
