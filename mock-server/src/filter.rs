//! In-memory evaluation of decoded queries against JSON documents.
//!
//! Evaluation order: `pre` rules, sort, `post` rules, limit, field
//! projection. `total` counts matches before the limit is applied.

use std::cmp::Ordering;

use regex::{Regex, RegexBuilder};
use rest_driver::{MatchOperation, MatchRules, Operator, Order, Query, SortSpec};
use serde_json::{Map, Value};

/// Documents selected by a query.
#[derive(Debug, Default)]
pub struct Selection {
    pub documents: Vec<Value>,
    pub total: usize,
}

/// Run `query` over `documents`.
pub fn select<'a>(
    documents: impl IntoIterator<Item = &'a Value>,
    query: &Query,
) -> Result<Selection, String> {
    let mut selected = Vec::new();
    for document in documents {
        if accepts(document, query.pre.as_ref())? {
            selected.push(document.clone());
        }
    }
    if let Some(sort) = &query.sort {
        sort_documents(&mut selected, sort);
    }
    let mut filtered = Vec::with_capacity(selected.len());
    for document in selected {
        if accepts(&document, query.post.as_ref())? {
            filtered.push(document);
        }
    }
    let total = filtered.len();
    if let Some(limit) = query.limit {
        let start = usize::try_from(limit.start).unwrap_or(usize::MAX);
        filtered = filtered.into_iter().skip(start).collect();
        if limit.count > 0 {
            filtered.truncate(usize::try_from(limit.count).unwrap_or(usize::MAX));
        }
    }
    if let Some(fields) = &query.fields {
        filtered = filtered.iter().map(|doc| project(doc, fields)).collect();
    }
    Ok(Selection {
        documents: filtered,
        total,
    })
}

/// True if `document` satisfies any of the rules' expressions.
pub fn accepts(document: &Value, rules: Option<&MatchRules>) -> Result<bool, String> {
    let Some(rules) = rules else {
        return Ok(true);
    };
    for expression in rules.expressions() {
        let mut all = true;
        for (path, operation) in expression.iter() {
            if !holds(lookup(document, path), operation)? {
                all = false;
                break;
            }
        }
        if all {
            return Ok(true);
        }
    }
    Ok(rules.expressions().is_empty())
}

/// Resolve a dotted path inside a document.
pub fn lookup<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(document, |value, segment| value.get(segment))
}

fn holds(field: Option<&Value>, operation: &MatchOperation) -> Result<bool, String> {
    let operand = &operation.value;
    let ordered = |accept: fn(Ordering) -> bool| {
        field
            .and_then(|value| compare(value, operand))
            .is_some_and(accept)
    };
    let member = |value: &Value| {
        operand
            .as_array()
            .is_some_and(|items| items.iter().any(|item| equal(value, item)))
    };
    Ok(match operation.operator {
        Operator::LessThan => ordered(Ordering::is_lt),
        Operator::LessThanOrEqual => ordered(Ordering::is_le),
        Operator::GreaterOrEqual => ordered(Ordering::is_ge),
        Operator::GreaterThan => ordered(Ordering::is_gt),
        Operator::Equal => field.is_some_and(|value| equal(value, operand)),
        Operator::NotEqual => !field.is_some_and(|value| equal(value, operand)),
        Operator::Between => match (field, operand.as_array().map(Vec::as_slice)) {
            (Some(value), Some([low, high])) => {
                compare(value, low).is_some_and(Ordering::is_ge)
                    && compare(value, high).is_some_and(Ordering::is_le)
            }
            _ => false,
        },
        Operator::Contain => field.is_some_and(member),
        Operator::NotContain => !field.is_some_and(member),
        Operator::RegExp => {
            let regex = pattern(operand)?;
            field
                .and_then(Value::as_str)
                .is_some_and(|text| regex.is_match(text))
        }
    })
}

fn pattern(operand: &Value) -> Result<Regex, String> {
    let source = operand
        .get("source")
        .and_then(Value::as_str)
        .ok_or("pattern has no source")?;
    let flags = operand.get("flags").and_then(Value::as_str).unwrap_or("");
    RegexBuilder::new(source)
        .case_insensitive(flags.contains('i'))
        .multi_line(flags.contains('m'))
        .dot_matches_new_line(flags.contains('s'))
        .ignore_whitespace(flags.contains('x'))
        .build()
        .map_err(|e| format!("invalid pattern `{source}`: {e}"))
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn equal(left: &Value, right: &Value) -> bool {
    compare(left, right).map_or(left == right, Ordering::is_eq)
}

fn sort_documents(documents: &mut [Value], sort: &SortSpec) {
    documents.sort_by(|a, b| {
        for (path, order) in sort {
            let ordering = match (lookup(a, path), lookup(b, path)) {
                (Some(x), Some(y)) => compare(x, y).unwrap_or(Ordering::Equal),
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            let ordering = match order {
                Order::Ascending => ordering,
                Order::Descending => ordering.reverse(),
            };
            if ordering.is_ne() {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

/// Keep only `fields` (dotted paths allowed) of `document`.
pub fn project(document: &Value, fields: &[String]) -> Value {
    let mut out = Value::Object(Map::new());
    for field in fields {
        let Some(value) = lookup(document, field) else {
            continue;
        };
        let mut target = &mut out;
        let mut segments = field.split('.').peekable();
        while let Some(segment) = segments.next() {
            let Value::Object(map) = target else {
                break;
            };
            if segments.peek().is_none() {
                map.insert(segment.to_string(), value.clone());
                break;
            }
            target = map
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use rest_driver::MatchExpression;
    use serde_json::json;

    use super::*;

    fn people() -> Vec<Value> {
        vec![
            json!({ "id": "1", "name": "ann", "age": 31, "address": { "city": "Oslo" } }),
            json!({ "id": "2", "name": "bob", "age": 17, "address": { "city": "Bergen" } }),
            json!({ "id": "3", "name": "Cid", "age": 45 }),
        ]
    }

    fn names(selection: &Selection) -> Vec<&str> {
        selection
            .documents
            .iter()
            .map(|doc| doc["name"].as_str().unwrap())
            .collect()
    }

    #[test]
    fn comparison_and_or_rules() {
        let docs = people();
        let query = Query::new()
            .pre(vec![
                MatchExpression::new().with("age", Operator::LessThan, 18),
                MatchExpression::new().with("address.city", Operator::Equal, "Oslo"),
            ])
            .sort("age", Order::Descending);
        let selection = select(&docs, &query).unwrap();
        assert_eq!(names(&selection), vec!["ann", "bob"]);
        assert_eq!(selection.total, 2);
    }

    #[test]
    fn between_is_inclusive_and_missing_fields_fail() {
        let docs = people();
        let query = Query::new().pre(
            MatchExpression::new().with("age", Operator::Between, json!([17, 31])),
        );
        assert_eq!(names(&select(&docs, &query).unwrap()), vec!["ann", "bob"]);

        let query = Query::new().pre(
            MatchExpression::new().with("address.city", Operator::NotContain, json!(["Oslo"])),
        );
        assert_eq!(names(&select(&docs, &query).unwrap()), vec!["bob", "Cid"]);
    }

    #[test]
    fn regexp_honors_flags() {
        let docs = people();
        let query = Query::new().pre(
            MatchExpression::new().with_operation("name", MatchOperation::regexp("^c", "i")),
        );
        assert_eq!(names(&select(&docs, &query).unwrap()), vec!["Cid"]);
        let bad = Query::new().pre(
            MatchExpression::new().with_operation("name", MatchOperation::regexp("(", "")),
        );
        assert!(select(&docs, &bad).is_err());
    }

    #[test]
    fn limit_applies_after_total_and_fields_project() {
        let docs = people();
        let query = Query::new()
            .sort("name", Order::Ascending)
            .limit(1, 1)
            .fields(["name", "address.city"]);
        let selection = select(&docs, &query).unwrap();
        assert_eq!(selection.total, 3);
        assert_eq!(
            selection.documents,
            vec![json!({ "name": "ann", "address": { "city": "Oslo" } })]
        );
    }
}
