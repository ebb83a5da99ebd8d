//! Query path codec.
//!
//! Serializes a `Query` into a single `/`-separated path suffix and back:
//!
//! ```text
//! query [/fields/N/<field>*N] [/pre/R/<rule>*R] [/post/R/<rule>*R]
//!       [/sort/N/(<path>/<order>)*N] [/limit/<start>/<count>]
//! rule := K/(<path>/<operator>/<operand>)*K
//! ```
//!
//! # Design
//! Every block carries an explicit count instead of a terminator, and every
//! path and operand token is percent-encoded, so a `/` can never appear
//! inside a token. The decoder splits the path, reverses the token list and
//! pops from the end: variable-length operands are read by popping a length
//! first and then exactly that many tokens.
//!
//! Column paths are checked against the `Model` in both directions. The
//! column type renders each operand as a token and restores the JSON value
//! from it on decode; operands the type cannot restore exactly fail encoding.

use indexmap::IndexSet;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::{json, Value};
use tracing::trace;

use crate::error::{CodecError, CodecResult};
use crate::model::{Column, Model};
use crate::query::{
    Arity, LimitSpec, MatchExpression, MatchOperation, MatchRules, Operator, Order, Query,
    SortSpec,
};

/// Leading token of every encoded query.
pub const QUERY_TAG: &str = "query";

const FIELDS_TAG: &str = "fields";
const PRE_TAG: &str = "pre";
const POST_TAG: &str = "post";
const SORT_TAG: &str = "sort";
const LIMIT_TAG: &str = "limit";

/// The `encodeURIComponent` set: alphanumerics and `-_.!~*'()` pass through.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Encode `query` against `model`. An empty query encodes to `"query"`.
pub fn encode(model: &Model, query: &Query) -> CodecResult<String> {
    let mut out = Encoder::default();
    out.raw(QUERY_TAG);
    if let Some(fields) = &query.fields {
        encode_fields(&mut out, model, fields)?;
    }
    if let Some(rules) = &query.pre {
        encode_rules(&mut out, PRE_TAG, model, rules)?;
    }
    if let Some(rules) = &query.post {
        encode_rules(&mut out, POST_TAG, model, rules)?;
    }
    if let Some(sort) = &query.sort {
        encode_sort(&mut out, model, sort)?;
    }
    if let Some(limit) = &query.limit {
        out.raw(LIMIT_TAG);
        out.raw(&limit.start.to_string());
        out.raw(&limit.count.to_string());
    }
    Ok(out.finish())
}

/// Decode a path produced by `encode`.
///
/// A path whose first token is not `query` is not a query at all and decodes
/// to the empty `Query`.
pub fn decode(model: &Model, path: &str) -> CodecResult<Query> {
    let mut tokens = Tokens::new(path);
    let mut query = Query::default();
    if tokens.next_raw() != Some(QUERY_TAG) {
        return Ok(query);
    }
    while let Some(tag) = tokens.next_raw() {
        trace!(block = tag, "decoding query block");
        match tag {
            FIELDS_TAG => query.fields = decode_fields(&mut tokens, model)?,
            PRE_TAG => query.pre = decode_rules(&mut tokens, PRE_TAG, model)?,
            POST_TAG => query.post = decode_rules(&mut tokens, POST_TAG, model)?,
            SORT_TAG => query.sort = decode_sort(&mut tokens, model)?,
            LIMIT_TAG => {
                query.limit = Some(LimitSpec {
                    start: tokens.number(LIMIT_TAG)?,
                    count: tokens.number(LIMIT_TAG)?,
                })
            }
            "" if tokens.is_empty() => break,
            other => {
                return Err(CodecError::Format(format!("unknown block tag `{other}`")));
            }
        }
    }
    Ok(query)
}

/// Percent-encode a single path token.
pub fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, COMPONENT).to_string()
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Encoder {
    tokens: Vec<String>,
}

impl Encoder {
    fn raw(&mut self, token: &str) {
        self.tokens.push(token.to_string());
    }

    fn escaped(&mut self, token: &str) {
        self.tokens.push(encode_component(token));
    }

    fn count(&mut self, n: usize) {
        self.tokens.push(n.to_string());
    }

    fn finish(self) -> String {
        self.tokens.join("/")
    }
}

/// Borrowed view of an operation's value, shaped by the operator's arity.
enum Operand<'a> {
    Scalar(&'a Value),
    Sequence(&'a [Value]),
    Pattern { source: &'a str, flags: &'a str },
}

fn operand<'a>(path: &str, operation: &'a MatchOperation) -> CodecResult<Operand<'a>> {
    let mismatch = |reason: &str| CodecError::Operator {
        operator: operation.operator.tag().to_string(),
        path: path.to_string(),
        reason: reason.to_string(),
    };
    match (operation.operator.arity(), &operation.value) {
        (Arity::Scalar, Value::Array(_) | Value::Object(_)) => {
            Err(mismatch("expected a single scalar value"))
        }
        (Arity::Scalar, value) => Ok(Operand::Scalar(value)),
        (Arity::Sequence, Value::Array(values)) => Ok(Operand::Sequence(values)),
        (Arity::Sequence, _) => Err(mismatch("expected a sequence of values")),
        (Arity::Pattern, Value::Object(pattern)) => {
            let source = pattern
                .get("source")
                .and_then(Value::as_str)
                .ok_or_else(|| mismatch("pattern is missing a string `source`"))?;
            let flags = match pattern.get("flags") {
                None => "",
                Some(flags) => flags
                    .as_str()
                    .ok_or_else(|| mismatch("pattern `flags` must be a string"))?,
            };
            Ok(Operand::Pattern { source, flags })
        }
        (Arity::Pattern, _) => Err(mismatch("expected a {source, flags} pattern")),
    }
}

/// Wire token for one operand value. A value the column cannot restore on
/// decode is rejected here rather than by the server.
fn typed_token(
    path: &str,
    operation: &MatchOperation,
    column: &Column,
    value: &Value,
) -> CodecResult<String> {
    if !column.column_type.accepts(value) {
        return Err(CodecError::Operator {
            operator: operation.operator.tag().to_string(),
            path: path.to_string(),
            reason: format!("`{value}` does not fit the column type"),
        });
    }
    Ok(column.column_type.token(value))
}

fn encode_fields(out: &mut Encoder, model: &Model, fields: &[String]) -> CodecResult<()> {
    let unique: IndexSet<&str> = fields.iter().map(String::as_str).collect();
    if unique.is_empty() {
        return Ok(());
    }
    for field in &unique {
        model.require_column(field)?;
    }
    out.raw(FIELDS_TAG);
    out.count(unique.len());
    for field in unique {
        out.escaped(field);
    }
    Ok(())
}

fn encode_rules(out: &mut Encoder, tag: &str, model: &Model, rules: &MatchRules) -> CodecResult<()> {
    let expressions: Vec<&MatchExpression> = rules
        .expressions()
        .iter()
        .filter(|expression| !expression.is_empty())
        .collect();
    if expressions.is_empty() {
        return Ok(());
    }
    out.raw(tag);
    out.count(expressions.len());
    for expression in expressions {
        out.count(expression.len());
        for (path, operation) in expression.iter() {
            let column = model.require_column(path)?;
            let operand = operand(path, operation)?;
            out.escaped(path);
            out.raw(operation.operator.tag());
            match operand {
                Operand::Scalar(value) => out.escaped(&typed_token(path, operation, column, value)?),
                Operand::Sequence(values) => {
                    out.count(values.len());
                    for value in values {
                        out.escaped(&typed_token(path, operation, column, value)?);
                    }
                }
                Operand::Pattern { source, flags } => {
                    out.escaped(source);
                    out.escaped(flags);
                }
            }
        }
    }
    Ok(())
}

fn encode_sort(out: &mut Encoder, model: &Model, sort: &SortSpec) -> CodecResult<()> {
    if sort.is_empty() {
        return Ok(());
    }
    out.raw(SORT_TAG);
    out.count(sort.len());
    for (path, order) in sort {
        model.require_column(path)?;
        out.escaped(path);
        out.raw(order.tag());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Reversed token list consumed from the end.
struct Tokens<'a> {
    stack: Vec<&'a str>,
}

impl<'a> Tokens<'a> {
    fn new(path: &'a str) -> Self {
        let path = path.strip_prefix('/').unwrap_or(path);
        let mut stack: Vec<&str> = path.split('/').collect();
        stack.reverse();
        Self { stack }
    }

    fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    fn next_raw(&mut self) -> Option<&'a str> {
        self.stack.pop()
    }

    fn raw(&mut self, block: &str) -> CodecResult<&'a str> {
        self.stack
            .pop()
            .ok_or_else(|| CodecError::Format(format!("`{block}` block is truncated")))
    }

    fn decoded(&mut self, block: &str) -> CodecResult<String> {
        let token = self.raw(block)?;
        percent_decode_str(token)
            .decode_utf8()
            .map(|s| s.into_owned())
            .map_err(|_| CodecError::Format(format!("token `{token}` is not valid UTF-8")))
    }

    fn number(&mut self, block: &str) -> CodecResult<u64> {
        let token = self.raw(block)?;
        token.parse().map_err(|_| {
            CodecError::Format(format!("`{token}` in `{block}` block is not a count"))
        })
    }

    fn count(&mut self, block: &str) -> CodecResult<usize> {
        let n = self.number(block)?;
        usize::try_from(n).map_err(|_| CodecError::Format(format!("count {n} is too large")))
    }
}

fn decode_fields(tokens: &mut Tokens, model: &Model) -> CodecResult<Option<Vec<String>>> {
    let n = tokens.count(FIELDS_TAG)?;
    let mut fields = IndexSet::new();
    for _ in 0..n {
        let field = tokens.decoded(FIELDS_TAG)?;
        model.require_column(&field)?;
        fields.insert(field);
    }
    Ok((!fields.is_empty()).then(|| fields.into_iter().collect()))
}

fn decode_rules(tokens: &mut Tokens, tag: &str, model: &Model) -> CodecResult<Option<MatchRules>> {
    let rules = tokens.count(tag)?;
    let mut expressions = Vec::new();
    for _ in 0..rules {
        let conditions = tokens.count(tag)?;
        let mut expression = MatchExpression::new();
        for _ in 0..conditions {
            let path = tokens.decoded(tag)?;
            let operation = decode_operation(tokens, tag, model, &path)?;
            expression.insert(&path, operation);
        }
        if !expression.is_empty() {
            expressions.push(expression);
        }
    }
    Ok(match expressions.len() {
        0 => None,
        1 => expressions.pop().map(MatchRules::Single),
        _ => Some(MatchRules::Any(expressions)),
    })
}

fn decode_operation(
    tokens: &mut Tokens,
    tag: &str,
    model: &Model,
    path: &str,
) -> CodecResult<MatchOperation> {
    let column = model.require_column(path)?;
    let code = tokens.raw(tag)?;
    let operator = Operator::from_tag(code).ok_or_else(|| CodecError::Operator {
        operator: code.to_string(),
        path: path.to_string(),
        reason: "unknown operator".to_string(),
    })?;
    let value = match operator.arity() {
        Arity::Scalar => column.column_type.cast(&tokens.decoded(tag)?)?,
        Arity::Sequence => {
            let n = tokens.count(tag)?;
            let mut values = Vec::new();
            for _ in 0..n {
                values.push(column.column_type.cast(&tokens.decoded(tag)?)?);
            }
            Value::Array(values)
        }
        Arity::Pattern => {
            let source = tokens.decoded(tag)?;
            let flags = tokens.decoded(tag)?;
            json!({ "source": source, "flags": flags })
        }
    };
    Ok(MatchOperation { operator, value })
}

fn decode_sort(tokens: &mut Tokens, model: &Model) -> CodecResult<Option<SortSpec>> {
    let n = tokens.count(SORT_TAG)?;
    let mut sort = SortSpec::new();
    for _ in 0..n {
        let path = tokens.decoded(SORT_TAG)?;
        model.require_column(&path)?;
        let tag = tokens.raw(SORT_TAG)?;
        let order = Order::from_tag(tag)
            .ok_or_else(|| CodecError::Format(format!("unknown sort order `{tag}`")))?;
        sort.insert(path, order);
    }
    Ok((!sort.is_empty()).then_some(sort))
}
