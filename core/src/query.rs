//! Structured query types: match rules, sort orders, limits and field lists.
//!
//! # Design
//! Operators form a closed enum so every `match` over them is checked for
//! exhaustiveness. Operand values stay as `serde_json::Value` because the
//! caller hands them over untyped; the codec checks the value shape against
//! the operator's arity when it encodes.
//!
//! Expressions and sort specs use `IndexMap` so iteration order (and with it
//! the wire order and tie-break precedence) survives a round trip.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Comparison kind applied to a column path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "lt")]
    LessThan,
    #[serde(rename = "lte")]
    LessThanOrEqual,
    #[serde(rename = "eq")]
    Equal,
    #[serde(rename = "ne")]
    NotEqual,
    #[serde(rename = "gte")]
    GreaterOrEqual,
    #[serde(rename = "gt")]
    GreaterThan,
    #[serde(rename = "between")]
    Between,
    #[serde(rename = "in")]
    Contain,
    #[serde(rename = "nin")]
    NotContain,
    #[serde(rename = "regexp")]
    RegExp,
}

/// How many operand tokens an operator carries on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// One token.
    Scalar,
    /// A length token followed by that many tokens.
    Sequence,
    /// Pattern source, then flags.
    Pattern,
}

impl Operator {
    pub const ALL: [Operator; 10] = [
        Operator::LessThan,
        Operator::LessThanOrEqual,
        Operator::Equal,
        Operator::NotEqual,
        Operator::GreaterOrEqual,
        Operator::GreaterThan,
        Operator::Between,
        Operator::Contain,
        Operator::NotContain,
        Operator::RegExp,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            Operator::LessThan => "lt",
            Operator::LessThanOrEqual => "lte",
            Operator::Equal => "eq",
            Operator::NotEqual => "ne",
            Operator::GreaterOrEqual => "gte",
            Operator::GreaterThan => "gt",
            Operator::Between => "between",
            Operator::Contain => "in",
            Operator::NotContain => "nin",
            Operator::RegExp => "regexp",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.tag() == tag)
    }

    pub fn arity(&self) -> Arity {
        match self {
            Operator::LessThan
            | Operator::LessThanOrEqual
            | Operator::Equal
            | Operator::NotEqual
            | Operator::GreaterOrEqual
            | Operator::GreaterThan => Arity::Scalar,
            Operator::Between | Operator::Contain | Operator::NotContain => Arity::Sequence,
            Operator::RegExp => Arity::Pattern,
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Order {
    #[serde(rename = "asc")]
    Ascending,
    #[serde(rename = "desc")]
    Descending,
}

impl Order {
    pub fn tag(&self) -> &'static str {
        match self {
            Order::Ascending => "asc",
            Order::Descending => "desc",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "asc" => Some(Order::Ascending),
            "desc" => Some(Order::Descending),
            _ => None,
        }
    }
}

/// One operator applied to one column path.
///
/// Deserializes from either `{"operator": "gt", "value": 30}` or the
/// shorthand `{"gt": 30}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawOperation")]
pub struct MatchOperation {
    pub operator: Operator,
    pub value: Value,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawOperation {
    Full { operator: Operator, value: Value },
    Short(IndexMap<Operator, Value>),
}

impl TryFrom<RawOperation> for MatchOperation {
    type Error = String;

    fn try_from(raw: RawOperation) -> Result<Self, Self::Error> {
        match raw {
            RawOperation::Full { operator, value } => Ok(Self { operator, value }),
            RawOperation::Short(map) => {
                if map.len() != 1 {
                    return Err(format!(
                        "shorthand operation needs exactly one operator, got {}",
                        map.len()
                    ));
                }
                let (operator, value) = map.into_iter().next().ok_or("empty operation")?;
                Ok(Self { operator, value })
            }
        }
    }
}

impl MatchOperation {
    pub fn new(operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            operator,
            value: value.into(),
        }
    }

    pub fn regexp(source: &str, flags: &str) -> Self {
        Self {
            operator: Operator::RegExp,
            value: json!({ "source": source, "flags": flags }),
        }
    }
}

/// An AND-group of column conditions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchExpression(IndexMap<String, MatchOperation>);

impl MatchExpression {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, path: &str, operator: Operator, value: impl Into<Value>) -> Self {
        self.with_operation(path, MatchOperation::new(operator, value))
    }

    pub fn with_operation(mut self, path: &str, operation: MatchOperation) -> Self {
        self.insert(path, operation);
        self
    }

    pub fn insert(&mut self, path: &str, operation: MatchOperation) {
        self.0.insert(path.to_string(), operation);
    }

    pub fn get(&self, path: &str) -> Option<&MatchOperation> {
        self.0.get(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MatchOperation)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One expression, or several OR'd together.
///
/// `Single(e)` and `Any(vec![e])` compare equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MatchRules {
    Single(MatchExpression),
    Any(Vec<MatchExpression>),
}

impl MatchRules {
    pub fn expressions(&self) -> &[MatchExpression] {
        match self {
            MatchRules::Single(expression) => std::slice::from_ref(expression),
            MatchRules::Any(expressions) => expressions,
        }
    }

    /// True when no expression carries a condition.
    pub fn is_empty(&self) -> bool {
        self.expressions().iter().all(MatchExpression::is_empty)
    }
}

impl PartialEq for MatchRules {
    fn eq(&self, other: &Self) -> bool {
        self.expressions() == other.expressions()
    }
}

impl From<MatchExpression> for MatchRules {
    fn from(expression: MatchExpression) -> Self {
        MatchRules::Single(expression)
    }
}

impl From<Vec<MatchExpression>> for MatchRules {
    fn from(expressions: Vec<MatchExpression>) -> Self {
        MatchRules::Any(expressions)
    }
}

/// Column path to direction, in precedence order.
pub type SortSpec = IndexMap<String, Order>;

/// Pagination window. A `count` of zero leaves the size to the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitSpec {
    #[serde(default)]
    pub start: u64,
    #[serde(default)]
    pub count: u64,
}

/// Everything a find/update/delete/count call can constrain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre: Option<MatchRules>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post: Option<MatchRules>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<LimitSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pre(mut self, rules: impl Into<MatchRules>) -> Self {
        self.pre = Some(rules.into());
        self
    }

    pub fn post(mut self, rules: impl Into<MatchRules>) -> Self {
        self.post = Some(rules.into());
        self
    }

    /// Append a sort key; earlier keys take precedence.
    pub fn sort(mut self, path: &str, order: Order) -> Self {
        self.sort
            .get_or_insert_with(SortSpec::new)
            .insert(path.to_string(), order);
        self
    }

    pub fn limit(mut self, start: u64, count: u64) -> Self {
        self.limit = Some(LimitSpec { start, count });
        self
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// True when encoding would emit no block at all.
    pub fn is_empty(&self) -> bool {
        self.pre.as_ref().map_or(true, MatchRules::is_empty)
            && self.post.as_ref().map_or(true, MatchRules::is_empty)
            && self.sort.as_ref().map_or(true, IndexMap::is_empty)
            && self.limit.is_none()
            && self.fields.as_ref().map_or(true, Vec::is_empty)
    }
}
