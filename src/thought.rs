//! Thoughts: immutable units of reasoning state.
//!
//! A [`Thought`] carries a flat [`Payload`], an optional score, a validity
//! flag and the ids of the thoughts it was derived from. Operations never
//! edit a thought; every transformation builds a new one, so the full
//! history of a run stays inspectable on the graph.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::graph::OperationId;

/// Field name reserved for the thought score.
pub const SCORE_FIELD: &str = "score";
/// Field name reserved for the thought validity flag.
pub const VALID_FIELD: &str = "valid";

const RESERVED_FIELDS: [&str; 2] = [SCORE_FIELD, VALID_FIELD];

/// Score assigned when a score cannot be obtained or parsed.
///
/// Ranks below every real score, so pruning still sees the full candidate set.
pub const SENTINEL_MIN_SCORE: f64 = f64::NEG_INFINITY;

/// Identifier of a thought, unique within one controller run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThoughtId(u64);

impl ThoughtId {
    /// Wrap a raw id.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw numeric id.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ThoughtId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t-{}", self.0)
    }
}

/// Monotonic thought id source for a single run.
///
/// Atomic so that fan-out inside an operation can allocate ids without a lock.
#[derive(Debug, Default)]
pub struct ThoughtIds {
    next: AtomicU64,
}

impl ThoughtIds {
    /// Start a fresh sequence at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next id.
    pub fn next_id(&self) -> ThoughtId {
        ThoughtId(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// Number of ids handed out so far.
    pub fn issued(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}

/// A scalar payload value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// Borrow the text if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Flat field map holding the working state of a thought.
///
/// Keys are ordered, which keeps rendered prompts and snapshots stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(BTreeMap<String, Value>);

impl Payload {
    /// Create an empty payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    /// Parse a flat JSON object. Nested arrays or objects are rejected.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Text value of `field`, if present and a string.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// A copy without the reserved `score` / `valid` fields.
    pub fn without_reserved(&self) -> Payload {
        Payload(
            self.0
                .iter()
                .filter(|(k, _)| !RESERVED_FIELDS.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// New payload with `overrides` layered on top of `self`.
    ///
    /// Fields of `overrides` win on collision; reserved fields in
    /// `overrides` are ignored.
    pub fn merged(&self, overrides: &Payload) -> Payload {
        let mut merged = self.0.clone();
        for (k, v) in &overrides.0 {
            if RESERVED_FIELDS.contains(&k.as_str()) {
                continue;
            }
            merged.insert(k.clone(), v.clone());
        }
        Payload(merged)
    }

    /// JSON object view, used by prompt templates.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Payload {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Payload(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// An immutable unit of reasoning state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Thought {
    id: ThoughtId,
    payload: Payload,
    #[serde(skip_serializing_if = "Option::is_none")]
    score: Option<f64>,
    valid: bool,
    lineage: Vec<ThoughtId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    producer: Option<OperationId>,
}

impl Thought {
    /// The seed thought wrapping a run's initial payload.
    pub(crate) fn bootstrap(id: ThoughtId, payload: Payload) -> Self {
        Self {
            id,
            payload,
            score: None,
            valid: true,
            lineage: Vec::new(),
            producer: None,
        }
    }

    /// A thought derived from a single parent with a new payload.
    ///
    /// Score is not inherited; validity is.
    pub(crate) fn derive(
        id: ThoughtId,
        producer: OperationId,
        parent: &Thought,
        payload: Payload,
    ) -> Self {
        Self {
            id,
            payload,
            score: None,
            valid: parent.valid,
            lineage: vec![parent.id],
            producer: Some(producer),
        }
    }

    /// A thought synthesized from several parents.
    pub(crate) fn merge(
        id: ThoughtId,
        producer: OperationId,
        parents: &[Thought],
        payload: Payload,
    ) -> Self {
        Self {
            id,
            payload,
            score: None,
            valid: true,
            lineage: parents.iter().map(|p| p.id).collect(),
            producer: Some(producer),
        }
    }

    /// An unchanged copy owned by `producer`.
    pub(crate) fn copy(&self, id: ThoughtId, producer: OperationId) -> Self {
        Self {
            id,
            payload: self.payload.clone(),
            score: self.score,
            valid: self.valid,
            lineage: vec![self.id],
            producer: Some(producer),
        }
    }

    /// A copy carrying `score`.
    pub(crate) fn scored(&self, id: ThoughtId, producer: OperationId, score: f64) -> Self {
        Self {
            score: Some(score),
            ..self.copy(id, producer)
        }
    }

    /// A copy carrying the validity verdict.
    pub(crate) fn validated(&self, id: ThoughtId, producer: OperationId, valid: bool) -> Self {
        Self {
            valid,
            ..self.copy(id, producer)
        }
    }

    pub fn id(&self) -> ThoughtId {
        self.id
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn score(&self) -> Option<f64> {
        self.score
    }

    /// Score used for ranking: unscored thoughts rank as the sentinel.
    pub fn rank_score(&self) -> f64 {
        self.score.unwrap_or(SENTINEL_MIN_SCORE)
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Ids of the thoughts this one was derived from.
    pub fn lineage(&self) -> &[ThoughtId] {
        &self.lineage
    }

    /// The operation that produced this thought; `None` for the bootstrap.
    pub fn producer(&self) -> Option<OperationId> {
        self.producer
    }
}
