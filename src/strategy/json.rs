//! Domain-neutral strategy that exchanges JSON with the model.
//!
//! States are rendered as pretty-printed JSON objects; completions are
//! expected to contain a JSON object of new fields, a `<Score>` tag or
//! JSON array of scores, or a `<Valid>` tag.

use tracing::debug;

use super::{
    extract_json, extract_tagged, parse_number, AggregateParser, AggregatePrompter,
    GenerateParser, GeneratePrompter, ImproveParser, ImprovePrompter, ScoreParser, ScorePrompter,
    ValidateParser, ValidatePrompter,
};
use crate::prompts::{
    AGGREGATE_TEMPLATE, GENERATE_TEMPLATE, IMPROVE_TEMPLATE, SCORE_COMBINED_TEMPLATE,
    SCORE_TEMPLATE, VALIDATE_TEMPLATE,
};
use crate::thought::{Payload, Value};

/// Reference prompter and parser for every operation kind.
#[derive(Debug, Clone)]
pub struct JsonStrategy {
    task: String,
    output_field: String,
}

impl JsonStrategy {
    /// Create a strategy for `task`; new content goes into the `answer` field.
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            output_field: "answer".to_string(),
        }
    }

    /// Name the field the model is asked to fill.
    pub fn with_output_field(mut self, field: impl Into<String>) -> Self {
        self.output_field = field.into();
        self
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    fn render(&self, template: &str, payload: &Payload) -> String {
        fill(
            template,
            &[
                ("task", self.task.as_str()),
                ("output_field", self.output_field.as_str()),
                ("state", render_state(payload).as_str()),
            ],
        )
    }

    fn render_many(&self, template: &str, payloads: &[&Payload]) -> String {
        let candidates = payloads
            .iter()
            .enumerate()
            .map(|(i, p)| format!("Candidate {}:\n{}", i + 1, render_state(p)))
            .collect::<Vec<_>>()
            .join("\n\n");

        fill(
            template,
            &[
                ("task", self.task.as_str()),
                ("output_field", self.output_field.as_str()),
                ("count", payloads.len().to_string().as_str()),
                ("candidates", candidates.as_str()),
            ],
        )
    }
}

/// Replace `{name}` placeholders in one pass. Substituted text is never
/// rescanned, and braces that do not form a known placeholder are kept.
fn fill(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let placeholder = after.find('}').and_then(|close| {
            vars.iter()
                .find(|(name, _)| *name == &after[..close])
                .map(|(_, value)| (close, *value))
        });
        match placeholder {
            Some((close, value)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

fn render_state(payload: &Payload) -> String {
    serde_json::to_string_pretty(&payload.to_json()).unwrap_or_default()
}

/// Parse the JSON object in `text` into a payload.
///
/// Nested arrays and objects are kept as their JSON text; nulls are dropped.
fn parse_payload(text: &str) -> Option<Payload> {
    let json = extract_json(text).ok()?;
    let object = match serde_json::from_str::<serde_json::Value>(json) {
        Ok(serde_json::Value::Object(map)) => map,
        Ok(_) => return None,
        Err(e) => {
            debug!(error = %e, "Completion is not a JSON object");
            return None;
        }
    };

    let payload: Payload = object
        .into_iter()
        .filter_map(|(k, v)| {
            let value = match v {
                serde_json::Value::Null => return None,
                serde_json::Value::Bool(b) => Value::Bool(b),
                serde_json::Value::Number(n) => match n.as_i64() {
                    Some(i) => Value::Integer(i),
                    None => Value::Float(n.as_f64()?),
                },
                serde_json::Value::String(s) => Value::Text(s),
                nested => Value::Text(nested.to_string()),
            };
            Some((k, value))
        })
        .collect();

    if payload.is_empty() {
        None
    } else {
        Some(payload)
    }
}

impl GeneratePrompter for JsonStrategy {
    fn generate_prompt(&self, payload: &Payload, _branches: usize) -> String {
        self.render(GENERATE_TEMPLATE, payload)
    }
}

impl GenerateParser for JsonStrategy {
    fn parse_generate(&self, _payload: &Payload, text: &str) -> Option<Payload> {
        parse_payload(text)
    }
}

impl ScorePrompter for JsonStrategy {
    fn score_prompt(&self, payloads: &[&Payload]) -> String {
        match payloads {
            [single] => self.render(SCORE_TEMPLATE, single),
            many => self.render_many(SCORE_COMBINED_TEMPLATE, many),
        }
    }
}

impl ScoreParser for JsonStrategy {
    /// Scores only when there is exactly one per payload; any other shape
    /// is treated as malformed and yields nothing.
    fn parse_scores(&self, payloads: &[&Payload], text: &str) -> Vec<f64> {
        if let Ok(json) = extract_json(text) {
            if let Ok(scores) = serde_json::from_str::<Vec<f64>>(json) {
                if scores.len() == payloads.len() {
                    return scores;
                }
                debug!(
                    expected = payloads.len(),
                    actual = scores.len(),
                    "Score array length does not match candidates"
                );
                return Vec::new();
            }
        }

        if payloads.len() != 1 {
            return Vec::new();
        }
        extract_tagged(text, "Score")
            .and_then(parse_number)
            .or_else(|| parse_number(text))
            .map(|score| vec![score])
            .unwrap_or_default()
    }
}

impl AggregatePrompter for JsonStrategy {
    fn aggregate_prompt(&self, payloads: &[&Payload]) -> String {
        self.render_many(AGGREGATE_TEMPLATE, payloads)
    }
}

impl AggregateParser for JsonStrategy {
    fn parse_aggregate(&self, _payloads: &[&Payload], text: &str) -> Option<Payload> {
        parse_payload(text)
    }
}

impl ImprovePrompter for JsonStrategy {
    fn improve_prompt(&self, payload: &Payload) -> String {
        self.render(IMPROVE_TEMPLATE, payload)
    }
}

impl ImproveParser for JsonStrategy {
    fn parse_improve(&self, _payload: &Payload, text: &str) -> Option<Payload> {
        parse_payload(text)
    }
}

impl ValidatePrompter for JsonStrategy {
    fn validate_prompt(&self, payload: &Payload) -> String {
        self.render(VALIDATE_TEMPLATE, payload)
    }
}

impl ValidateParser for JsonStrategy {
    fn parse_validation(&self, _payload: &Payload, text: &str) -> Option<bool> {
        let verdict = extract_tagged(text, "Valid").unwrap_or(text).trim();
        match verdict.to_lowercase().as_str() {
            "true" | "yes" | "valid" => Some(true),
            "false" | "no" | "invalid" => Some(false),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn strategy() -> JsonStrategy {
        JsonStrategy::new("Fix the bug.").with_output_field("patch")
    }

    #[test]
    fn test_generate_prompt_embeds_task_and_state() {
        let payload = Payload::new().with("code", "let x = 1;");
        let prompt = strategy().generate_prompt(&payload, 3);
        assert!(prompt.contains("Fix the bug."));
        assert!(prompt.contains("\"code\": \"let x = 1;\""));
        assert!(prompt.contains("{\"patch\": \"...\"}"));
        assert!(!prompt.contains("{state}"));
    }

    #[test]
    fn test_parse_generate_reads_json_object() {
        let parsed = strategy()
            .parse_generate(&Payload::new(), "```json\n{\"patch\": \"diff\", \"attempt\": 2}\n```")
            .unwrap();
        assert_eq!(
            parsed,
            Payload::new().with("attempt", 2_i64).with("patch", "diff")
        );
    }

    #[test]
    fn test_parse_generate_flattens_nested_values() {
        let parsed = strategy()
            .parse_generate(&Payload::new(), r#"{"steps": ["a", "b"], "note": null}"#)
            .unwrap();
        assert_eq!(parsed.get_str("steps"), Some(r#"["a","b"]"#));
        assert!(!parsed.contains("note"));
    }

    #[test]
    fn test_parse_generate_rejects_prose_and_empty_objects() {
        assert!(strategy()
            .parse_generate(&Payload::new(), "I could not do it")
            .is_none());
        assert!(strategy().parse_generate(&Payload::new(), "{}").is_none());
        assert!(strategy().parse_generate(&Payload::new(), "[1, 2]").is_none());
    }

    #[test]
    fn test_score_prompt_switches_to_combined_template() {
        let a = Payload::new().with("v", "a");
        let b = Payload::new().with("v", "b");

        let single = strategy().score_prompt(&[&a]);
        assert!(single.contains("<Score>"));

        let combined = strategy().score_prompt(&[&a, &b]);
        assert!(combined.contains("Candidate 1:"));
        assert!(combined.contains("Candidate 2:"));
        assert!(combined.contains("exactly 2 numbers"));
    }

    #[test]
    fn test_parse_scores_formats() {
        let a = Payload::new();
        let s = strategy();
        assert_eq!(s.parse_scores(&[&a], "<Score>8</Score>"), vec![8.0]);
        assert_eq!(s.parse_scores(&[&a], "7"), vec![7.0]);
        assert_eq!(s.parse_scores(&[&a, &a], "[3, 9.5]"), vec![3.0, 9.5]);
        assert!(s.parse_scores(&[&a], "looks fine to me").is_empty());
        // bare numbers are only trusted for a single candidate
        assert!(s.parse_scores(&[&a, &a], "7").is_empty());
    }

    #[test]
    fn test_parse_scores_rejects_wrong_count() {
        let a = Payload::new();
        let s = strategy();
        assert!(s.parse_scores(&[&a, &a, &a], "<Score>8</Score>").is_empty());
        assert!(s.parse_scores(&[&a, &a, &a], "[4, 8]").is_empty());
        assert!(s.parse_scores(&[&a], "[4, 8]").is_empty());
        assert_eq!(s.parse_scores(&[&a], "[6]"), vec![6.0]);
    }

    #[test]
    fn test_placeholders_in_task_are_not_expanded() {
        let s = JsonStrategy::new("Keep {state} and {count} literal, see {candidates}.");
        let payload = Payload::new().with("v", "x");

        let single = s.generate_prompt(&payload, 1);
        assert!(single.contains("Keep {state} and {count} literal, see {candidates}."));
        assert_eq!(single.matches("\"v\": \"x\"").count(), 1);

        let many = s.aggregate_prompt(&[&payload, &payload]);
        assert!(many.contains("Keep {state} and {count} literal, see {candidates}."));
        assert!(many.contains("Combine the 2 candidate states"));
    }

    #[test]
    fn test_payload_text_is_not_treated_as_placeholder() {
        let payload = Payload::new().with("note", "{task}");
        let prompt = strategy().improve_prompt(&payload);
        assert!(prompt.contains("\"note\": \"{task}\""));
        assert_eq!(prompt.matches("Fix the bug.").count(), 1);
    }

    #[test]
    fn test_parse_validation() {
        let p = Payload::new();
        let s = strategy();
        assert_eq!(s.parse_validation(&p, "<Valid>true</Valid>"), Some(true));
        assert_eq!(s.parse_validation(&p, " False "), Some(false));
        assert_eq!(s.parse_validation(&p, "maybe"), None);
    }

    #[test]
    fn test_aggregate_prompt_lists_candidates_in_order() {
        let a = Payload::new().with("v", "first");
        let b = Payload::new().with("v", "second");
        let prompt = strategy().aggregate_prompt(&[&a, &b]);
        let first = prompt.find("first").unwrap();
        let second = prompt.find("second").unwrap();
        assert!(first < second);
        assert!(prompt.contains("Combine the 2 candidate states"));
    }
}
