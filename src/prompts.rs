//! Centralized prompt definitions
//!
//! System prompt for the Langbase pipe and the templates rendered by the
//! reference [`JsonStrategy`](crate::strategy::JsonStrategy). Placeholders
//! in braces are substituted by the strategy.

/// System prompt installed on the pipe created by `LangbaseClient::ensure_pipe`.
pub const PIPE_SYSTEM_PROMPT: &str = r#"You are a careful reasoning engine that is one step in a larger graph of reasoning operations.

Each request states the task, the current working state as a JSON object, and exactly what to return.
Follow the requested output format strictly. Do not add commentary outside the requested format."#;

/// Branching: produce one new candidate for the working state.
pub const GENERATE_TEMPLATE: &str = r#"<Instruction>
{task}

Produce ONE new candidate that advances the working state below.
Return a JSON object whose fields are the fields you add or change, for example {"{output_field}": "..."}.
Output ONLY the JSON object.
</Instruction>

<State>
{state}
</State>"#;

/// Evaluation of a single candidate.
pub const SCORE_TEMPLATE: &str = r#"<Instruction>
{task}

Score the candidate state below on a scale of 1 to 10, where 10 is a perfect solution and 1 is completely wrong.
Output ONLY the score as a number within <Score> and </Score> tags.
</Instruction>

<State>
{state}
</State>"#;

/// Relative evaluation of several candidates in one request.
pub const SCORE_COMBINED_TEMPLATE: &str = r#"<Instruction>
{task}

Compare the {count} candidate states below and score each on a scale of 1 to 10, where 10 is a perfect solution.
Output ONLY a JSON array with exactly {count} numbers, one per candidate, in the order given.
</Instruction>

<Candidates>
{candidates}
</Candidates>"#;

/// Merge several candidates into one.
pub const AGGREGATE_TEMPLATE: &str = r#"<Instruction>
{task}

Combine the {count} candidate states below into a single state that keeps the strengths of each and resolves their conflicts.
Return a JSON object with the merged fields, for example {"{output_field}": "..."}.
Output ONLY the JSON object.
</Instruction>

<Candidates>
{candidates}
</Candidates>"#;

/// Self-critique of one candidate.
pub const IMPROVE_TEMPLATE: &str = r#"<Instruction>
{task}

Critique the candidate state below and return an improved version.
Return a JSON object with the fields you change, for example {"{output_field}": "..."}.
Output ONLY the JSON object.
</Instruction>

<State>
{state}
</State>"#;

/// Accept/reject check for one candidate.
pub const VALIDATE_TEMPLATE: &str = r#"<Instruction>
{task}

Decide whether the candidate state below is a valid solution.
Output ONLY true or false within <Valid> and </Valid> tags.
</Instruction>

<State>
{state}
</State>"#;
