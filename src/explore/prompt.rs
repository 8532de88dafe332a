//! Instructions sent to the completion service

use crate::llm::CompletionRequest;
use crate::parser::ParseError;
use crate::segment::Segment;

/// The exact shape every answer must take
pub const OUTPUT_FORMAT: &str = r#"Respond with only a JSON object, no other text:
{"list": [{"title": "short title", "content": "explanation of at most 50 words"}]}"#;

const SEARCH_SYSTEM: &str = "You are a patient guide helping someone explore a topic. \
Break the topic into 3 to 6 distinct, self-contained segments, each with a short title \
and a plain explanation of at most 50 words.";

const EXPAND_SYSTEM: &str = "You are a patient guide helping someone dig deeper into one \
part of a topic they are exploring. Produce 3 to 5 segments that go one level deeper than \
the segment named, without repeating it. Each segment has a short title and a plain \
explanation of at most 50 words.";

const EXTEND_SYSTEM: &str = "You are a patient guide helping someone explore a topic. \
Produce additional segments that cover aspects not yet listed. If nothing meaningful is \
left to add, return an empty list.";

const CONTINUATION_PREFIX: &str = "More on: ";

pub fn search_request(query: &str) -> CompletionRequest {
    CompletionRequest::new(
        format!("{SEARCH_SYSTEM}\n\n{OUTPUT_FORMAT}"),
        query.trim().to_string(),
    )
}

/// The query text recorded for expanding `segment`
pub fn expansion_directive(segment: &Segment) -> String {
    format!("Tell me more about \"{}\": {}", segment.title, segment.content)
}

pub fn expansion_request(directive: &str, context: &str) -> CompletionRequest {
    CompletionRequest::new(
        format!("{EXPAND_SYSTEM}\n\n{OUTPUT_FORMAT}"),
        format!("{context}\n\n{directive}"),
    )
}

/// The query text recorded for extending a view of `query`
pub fn continuation_query(query: &str) -> String {
    let base = query.strip_prefix(CONTINUATION_PREFIX).unwrap_or(query);
    format!("{CONTINUATION_PREFIX}{base}")
}

pub fn continuation_request(query: &str, existing: &[Segment], wanted: usize) -> CompletionRequest {
    let titles: Vec<String> = existing.iter().map(|s| format!("- {}", s.title)).collect();
    CompletionRequest::new(
        format!("{EXTEND_SYSTEM}\n\n{OUTPUT_FORMAT}"),
        format!(
            "{}\n\nAlready covered:\n{}\n\nGive at most {wanted} new segments.",
            continuation_query(query),
            titles.join("\n")
        ),
    )
}

/// Follow-up demanding the exact shape after an unusable answer
pub fn corrective_instruction(error: &ParseError) -> String {
    format!(
        "Your previous answer could not be used ({error}). {OUTPUT_FORMAT}\n\
         Every entry needs a non-empty \"title\" and \"content\"."
    )
}
