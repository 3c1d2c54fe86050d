//! Prompt context projection
//!
//! Pure rendering of an event list into bounded text for language stages:
//! - Only the most recent [`MAX_MESSAGES`] chat messages survive
//! - Every non-message event is kept
//! - Original relative order is preserved across both kinds
//!
//! Output is deterministic for identical input.

use crate::event::{ActionEvent, EventKind, MessagePayload};
use serde_json::Value;
use std::fmt::Write as _;

/// Opening marker of the projected context
pub const CONTEXT_START: &str = "=== CONVERSATION CONTEXT START ===";
/// Closing marker of the projected context
pub const CONTEXT_END: &str = "=== CONVERSATION CONTEXT END ===";
/// Chat messages kept in the projection
pub const MAX_MESSAGES: usize = 15;
/// Plain-text tool results longer than this are truncated
pub const TOOL_RESULT_LIMIT: usize = 500;

const TRUNCATION_MARKER: &str = "... [truncated]";

/// Render `events` into prompt context
#[must_use]
pub fn project(events: &[ActionEvent]) -> String {
    let messages = events.iter().filter(|e| e.is_message()).count();
    let mut skip_messages = messages.saturating_sub(MAX_MESSAGES);

    let mut out = String::from(CONTEXT_START);
    for event in events {
        if event.is_message() && skip_messages > 0 {
            skip_messages -= 1;
            continue;
        }
        out.push('\n');
        render_event(&mut out, event);
    }
    out.push('\n');
    out.push_str(CONTEXT_END);
    out
}

fn render_event(out: &mut String, event: &ActionEvent) {
    // Writing into a String cannot fail.
    let _ = match event.kind() {
        EventKind::Message => {
            let payload = MessagePayload::from_value(&event.data);
            write!(out, "{}: {}", payload.role().label(), payload.text)
        }
        EventKind::CompletedTool(tool) => {
            let result = event.data.get("result").unwrap_or(&event.data);
            write!(out, "Tool {tool} result:\n{}", render_tool_result(result))
        }
        EventKind::ErrorTool(tool) => {
            write!(out, "Tool {tool} error: {}", error_message(&event.data))
        }
        EventKind::Other => write!(out, "{}:\n{}", event.action, pretty(&event.data)),
    };
}

fn render_tool_result(result: &Value) -> String {
    match result {
        Value::String(text) => match parse_json_shaped(text) {
            Some(parsed) => pretty(&parsed),
            None => truncate(text, TOOL_RESULT_LIMIT),
        },
        other => pretty(other),
    }
}

fn error_message(data: &Value) -> String {
    match data.get("error").unwrap_or(data) {
        Value::String(msg) => msg.clone(),
        Value::Null => "unknown error".to_string(),
        other => other.to_string(),
    }
}

/// Parse text that looks like a JSON object or array
fn parse_json_shaped(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    let shaped = (trimmed.starts_with('{') && trimmed.ends_with('}'))
        || (trimmed.starts_with('[') && trimmed.ends_with(']'));
    if !shaped {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn truncate(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}{TRUNCATION_MARKER}", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::MessageRole;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde_json::json;

    fn lines(text: &str) -> Vec<&str> {
        text.lines().collect()
    }

    #[test]
    fn empty_input_is_just_markers() {
        assert_eq!(project(&[]), format!("{CONTEXT_START}\n{CONTEXT_END}"));
    }

    #[test]
    fn renders_each_kind() {
        let events = vec![
            ActionEvent::message("a lamp", MessageRole::User),
            ActionEvent::tool_completed("Vision", json!({"productName": "Lamp"})),
            ActionEvent::tool_errored("Scrape", "timeout"),
            ActionEvent::new("Started_MarketAnalysis", json!({"input": "x"})),
        ];
        let text = project(&events);

        assert!(text.contains("User: a lamp"));
        assert!(text.contains("Tool Vision result:\n{\n  \"productName\": \"Lamp\"\n}"));
        assert!(text.contains("Tool Scrape error: timeout"));
        assert!(text.contains("Started_MarketAnalysis:\n{\n  \"input\": \"x\"\n}"));
    }

    #[test]
    fn long_plain_tool_result_is_truncated() {
        let long = "x".repeat(TOOL_RESULT_LIMIT + 20);
        let text = project(&[ActionEvent::tool_completed("Search", json!(long))]);
        let expected = format!("{}{TRUNCATION_MARKER}", "x".repeat(TOOL_RESULT_LIMIT));
        assert!(text.contains(&expected));
        assert!(!text.contains(&"x".repeat(TOOL_RESULT_LIMIT + 1)));
    }

    #[test]
    fn json_shaped_text_is_pretty_printed() {
        let text = project(&[ActionEvent::tool_completed("Search", json!("[1,2]"))]);
        assert!(text.contains("[\n  1,\n  2\n]"));
    }

    #[test]
    fn keeps_latest_messages_in_original_order() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut events = Vec::new();
        for i in 0..20 {
            events.push(ActionEvent::at(
                "Message",
                ts,
                json!({"text": format!("m{i}"), "isUser": true}),
            ));
            if i == 2 {
                events.push(ActionEvent::at("Completed_VisionAnalysis", ts, json!(null)));
            }
        }

        let text = project(&events);
        let body = lines(&text);
        assert_eq!(body.first(), Some(&CONTEXT_START));
        assert_eq!(body.last(), Some(&CONTEXT_END));

        let message_lines: Vec<&str> = body
            .iter()
            .copied()
            .filter(|l| l.starts_with("User: "))
            .collect();
        assert_eq!(message_lines.len(), MAX_MESSAGES);
        assert_eq!(message_lines[0], "User: m5");
        assert_eq!(message_lines[14], "User: m19");

        // Non-message event from before the kept window stays, ahead of them.
        assert_eq!(body[1], "Completed_VisionAnalysis:");
    }

    fn arb_event() -> impl Strategy<Value = ActionEvent> {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        prop_oneof![
            "[a-z]{0,12}".prop_map(move |t| ActionEvent::at(
                "Message",
                ts,
                json!({"text": t, "isUser": true})
            )),
            "[a-z]{1,8}".prop_map(move |tool| ActionEvent::at(
                format!("CompletedTool_{tool}"),
                ts,
                json!({"result": "ok"})
            )),
            "[A-Z][a-z]{1,8}".prop_map(move |a| ActionEvent::at(
                format!("Started_{a}"),
                ts,
                json!({"n": 1})
            )),
        ]
    }

    proptest! {
        #[test]
        fn message_count_is_bounded(events in prop::collection::vec(arb_event(), 0..60)) {
            let text = project(&events);
            let messages = events.iter().filter(|e| e.is_message()).count();
            let others = events.len() - messages;

            let rendered_messages = text.lines().filter(|l| l.starts_with("User: ")).count();
            prop_assert_eq!(rendered_messages, messages.min(MAX_MESSAGES));

            let rendered_others = text
                .lines()
                .filter(|l| l.starts_with("Tool ") || l.starts_with("Started_"))
                .count();
            prop_assert_eq!(rendered_others, others);
        }

        #[test]
        fn projection_is_deterministic(events in prop::collection::vec(arb_event(), 0..40)) {
            prop_assert_eq!(project(&events), project(&events));
        }
    }
}
