use serde_json::{Map, Value};

use super::reasoning;
use super::types::{ChatResponse, Choice, ResponseMessage, Usage};

/// Raw-text fields checked, in priority order, when the upstream does not
/// answer in the chat-completions shape.
pub const RAW_TEXT_FIELDS: &[&str] = &["output_text", "generated_text", "text"];

/// Translate an upstream response body into an OpenAI-compatible response.
/// Pure function: never fails; missing or mistyped fields fall back to
/// empty strings and zeros.
#[must_use]
pub fn translate_response(upstream: &Value, model: &str, apply_filter: bool) -> ChatResponse {
    match upstream.get("choices").and_then(Value::as_array) {
        Some(choices) => from_chat_shape(upstream, choices, model, apply_filter),
        None => {
            let text = extract_raw_text(upstream);
            let text = if apply_filter {
                reasoning::filter(&text)
            } else {
                text
            };
            synthesize_response(text, model)
        }
    }
}

/// First non-empty string among [`RAW_TEXT_FIELDS`], or an empty string.
#[must_use]
pub fn extract_raw_text(upstream: &Value) -> String {
    RAW_TEXT_FIELDS
        .iter()
        .find_map(|field| {
            upstream
                .get(*field)
                .and_then(Value::as_str)
                .filter(|text| !text.is_empty())
        })
        .unwrap_or_default()
        .to_string()
}

/// Wrap plain generated text in a single-choice response.
#[must_use]
pub fn synthesize_response(text: String, model: &str) -> ChatResponse {
    let now = chrono::Utc::now().timestamp();
    ChatResponse {
        id: format!("chatcmpl-{now}"),
        object: "chat.completion".to_string(),
        created: now,
        model: model.to_string(),
        choices: vec![Choice {
            index: 0,
            message: ResponseMessage {
                role: "assistant".to_string(),
                content: text,
                extra: Map::new(),
            },
            finish_reason: Some("stop".to_string()),
            extra: Map::new(),
        }],
        usage: Usage::default(),
        extra: Map::new(),
    }
}

fn from_chat_shape(
    upstream: &Value,
    choices: &[Value],
    model: &str,
    apply_filter: bool,
) -> ChatResponse {
    let mut extra = upstream.as_object().cloned().unwrap_or_default();
    for known in ["id", "object", "created", "model", "choices", "usage"] {
        extra.remove(known);
    }

    let created = upstream
        .get("created")
        .and_then(Value::as_i64)
        .unwrap_or_else(|| chrono::Utc::now().timestamp());

    ChatResponse {
        id: string_field(upstream, "id").unwrap_or_else(|| format!("chatcmpl-{created}")),
        object: string_field(upstream, "object").unwrap_or_else(|| "chat.completion".to_string()),
        created,
        model: string_field(upstream, "model").unwrap_or_else(|| model.to_string()),
        choices: choices
            .iter()
            .enumerate()
            .map(|(i, c)| translate_choice(c, i as u64, apply_filter))
            .collect(),
        usage: upstream
            .get("usage")
            .and_then(|u| serde_json::from_value(u.clone()).ok())
            .unwrap_or_default(),
        extra,
    }
}

fn translate_choice(choice: &Value, position: u64, apply_filter: bool) -> Choice {
    let mut extra = choice.as_object().cloned().unwrap_or_default();
    let index = extra
        .remove("index")
        .and_then(|v| v.as_u64())
        .unwrap_or(position);
    let finish_reason = extra
        .remove("finish_reason")
        .and_then(|v| v.as_str().map(String::from));
    // Legacy completions put the text directly on the choice.
    let legacy_text = extra.remove("text");

    let mut message_fields = match extra.remove("message") {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    let role = message_fields
        .remove("role")
        .and_then(|v| v.as_str().map(String::from))
        .unwrap_or_else(|| "assistant".to_string());
    let content = message_fields
        .remove("content")
        .or(legacy_text)
        .and_then(|v| v.as_str().map(String::from))
        .unwrap_or_default();

    let content = if apply_filter {
        message_fields.remove("reasoning_content");
        reasoning::filter(&content)
    } else {
        content
    };

    Choice {
        index,
        message: ResponseMessage {
            role,
            content,
            extra: message_fields,
        },
        finish_reason,
        extra,
    }
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_raw_output_text() {
        let resp = translate_response(&json!({"output_text": "hello"}), "m", false);

        assert!(resp.id.starts_with("chatcmpl-"));
        assert_eq!(resp.object, "chat.completion");
        assert_eq!(resp.model, "m");
        assert_eq!(resp.choices.len(), 1);
        assert_eq!(resp.choices[0].index, 0);
        assert_eq!(resp.choices[0].message.role, "assistant");
        assert_eq!(resp.choices[0].message.content, "hello");
        assert_eq!(resp.choices[0].finish_reason.as_deref(), Some("stop"));
        assert_eq!(resp.usage, Usage::default());

        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["usage"]["total_tokens"], 0);
    }

    #[test]
    fn test_raw_field_priority() {
        let both = json!({"text": "third", "generated_text": "second"});
        assert_eq!(extract_raw_text(&both), "second");

        let all = json!({"text": "c", "generated_text": "b", "output_text": "a"});
        assert_eq!(extract_raw_text(&all), "a");

        let null_first = json!({"output_text": null, "text": "c"});
        assert_eq!(extract_raw_text(&null_first), "c");

        let empty_first = json!({"output_text": "", "generated_text": "hi"});
        assert_eq!(extract_raw_text(&empty_first), "hi");

        let all_empty = json!({"output_text": "", "text": ""});
        assert_eq!(extract_raw_text(&all_empty), "");
    }

    #[test]
    fn test_raw_missing_or_malformed_degrades_to_empty() {
        for body in [json!({}), json!({"output_text": 42}), json!("just a string"), json!(null)] {
            let resp = translate_response(&body, "m", true);
            assert_eq!(resp.choices.len(), 1);
            assert_eq!(resp.choices[0].message.content, "");
        }
    }

    #[test]
    fn test_raw_text_filtered() {
        let resp = translate_response(
            &json!({"generated_text": "<think>plan</think>\nDone."}),
            "m",
            true,
        );
        assert_eq!(resp.choices[0].message.content, "Done.");
    }

    #[test]
    fn test_chat_shape_filtered() {
        let upstream = json!({
            "id": "chatcmpl-abc",
            "object": "chat.completion",
            "created": 1700000000,
            "model": "deepseek-ai/deepseek-r1",
            "choices": [
                {
                    "index": 0,
                    "message": {
                        "role": "assistant",
                        "content": "<think>hmm</think>Paris",
                        "reasoning_content": "hmm"
                    },
                    "finish_reason": "stop"
                },
                {
                    "index": 1,
                    "message": {"role": "assistant", "content": "Lyon"},
                    "finish_reason": "length"
                }
            ],
            "usage": {"prompt_tokens": 3, "completion_tokens": 4, "total_tokens": 7}
        });

        let resp = translate_response(&upstream, "requested", true);

        assert_eq!(resp.id, "chatcmpl-abc");
        assert_eq!(resp.created, 1_700_000_000);
        assert_eq!(resp.model, "deepseek-ai/deepseek-r1");
        assert_eq!(resp.choices[0].message.content, "Paris");
        assert!(!resp.choices[0].message.extra.contains_key("reasoning_content"));
        assert_eq!(resp.choices[1].message.content, "Lyon");
        assert_eq!(resp.choices[1].finish_reason.as_deref(), Some("length"));
        assert_eq!(resp.usage.total_tokens, 7);
    }

    #[test]
    fn test_chat_shape_passthrough_unchanged_without_filter() {
        let upstream = json!({
            "id": "chatcmpl-abc",
            "object": "chat.completion",
            "created": 1,
            "model": "m",
            "system_fingerprint": "fp_1",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": "<think>hmm</think>Paris",
                    "reasoning_content": "hmm"
                },
                "finish_reason": "stop",
                "logprobs": null
            }],
            "usage": {"prompt_tokens": 0, "completion_tokens": 0, "total_tokens": 0}
        });

        let resp = translate_response(&upstream, "m", false);
        assert_eq!(serde_json::to_value(&resp).unwrap(), upstream);
    }

    #[test]
    fn test_chat_shape_with_missing_fields() {
        let upstream = json!({"choices": [{"message": {}}, {"text": "legacy"}, 7]});
        let resp = translate_response(&upstream, "fallback", false);

        assert_eq!(resp.model, "fallback");
        assert_eq!(resp.object, "chat.completion");
        assert_eq!(resp.choices.len(), 3);
        assert_eq!(resp.choices[0].message.content, "");
        assert_eq!(resp.choices[0].message.role, "assistant");
        assert_eq!(resp.choices[1].index, 1);
        assert_eq!(resp.choices[1].message.content, "legacy");
        assert_eq!(resp.choices[2].index, 2);
        assert!(resp.choices[2].finish_reason.is_none());
    }
}
