//! Translate inbound chat requests into upstream requests.
//!
//! Resolves defaults, applies the disable-reasoning system instruction for
//! reasoning-capable models, and renders the flat prompt used by raw
//! generation endpoints.

use crate::config::DefaultsConfig;
use crate::registry::ModelRegistry;

use super::types::{ChatMessage, ChatRequest, PromptParameters, PromptRequest, Role, UpstreamRequest};

/// System instruction injected when a client sets `disable_reasoning`.
pub const DISABLE_REASONING_INSTRUCTION: &str = "Respond directly with the final answer. \
     Do not show your reasoning or thinking process, and do not emit <think> or similar markup.";

/// Translate a client request into the upstream chat-completions shape.
/// Pure function: the caller's request is never modified.
#[must_use]
pub fn translate_request(
    req: &ChatRequest,
    defaults: &DefaultsConfig,
    registry: &ModelRegistry,
) -> UpstreamRequest {
    let model = req
        .model
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or(defaults.model.as_str())
        .to_string();

    let mut messages = req.messages.clone();
    if req.disable_reasoning && registry.is_reasoning_capable(&model) {
        inject_disable_reasoning(&mut messages);
    }

    UpstreamRequest {
        model,
        messages,
        temperature: req.temperature.unwrap_or(defaults.temperature),
        max_tokens: req.max_tokens.unwrap_or(defaults.max_tokens),
        top_p: req.top_p.unwrap_or(defaults.top_p),
        stream: req.stream.unwrap_or(false),
    }
}

/// Prepend the instruction as a new system message, or append it to an
/// existing leading system message.
fn inject_disable_reasoning(messages: &mut Vec<ChatMessage>) {
    match messages.first_mut() {
        Some(first) if first.role == Role::System => {
            if first.content.is_empty() {
                first.content = DISABLE_REASONING_INSTRUCTION.to_string();
            } else {
                first.content.push(' ');
                first.content.push_str(DISABLE_REASONING_INSTRUCTION);
            }
        }
        _ => messages.insert(
            0,
            ChatMessage::new(Role::System, DISABLE_REASONING_INSTRUCTION),
        ),
    }
}

/// Render messages as the tagged transcript expected by raw generation endpoints.
#[must_use]
pub fn render_prompt(messages: &[ChatMessage]) -> String {
    let mut prompt = String::new();
    for msg in messages {
        let tag = match msg.role {
            Role::System => "[SYSTEM]",
            Role::Assistant => "[ASSISTANT]",
            Role::User => "[USER]",
        };
        prompt.push_str(tag);
        prompt.push('\n');
        prompt.push_str(&msg.content);
        prompt.push_str("\n\n");
    }
    prompt.push_str("[ASSISTANT]\n");
    prompt
}

/// Convert a resolved upstream request into the raw prompt shape.
#[must_use]
pub fn to_prompt_request(req: &UpstreamRequest) -> PromptRequest {
    PromptRequest {
        input: render_prompt(&req.messages),
        parameters: PromptParameters {
            temperature: req.temperature,
            max_new_tokens: req.max_tokens,
            top_p: req.top_p,
        },
    }
}
