//! Demonstrate the translation layer without a server.
//!
//! Usage:
//!   `cargo run --example translate_only`

use nim_proxy::config::DefaultsConfig;
use nim_proxy::registry::ModelRegistry;
use nim_proxy::translate::request::{to_prompt_request, translate_request};
use nim_proxy::translate::response::translate_response;
use nim_proxy::translate::streaming::StreamRelay;
use nim_proxy::translate::types::{ChatMessage, ChatRequest, Role};

fn main() {
    // What an OpenAI client sends, with the proxy's extension flag set
    let req = ChatRequest {
        model: Some("deepseek-ai/deepseek-r1".to_string()),
        messages: vec![
            ChatMessage::new(Role::System, "You are a geography expert. Be concise."),
            ChatMessage::new(Role::User, "What is the capital of France?"),
        ],
        stream: Some(true),
        disable_reasoning: true,
        ..ChatRequest::default()
    };

    let registry = ModelRegistry::default();
    let upstream = translate_request(&req, &DefaultsConfig::default(), &registry);

    println!("=== Upstream chat request ===");
    println!("{}", serde_json::to_string_pretty(&upstream).unwrap());

    println!("\n=== Upstream prompt request ===");
    println!(
        "{}",
        serde_json::to_string_pretty(&to_prompt_request(&upstream)).unwrap()
    );

    // A raw-text upstream answer with reasoning markup
    let raw = serde_json::json!({
        "output_text": "<think>France... Paris.</think>\nParis."
    });
    let resp = translate_response(&raw, &upstream.model, true);

    println!("\n=== Client response ===");
    println!("{}", serde_json::to_string_pretty(&resp).unwrap());

    // Streamed upstream lines relayed with filtering
    let lines = [
        r#"data: {"choices":[{"index":0,"delta":{"content":"<think>hmm</think>Par"}}]}"#,
        "",
        r#"data: {"choices":[{"index":0,"delta":{"content":"is."}}]}"#,
        "",
        "data: [DONE]",
    ];

    println!("\n=== Relayed stream ===");
    let mut relay = StreamRelay::new(true);
    for line in lines {
        if let Some(event) = relay.process_line(line) {
            print!("{event}");
        }
    }
}
