//! Process-wide model registry.
//!
//! Built once at startup from the built-in catalogue plus any `[[models]]`
//! entries in the config, then shared read-only behind an `Arc`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    /// Whether the model emits reasoning markup that a system instruction can suppress.
    #[serde(default)]
    pub reasoning: bool,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_owner")]
    pub owned_by: String,
}

fn default_owner() -> String {
    "nvidia".to_string()
}

impl ModelDescriptor {
    fn builtin(id: &str, display_name: &str, reasoning: bool, description: &str) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            reasoning,
            description: description.to_string(),
            owned_by: default_owner(),
        }
    }
}

/// A single entry of the OpenAI-compatible `/v1/models` listing.
#[derive(Debug, Clone, Serialize)]
pub struct ModelCard {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub owned_by: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelList {
    pub object: &'static str,
    pub data: Vec<ModelCard>,
}

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: BTreeMap<String, ModelDescriptor>,
    created: i64,
}

fn builtin_models() -> Vec<ModelDescriptor> {
    vec![
        ModelDescriptor::builtin(
            "deepseek-ai/deepseek-v3_2",
            "DeepSeek V3.2",
            true,
            "DeepSeek V3.2 hybrid model with an optional thinking mode",
        ),
        ModelDescriptor::builtin(
            "deepseek-ai/deepseek-r1",
            "DeepSeek R1",
            true,
            "DeepSeek R1 reasoning model; emits <think> blocks before answering",
        ),
        ModelDescriptor::builtin(
            "qwen/qwq-32b",
            "QwQ 32B",
            true,
            "Qwen reasoning model",
        ),
        ModelDescriptor::builtin(
            "meta/llama-3.3-70b-instruct",
            "Llama 3.3 70B Instruct",
            false,
            "General-purpose instruction-tuned model",
        ),
    ]
}

impl ModelRegistry {
    /// Built-in catalogue overlaid with `extra` (same id replaces the built-in).
    #[must_use]
    pub fn new(extra: &[ModelDescriptor]) -> Self {
        let mut models = BTreeMap::new();
        for model in builtin_models().into_iter().chain(extra.iter().cloned()) {
            models.insert(model.id.clone(), model);
        }
        Self {
            models,
            created: chrono::Utc::now().timestamp(),
        }
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&ModelDescriptor> {
        self.models.get(id)
    }

    /// Unknown models are never treated as reasoning-capable.
    #[must_use]
    pub fn is_reasoning_capable(&self, id: &str) -> bool {
        self.get(id).is_some_and(|m| m.reasoning)
    }

    /// Descriptors ordered by id.
    pub fn iter(&self) -> impl Iterator<Item = &ModelDescriptor> {
        self.models.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    #[must_use]
    pub fn to_model_list(&self) -> ModelList {
        ModelList {
            object: "list",
            data: self
                .iter()
                .map(|m| ModelCard {
                    id: m.id.clone(),
                    object: "model",
                    created: self.created,
                    owned_by: m.owned_by.clone(),
                    description: m.description.clone(),
                })
                .collect(),
        }
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new(&[])
    }
}
