//! Built-in upstream presets.
//!
//! Each preset defines the base URL, the upstream request format and the
//! default environment variable holding the bearer credential, which
//! `ProxyConfig::select_upstream` adopts. Users name a preset in their config
//! and only override what differs.

use crate::config::UpstreamFormat;

#[derive(Debug, Clone)]
pub struct UpstreamPreset {
    pub name: &'static str,
    pub base_url: &'static str,
    pub format: UpstreamFormat,
    pub default_api_key_env: &'static str,
}

const PRESETS: &[UpstreamPreset] = &[
    UpstreamPreset {
        name: "nvidia",
        base_url: "https://integrate.api.nvidia.com/v1",
        format: UpstreamFormat::Chat,
        default_api_key_env: "NVIDIA_API_KEY",
    },
    UpstreamPreset {
        name: "nvidia-inference",
        base_url: "https://integrate.api.nvidia.com/v1/inference",
        format: UpstreamFormat::Prompt,
        default_api_key_env: "NVIDIA_API_KEY",
    },
];

impl UpstreamPreset {
    #[must_use]
    pub fn from_name(name: &str) -> Option<&'static UpstreamPreset> {
        PRESETS.iter().find(|p| p.name == name.to_lowercase())
    }

    #[must_use]
    pub fn all() -> &'static [UpstreamPreset] {
        PRESETS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_presets() {
        assert!(UpstreamPreset::from_name("nvidia").is_some());
        assert!(UpstreamPreset::from_name("NVIDIA-Inference").is_some()); // case-insensitive
        assert!(UpstreamPreset::from_name("unknown_upstream").is_none());
    }

    #[test]
    fn test_inference_preset_uses_prompt_format() {
        let preset = UpstreamPreset::from_name("nvidia-inference").unwrap();
        assert_eq!(preset.format, UpstreamFormat::Prompt);
    }

    #[test]
    fn test_all_presets_share_the_nvidia_credential() {
        for preset in UpstreamPreset::all() {
            assert_eq!(
                preset.default_api_key_env, "NVIDIA_API_KEY",
                "Preset {} should read NVIDIA_API_KEY",
                preset.name
            );
        }
    }
}
