use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

mod phi3;

pub use phi3::Phi3Generator;

use crate::{DeviceKind, DeviceMap, Loader, ModelSource, WeightRepo};

/// How a prompt is turned into a continuation.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingOptions {
    /// Prompts longer than this many tokens keep only their head.
    pub max_input_tokens: usize,
    pub max_new_tokens: usize,
    pub temperature: f64,
    /// Fixed sampling seed. Without one every request draws its own.
    pub seed: Option<u64>,
}

impl Default for SamplingOptions {
    fn default() -> Self {
        Self {
            max_input_tokens: 2048,
            max_new_tokens: 500,
            temperature: 0.7,
            seed: None,
        }
    }
}

impl SamplingOptions {
    pub fn request_seed(&self) -> u64 {
        self.seed.unwrap_or_else(rand::random)
    }
}

/// A causal language model paired with its tokenizer.
pub trait TextGenerator: Send + Sync {
    /// Samples a continuation of `prompt` and returns only the new text.
    fn generate(&self, prompt: &str, options: &SamplingOptions) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Architecture {
    Phi3,
}

impl Architecture {
    pub fn from_model_type(model_type: &str) -> Option<Self> {
        match model_type {
            "phi3" => Some(Self::Phi3),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct ArchitectureProbe {
    model_type: String,
}

pub struct Phi3Loader {
    device_map: DeviceMap,
}

impl Phi3Loader {
    pub fn new(device_map: DeviceMap) -> Self {
        Self { device_map }
    }
}

#[async_trait]
impl Loader for Phi3Loader {
    type Model = dyn TextGenerator;

    async fn load(
        &self,
        source: &ModelSource,
        token: Option<&str>,
    ) -> Result<Arc<dyn TextGenerator>> {
        let repo = WeightRepo::open(source, token)?;
        let config_file = repo
            .get("config.json")
            .await
            .context("failed to get model config")?;
        let config = std::fs::read_to_string(&config_file).context("failed to read model config")?;
        let probe: ArchitectureProbe =
            serde_json::from_str(&config).context("failed to parse model config")?;
        let architecture = Architecture::from_model_type(&probe.model_type)
            .with_context(|| format!("unsupported model type: {}", probe.model_type))?;
        tracing::info!(model = %source, ?architecture, "loading language model");

        let tokenizer_file = repo
            .get("tokenizer.json")
            .await
            .context("failed to get tokenizer")?;
        let weights = repo
            .get_safetensors("model.safetensors.index.json")
            .await
            .context("failed to get model weights")?;

        let device_map = self.device_map;
        let generator = tokio::task::spawn_blocking(move || match architecture {
            Architecture::Phi3 => Phi3Generator::load(&config, &tokenizer_file, &weights, device_map),
        })
        .await
        .context("model loading task failed")??;
        let generator: Arc<dyn TextGenerator> = Arc::new(generator);
        Ok(generator)
    }

    fn device(&self) -> DeviceKind {
        self.device_map.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_supported_architectures() {
        assert_eq!(Architecture::from_model_type("phi3"), Some(Architecture::Phi3));
        assert_eq!(Architecture::from_model_type("llama"), None);
    }

    #[test]
    fn default_sampling_matches_service_defaults() {
        let options = SamplingOptions::default();
        assert_eq!(options.max_input_tokens, 2048);
        assert_eq!(options.max_new_tokens, 500);
        assert_eq!(options.temperature, 0.7);
        assert_eq!(options.seed, None);
    }

    #[test]
    fn seed_is_fixed_only_when_configured() {
        let fixed = SamplingOptions {
            seed: Some(42),
            ..Default::default()
        };
        assert_eq!(fixed.request_seed(), 42);
        assert_eq!(fixed.request_seed(), 42);

        let drawn = SamplingOptions::default();
        assert_ne!(drawn.request_seed(), drawn.request_seed());
    }
}
