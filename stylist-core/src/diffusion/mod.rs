use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

mod pipeline;

pub use pipeline::StableDiffusionPipeline;

use crate::{DeviceKind, DeviceMap, Loader, ModelSource, WeightRepo};

pub const DEFAULT_STRENGTH: f64 = 0.6;
pub const DEFAULT_GUIDANCE_SCALE: f64 = 7.5;
pub const DEFAULT_INFERENCE_STEPS: usize = 30;

/// Knobs for a single image-to-image run.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct EditParams {
    pub strength: f64,
    pub guidance_scale: f64,
    pub num_inference_steps: usize,
    #[serde(skip_serializing)]
    pub seed: Option<u64>,
}

impl Default for EditParams {
    fn default() -> Self {
        Self {
            strength: DEFAULT_STRENGTH,
            guidance_scale: DEFAULT_GUIDANCE_SCALE,
            num_inference_steps: DEFAULT_INFERENCE_STEPS,
            seed: None,
        }
    }
}

pub trait ImageToImage: Send + Sync {
    fn edit(&self, prompt: &str, image: &DynamicImage, params: &EditParams)
        -> Result<DynamicImage>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StableDiffusionVariant {
    V1_5,
    V2_1,
}

impl StableDiffusionVariant {
    /// Detect the variant from a model name, defaulting to 1.5.
    pub fn from_name(model_name: &str) -> Self {
        let name = model_name.to_lowercase();
        if name.contains("2-1") || name.contains("2.1") {
            Self::V2_1
        } else {
            Self::V1_5
        }
    }

    fn tokenizer_repo(self) -> &'static str {
        match self {
            Self::V1_5 | Self::V2_1 => "openai/clip-vit-base-patch32",
        }
    }
}

pub struct StableDiffusionLoader {
    device_map: DeviceMap,
}

impl StableDiffusionLoader {
    pub fn new(device_map: DeviceMap) -> Self {
        Self { device_map }
    }
}

#[async_trait]
impl Loader for StableDiffusionLoader {
    type Model = dyn ImageToImage;

    async fn load(
        &self,
        source: &ModelSource,
        token: Option<&str>,
    ) -> Result<Arc<dyn ImageToImage>> {
        let variant = StableDiffusionVariant::from_name(source.id());
        tracing::info!(model = %source, ?variant, "loading stable diffusion img2img pipeline");

        let repo = WeightRepo::open(source, token)?;
        let tokenizer_file = match repo.get("tokenizer/tokenizer.json").await {
            Ok(file) => file,
            Err(_) => WeightRepo::open(&ModelSource::parse(variant.tokenizer_repo()), None)?
                .get("tokenizer.json")
                .await
                .context("failed to get CLIP tokenizer")?,
        };
        let clip_weights = repo
            .get("text_encoder/model.safetensors")
            .await
            .context("failed to get text encoder weights")?;
        let vae_weights = repo
            .get("vae/diffusion_pytorch_model.safetensors")
            .await
            .context("failed to get vae weights")?;
        let unet_weights = repo
            .get("unet/diffusion_pytorch_model.safetensors")
            .await
            .context("failed to get unet weights")?;

        let files = pipeline::PipelineFiles {
            tokenizer: tokenizer_file,
            clip: clip_weights,
            vae: vae_weights,
            unet: unet_weights,
        };
        let device_map = self.device_map;
        let pipeline = tokio::task::spawn_blocking(move || {
            StableDiffusionPipeline::load(variant, files, device_map)
        })
        .await
        .context("pipeline loading task failed")??;
        let pipeline: Arc<dyn ImageToImage> = Arc::new(pipeline);
        Ok(pipeline)
    }

    fn device(&self) -> DeviceKind {
        self.device_map.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_variant_from_name() {
        assert_eq!(
            StableDiffusionVariant::from_name("stabilityai/stable-diffusion-2-1"),
            StableDiffusionVariant::V2_1
        );
        assert_eq!(
            StableDiffusionVariant::from_name("stable-diffusion-v1-5/stable-diffusion-v1-5"),
            StableDiffusionVariant::V1_5
        );
        assert_eq!(
            StableDiffusionVariant::from_name("acme/custom-finetune"),
            StableDiffusionVariant::V1_5
        );
    }

    #[test]
    fn echoed_parameters_leave_out_the_seed() {
        let params = EditParams {
            seed: Some(7),
            ..EditParams::default()
        };
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "strength": 0.6,
                "guidance_scale": 7.5,
                "num_inference_steps": 30
            })
        );
    }
}
