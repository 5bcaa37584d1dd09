use std::path::PathBuf;

use anyhow::{Context, Error, Result};
use candle_core::{DType, Device, IndexOp, Module, Tensor};
use candle_transformers::models::stable_diffusion::{
    self, clip::ClipTextTransformer, schedulers::Scheduler, unet_2d::UNet2DConditionModel,
    vae::AutoEncoderKL, StableDiffusionConfig,
};
use image::{imageops::FilterType, DynamicImage};
use tokenizers::Tokenizer;

use super::{EditParams, ImageToImage, StableDiffusionVariant};
use crate::{half_precision_for, image_to_tensor, select_best_device, tensor_to_image, DeviceMap};

const VAE_SCALE: f64 = 0.18215;
const LATENT_CHANNELS: usize = 4;
/// The VAE downsamples by 8 and the UNet halves three more times.
const SIZE_MULTIPLE: u32 = 32;

pub(super) struct PipelineFiles {
    pub tokenizer: PathBuf,
    pub clip: PathBuf,
    pub vae: PathBuf,
    pub unet: PathBuf,
}

pub struct StableDiffusionPipeline {
    device: Device,
    dtype: DType,
    config: StableDiffusionConfig,
    tokenizer: Tokenizer,
    pad_id: u32,
    clip: ClipTextTransformer,
    vae: AutoEncoderKL,
    unet: UNet2DConditionModel,
}

impl StableDiffusionPipeline {
    pub(super) fn load(
        variant: StableDiffusionVariant,
        files: PipelineFiles,
        device_map: DeviceMap,
    ) -> Result<Self> {
        let device = select_best_device(device_map).context("failed to set up device")?;
        let dtype = half_precision_for(&device);
        tracing::info!(?device, ?dtype, "building stable diffusion pipeline");

        let config = match variant {
            StableDiffusionVariant::V1_5 => StableDiffusionConfig::v1_5(None, None, None),
            StableDiffusionVariant::V2_1 => StableDiffusionConfig::v2_1(None, None, None),
        };

        let tokenizer = Tokenizer::from_file(&files.tokenizer)
            .map_err(Error::msg)
            .context("failed to load CLIP tokenizer")?;
        let pad_token = config.clip.pad_with.as_deref().unwrap_or("<|endoftext|>");
        let pad_id = tokenizer
            .token_to_id(pad_token)
            .with_context(|| format!("tokenizer has no {pad_token} token"))?;

        // The text encoder stays in f32, as the half precision CLIP is unstable.
        let clip = stable_diffusion::build_clip_transformer(
            &config.clip,
            &files.clip,
            &device,
            DType::F32,
        )
        .context("failed to load text encoder")?;
        let vae = config
            .build_vae(&files.vae, &device, dtype)
            .context("failed to load vae")?;
        let unet = config
            .build_unet(
                &files.unet,
                &device,
                LATENT_CHANNELS,
                cfg!(feature = "flash-attn"),
                dtype,
            )
            .context("failed to load unet")?;

        Ok(Self {
            device,
            dtype,
            config,
            tokenizer,
            pad_id,
            clip,
            vae,
            unet,
        })
    }

    fn encode_prompt(&self, prompt: &str) -> Result<Tensor> {
        let max_len = self.config.clip.max_position_embeddings;
        let mut tokens = self
            .tokenizer
            .encode(prompt, true)
            .map_err(Error::msg)?
            .get_ids()
            .to_vec();
        tokens.truncate(max_len);
        tokens.resize(max_len, self.pad_id);
        let tokens = Tensor::new(tokens.as_slice(), &self.device)?.unsqueeze(0)?;
        Ok(self.clip.forward(&tokens)?)
    }

    fn text_embeddings(&self, prompt: &str, guided: bool) -> Result<Tensor> {
        let cond = self.encode_prompt(prompt)?;
        let embeddings = if guided {
            let uncond = self.encode_prompt("")?;
            Tensor::cat(&[uncond, cond], 0)?
        } else {
            cond
        };
        Ok(embeddings.to_dtype(self.dtype)?)
    }

    fn preprocess(&self, image: &DynamicImage) -> Result<Tensor> {
        let width = image.width() - image.width() % SIZE_MULTIPLE;
        let height = image.height() - image.height() % SIZE_MULTIPLE;
        if width == 0 || height == 0 {
            anyhow::bail!(
                "image of {}x{} is too small, both sides must be at least {SIZE_MULTIPLE} pixels",
                image.width(),
                image.height()
            );
        }
        let image = if (width, height) == (image.width(), image.height()) {
            image.clone()
        } else {
            image.resize_to_fill(width, height, FilterType::CatmullRom)
        };
        image_to_tensor(&image, &self.device)
    }

    fn seed(&self, seed: Option<u64>) {
        if let Some(seed) = seed {
            if let Err(err) = self.device.set_seed(seed) {
                tracing::warn!(seed, %err, "device does not support seeding, continuing unseeded");
            }
        }
    }
}

impl ImageToImage for StableDiffusionPipeline {
    fn edit(
        &self,
        prompt: &str,
        image: &DynamicImage,
        params: &EditParams,
    ) -> Result<DynamicImage> {
        let steps = params.num_inference_steps;
        let guided = params.guidance_scale > 1.0;
        self.seed(params.seed);

        let init_image = self.preprocess(image)?.to_dtype(self.dtype)?;
        let latents = (self.vae.encode(&init_image)?.sample()? * VAE_SCALE)?;

        let latents = if steps == 0 {
            latents
        } else {
            let text_embeddings = self.text_embeddings(prompt, guided)?;
            let mut scheduler = self.config.build_scheduler(steps)?;
            let timesteps = scheduler.timesteps().to_vec();
            let strength = params.strength.clamp(0.0, 1.0);
            let t_start = steps.saturating_sub((steps as f64 * strength) as usize);
            tracing::debug!(steps, t_start, guided, "denoising");

            let mut latents = match timesteps.get(t_start) {
                Some(&timestep) => {
                    let noise = latents.randn_like(0f64, 1f64)?;
                    scheduler.add_noise(&latents, noise, timestep)?
                }
                None => latents,
            }
            .to_dtype(self.dtype)?;

            for (index, &timestep) in timesteps.iter().enumerate().skip(t_start) {
                let model_input = if guided {
                    Tensor::cat(&[&latents, &latents], 0)?
                } else {
                    latents.clone()
                };
                let model_input = scheduler.scale_model_input(model_input, timestep)?;
                let noise_pred =
                    self.unet
                        .forward(&model_input, timestep as f64, &text_embeddings)?;
                let noise_pred = if guided {
                    let chunks = noise_pred.chunk(2, 0)?;
                    let (uncond, cond) = (&chunks[0], &chunks[1]);
                    (uncond + ((cond - uncond)? * params.guidance_scale)?)?
                } else {
                    noise_pred
                };
                latents = scheduler.step(&noise_pred, timestep, &latents)?;
                tracing::debug!(step = index + 1, of = timesteps.len(), "denoising step done");
            }
            latents
        };

        let decoded = self.vae.decode(&(&latents / VAE_SCALE)?)?;
        let decoded = ((decoded / 2.)? + 0.5)?
            .to_device(&Device::Cpu)?
            .to_dtype(DType::F32)?;
        let pixels = (decoded.clamp(0f32, 1f32)? * 255.)?
            .to_dtype(DType::U8)?
            .i(0)?;
        tensor_to_image(&pixels)
    }
}
