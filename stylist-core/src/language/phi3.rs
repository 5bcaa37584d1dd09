use std::{
    path::{Path, PathBuf},
    sync::Mutex,
};

use anyhow::{Context, Error, Result};
use candle_core::{DType, Device, Tensor};
use candle_transformers::{
    generation::LogitsProcessor,
    models::phi3::{Config, Model},
};
use tokenizers::Tokenizer;

use super::{SamplingOptions, TextGenerator};
use crate::{select_best_device, DeviceMap};

const STOP_TOKENS: [&str; 3] = ["<|endoftext|>", "<|end|>", "</s>"];

pub struct Phi3Generator {
    device: Device,
    tokenizer: Tokenizer,
    stop_ids: Vec<u32>,
    // The KV cache lives inside the model, so one generation at a time.
    model: Mutex<Model>,
}

impl Phi3Generator {
    pub(super) fn load(
        config: &str,
        tokenizer_file: &Path,
        weights: &[PathBuf],
        device_map: DeviceMap,
    ) -> Result<Self> {
        let device = select_best_device(device_map).context("failed to set up device")?;
        let dtype = device.bf16_default_to_f32();
        tracing::info!(?device, ?dtype, shards = weights.len(), "building phi3 model");

        let config: Config = serde_json::from_str(config).context("failed to parse phi3 config")?;
        let tokenizer = Tokenizer::from_file(tokenizer_file)
            .map_err(Error::msg)
            .context("failed to load tokenizer")?;
        let stop_ids = STOP_TOKENS
            .iter()
            .filter_map(|token| tokenizer.token_to_id(token))
            .collect();

        let vb = unsafe {
            candle_nn::VarBuilder::from_mmaped_safetensors(weights, dtype, &device)
                .context("failed to build phi3 var builder")?
        };
        let model = Model::new(&config, vb).context("failed to load phi3 model")?;

        Ok(Self {
            device,
            tokenizer,
            stop_ids,
            model: Mutex::new(model),
        })
    }
}

impl TextGenerator for Phi3Generator {
    fn generate(&self, prompt: &str, options: &SamplingOptions) -> Result<String> {
        let mut tokens = self
            .tokenizer
            .encode(prompt, true)
            .map_err(Error::msg)?
            .get_ids()
            .to_vec();
        if tokens.len() > options.max_input_tokens {
            tracing::warn!(
                tokens = tokens.len(),
                limit = options.max_input_tokens,
                "prompt truncated"
            );
            tokens.truncate(options.max_input_tokens);
        }
        anyhow::ensure!(!tokens.is_empty(), "prompt produced no tokens");
        tracing::info!(input_tokens = tokens.len(), "generating");

        let mut model = self
            .model
            .lock()
            .map_err(|_| anyhow::anyhow!("language model lock poisoned"))?;
        model.clear_kv_cache();

        let seed = options.request_seed();
        tracing::debug!(seed, "sampling seed");
        let mut logits_processor = LogitsProcessor::new(seed, Some(options.temperature), None);
        let mut generated = Vec::with_capacity(options.max_new_tokens);
        let mut offset = 0;
        for _ in 0..options.max_new_tokens {
            let context = if offset == 0 {
                &tokens[..]
            } else {
                &tokens[tokens.len() - 1..]
            };
            let input = Tensor::new(context, &self.device)?.unsqueeze(0)?;
            let logits = model
                .forward(&input, offset)?
                .squeeze(0)?
                .squeeze(0)?
                .to_dtype(DType::F32)?;
            offset += context.len();

            let next = logits_processor.sample(&logits)?;
            if self.stop_ids.contains(&next) {
                break;
            }
            tokens.push(next);
            generated.push(next);
        }
        tracing::info!(new_tokens = generated.len(), "generation finished");

        self.tokenizer.decode(&generated, true).map_err(Error::msg)
    }
}
