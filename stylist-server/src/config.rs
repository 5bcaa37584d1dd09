use clap::Parser;
use stylist_core::{DeviceMap, SamplingOptions};

pub const DEFAULT_EDITOR_MODEL: &str = "stable-diffusion-v1-5/stable-diffusion-v1-5";
pub const DEFAULT_RECOMMENDATION_MODEL: &str = "microsoft/Phi-3-mini-4k-instruct";

#[derive(Parser, Debug)]
#[command(author, version, about = "Stable Diffusion img2img editing server")]
pub struct EditorArgs {
    /// Host address to bind the server to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to bind the server to
    #[arg(long, env = "PORT", default_value_t = 5000)]
    pub port: u16,

    /// Model loaded at startup and used when a request names none
    #[arg(long, env = "MODEL_PATH", default_value = DEFAULT_EDITOR_MODEL)]
    pub model: String,

    /// Use CPU instead of GPU
    #[arg(long)]
    pub cpu: bool,

    /// Load the model on the first request instead of at startup
    #[arg(long)]
    pub lazy: bool,
}

impl EditorArgs {
    pub fn device_map(&self) -> DeviceMap {
        DeviceMap::from_cpu_flag(self.cpu)
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Hairstyle recommendation server")]
pub struct RecommenderArgs {
    /// Host address to bind the server to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to bind the server to
    #[arg(long, env = "PORT", default_value_t = 5001)]
    pub port: u16,

    /// Model loaded at startup and used when a request names none
    #[arg(long, env = "RECOMMENDATION_MODEL", default_value = DEFAULT_RECOMMENDATION_MODEL)]
    pub model: String,

    /// Use CPU instead of GPU
    #[arg(long)]
    pub cpu: bool,

    /// Load the model on the first request instead of at startup
    #[arg(long)]
    pub lazy: bool,

    /// Prompt tokens beyond this are dropped
    #[arg(long, default_value_t = 2048)]
    pub max_input_tokens: usize,

    #[arg(long, default_value_t = 500)]
    pub max_new_tokens: usize,

    #[arg(long, default_value_t = 0.7)]
    pub temperature: f64,

    /// Fixed sampling seed; a fresh one is drawn per request when unset
    #[arg(long)]
    pub seed: Option<u64>,
}

impl RecommenderArgs {
    pub fn device_map(&self) -> DeviceMap {
        DeviceMap::from_cpu_flag(self.cpu)
    }

    pub fn sampling(&self) -> SamplingOptions {
        SamplingOptions {
            max_input_tokens: self.max_input_tokens,
            max_new_tokens: self.max_new_tokens,
            temperature: self.temperature,
            seed: self.seed,
        }
    }
}
