pub mod codec;
pub mod device_map;
pub mod diffusion;
pub mod error;
pub mod language;
pub mod loader;
pub mod recommend;
pub mod slot;
mod util;

pub use device_map::*;
pub use diffusion::{EditParams, ImageToImage, StableDiffusionLoader};
pub use error::{ServiceError, ServiceResult};
pub use language::{Phi3Loader, SamplingOptions, TextGenerator};
pub use loader::*;
pub use recommend::{extract_recommendations, Extraction, StyleOption, UserProfile};
pub use slot::{LoadedModel, ModelSlot};
pub(crate) use util::*;
