mod extract;
mod profile;
mod prompt;

pub use extract::{extract_recommendations, Extraction};
pub use profile::{SkinTone, StyleOption, UserProfile};
pub use prompt::{build_prompt, catalog_lines, MAX_CATALOG_ITEMS, RECOMMENDATION_COUNT};

use anyhow::Result;

use crate::{SamplingOptions, TextGenerator};

const PREVIEW_CHARS: usize = 200;

/// Prompts `generator` with the profile and catalog and extracts the ranked
/// styles from its reply. Generation errors are returned as errors; an
/// unusable reply is [`Extraction::NoResult`].
pub fn recommend(
    generator: &dyn TextGenerator,
    profile: &UserProfile,
    catalog: &[StyleOption],
    options: &SamplingOptions,
) -> Result<Extraction> {
    let prompt = build_prompt(profile, catalog);
    tracing::debug!(
        styles = catalog.len().min(MAX_CATALOG_ITEMS),
        prompt_chars = prompt.len(),
        "prompt built"
    );

    let reply = generator.generate(&prompt, options)?;
    let preview: String = reply.chars().take(PREVIEW_CHARS).collect();
    tracing::debug!(reply_chars = reply.len(), %preview, "model replied");

    let extraction = extract_recommendations(&reply);
    if extraction == Extraction::NoResult {
        tracing::warn!(%preview, "could not find a recommendation list in the model reply");
    }
    Ok(extraction)
}
