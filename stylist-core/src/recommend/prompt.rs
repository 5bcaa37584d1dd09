use std::fmt::Write;

use super::{StyleOption, UserProfile};

/// Only this many catalog entries are shown to the model.
pub const MAX_CATALOG_ITEMS: usize = 20;
pub const RECOMMENDATION_COUNT: usize = 3;

const RESPONSE_FORMAT: &str = r#"[
  {
    "id": 1,
    "name": "Exact Name from Available Options",
    "matchScore": 95,
    "whyRecommendation": "Detailed 2-3 sentence explanation of why this hairstyle is perfect for this user."
  },
  {
    "id": 2,
    "name": "Another Hairstyle Name",
    "matchScore": 88,
    "whyRecommendation": "Explanation here."
  },
  {
    "id": 3,
    "name": "Third Hairstyle Name",
    "matchScore": 85,
    "whyRecommendation": "Explanation here."
  }
]"#;

fn or<'a>(value: Option<&'a str>, fallback: &'a str) -> &'a str {
    value.filter(|value| !value.is_empty()).unwrap_or(fallback)
}

fn display_id(id: &serde_json::Value) -> String {
    match id {
        serde_json::Value::String(id) => id.clone(),
        serde_json::Value::Null => "N/A".to_string(),
        other => other.to_string(),
    }
}

/// Renders one catalog line per style, capped at [`MAX_CATALOG_ITEMS`].
pub fn catalog_lines(catalog: &[StyleOption]) -> String {
    let mut lines = String::new();
    for (index, style) in catalog.iter().take(MAX_CATALOG_ITEMS).enumerate() {
        if index > 0 {
            lines.push('\n');
        }
        let _ = write!(
            lines,
            "- ID: {}, Name: {}, Category: {}, Hair Type: {}, Tags: {}",
            display_id(&style.id),
            or(style.name.as_deref(), "N/A"),
            or(style.category.as_deref(), "N/A"),
            or(style.hair_type.as_deref(), "N/A"),
            style.style_tags.join(", "),
        );
    }
    lines
}

/// Builds the instruction asking the model for exactly three ranked styles
/// as a bare JSON array.
pub fn build_prompt(profile: &UserProfile, catalog: &[StyleOption]) -> String {
    let skin_tone = profile.skin_tone.as_ref().and_then(|tone| tone.describe());
    let preferences = if profile.style_preferences.is_empty() {
        "None specified".to_string()
    } else {
        profile.style_preferences.join(", ")
    };

    format!(
        "You are a professional hairstylist AI. Analyze the user profile and recommend exactly \
{count} best matching hairstyles.

User Profile:
- Face Shape: {face_shape}
- Skin Tone: {skin_tone}
- Hair Length Preference: {hair_length}
- Hair Type Preference: {hair_type}
- Style Preferences: {preferences}

Available Hairstyles:
{catalog}

Based on the user's facial structure, face shape, skin tone, and preferences, recommend EXACTLY \
{count} hairstyles from the available options above.

For each recommendation, provide:
1. The exact hairstyle ID and name from the available options
2. A match score (0-100)
3. A detailed explanation (2-3 sentences) explaining WHY this hairstyle is recommended

Return ONLY valid JSON in this exact format (no additional text):
{format}",
        count = RECOMMENDATION_COUNT,
        face_shape = or(profile.face_shape.as_deref(), "unknown"),
        skin_tone = or(skin_tone.as_deref(), "unknown"),
        hair_length = or(profile.hair_length.as_deref(), "any"),
        hair_type = or(profile.hair_type.as_deref(), "any"),
        catalog = catalog_lines(catalog),
        format = RESPONSE_FORMAT,
    )
}
