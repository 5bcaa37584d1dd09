use serde::{Deserialize, Deserializer, Serialize};

/// What the client knows about the person asking for a haircut.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct UserProfile {
    pub face_shape: Option<String>,
    pub skin_tone: Option<SkinTone>,
    pub hair_length: Option<String>,
    pub hair_type: Option<String>,
    #[serde(deserialize_with = "null_as_empty")]
    pub style_preferences: Vec<String>,
}

/// Clients send either a bare label or a `{label, value}` swatch.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum SkinTone {
    Label(String),
    Swatch {
        label: Option<String>,
        value: Option<serde_json::Value>,
    },
}

impl SkinTone {
    pub fn describe(&self) -> Option<String> {
        match self {
            SkinTone::Label(label) if !label.is_empty() => Some(label.clone()),
            SkinTone::Label(_) => None,
            SkinTone::Swatch { label: Some(label), .. } => Some(label.clone()),
            SkinTone::Swatch {
                value: Some(serde_json::Value::String(value)),
                ..
            } => Some(value.clone()),
            SkinTone::Swatch {
                value: Some(value), ..
            } if !value.is_null() => Some(value.to_string()),
            SkinTone::Swatch { .. } => None,
        }
    }
}

/// One entry of the hairstyle catalog.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct StyleOption {
    /// Catalog ids are numbers or strings depending on the client.
    pub id: serde_json::Value,
    pub name: Option<String>,
    pub category: Option<String>,
    pub hair_type: Option<String>,
    #[serde(deserialize_with = "null_as_empty")]
    pub style_tags: Vec<String>,
}

/// Clients send `null` for an empty list as often as they omit it.
fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn skin_tone_accepts_label_or_swatch() {
        let profile: UserProfile = serde_json::from_value(json!({
            "faceShape": "oval",
            "skinTone": {"label": "warm beige", "value": "#d8b08c"}
        }))
        .unwrap();
        assert_eq!(profile.face_shape.as_deref(), Some("oval"));
        assert_eq!(
            profile.skin_tone.and_then(|tone| tone.describe()).as_deref(),
            Some("warm beige")
        );

        let tone: SkinTone = serde_json::from_value(json!("olive")).unwrap();
        assert_eq!(tone.describe().as_deref(), Some("olive"));

        let tone: SkinTone = serde_json::from_value(json!({"value": 3})).unwrap();
        assert_eq!(tone.describe().as_deref(), Some("3"));

        let tone: SkinTone = serde_json::from_value(json!({})).unwrap();
        assert_eq!(tone.describe(), None);
    }

    #[test]
    fn style_option_tolerates_missing_fields() {
        let option: StyleOption = serde_json::from_value(json!({
            "id": "bob-01",
            "name": "Bob",
            "styleTags": ["short", "classic"]
        }))
        .unwrap();
        assert_eq!(option.id, json!("bob-01"));
        assert_eq!(option.category, None);
        assert_eq!(option.style_tags, vec!["short", "classic"]);
    }

    #[test]
    fn null_lists_read_as_empty() {
        let profile: UserProfile = serde_json::from_value(json!({
            "faceShape": "oval",
            "stylePreferences": null
        }))
        .unwrap();
        assert!(profile.style_preferences.is_empty());

        let option: StyleOption =
            serde_json::from_value(json!({"id": 1, "name": "Bob", "styleTags": null})).unwrap();
        assert!(option.style_tags.is_empty());
    }
}
