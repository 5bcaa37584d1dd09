use serde_json::Value;

use super::prompt::RECOMMENDATION_COUNT;

/// Outcome of pulling a recommendation list out of free-form model text.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    /// One to three items, in the order the model gave them.
    Found(Vec<Value>),
    /// Nothing usable; the caller should fall back to another recommender.
    NoResult,
}

/// Takes the span from the first `[` to the last `]` of `reply` and parses it
/// as a JSON array. Surrounding prose is ignored. Never fails: anything that
/// is not a non-empty array yields [`Extraction::NoResult`].
pub fn extract_recommendations(reply: &str) -> Extraction {
    let (Some(start), Some(end)) = (reply.find('['), reply.rfind(']')) else {
        return Extraction::NoResult;
    };
    if end <= start {
        return Extraction::NoResult;
    }
    match serde_json::from_str::<Value>(&reply[start..=end]) {
        Ok(Value::Array(mut items)) if !items.is_empty() => {
            items.truncate(RECOMMENDATION_COUNT);
            Extraction::Found(items)
        }
        _ => Extraction::NoResult,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ignores_surrounding_prose() {
        let reply = "Sure! Here you go: [{\"id\":1,\"name\":\"Bob\",\"matchScore\":90,\"whyRecommendation\":\"fits\"}] Hope that helps!";
        let Extraction::Found(items) = extract_recommendations(reply) else {
            panic!("expected recommendations");
        };
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["id"], json!(1));
        assert_eq!(items[0]["name"], json!("Bob"));
    }

    #[test]
    fn keeps_only_the_first_three() {
        let reply = r#"[{"a":1},{"a":2},{"a":3},{"a":4}]"#;
        assert_eq!(
            extract_recommendations(reply),
            Extraction::Found(vec![json!({"a":1}), json!({"a":2}), json!({"a":3})])
        );
    }

    #[test]
    fn returns_arrays_of_up_to_three_unchanged() {
        let items = vec![
            json!({"id": 4, "name": "Pixie", "matchScore": 91, "whyRecommendation": "a"}),
            json!({"id": 9, "name": "Lob", "matchScore": 84, "whyRecommendation": "b"}),
        ];
        let reply = format!(
            "Ranked picks:\n{}\n",
            serde_json::to_string_pretty(&items).unwrap()
        );
        assert_eq!(extract_recommendations(&reply), Extraction::Found(items));
    }

    #[test]
    fn no_brackets_is_no_result() {
        assert_eq!(extract_recommendations("no brackets here"), Extraction::NoResult);
        assert_eq!(extract_recommendations(""), Extraction::NoResult);
        assert_eq!(extract_recommendations("only an opener ["), Extraction::NoResult);
    }

    #[test]
    fn reversed_brackets_are_no_result() {
        assert_eq!(extract_recommendations("] then [ "), Extraction::NoResult);
    }

    #[test]
    fn invalid_json_is_no_result() {
        assert_eq!(
            extract_recommendations("[{\"id\": 1, \"name\": }]"),
            Extraction::NoResult
        );
        // An unrelated bracket after the array widens the span past valid JSON.
        assert_eq!(
            extract_recommendations(r#"[{"id":1}] see note [2]"#),
            Extraction::NoResult
        );
    }

    #[test]
    fn empty_array_is_no_result() {
        assert_eq!(extract_recommendations("Nothing fits: []"), Extraction::NoResult);
    }

    #[test]
    fn multibyte_text_around_the_array_is_fine() {
        let reply = "Voilà ✂️ [{\"id\":\"é\"}] — fin";
        assert_eq!(
            extract_recommendations(reply),
            Extraction::Found(vec![json!({"id": "é"})])
        );
    }
}
