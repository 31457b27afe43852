use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::request::ContentType;

/// One section of generated content.
///
/// Narrative sections (e.g. `"timeline"`) carry `content`; every other type
/// carries a non-empty `items` array. Which is which is decided per content
/// type by the validator, not here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<String>>,
}

impl Section {
    pub fn narrative(kind: &str, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            title: title.into(),
            content: Some(content.into()),
            items: None,
        }
    }

    pub fn list(kind: &str, title: impl Into<String>, items: Vec<String>) -> Self {
        Self {
            kind: kind.to_string(),
            title: title.into(),
            content: None,
            items: Some(items),
        }
    }
}

/// The validated output shape shared by every content type.
///
/// Providers name the items collection after the content type (`questions`,
/// `modules`, `bullets`); all of them land in `items`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredContent {
    #[serde(default)]
    pub title: String,
    pub sections: Vec<Section>,
    #[serde(alias = "questions", alias = "modules", alias = "bullets")]
    pub items: Vec<String>,
}

impl StructuredContent {
    /// Renders the content-type specific response fields, with the items
    /// collection under its public name.
    pub fn to_response_fields(&self, content_type: ContentType) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("title".to_string(), Value::String(self.title.clone()));
        fields.insert(
            "sections".to_string(),
            serde_json::to_value(&self.sections).unwrap_or(Value::Array(Vec::new())),
        );
        fields.insert(
            content_type.items_field().to_string(),
            Value::Array(self.items.iter().cloned().map(Value::String).collect()),
        );
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_items_accept_content_type_aliases() {
        let json = r#"{
            "title": "Plan",
            "sections": [{"type": "timeline", "title": "Week 1", "content": "Study"}],
            "questions": ["Why us?"]
        }"#;
        let content: StructuredContent = serde_json::from_str(json).unwrap();
        assert_eq!(content.items, vec!["Why us?".to_string()]);
        assert_eq!(content.sections[0].kind, "timeline");
    }

    #[test]
    fn test_section_requires_type() {
        let json = r#"{"title": "Missing type", "content": "text"}"#;
        assert!(serde_json::from_str::<Section>(json).is_err());
    }

    #[test]
    fn test_response_fields_use_public_items_name() {
        let content = StructuredContent {
            title: "Training".to_string(),
            sections: vec![Section::list("focus", "Focus", vec!["SQL".to_string()])],
            items: vec!["Module 1".to_string()],
        };
        let fields = content.to_response_fields(ContentType::TrainingPlan);
        assert!(fields.contains_key("modules"));
        assert!(!fields.contains_key("items"));
        assert_eq!(fields["sections"][0]["type"], "focus");
    }
}
