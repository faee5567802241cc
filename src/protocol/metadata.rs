//! Page metadata snapshot.
//!
//! Sent once per session inside `initialSessionData` so the consumer can
//! reason about the page without parsing frames.

use serde::{Deserialize, Serialize};

// ============================================================================
// PageMetadata
// ============================================================================

/// Interactive elements, a cleaned DOM snapshot and an optional screenshot.
///
/// # Format
///
/// ```json
/// {
///   "clickableElementsInfo": "[{\"tagName\":\"A\",\"attributes\":{...}}]",
///   "formElementsInfo": "[...]",
///   "domSnapshot": "<html>...</html>",
///   "totalClickableElementCount": 12,
///   "totalFormElementCount": 3,
///   "screenshotBase64": "data:image/jpeg;base64,..."
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMetadata {
    /// JSON array of clickable elements, as a string.
    pub clickable_elements_info: String,

    /// JSON array of form elements, as a string.
    pub form_elements_info: String,

    /// Outer HTML without scripts, styles, stylesheet links and comments.
    pub dom_snapshot: String,

    /// Number of clickable elements.
    pub total_clickable_element_count: u64,

    /// Number of form elements.
    pub total_form_element_count: u64,

    /// JPEG data URL of the viewport, when requested and available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_base64: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_names_are_camel_case() {
        let metadata = PageMetadata {
            total_clickable_element_count: 2,
            ..PageMetadata::default()
        };
        let json = serde_json::to_value(&metadata).expect("serialize");

        assert_eq!(json["totalClickableElementCount"], 2);
        assert!(json.get("domSnapshot").is_some());
        assert!(json.get("screenshotBase64").is_none());
    }

    #[test]
    fn test_parses_script_result() {
        let raw = r#"{
            "clickableElementsInfo": "[]",
            "formElementsInfo": "[{\"tagName\":\"INPUT\"}]",
            "domSnapshot": "<html></html>",
            "totalClickableElementCount": 0,
            "totalFormElementCount": 1
        }"#;

        let metadata: PageMetadata = serde_json::from_str(raw).expect("parse");
        assert_eq!(metadata.total_form_element_count, 1);
        assert_eq!(metadata.screenshot_base64, None);
    }
}
