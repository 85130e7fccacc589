//! REST API types for triggering and observing imports.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::import::progress::SavedState;
use crate::import::{Settings, DEFAULT_ERROR_REPORT_EXAMPLES};
use crate::models::Item;

/// Import request: run settings plus the staged items to load.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRequest {
    pub settings: ImportSettingsPayload,
    pub items: Vec<Item>,
}

/// Wire form of the importer settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSettingsPayload {
    /// Language codes to publish, e.g. `["en", "cs"]`.
    pub languages: Vec<String>,
    /// Fallback language for missing translations.
    pub default_language: String,
    #[serde(default)]
    pub track_only_data_in_docstore: bool,
    #[serde(default)]
    pub use_performer_name_as_session_name: bool,
    /// Failure examples reported per entity type.
    #[serde(default)]
    pub error_report_examples: Option<usize>,
}

impl ImportSettingsPayload {
    pub fn into_settings(self) -> Settings {
        let mut settings = Settings::new(self.languages, self.default_language);
        settings.track_only_data_in_docstore = self.track_only_data_in_docstore;
        settings.use_performer_name_as_session_name = self.use_performer_name_as_session_name;
        settings.error_report_examples =
            self.error_report_examples.unwrap_or(DEFAULT_ERROR_REPORT_EXAMPLES);
        settings
    }
}

/// Response sent back once an import run settled.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResponse {
    pub import_id: String,
    /// `"finished"` or `"failed"`.
    pub status: String,
    pub progress: f64,
    pub items_staged: usize,
    pub error_summary: String,
    pub warning_summary: String,
}

impl ImportResponse {
    pub fn from_state(state: &SavedState, items_staged: usize) -> Self {
        let failed = state.error_summary.contains("loading-data-failed");
        Self {
            import_id: state.import_id.clone(),
            status: if failed { "failed" } else { "finished" }.to_string(),
            progress: state.progress,
            items_staged,
            error_summary: state.error_summary.clone(),
            warning_summary: state.warning_summary.clone(),
        }
    }
}

/// JSON error body.
pub fn error_response(message: &str) -> Value {
    json!({ "error": message })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_decoding() {
        let request: ImportRequest = serde_json::from_str(
            r#"{
                "settings": { "languages": ["en", "cs"], "defaultLanguage": "en" },
                "items": [
                    { "id": "v1", "type": "venue", "language": "en", "data": { "id": "v1" } }
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(request.items.len(), 1);
        let settings = request.settings.into_settings();
        assert_eq!(settings.default_language, "en");
        assert_eq!(settings.error_report_examples, DEFAULT_ERROR_REPORT_EXAMPLES);
        assert!(!settings.use_performer_name_as_session_name);
    }

    #[test]
    fn test_error_response_shape() {
        assert_eq!(error_response("nope"), json!({ "error": "nope" }));
    }
}
