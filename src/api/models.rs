use serde::Deserialize;

pub const MSG_INVALID_BODY: &str =
    "Invalid request body. Please send a JSON object with a \"url\" field.";
pub const MSG_URL_REQUIRED: &str = "the \"url\" field is required";

/// Body of `POST /analyze`.
#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub url: String,
}
