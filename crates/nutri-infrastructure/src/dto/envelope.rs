use serde::Deserialize;

/// `{ "success": bool, "error"?: string, ...payload }`
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(flatten)]
    pub payload: T,
}

/// Payload of responses that carry nothing besides the envelope.
#[derive(Debug, Default, Deserialize)]
pub struct Empty {}
