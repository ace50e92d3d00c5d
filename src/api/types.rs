use serde::{Deserialize, Serialize};

use crate::conversation::ChatMessage;

#[derive(Debug, Deserialize)]
pub struct GenerationRequest {
    pub raw_data: String,
    pub chart_type: String,
    pub data_type: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct D3Response {
    pub d3_code: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
    pub model_id: String,
}
