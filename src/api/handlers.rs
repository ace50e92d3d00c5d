use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    api::types::{ChatRequest, ChatResponse, D3Response, GenerationRequest, HealthResponse},
    api::AppState,
    conversation::{assistant_reply, extract_code_block, ChatMessage},
    error::{ApiError, ApiResult},
    inference::{ChatModel, Generation, GenerationParams},
    prompts::{d3_conversation, ChartType, DataType},
};

#[instrument(skip_all, fields(request_id = %Uuid::new_v4()))]
pub async fn generate_d3(
    State(state): State<AppState>,
    payload: Result<Json<GenerationRequest>, JsonRejection>,
) -> ApiResult<Json<D3Response>> {
    let started = Instant::now();
    let Json(req) = payload?;

    let model = state.models.current().ok_or(ApiError::ModelNotReady)?;

    let chart = ChartType::from_label(&req.chart_type)
        .ok_or_else(|| ApiError::UnsupportedChartType(req.chart_type.clone()))?;
    let data_type = DataType::from_label(&req.data_type)
        .ok_or_else(|| ApiError::UnsupportedDataType(req.data_type.clone()))?;

    info!(chart = chart.label(), ?data_type, raw_len = req.raw_data.len(), "generate_d3");

    let messages = d3_conversation(&req.raw_data, Some(chart), data_type);
    let generation = run_generation(model, messages, GenerationParams::d3())
        .await
        .inspect_err(|_| {
            warn!(
                total_ms = started.elapsed().as_millis() as u64,
                "generate_d3 failed"
            )
        })?;

    let d3_code = extract_code_block(assistant_reply(&generation.text)).to_string();

    info!(
        total_ms = started.elapsed().as_millis() as u64,
        generation_ms = generation.elapsed.as_millis() as u64,
        generated_tokens = generation.generated_tokens,
        tokens_per_sec = generation.tokens_per_sec(),
        "generate_d3 finished"
    );

    Ok(Json(D3Response { d3_code }))
}

#[instrument(skip_all, fields(request_id = %Uuid::new_v4()))]
pub async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> ApiResult<Json<ChatResponse>> {
    let started = Instant::now();
    let Json(req) = payload?;
    let model = state.models.current().ok_or(ApiError::ModelNotReady)?;

    info!(turns = req.messages.len(), "chat");

    let generation = run_generation(model, req.messages, GenerationParams::chat())
        .await
        .inspect_err(|_| {
            warn!(
                total_ms = started.elapsed().as_millis() as u64,
                "chat failed"
            )
        })?;
    let response = assistant_reply(&generation.text).trim().to_string();

    info!(
        total_ms = started.elapsed().as_millis() as u64,
        generation_ms = generation.elapsed.as_millis() as u64,
        generated_tokens = generation.generated_tokens,
        "chat finished"
    );

    Ok(Json(ChatResponse { response }))
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let current = state.models.current();
    let model_id = current
        .as_ref()
        .map(|m| m.model_id().to_string())
        .unwrap_or_else(|| state.model_id.clone());

    Json(HealthResponse {
        status: "ok".into(),
        model_loaded: current.is_some(),
        model_id,
    })
}

/// Template rendering and decoding run on the blocking pool with the model.
async fn run_generation(
    model: Arc<dyn ChatModel>,
    messages: Vec<ChatMessage>,
    params: GenerationParams,
) -> ApiResult<Generation> {
    tokio::task::spawn_blocking(move || {
        let prompt = model.render_chat(&messages)?;
        model.generate(&prompt, &params)
    })
    .await
    .map_err(|e| ApiError::internal(format!("generation task failed: {e}")))?
    .map_err(ApiError::Generation)
}
