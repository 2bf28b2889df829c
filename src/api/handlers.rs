use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;

use crate::context::RequestContext;
use crate::data_models::AnalysisResult;
use crate::errors::AppError;

use super::AppState;
use super::models::{AnalyzeRequest, MSG_INVALID_BODY, MSG_URL_REQUIRED};

pub async fn analyze_handler(
    State(state): State<AppState>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<AnalysisResult>, AppError> {
    let Json(request) = payload.map_err(|rejection| {
        log::debug!("rejected analyze request body: {rejection}");
        AppError::invalid_input(MSG_INVALID_BODY)
    })?;

    if request.url.is_empty() {
        return Err(AppError::invalid_input(MSG_URL_REQUIRED));
    }

    let ctx = RequestContext::background().with_timeout(state.analyze_timeout);
    // stop in-flight work if the client goes away
    let _guard = ctx.cancel_on_drop();

    let result = state.analyzer.analyze(&ctx, &request.url).await?;
    Ok(Json(result))
}
