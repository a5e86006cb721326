use crate::models::chat::StatusResponse;
use crate::services::conversation::IngestionProvider;
use crate::utils::error::ApiError;
use axum::{extract::State, Json};
use std::sync::Arc;
use tracing::info;

pub async fn process_documents_handler(
    State(ingestion): State<Arc<dyn IngestionProvider>>,
) -> Result<Json<StatusResponse>, ApiError> {
    let report = ingestion
        .process_all()
        .await
        .map_err(|e| ApiError::IngestionFailed(format!("{:#}", e)))?;

    if !report.is_success() {
        return Err(ApiError::IngestionFailed(format!(
            "Failed to process documents ({} found, {} failed)",
            report.files_found, report.files_failed
        )));
    }

    info!("Document processing report: {:?}", report);

    Ok(Json(StatusResponse::success(Some(format!(
        "Documents processed successfully ({} new files, {} chunks, {} already indexed)",
        report.files_indexed, report.chunks_added, report.files_skipped
    )))))
}
