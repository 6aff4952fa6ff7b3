use std::sync::Arc;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;
use crate::{
    error::AppError,
    models::{
        Analysis, AxisSpec, ChartConfig, ChartType, ExportRecord, Page, PageQuery, Pagination,
    },
    routes::identity::CurrentUser,
    services::{chart, insights},
    AppState,
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_analyses))
        .route("/generate-chart", post(generate_chart))
        .route("/:analysis_id", get(get_analysis).delete(delete_analysis))
        .route("/:analysis_id/export", post(export_chart))
        .route("/:analysis_id/ai-insights", post(generate_insights))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateChartRequest {
    upload_id: String,
    sheet_name: String,
    chart_type: ChartType,
    x_axis: String,
    y_axis: String,
    chart_config: Option<ChartConfig>,
}

fn default_format() -> String {
    "png".to_string()
}

#[derive(Debug, Deserialize)]
pub struct ExportRequest {
    #[serde(default = "default_format")]
    format: String,
}

async fn generate_chart(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    payload: Result<Json<GenerateChartRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let Json(request) = payload?;
    tracing::info!(
        "Chart request from user {}: upload {}, sheet {}, {} vs {} ({})",
        user.id,
        request.upload_id,
        request.sheet_name,
        request.y_axis,
        request.x_axis,
        request.chart_type.as_str()
    );

    let upload = state
        .store
        .get_upload(&request.upload_id, Some(&user.id))?
        .ok_or_else(|| AppError::NotFound("Upload".to_string()))?;
    let sheet = upload
        .sheet(&request.sheet_name)
        .ok_or_else(|| AppError::NotFound("Sheet".to_string()))?;

    let chart_data = chart::derive_chart_data(
        sheet,
        &request.x_axis,
        &request.y_axis,
        request.chart_type,
    )?;

    let chart_config = request.chart_config.unwrap_or_else(|| {
        ChartConfig::default_for(&request.x_axis, &request.y_axis, &upload.original_name)
    });

    let analysis = Analysis {
        id: Uuid::new_v4().to_string(),
        user_id: user.id.clone(),
        upload_id: upload.id.clone(),
        sheet_name: request.sheet_name,
        chart_type: request.chart_type,
        x_axis: AxisSpec::for_column(&request.x_axis),
        y_axis: AxisSpec::for_column(&request.y_axis),
        chart_data,
        chart_config,
        export_history: Vec::new(),
        ai_insights: None,
        created_at: Utc::now(),
    };
    state.store.insert_analysis(&analysis)?;

    tracing::info!(
        "Analysis {} created with {} points",
        analysis.id,
        analysis.chart_data.labels.len()
    );

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Chart generated successfully",
            "analysis": analysis,
        })),
    ))
}

async fn list_analyses(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<Value>, AppError> {
    let page = Page::from_query(query);
    let (analyses, total) = state.store.list_analyses(Some(&user.id), page)?;
    Ok(Json(json!({
        "analyses": analyses,
        "pagination": Pagination::new(page, total),
    })))
}

async fn get_analysis(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(analysis_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let analysis = state
        .store
        .get_analysis(&analysis_id, Some(&user.id))?
        .ok_or_else(|| AppError::NotFound("Analysis".to_string()))?;
    Ok(Json(json!({ "analysis": analysis })))
}

async fn export_chart(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(analysis_id): Path<String>,
    request: Option<Json<ExportRequest>>,
) -> Result<Json<Value>, AppError> {
    let format = request.map_or_else(default_format, |Json(r)| r.format.to_lowercase());
    if format.is_empty() || !format.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(AppError::InvalidInput(format!("unsupported export format {:?}", format)));
    }

    let record = ExportRecord {
        file_name: format!("chart-{}.{}", analysis_id, format),
        format: format.clone(),
        exported_at: Utc::now(),
    };
    let analysis = state
        .store
        .append_export(&analysis_id, &user.id, record.clone())?
        .ok_or_else(|| AppError::NotFound("Analysis".to_string()))?;

    tracing::info!("Analysis {} exported as {}", analysis_id, format);

    Ok(Json(json!({
        "message": "Export data prepared",
        "exportData": {
            "format": format,
            "chartData": analysis.chart_data,
            "chartConfig": analysis.chart_config,
            "chartType": analysis.chart_type,
            "fileName": record.file_name,
        },
    })))
}

async fn generate_insights(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(analysis_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let analysis = state
        .store
        .get_analysis(&analysis_id, Some(&user.id))?
        .ok_or_else(|| AppError::NotFound("Analysis".to_string()))?;

    let summary = insights::summarize(&analysis.chart_data, &analysis.y_axis.label);
    let updated = state
        .store
        .set_insights(&analysis_id, &user.id, summary)?
        .ok_or_else(|| AppError::NotFound("Analysis".to_string()))?;

    Ok(Json(json!({
        "message": "AI insights generated",
        "insights": updated.ai_insights,
    })))
}

async fn delete_analysis(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(analysis_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    if !state.store.delete_analysis(&analysis_id, Some(&user.id))? {
        return Err(AppError::NotFound("Analysis".to_string()));
    }
    Ok(Json(json!({ "message": "Analysis deleted successfully" })))
}
