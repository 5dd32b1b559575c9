use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use crate::state::TagService;

#[derive(Deserialize)]
pub struct TranslateParams {
    pub tag: Option<String>,
    pub namespace: Option<String>,
    pub name: Option<String>,
}

#[derive(Deserialize)]
pub struct SuggestParams {
    pub keyword: String,
    pub translate: Option<bool>,
}

#[derive(Deserialize)]
pub struct RefreshParams {
    pub wait: Option<bool>,
}

pub async fn translate_handler(
    State(service): State<Arc<TagService>>,
    Query(params): Query<TranslateParams>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let translation = match (params.tag, params.namespace, params.name) {
        (Some(tag), _, _) => service.get_translation(&tag),
        (None, Some(namespace), Some(name)) => service.translate(&namespace, &name),
        (None, Some(namespace), None) => service
            .current()
            .and_then(|db| db.translate_namespace(&namespace).map(str::to_string)),
        _ => {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(json!({ "status": "error", "message": "Expected `tag` or `namespace`" })),
            ));
        }
    };

    Ok(Json(json!({ "status": "ok", "translation": translation })))
}

pub async fn suggest_handler(
    State(service): State<Arc<TagService>>,
    Query(params): Query<SuggestParams>,
) -> Json<Value> {
    let suggestions = service.suggest(&params.keyword, params.translate.unwrap_or(true));
    Json(json!({ "status": "ok", "suggestions": suggestions }))
}

pub async fn refresh_handler(
    State(service): State<Arc<TagService>>,
    Query(params): Query<RefreshParams>,
) -> Json<Value> {
    if params.wait.unwrap_or(false) {
        let outcome = service.refresh().await;
        return Json(json!({ "status": "ok", "result": outcome }));
    }

    info!("[Tags] Refresh requested.");
    service.spawn_refresh();
    Json(json!({ "status": "started" }))
}

pub async fn status_handler(State(service): State<Arc<TagService>>) -> Json<Value> {
    Json(json!({ "status": "ok", "tags": service.status() }))
}
