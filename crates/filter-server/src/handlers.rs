use std::sync::Arc;

use axum::{Json, extract::State};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{
    error::FilterError,
    state::FilterStore,
    types::{GalleryInfo, NewFilter},
};

#[derive(Deserialize)]
#[serde(tag = "action", content = "payload", rename_all = "snake_case")]
pub enum FilterAction {
    Toggle { id: i64 },
    Delete { id: i64 },
}

#[derive(Deserialize)]
pub struct CommentCheck {
    pub commenter: Option<String>,
    pub comment: String,
}

/// Runs a store operation off the async runtime; every write touches SQLite.
async fn blocking<T, F>(store: Arc<FilterStore>, f: F) -> Result<T, FilterError>
where
    T: Send + 'static,
    F: FnOnce(&FilterStore) -> Result<T, FilterError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&store)).await?
}

pub async fn list_filters_handler(State(store): State<Arc<FilterStore>>) -> Json<Value> {
    Json(json!({ "status": "ok", "filters": store.list(), "needTags": store.need_tags() }))
}

pub async fn add_filter_handler(
    State(store): State<Arc<FilterStore>>,
    Json(new): Json<NewFilter>,
) -> Result<Json<Value>, FilterError> {
    let filter = blocking(store, move |store| store.add(new.mode, &new.text)).await?;
    Ok(Json(json!({ "status": "ok", "filter": filter })))
}

pub async fn manage_filters_handler(
    State(store): State<Arc<FilterStore>>,
    Json(action): Json<FilterAction>,
) -> Result<Json<Value>, FilterError> {
    let filter = blocking(store, move |store| match action {
        FilterAction::Toggle { id } => store.toggle(id),
        FilterAction::Delete { id } => store.delete(id),
    })
    .await?;
    Ok(Json(json!({ "status": "ok", "filter": filter })))
}

pub async fn check_gallery_handler(
    State(store): State<Arc<FilterStore>>,
    Json(info): Json<GalleryInfo>,
) -> Json<Value> {
    let hit = store.filter_gallery(&info);
    Json(json!({ "status": "ok", "filtered": hit.is_some(), "mode": hit }))
}

pub async fn check_comment_handler(
    State(store): State<Arc<FilterStore>>,
    Json(check): Json<CommentCheck>,
) -> Json<Value> {
    let hit = store.filter_comment_entry(check.commenter.as_deref(), &check.comment);
    Json(json!({ "status": "ok", "filtered": hit.is_some(), "mode": hit }))
}

pub async fn export_filters_handler(State(store): State<Arc<FilterStore>>) -> Json<Value> {
    Json(json!({ "status": "ok", "filters": store.export() }))
}

pub async fn import_filters_handler(
    State(store): State<Arc<FilterStore>>,
    Json(filters): Json<Vec<NewFilter>>,
) -> Result<Json<Value>, FilterError> {
    let report = blocking(store, move |store| store.import(filters)).await?;
    Ok(Json(json!({ "status": "ok", "report": report })))
}
