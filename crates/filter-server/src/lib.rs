use std::{path::Path, sync::Arc};

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;

pub mod error;
pub mod handlers;
pub mod matcher;
pub mod state;
pub mod types;

pub use error::FilterError;
use handlers::{
    add_filter_handler, check_comment_handler, check_gallery_handler, export_filters_handler,
    import_filters_handler, list_filters_handler, manage_filters_handler,
};
pub use state::FilterStore;
pub use types::{Filter, FilterMode, GalleryInfo, ImportReport, NewFilter};

pub fn create_store(data_dir: &Path) -> Result<Arc<FilterStore>, FilterError> {
    Ok(Arc::new(FilterStore::open(data_dir)?))
}

pub fn create_router(store: Arc<FilterStore>) -> Router {
    Router::new()
        .route("/", get(list_filters_handler).post(add_filter_handler))
        .route("/manage", post(manage_filters_handler))
        .route("/check", post(check_gallery_handler))
        .route("/check-comment", post(check_comment_handler))
        .route("/export", get(export_filters_handler))
        .route("/import", post(import_filters_handler))
        .layer(CorsLayer::permissive())
        .with_state(store)
}

#[cfg(test)]
mod tests {
    use std::{
        fs,
        path::PathBuf,
        time::{SystemTime, UNIX_EPOCH},
    };

    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode, header::CONTENT_TYPE},
    };
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;

    fn test_data_dir(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time")
            .as_nanos();
        std::env::temp_dir().join(format!(
            "ehviewer-filter-router-test-{}-{}-{}",
            name,
            std::process::id(),
            nanos
        ))
    }

    async fn call(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");

        let response = router.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        (status, serde_json::from_slice(&body).expect("json body"))
    }

    #[tokio::test]
    async fn add_rejections_map_to_client_errors() {
        let dir = test_data_dir("add");
        let app = create_router(create_store(&dir).expect("store"));

        let (status, body) =
            call(&app, "POST", "/", Some(json!({ "mode": "title", "text": "Spoiler" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["filter"]["text"], json!("spoiler"));
        assert_eq!(body["filter"]["enabled"], json!(true));

        let (status, body) =
            call(&app, "POST", "/", Some(json!({ "mode": "title", "text": "SPOILER" }))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["status"], json!("error"));

        let (status, _) =
            call(&app, "POST", "/", Some(json!({ "mode": "uploader", "text": "  " }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) =
            call(&app, "POST", "/", Some(json!({ "mode": "comment", "text": "(" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(&app, "GET", "/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["filters"].as_array().map(Vec::len), Some(1));
        assert_eq!(body["needTags"], json!(false));

        let _ = fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn manage_toggles_and_deletes_through_the_router() {
        let dir = test_data_dir("manage");
        let app = create_router(create_store(&dir).expect("store"));

        let (_, body) =
            call(&app, "POST", "/", Some(json!({ "mode": "title", "text": "spoiler" }))).await;
        let id = body["filter"]["id"].as_i64().expect("id");
        let gallery = json!({ "title": "Big SPOILER inside", "simpleTags": ["female:glasses"] });

        let (_, body) = call(&app, "POST", "/check", Some(gallery.clone())).await;
        assert_eq!(body["filtered"], json!(true));
        assert_eq!(body["mode"], json!("title"));

        let toggle = json!({ "action": "toggle", "payload": { "id": id } });
        let (status, body) = call(&app, "POST", "/manage", Some(toggle)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["filter"]["enabled"], json!(false));

        let (_, body) = call(&app, "POST", "/check", Some(gallery)).await;
        assert_eq!(body["filtered"], json!(false));
        assert_eq!(body["mode"], Value::Null);

        let delete = json!({ "action": "delete", "payload": { "id": id } });
        let (status, _) = call(&app, "POST", "/manage", Some(delete.clone())).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(&app, "POST", "/manage", Some(delete)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status"], json!("error"));

        let _ = fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn comments_import_and_export() {
        let dir = test_data_dir("import");
        let app = create_router(create_store(&dir).expect("store"));

        let filters = json!([
            { "mode": "commenter", "text": "Troll" },
            { "mode": "comment", "text": "buy\\s+now", "enabled": true },
            { "mode": "commenter", "text": "Troll" },
            { "mode": "comment", "text": "[" }
        ]);
        let (status, body) = call(&app, "POST", "/import", Some(filters)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["report"], json!({ "added": 2, "duplicates": 1, "rejected": 1 }));

        let (_, body) = call(
            &app,
            "POST",
            "/check-comment",
            Some(json!({ "commenter": "Troll", "comment": "hi" })),
        )
        .await;
        assert_eq!(body["mode"], json!("commenter"));

        let (_, body) = call(
            &app,
            "POST",
            "/check-comment",
            Some(json!({ "comment": "please buy  now" })),
        )
        .await;
        assert_eq!(body["mode"], json!("comment"));

        let (_, body) = call(&app, "GET", "/export", None).await;
        assert_eq!(
            body["filters"],
            json!([
                { "mode": "commenter", "text": "Troll", "enabled": true },
                { "mode": "comment", "text": "buy\\s+now", "enabled": true }
            ])
        );

        let _ = fs::remove_dir_all(dir);
    }
}
