use std::{path::Path, sync::Arc, time::Duration};

use anyhow::Result;
use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tracing::info;

pub mod database;
pub mod handlers;
pub mod namespace;
pub mod state;
pub mod update;

use handlers::{refresh_handler, status_handler, suggest_handler, translate_handler};
pub use state::{RefreshOutcome, TagService, TagSource, TagStatus};
use update::HttpFetcher;

/// Builds the service over `data_dir` and, if asked, refreshes it in the
/// background shortly after start-up.
pub async fn create_service(
    data_dir: &Path,
    source: TagSource,
    refresh_on_start: bool,
) -> Result<Arc<TagService>> {
    let fetcher = Arc::new(HttpFetcher::new()?);
    let service = Arc::new(TagService::new(data_dir, source, fetcher).await);

    if refresh_on_start {
        let startup = Arc::clone(&service);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            info!("[Tags] Checking for translation updates...");
            startup.spawn_refresh();
        });
    } else {
        info!("[Tags] Start-up refresh disabled.");
    }

    Ok(service)
}

pub fn create_router(service: Arc<TagService>) -> Router {
    Router::new()
        .route("/translate", get(translate_handler))
        .route("/suggest", get(suggest_handler))
        .route("/refresh", post(refresh_handler))
        .route("/status", get(status_handler))
        .layer(CorsLayer::permissive())
        .with_state(service)
}

#[cfg(test)]
mod tests {
    use std::{
        fs,
        path::PathBuf,
        time::{SystemTime, UNIX_EPOCH},
    };

    use anyhow::anyhow;
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode},
    };
    use bytes::Bytes;
    use futures::{FutureExt, future::BoxFuture};
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::{
        database::TagDatabase,
        update::{Fetch, file_sha1},
    };

    struct Offline;

    impl Fetch for Offline {
        fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Bytes>> {
            async move { Err(anyhow!("offline: {url}")) }.boxed()
        }
    }

    fn test_data_dir(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time")
            .as_nanos();
        std::env::temp_dir().join(format!(
            "ehviewer-tag-router-test-{}-{}-{}",
            name,
            std::process::id(),
            nanos
        ))
    }

    /// Router over a verified data file already on disk.
    async fn router(name: &str) -> (PathBuf, Router) {
        let dir = test_data_dir(name);
        let tags = dir.join("tag-translations");
        fs::create_dir_all(&tags).expect("create tag dir");

        let db = TagDatabase::from_entries(
            "tags.bin",
            [("f:glasses", "眼镜"), ("n:female", "女性"), ("n:artist", "作者")],
        )
        .expect("entries");
        let mut file = Vec::new();
        db.write_to(&mut file).expect("pack");
        fs::write(tags.join("tags.bin"), &file).expect("write data");
        let sum = file_sha1(&tags.join("tags.bin")).expect("sha1");
        fs::write(tags.join("tags.bin.sha1"), sum).expect("write sha1");

        let source = TagSource {
            sha1_name: "tags.bin.sha1".into(),
            sha1_url: "https://offline.invalid/tags.bin.sha1".into(),
            data_name: "tags.bin".into(),
            data_url: "https://offline.invalid/tags.bin".into(),
        };
        let service = TagService::new(&dir, source, Arc::new(Offline)).await;
        (dir, create_router(Arc::new(service)))
    }

    async fn call(router: &Router, method: &str, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .expect("request");
        let response = router.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        (status, serde_json::from_slice(&body).expect("json body"))
    }

    #[tokio::test]
    async fn translate_accepts_tags_namespaces_and_pairs() {
        let (dir, app) = router("translate").await;

        let (status, body) = call(&app, "GET", "/translate?tag=f:glasses").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["translation"], json!("眼镜"));

        let (_, body) = call(&app, "GET", "/translate?namespace=female&name=glasses").await;
        assert_eq!(body["translation"], json!("眼镜"));

        let (_, body) = call(&app, "GET", "/translate?namespace=female").await;
        assert_eq!(body["translation"], json!("女性"));

        let (_, body) = call(&app, "GET", "/translate?tag=f:missing").await;
        assert_eq!(body["translation"], Value::Null);

        for uri in ["/translate", "/translate?name=glasses"] {
            let (status, body) = call(&app, "GET", uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(body["status"], json!("error"));
        }

        let _ = fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn suggest_status_and_refresh_report_json() {
        let (dir, app) = router("suggest").await;

        let (status, body) = call(&app, "GET", "/suggest?keyword=-art").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["suggestions"],
            json!([{ "translation": "作者", "tag": "-artist:" }])
        );

        let (_, body) = call(&app, "GET", "/suggest?keyword=glass&translate=false").await;
        assert_eq!(body["suggestions"], json!([{ "tag": "f:glasses" }]));

        let (_, body) = call(&app, "GET", "/status").await;
        assert_eq!(body["tags"]["loaded"], json!(true));
        assert_eq!(body["tags"]["entries"], json!(3));
        assert_eq!(body["tags"]["refreshing"], json!(false));

        let (status, body) = call(&app, "POST", "/refresh?wait=true").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"]["outcome"], json!("failed"));

        let (_, body) = call(&app, "GET", "/translate?tag=f:glasses").await;
        assert_eq!(body["translation"], json!("眼镜"));

        let _ = fs::remove_dir_all(dir);
    }
}
