//! HTTP front end: routes page requests and image aliases to the engine.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, RawQuery, State};
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Form, Router};
use serde_json::{Map, Value};
use survey_engine::{EngineError, PageRequest, PageResponse, SurveyEngine};
use tracing::{error, info, warn};

use crate::CliResult;

type SharedEngine = Arc<SurveyEngine>;

/// Builds the router for `engine`, mounted under its base URL.
pub fn router(engine: SurveyEngine) -> Router {
    let base = engine.base_url().to_string();
    let mut app = Router::new()
        .route(&format!("{base}/"), get(handle_get).post(handle_post))
        .route(&format!("{base}/img/{{alias}}"), get(handle_image));
    if !base.is_empty() {
        app = app.route(&base, get(handle_bare_base).post(handle_bare_base));
    }
    app.route("/favicon.ico", get(handle_favicon))
        .with_state(Arc::new(engine))
}

pub async fn run(engine: SurveyEngine, addr: &str, port: u16) -> CliResult<()> {
    let base = engine.base_url().to_string();
    let title = engine.spec().title.clone();
    let app = router(engine);
    let listener = tokio::net::TcpListener::bind((addr, port)).await?;
    info!(title = %title, "starting server at http://{}:{}{}/", addr, port, base);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("shutting down..");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {}", err);
    }
}

async fn handle_get(
    State(engine): State<SharedEngine>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    dispatch(engine, page_request(query, None)).await
}

async fn handle_post(
    State(engine): State<SharedEngine>,
    Query(query): Query<HashMap<String, String>>,
    Form(fields): Form<Vec<(String, String)>>,
) -> Response {
    let form = fields
        .into_iter()
        .map(|(key, value)| (key, Value::String(value)))
        .collect::<Map<String, Value>>();
    dispatch(engine, page_request(query, Some(form))).await
}

/// Pages link images relative to `{base}/`, so the bare prefix only redirects.
async fn handle_bare_base(
    State(engine): State<SharedEngine>,
    RawQuery(query): RawQuery,
) -> Redirect {
    let location = match query {
        Some(query) => format!("{}/?{query}", engine.base_url()),
        None => format!("{}/", engine.base_url()),
    };
    Redirect::temporary(&location)
}

fn page_request(mut query: HashMap<String, String>, form: Option<Map<String, Value>>) -> PageRequest {
    PageRequest {
        token: query.remove("token"),
        pix: query.remove("pix"),
        form,
    }
}

async fn dispatch(engine: SharedEngine, request: PageRequest) -> Response {
    match tokio::task::spawn_blocking(move || engine.handle(&request)).await {
        Ok(Ok(PageResponse::Redirect { location })) => Redirect::temporary(&location).into_response(),
        Ok(Ok(PageResponse::Page { markup, .. })) => Html(markup).into_response(),
        Ok(Err(err)) => {
            error!("request failed: {}", err);
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
        Err(err) => {
            error!("request worker failed: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn handle_image(
    State(engine): State<SharedEngine>,
    Path(alias): Path<String>,
) -> Response {
    match tokio::task::spawn_blocking(move || engine.asset(&alias)).await {
        Ok(Ok(asset)) => ([(header::CONTENT_TYPE, asset.content_type)], asset.bytes).into_response(),
        Ok(Err(EngineError::MissingAsset(alias))) => {
            warn!(alias = %alias, "unknown image alias");
            StatusCode::NOT_FOUND.into_response()
        }
        Ok(Err(err)) => {
            error!("image request failed: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        Err(err) => {
            error!("image worker failed: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn handle_favicon() -> StatusCode {
    StatusCode::NO_CONTENT
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use serde_json::json;
    use survey_engine::{FileStore, MemoryStore};
    use survey_spec::{AssetRegistry, SurveyDocument, SurveySpec, flatten};
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn spec() -> SurveySpec {
        let document = SurveyDocument::from_value(json!({
            "title": "Web",
            "pages": [
                { "pid": "intro", "lines": ["Hello {token}"] },
                {
                    "pid": "q",
                    "lines": [["likert", "Rate it", "score"]],
                    "continue": "choice",
                    "values": ["Yes", "No"]
                },
                { "pid": "bye", "lines": ["Done"], "continue": "end" }
            ]
        }))
        .expect("deserialize");
        flatten(&document).expect("flatten")
    }

    fn app() -> Router {
        let engine = SurveyEngine::new(spec(), AssetRegistry::new("."), Box::new(MemoryStore::new()))
            .with_base_url("study");
        router(engine)
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).expect("request")
    }

    fn location(response: &Response) -> String {
        response.headers()[header::LOCATION]
            .to_str()
            .expect("location header")
            .to_string()
    }

    #[tokio::test]
    async fn sessionless_visit_redirects_to_fresh_session() {
        let response = app().oneshot(get_request("/study/")).await.expect("response");
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert!(location(&response).starts_with("/study/?pix=0&token="));
    }

    #[tokio::test]
    async fn bare_prefix_redirects_to_trailing_slash() {
        let response = app()
            .oneshot(get_request("/study?pix=1&token=tok"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(location(&response), "/study/?pix=1&token=tok");

        let response = app().oneshot(get_request("/study")).await.expect("response");
        assert_eq!(location(&response), "/study/");
    }

    #[tokio::test]
    async fn get_renders_requested_page() {
        let response = app()
            .oneshot(get_request("/study/?pix=0&token=tok"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let markup = String::from_utf8(body.to_vec()).expect("utf8");
        assert!(markup.contains("Hello tok"));
    }

    #[tokio::test]
    async fn posted_form_is_recorded() {
        let dir = TempDir::new().expect("temp dir");
        let store = FileStore::new(dir.path());
        let engine = SurveyEngine::new(spec(), AssetRegistry::new("."), Box::new(store.clone()))
            .with_base_url("study");
        let request = Request::builder()
            .method("POST")
            .uri("/study/?pix=2&token=tok")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("_pid=q&score=2&_res=No"))
            .expect("request");

        let response = router(engine).oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let saved: Value = serde_json::from_str(
            &std::fs::read_to_string(store.path_for("tok")).expect("saved document"),
        )
        .expect("json");
        assert_eq!(saved, json!({ "q": { "score": "2", "_res": "No" } }));
    }

    #[tokio::test]
    async fn unknown_image_alias_is_not_found() {
        let response = app()
            .oneshot(get_request("/study/img/7.png"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn favicon_has_no_content() {
        let response = app().oneshot(get_request("/favicon.ico")).await.expect("response");
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn routes_are_mounted_under_the_base_url() {
        let response = app()
            .oneshot(get_request("/?pix=0&token=tok"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
