//! Router assembly: HTTP endpoints, the proxy gateway, static files, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{any, get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

mod extract;
pub mod http;
pub mod proxy;

/// Build the application router with:
/// - REST-ish API under `/api/v1/...`
/// - the proxy gateway at `/api/hf/v1/chat/completions` (answers its own CORS)
/// - Static SPA from `./static` with index fallback
/// - CORS (allow any origin/method/headers) on the API
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    // Static files with SPA fallback
    let static_service = ServeDir::new("./static")
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new("./static/index.html"));

    let api = Router::new()
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/days", get(http::http_get_days))
        .route("/api/v1/days/:day", get(http::http_get_day))
        .route("/api/v1/words/:word", get(http::http_get_word))
        .route("/api/v1/parts-of-speech", get(http::http_get_parts_of_speech))
        .route("/api/v1/sessions", post(http::http_post_session))
        .route(
            "/api/v1/sessions/:id",
            get(http::http_get_session).delete(http::http_delete_session),
        )
        .route("/api/v1/sessions/:id/actions", post(http::http_post_session_action))
        .route("/api/v1/paragraph", get(http::http_get_paragraph))
        .route("/api/v1/paragraph/prompt", get(http::http_get_paragraph_prompt))
        .route("/api/v1/paragraph/generate", post(http::http_post_paragraph_generate))
        .with_state(state.clone())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let gateway = Router::new()
        .route("/api/hf/v1/chat/completions", any(proxy::forward))
        .with_state(state.proxy.clone());

    api.merge(gateway)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Frontend fallback
        .fallback_service(static_service)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{Method, Request, StatusCode},
        response::Response,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::catalog::tests::sample_catalog;
    use crate::config::AppConfig;
    use crate::paragraph::tests::CannedGenerator;

    fn app_with(reply: &str) -> Router {
        let state = AppState::with_parts(
            Arc::new(sample_catalog()),
            Arc::new(CannedGenerator(Ok(reply.to_string()))),
            &AppConfig::default(),
        );
        build_router(Arc::new(state))
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> Response {
        let builder = Request::builder().method(method).uri(uri);
        let req = match body {
            Some(v) => builder
                .header("content-type", "application/json")
                .body(Body::from(v.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        app.clone().oneshot(req).await.unwrap()
    }

    async fn json_of(res: Response) -> Value {
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn day_listing_and_empty_day() {
        let app = app_with("");
        let days = json_of(call(&app, Method::GET, "/api/v1/days", None).await).await;
        assert_eq!(days[0]["day"], 1);
        assert_eq!(days[0]["wordCount"], 3);
        assert_eq!(days[0]["skill"], "Reading");

        let day = json_of(call(&app, Method::GET, "/api/v1/days/1", None).await).await;
        assert_eq!(day["entries"][0]["word"], "Run");
        assert_eq!(day["entries"][2]["word"], "Rapid");

        let empty = json_of(call(&app, Method::GET, "/api/v1/days/8", None).await).await;
        assert_eq!(empty["empty"], true);
    }

    #[tokio::test]
    async fn word_lookup_is_case_insensitive() {
        let app = app_with("");
        let res = call(&app, Method::GET, "/api/v1/words/QUIETLY", None).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(json_of(res).await["day"], 2);
        let missing = call(&app, Method::GET, "/api/v1/words/nope", None).await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn empty_day_session_is_refused() {
        let app = app_with("");
        let res = call(&app, Method::POST, "/api/v1/sessions", Some(json!({"day": 5, "mode": "learn"}))).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_of(res).await["code"], "EMPTY_DAY");
    }

    #[tokio::test]
    async fn learn_session_reveals_progressively() {
        let app = app_with("");
        let res = call(&app, Method::POST, "/api/v1/sessions", Some(json!({"day": 1, "mode": "learn"}))).await;
        assert_eq!(res.status(), StatusCode::CREATED);
        let s = json_of(res).await;
        let id = s["id"].as_str().unwrap().to_string();
        assert_eq!(s["revealStep"], 0);
        assert_eq!(s["card"]["word"], "Run");
        assert!(s["card"].get("meaning").is_none());
        assert_eq!(s["isPrevDisabled"], true);

        let uri = format!("/api/v1/sessions/{id}/actions");
        call(&app, Method::POST, &uri, Some(json!({"type": "advance"}))).await;
        let s = json_of(call(&app, Method::POST, &uri, Some(json!({"type": "advance"}))).await).await;
        assert_eq!(s["revealStep"], 2);
        assert_eq!(s["card"]["meaning"], "move fast on foot");
        assert_eq!(s["card"]["image"], "2.png");

        let s = json_of(call(&app, Method::POST, &uri, Some(json!({"type": "advance"}))).await).await;
        assert_eq!((s["index"].clone(), s["revealStep"].clone()), (json!(1), json!(0)));

        let bad = call(&app, Method::POST, &uri, Some(json!({"type": "check"}))).await;
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);

        let gone = call(&app, Method::DELETE, &format!("/api/v1/sessions/{id}"), None).await;
        assert_eq!(gone.status(), StatusCode::NO_CONTENT);
        let after = call(&app, Method::GET, &format!("/api/v1/sessions/{id}"), None).await;
        assert_eq!(after.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn answer_session_scores_and_summarizes() {
        let app = app_with("");
        let s = json_of(call(&app, Method::POST, "/api/v1/sessions", Some(json!({"day": 2, "mode": "answer"}))).await).await;
        let id = s["id"].as_str().unwrap().to_string();
        assert_eq!(s["canCheck"], false);
        assert!(s["card"].get("word").is_none());

        let uri = format!("/api/v1/sessions/{id}/actions");
        call(&app, Method::POST, &uri, Some(json!({"type": "set_guess", "word": "quietly"}))).await;
        call(&app, Method::POST, &uri, Some(json!({"type": "set_part_of_speech", "choice": "Adverb"}))).await;
        let s = json_of(call(&app, Method::POST, &uri, Some(json!({"type": "check"}))).await).await;
        assert_eq!(s["checked"], true);
        assert_eq!(s["result"], json!({"wordCorrect": true, "posCorrect": true}));
        assert_eq!(s["card"]["word"], "Quietly");
        assert_eq!(s["summary"], json!({"total": 1, "completed": 1, "correct": 1, "wrong": 0, "finished": true}));
    }

    #[tokio::test]
    async fn paragraph_generation_highlights_catalog_words() {
        let app = app_with("Run, then stay calm. Rerun nothing.");
        let idle = json_of(call(&app, Method::GET, "/api/v1/paragraph", None).await).await;
        assert_eq!(idle["status"], "idle");

        let p = json_of(call(&app, Method::POST, "/api/v1/paragraph/generate", None).await).await;
        assert_eq!(p["status"], "ready");
        assert_eq!(p["superseded"], false);
        let matched: Vec<_> = p["segments"]
            .as_array()
            .unwrap()
            .iter()
            .filter(|s| s.get("entry").is_some())
            .map(|s| (s["text"].clone(), s["color"].clone()))
            .collect();
        assert_eq!(matched, vec![(json!("Run"), json!("#fef08a")), (json!("calm"), json!("#fef08a"))]);

        let prompt = json_of(call(&app, Method::GET, "/api/v1/paragraph/prompt", None).await).await;
        assert_eq!(prompt["dayGroups"][1], json!({"day": 2, "words": ["Quietly"]}));
    }

    #[tokio::test]
    async fn bad_input_uses_the_error_envelope() {
        let app = app_with("");
        let res = call(&app, Method::GET, "/api/v1/days/abc", None).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body = json_of(res).await;
        assert_eq!((body["success"].clone(), body["code"].clone()), (json!(false), json!("INVALID_PATH")));

        let s = json_of(call(&app, Method::POST, "/api/v1/sessions", Some(json!({"day": 1, "mode": "learn"}))).await).await;
        let uri = format!("/api/v1/sessions/{}/actions", s["id"].as_str().unwrap());
        let res = call(&app, Method::POST, &uri, Some(json!({"type": "jump"}))).await;
        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = json_of(res).await;
        assert_eq!(body["code"], "INVALID_BODY");
        assert!(body["error"].as_str().is_some_and(|m| !m.is_empty()));

        let res = call(&app, Method::GET, "/api/v1/sessions/not-a-uuid", None).await;
        assert_eq!(json_of(res).await["code"], "INVALID_PATH");
    }
}
