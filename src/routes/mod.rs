//! Router assembly: HTTP endpoints, WebSocket upgrade, static files, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;
pub mod ws;

/// Build the application router with:
/// - WebSocket at `/ws`
/// - tutor API under `/api/v1/...`
/// - Static SPA from `./static` with index fallback
/// - CORS (allow any origin/method/headers); tighten for production
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    let static_service = ServeDir::new("./static")
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new("./static/index.html"));

    Router::new()
        .route("/ws", get(ws::ws_upgrade))
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/tutor/ask", post(http::http_post_ask))
        .route("/api/v1/tutor/prompt", post(http::http_post_prompt))
        .route("/api/v1/tutor/format", post(http::http_post_format))
        .route("/api/v1/tutor/transcribe", post(http::http_post_transcribe))
        .route("/api/v1/tutor/speak", post(http::http_post_speak))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .fallback_service(static_service)
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{header::CONTENT_TYPE, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::config::{Prompts, SamplingConfig};
    use crate::tutor::tests::{tutor_with, FakeGenerator};
    use crate::tutor::Tutor;

    fn app_with(generator: FakeGenerator) -> Router {
        let (tutor, _) = tutor_with(generator);
        build_router(Arc::new(AppState::with_tutor(tutor)))
    }

    async fn post(app: Router, path: &str, body: Value) -> (StatusCode, Value) {
        let req = Request::post(path)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn health_reports_generator() {
        let app = app_with(FakeGenerator::replying("{}"));
        let res = app
            .oneshot(Request::get("/api/v1/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, json!({"ok": true, "generator": true}));
    }

    #[tokio::test]
    async fn ask_returns_full_whiteboard() {
        let raw = r##"{"steps": "# Derivative\n\nUse $\\frac{d}{dx}x^2 = 2x$", "practice": {"problems": [{"question": "d/dx x^3?", "solution": "3x^2"}]}}"##;
        let app = app_with(FakeGenerator::replying(raw));
        let (status, body) = post(
            app,
            "/api/v1/tutor/ask",
            json!({"question": "Derivative of x^2?", "teachingStyle": "step-by-step", "subject": "math"}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert!(body["content"]["steps"].as_str().unwrap().starts_with("Your Question: Derivative of x^2?"));
        assert_eq!(body["content"]["visual"]["type"], "function");
        assert_eq!(body["content"]["practice"]["problems"][0]["solution"], "3x^2");
        assert!(body["content"]["concepts"]["relatedTopics"].as_array().unwrap().is_empty());
        assert!(body["html"].as_str().unwrap().contains("<h1>Derivative</h1>"));
        assert_eq!(body["charts"][0]["type"], "line");
    }

    #[tokio::test]
    async fn ask_maps_errors_to_status_codes() {
        let (status, body) = post(
            app_with(FakeGenerator::replying("{}")),
            "/api/v1/tutor/ask",
            json!({"question": "  "}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Please ask a question first.");

        let (status, body) = post(
            app_with(FakeGenerator::failing(429)),
            "/api/v1/tutor/ask",
            json!({"question": "Why?"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], "Error processing your question. Please try again.");

        let offline = Tutor::new(None, None, Prompts::default(), SamplingConfig::default());
        let app = build_router(Arc::new(AppState::with_tutor(offline)));
        let (status, _) = post(app, "/api/v1/tutor/ask", json!({"question": "Why?"})).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn prompt_preview_needs_no_generator() {
        let offline = Tutor::new(None, None, Prompts::default(), SamplingConfig::default());
        let app = build_router(Arc::new(AppState::with_tutor(offline)));
        let (status, body) = post(
            app,
            "/api/v1/tutor/prompt",
            json!({"question": "Why is the sky blue?", "teachingStyle": "interactive", "subject": "science"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let prompt = body["prompt"].as_str().unwrap();
        assert!(prompt.contains("expert science tutor"));
        assert!(prompt.contains("Question: Why is the sky blue?"));
    }

    #[tokio::test]
    async fn format_endpoint_defaults_unparseable_text() {
        let app = app_with(FakeGenerator::replying("{}"));
        let (status, body) = post(
            app,
            "/api/v1/tutor/format",
            json!({"raw": "not json at all", "question": "What?"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["content"]["steps"], "Your Question: What?\n\nNo steps available");
        assert_eq!(body["content"]["visual"]["data"]["function"], "x");
        assert_eq!(body["content"]["visual"]["data"]["points"].as_array().unwrap().len(), 201);
    }

    #[tokio::test]
    async fn speak_returns_base64_audio() {
        use base64::Engine;

        let app = app_with(FakeGenerator::replying("{}"));
        let (status, body) = post(app, "/api/v1/tutor/speak", json!({"text": "Hello", "subject": "science"})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["mime"], "audio/mpeg");
        let audio = base64::engine::general_purpose::STANDARD
            .decode(body["audioBase64"].as_str().unwrap())
            .unwrap();
        assert_eq!(audio, b"science:Hello");

        let app = app_with(FakeGenerator::replying("{}"));
        let (status, body) = post(app, "/api/v1/tutor/speak", json!({"text": "   "})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "There is nothing to read aloud yet.");

        let offline = Tutor::new(None, None, Prompts::default(), SamplingConfig::default());
        let app = build_router(Arc::new(AppState::with_tutor(offline)));
        let (status, body) = post(app, "/api/v1/tutor/speak", json!({"text": "Hello"})).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "Error processing your question. Please try again.");
    }
}
