//! Chat Memory Server
//!
//! HTTP relay: validates a prompt, assembles the user's stored context, calls
//! the generation endpoint, persists the new turn best-effort.

use axum::{
    extract::State,
    http::{HeaderValue, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chat_memory::{
    assembler::ContextAssembler,
    config::{Config, StoreMode},
    embedding::{HttpEmbeddingClient, ZeroFallback},
    generation::{ChatCompletionClient, Generator},
    record::ContextRecord,
    store::ContextStore,
};

/// Application state shared across handlers.
///
/// Built once at startup, read-only thereafter; the handles are stateless
/// HTTP clients and a mutex-guarded SQLite connection, so no teardown is
/// needed.
struct AppState {
    store: ContextStore,
    assembler: ContextAssembler,
    generator: Box<dyn Generator>,
    embedder: Option<ZeroFallback<HttpEmbeddingClient>>,
    embedding_dimensions: usize,
}

type SharedState = Arc<AppState>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Starting Chat Memory Server on port {}", config.server_port);
    tracing::info!("Data directory: {:?}", config.data_dir);
    tracing::info!("Store mode: {:?}", config.store_mode);

    // Initialize components
    let store = ContextStore::new(&config)?;
    let assembler = ContextAssembler::new(config.history_attribution);

    let generation_endpoint = config
        .generation
        .clone()
        .ok_or_else(|| anyhow::anyhow!("generation endpoint is required"))?;
    let generator: Box<dyn Generator> =
        Box::new(ChatCompletionClient::new(&config, generation_endpoint)?);

    let embedder = config
        .embedding
        .clone()
        .map(|endpoint| HttpEmbeddingClient::new(&config, endpoint).map(ZeroFallback::new))
        .transpose()?;

    let state = Arc::new(AppState {
        store,
        assembler,
        generator,
        embedder,
        embedding_dimensions: config.embedding_dimensions,
    });

    // Build router
    let app = Router::new()
        .route("/", get(home))
        .route("/health", get(health))
        .route("/ask", post(ask))
        .layer(cors_layer(config.allowed_origin.as_deref())?)
        .with_state(state);

    let listener =
        tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.server_port)).await?;
    tracing::info!("Server listening on http://0.0.0.0:{}", config.server_port);

    axum::serve(listener, app).await?;

    Ok(())
}

fn cors_layer(allowed_origin: Option<&str>) -> anyhow::Result<CorsLayer> {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    Ok(match allowed_origin {
        Some(origin) => layer.allow_origin(origin.parse::<HeaderValue>()?),
        None => layer.allow_origin(Any),
    })
}

// === Handlers ===

async fn home() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "Welcome to the Chat Memory API. Use the /ask endpoint to interact."
    }))
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
struct AskRequest {
    user_id: Option<String>,
    prompt: Option<String>,
}

#[derive(Debug, Serialize)]
struct AskResponse {
    answer: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn bad_request(message: &str) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
}

fn server_error(message: String) -> ApiError {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorBody { error: message }))
}

async fn ask(
    State(state): State<SharedState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AskResponse>, ApiError> {
    let user_id = req.user_id.filter(|v| !v.is_empty());
    let prompt = req.prompt.filter(|v| !v.is_empty());
    let (user_id, prompt) = match (user_id, prompt) {
        (Some(u), Some(p)) => (u, p),
        _ => return Err(bad_request("user_id and prompt are required")),
    };

    // Retrieve prior context. Failure here is indistinguishable from "no
    // history" under the default suppress policy.
    let history = load_history(&state, &user_id).map_err(|e| server_error(e.to_string()))?;

    let messages = state.assembler.assemble(&history, &prompt);

    let answer = state
        .generator
        .generate(&messages)
        .await
        .map_err(|e| server_error(e.to_string()))?;

    // Persist the completed turn. The answer is already in hand, so a store
    // failure is logged but never fails the request.
    if let Err(e) = persist_turn(&state, &user_id, &prompt, &answer).await {
        tracing::error!(error = %e, %user_id, "Failed to persist turn");
    }

    tracing::info!(%user_id, "Generated answer");

    Ok(Json(AskResponse { answer }))
}

fn load_history(state: &AppState, user_id: &str) -> chat_memory::Result<Vec<ContextRecord>> {
    match state.store.mode() {
        StoreMode::AppendLog => state.store.list_by_user(user_id),
        StoreMode::SingleSlot => Ok(state
            .store
            .get_single(user_id)?
            .and_then(|blob| record_from_blob(user_id, &blob))
            .into_iter()
            .collect()),
    }
}

/// Rehydrate the single-slot blob into one history record
fn record_from_blob(user_id: &str, blob: &serde_json::Value) -> Option<ContextRecord> {
    let prompt = blob.get("prompt")?.as_str()?;
    let response = blob.get("response")?.as_str()?;
    Some(ContextRecord::new(user_id, prompt, response))
}

async fn persist_turn(
    state: &AppState,
    user_id: &str,
    prompt: &str,
    answer: &str,
) -> chat_memory::Result<()> {
    match state.store.mode() {
        StoreMode::AppendLog => {
            let embedding = match &state.embedder {
                Some(embedder) => Some(embedder.embed_or_zero(prompt).await),
                None => None,
            };
            state
                .store
                .append(user_id, prompt, answer, embedding.as_deref())
        }
        StoreMode::SingleSlot => {
            let blob = serde_json::json!({ "prompt": prompt, "response": answer });
            let embedding = match &state.embedder {
                Some(embedder) => embedder.embed_or_zero(&blob.to_string()).await,
                None => vec![0.0; state.embedding_dimensions],
            };
            state.store.upsert_single(user_id, &blob, &embedding)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chat_memory::record::ChatMessage;
    use chat_memory::Error;
    use tempfile::TempDir;

    struct FixedGenerator {
        reply: &'static str,
    }

    #[async_trait]
    impl Generator for FixedGenerator {
        async fn generate(&self, _messages: &[ChatMessage]) -> chat_memory::Result<String> {
            Ok(self.reply.to_string())
        }
    }

    struct FailingGenerator;

    #[async_trait]
    impl Generator for FailingGenerator {
        async fn generate(&self, _messages: &[ChatMessage]) -> chat_memory::Result<String> {
            Err(Error::generation("model unavailable"))
        }
    }

    fn test_state(dir: &TempDir, generator: Box<dyn Generator>) -> SharedState {
        let config = Config::with_data_dir(dir.path());
        Arc::new(AppState {
            store: ContextStore::new(&config).unwrap(),
            assembler: ContextAssembler::new(config.history_attribution),
            generator,
            embedder: None,
            embedding_dimensions: config.embedding_dimensions,
        })
    }

    fn request(user_id: Option<&str>, prompt: Option<&str>) -> AskRequest {
        AskRequest {
            user_id: user_id.map(String::from),
            prompt: prompt.map(String::from),
        }
    }

    #[tokio::test]
    async fn missing_fields_are_rejected_with_400() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir, Box::new(FixedGenerator { reply: "hello" }));

        for (user_id, prompt) in [
            (None, Some("hi")),
            (Some("u1"), None),
            (None, None),
            (Some(""), Some("hi")),
            (Some("u1"), Some("")),
        ] {
            let (status, Json(body)) = ask(State(state.clone()), Json(request(user_id, prompt)))
                .await
                .unwrap_err();
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body.error, "user_id and prompt are required");
        }
    }

    #[tokio::test]
    async fn generation_failure_surfaces_as_500_with_message() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir, Box::new(FailingGenerator));

        let (status, Json(body)) = ask(State(state), Json(request(Some("u1"), Some("hi"))))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.error.contains("model unavailable"));
    }

    #[tokio::test]
    async fn valid_request_answers_and_persists_the_turn() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir, Box::new(FixedGenerator { reply: "hello" }));

        let Json(body) = ask(State(state.clone()), Json(request(Some("u1"), Some("hi"))))
            .await
            .unwrap();
        assert_eq!(body.answer, "hello");

        let records = state.store.list_by_user("u1").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].prompt, "hi");
        assert_eq!(records[0].response, "hello");
    }

    #[tokio::test]
    async fn store_failure_does_not_prevent_the_answer() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir, Box::new(FixedGenerator { reply: "hello" }));

        // Break the backing table out from under the store's connection.
        let conn = rusqlite::Connection::open(dir.path().join("contexts.db")).unwrap();
        conn.execute_batch("DROP TABLE user_contexts").unwrap();

        let Json(body) = ask(State(state), Json(request(Some("u1"), Some("hi"))))
            .await
            .unwrap();
        assert_eq!(body.answer, "hello");
    }

    #[test]
    fn ask_request_tolerates_missing_fields() {
        let req: AskRequest = serde_json::from_str(r#"{"prompt": "hi"}"#).unwrap();
        assert!(req.user_id.is_none());
        assert_eq!(req.prompt.as_deref(), Some("hi"));

        let req: AskRequest = serde_json::from_str("{}").unwrap();
        assert!(req.user_id.is_none());
        assert!(req.prompt.is_none());
    }

    #[test]
    fn response_bodies_have_expected_shape() {
        let answer = serde_json::to_value(AskResponse {
            answer: "hello".into(),
        })
        .unwrap();
        assert_eq!(answer, serde_json::json!({"answer": "hello"}));

        let error = serde_json::to_value(ErrorBody {
            error: "user_id and prompt are required".into(),
        })
        .unwrap();
        assert_eq!(
            error,
            serde_json::json!({"error": "user_id and prompt are required"})
        );
    }

    #[test]
    fn blob_rehydrates_into_one_record() {
        let blob = serde_json::json!({"prompt": "hi", "response": "hello"});
        let record = record_from_blob("u1", &blob).unwrap();
        assert_eq!(record.user_id, "u1");
        assert_eq!(record.prompt, "hi");
        assert_eq!(record.response, "hello");
    }

    #[test]
    fn malformed_blob_yields_no_history() {
        assert!(record_from_blob("u1", &serde_json::json!({"prompt": "hi"})).is_none());
        assert!(record_from_blob("u1", &serde_json::json!("just a string")).is_none());
    }

    #[test]
    fn cors_layer_accepts_exact_origin() {
        assert!(cors_layer(Some("https://example.app")).is_ok());
        assert!(cors_layer(None).is_ok());
    }
}
