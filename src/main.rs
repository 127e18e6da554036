//! LivePoll 실시간 투표 서버

mod config;
mod error;
mod handlers;
mod protocol;
mod session;
mod state;
mod store;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    http::HeaderValue,
    response::{Html, IntoResponse, Json},
    routing::get,
    Router,
};
use config::Config;
use futures::{SinkExt, StreamExt};
use protocol::{ClientMessage, ServerMessage};
use session::{Coordinator, Outbound};
use state::AppState;
use std::sync::Arc;
use store::{MemoryPollStore, SharedStore};
use tokio::sync::mpsc;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (config, invalid_vars) = Config::from_env();

    // 로깅 초기화
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.log_level))
        .with(tracing_subscriber::fmt::layer())
        .init();

    for var in &invalid_vars {
        tracing::warn!(key = %var.key, value = %var.value, "Invalid config value, using default");
    }

    let config = Arc::new(config);
    let store: SharedStore = Arc::new(MemoryPollStore::new());

    // 이전 프로세스에서 끝나지 않은 투표 정리
    match store::retire_orphaned_polls(store.as_ref()).await {
        Ok(0) => {}
        Ok(count) => tracing::info!(count = count, "Retired orphaned polls"),
        Err(e) => tracing::warn!(error = %e, "Could not reconcile poll store"),
    }

    let coordinator = Coordinator::spawn(config.clone(), store.clone());
    let state = Arc::new(AppState::new(config.clone(), coordinator, store));

    // CORS 설정
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    let cors = if config.allows_any_origin() {
        cors.allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        cors.allow_origin(AllowOrigin::list(origins))
    };

    // 라우터 설정
    let app = Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .route("/api/polls", get(handlers::list_polls))
        .route("/api/polls/active", get(handlers::list_active_polls))
        .route("/api/polls/:id", get(handlers::get_poll))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
        .with_state(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("🚀 LivePoll server started");
    tracing::info!("Address: {}", addr);
    tracing::info!("WebSocket: ws://{}/ws", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

async fn index_handler() -> Html<&'static str> {
    Html("<h1>LivePoll Server</h1><p>WebSocket endpoint: /ws</p>")
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "server": "livepoll-server",
        "replacePolicy": format!("{:?}", state.config.poll.replace_policy).to_lowercase(),
        "timestamp": chrono::Utc::now().timestamp()
    }))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();

    // 연결 처리
    let connection_id = state.coordinator.connect(tx.clone());

    // 송신 태스크
    let mut send_task = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            match outbound {
                Outbound::Event(msg) => {
                    if let Ok(json) = serde_json::to_string(&msg) {
                        if ws_sender.send(Message::Text(json)).await.is_err() {
                            break;
                        }
                    }
                }
                Outbound::Close => {
                    let _ = ws_sender.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    // 수신 태스크
    let coordinator = state.coordinator.clone();
    let receiver_id = connection_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(msg) => coordinator.dispatch(&receiver_id, msg),
                    Err(e) => {
                        tracing::debug!(connection_id = %receiver_id, error = %e, "Malformed client message");
                        let _ = tx.send(Outbound::Event(ServerMessage::Error {
                            code: "malformed_message".to_string(),
                            message: e.to_string(),
                        }));
                    }
                },
                Ok(Message::Close(_)) => break,
                Err(_) => break,
                _ => {}
            }
        }
    });

    // 한쪽이 끝나면 다른 쪽도 정리
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    // 연결 해제
    state.coordinator.disconnect(&connection_id);
}
