use axum::{
    debug_handler,
    extract::{
        Path, Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;

use crate::event::InboundEvent;
use crate::registry::{Enqueue, SessionHandle};
use crate::AppState;

#[derive(Deserialize)]
pub(crate) struct WsQuery {
    #[serde(default = "default_nickname")]
    nickname: String,
}

fn default_nickname() -> String {
    "Anonymous".to_owned()
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn room_ws(
    Path(room): Path<String>,
    Query(WsQuery { nickname }): Query<WsQuery>,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    // A present-but-blank ?nickname= counts as absent.
    let nickname = if nickname.is_empty() {
        default_nickname()
    } else {
        nickname
    };
    ws.on_upgrade(move |socket| run_session(socket, state, room, nickname))
}

/// One connected client: admit it to the room, replay the backlog into its
/// outbound queue, then run the two duplex loops until either side fails.
async fn run_session(socket: WebSocket, state: AppState, room: String, nickname: String) {
    let (session, mut outbound_rx) = SessionHandle::new(&nickname);
    let session_id = session.id();
    // Subscribe before the handle is shared so a prune can never race past us.
    let mut shutdown = session.closed();

    state.registry.join(&room, session.clone());
    tracing::info!(%room, %nickname, "client connected");

    match state.history.fetch_history(&room).await {
        Ok(backlog) => {
            for event in backlog {
                if let Enqueue::Dropped = session.enqueue(event) {
                    tracing::warn!(%room, %nickname, "outbound queue filled during history replay");
                    break;
                }
            }
        }
        Err(err) => tracing::warn!(%room, %err, "failed to load history"),
    }

    let (mut sender, mut receiver) = socket.split();

    // Sole reader of the outbound queue, sole writer to the wire.
    let mut outbound = tokio::spawn(async move {
        while let Some(event) = outbound_rx.recv().await {
            let Ok(text) = serde_json::to_string(&event) else {
                continue;
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let router = state.router.clone();
    let inbound_room = room.clone();
    let inbound_nickname = nickname.clone();
    let mut inbound = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            let text = match message {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };
            let inbound: InboundEvent = match serde_json::from_str(&text) {
                Ok(inbound) => inbound,
                Err(err) => {
                    tracing::debug!(%err, "ignoring malformed client message");
                    continue;
                }
            };
            router.submit(&inbound_room, inbound.into_event(&inbound_nickname));
        }
    });

    // Either direction ending tears the whole session down, as does the
    // router marking the session dead after a capacity drop: saturation is
    // terminal for the connection, not just the registry entry.
    tokio::select! {
        _ = &mut inbound => outbound.abort(),
        _ = &mut outbound => inbound.abort(),
        _ = shutdown.changed() => {
            inbound.abort();
            outbound.abort();
        }
    }

    session.close();
    state.registry.leave(&room, session_id);
    tracing::info!(%room, %nickname, "client disconnected");
}
