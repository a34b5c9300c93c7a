use axum::{Form, Json, debug_handler, extract::State};
use serde::{Deserialize, Serialize};

use crate::history::HistoryStore;
use crate::{AppError, AppResult};

#[derive(Debug, Deserialize)]
pub(crate) struct NewRoomForm {
    name: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct RoomCreated {
    id: i64,
    name: String,
}

/// Explicit room-creation boundary. Idempotent: creating a room that already
/// exists answers with the existing row.
#[debug_handler(state = crate::AppState)]
pub(crate) async fn new_room(
    State(history): State<HistoryStore>,
    Form(NewRoomForm { name }): Form<NewRoomForm>,
) -> AppResult<Json<RoomCreated>> {
    let name = name.trim().to_owned();
    if name.is_empty() {
        return Err(AppError::bad_request("room name is required"));
    }

    let id = history.ensure_room(&name).await?;
    Ok(Json(RoomCreated { id, name }))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn list_rooms(
    State(history): State<HistoryStore>,
) -> AppResult<Json<Vec<String>>> {
    Ok(Json(history.room_names().await?))
}
