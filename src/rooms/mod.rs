mod new;
mod ws;

use axum::{
    Router,
    routing::{get, post},
};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(new::list_rooms))
        .route("/new", post(new::new_room))
        .route("/{room}/ws", get(ws::room_ws))
}
