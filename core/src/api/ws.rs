//! WebSocket endpoint: registers the client with the broadcast fan-out and
//! pumps serialized frames into the socket until either side goes away.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use log::debug;

use super::ApiState;

pub async fn handler(ws: WebSocketUpgrade, State(state): State<Arc<ApiState>>) -> Response {
    ws.on_upgrade(move |socket| client_loop(socket, state))
}

async fn client_loop(mut socket: WebSocket, state: Arc<ApiState>) {
    let (client_id, mut frames) = state.broadcast.register();

    loop {
        tokio::select! {
            frame = frames.recv() => {
                match frame {
                    Some(payload) => {
                        if socket.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    // Manager pruned us.
                    None => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    // Inbound frames are ignored; the stream is one-way.
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    state.broadcast.unregister(client_id);
    debug!("ws client {} closed", client_id);
}
