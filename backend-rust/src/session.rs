//! WebSocket session handlers for players and spectators (SPEC_FULL.md
//! §4.5), grounded on the original `play_handler`/`watch_handler`, adapted
//! to axum's native WebSocket extractors in place of aiohttp's.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::arena::Arena;
use crate::config::DELAY;
use crate::entities::Command;
use crate::error::BattleError;
use crate::match_runner::{JoinKind, Match};
use crate::registry::{get_or_create_match, SharedRegistry};
use crate::wire;

#[derive(Clone)]
pub struct AppState {
    pub registry: SharedRegistry,
    pub db: crate::persistence::ResultSink,
}

#[derive(Deserialize)]
struct Hello {
    name: String,
    secret: String,
}

pub async fn watch_ws(
    Path(match_id): Path<u32>,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| watch_session(socket, match_id, state))
}

pub async fn play_ws(
    Path(match_id): Path<u32>,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| play_session(socket, match_id, state))
}

async fn watch_session(socket: WebSocket, match_id: u32, state: AppState) {
    info!(match_id, "spectator connected");
    let (mut sink, mut stream) = socket.split();
    let recv_guard = tokio::spawn(async move { while stream.next().await.is_some() {} });

    // Grounded on `watch_handler`'s own `get_or_create_match(..., recycle=match_id==0)`:
    // a spectator on a not-yet-existing id does bring an (empty, unstarted)
    // match into being, exactly like a player would. The "placeholder frames
    // until a player creates it" effect from spec.md §6.2 falls out for free
    // below, since that empty match's delay-line stays empty until a player
    // joins and its tick loop actually starts ticking.
    let placeholder = Arena::new();
    loop {
        let m = match get_or_create_match(&state.registry, match_id, match_id == 0, &state.db).await {
            Ok(m) => m,
            Err(e) => {
                warn!(match_id, error = %e, "spectator requested invalid match");
                break;
            }
        };

        while m.delay_line_len().await < DELAY {
            if send_compact(&mut sink, &placeholder).await.is_err() {
                recv_guard.abort();
                return;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        let mut idx = if m.is_finished().await {
            m.delay_line_len().await.saturating_sub(1)
        } else {
            m.delay_line_len().await.saturating_sub(DELAY)
        };

        loop {
            let finished = m.is_finished().await;
            let len = m.delay_line_len().await;
            if finished && idx >= len {
                break;
            }
            if idx >= len {
                idx = len.saturating_sub(1);
            }
            idx = idx.max(len.saturating_sub(DELAY));
            let Some(frame) = m.delay_line_at(idx).await else {
                break;
            };
            idx += 1;
            if send_compact(&mut sink, &frame).await.is_err() {
                recv_guard.abort();
                return;
            }
            tokio::time::sleep(Duration::from_secs_f64(1.0 / crate::config::FPS as f64)).await;
        }

        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    recv_guard.abort();
}

async fn send_compact(sink: &mut (impl SinkExt<Message> + Unpin), arena: &Arena) -> Result<(), ()> {
    let text = wire::to_compact_string(arena).map_err(|_| ())?;
    sink.send(Message::Text(text)).await.map_err(|_| ())
}

async fn play_session(socket: WebSocket, match_id: u32, state: AppState) {
    let (mut ws_tx, mut stream) = socket.split();

    let Some(Ok(Message::Text(text))) = stream.next().await else {
        return;
    };
    let Ok(hello) = serde_json::from_str::<Hello>(&text) else {
        let err = BattleError::BadHello(text.clone());
        let _ = ws_tx.send(echo(&err.to_string())).await;
        return;
    };

    let m = match get_or_create_match(&state.registry, match_id, true, &state.db).await {
        Ok(m) => m,
        Err(e) => {
            let _ = ws_tx.send(echo(&e.to_string())).await;
            return;
        }
    };

    // One mpsc-fed writer task owns the socket's send half; the command-intake
    // loop below and the tick-driven pusher task both hand it messages
    // instead of racing for the sink themselves (same split as
    // echo-session-ws-gateway's writer/out_tx pattern).
    let (out_tx, mut out_rx) = mpsc::channel::<Message>(32);
    let writer = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if ws_tx.send(msg).await.is_err() {
                break;
            }
        }
    });

    match m.join(&hello.name, &hello.secret).await {
        Ok(JoinKind::Welcome) => {
            info!(match_id, robot = %hello.name, "robot joined");
            let _ = out_tx.send(echo(&format!("Welcome, {}", hello.name))).await;
        }
        Ok(JoinKind::WelcomeBack) => {
            info!(match_id, robot = %hello.name, "robot reconnected");
            let _ = out_tx.send(echo(&format!("Welcome back, {}", hello.name))).await;
        }
        Err(e) => {
            let _ = out_tx.send(echo(&format!("Sorry {}, {}", hello.name, e))).await;
            drop(out_tx);
            let _ = writer.await;
            return;
        }
    }

    let name = hello.name.clone();
    let send_match = m.clone();
    let send_name = name.clone();
    let push_tx = out_tx.clone();
    let send_task = tokio::spawn(async move { send_robot_updates(send_match, send_name, push_tx).await });

    while let Some(msg) = stream.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => {
                warn!(match_id, robot = %name, source = %e, error = %BattleError::PeerGone, "peer connection errored");
                break;
            }
        };
        match msg {
            Message::Text(text) => match handle_command_text(&m, &name, &text).await {
                Ok(()) => {}
                Err(e @ BattleError::BadCommand(_)) => {
                    warn!(match_id, robot = %name, error = %e, "bad command received");
                    if out_tx.send(echo(&e.to_string())).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(match_id, robot = %name, error = %e, "dropping player session");
                    break;
                }
            },
            Message::Close(_) => {
                info!(match_id, robot = %name, error = %BattleError::PeerGone, "peer closed connection");
                break;
            }
            _ => {}
        }
    }

    m.mark_disconnected(&name).await;
    send_task.abort();
    drop(out_tx);
    let _ = writer.await;
    info!(match_id, robot = %name, "websocket connection closed");
}

/// Parses and enqueues an inbound command message one element at a time,
/// matching `play_handler`'s `for cmd in cmds[:remaining]` loop
/// (`runner.py:313-325`): a single object is treated as a one-element array,
/// and each element is converted and enqueued immediately rather than the
/// whole array being validated atomically, so a malformed element partway
/// through leaves the commands before it already queued.
async fn handle_command_text(m: &Arc<Match>, name: &str, text: &str) -> Result<(), BattleError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| BattleError::BadCommand(e.to_string()))?;
    if value.is_null() {
        return Ok(());
    }
    let items = match value {
        serde_json::Value::Array(items) => items,
        single => vec![single],
    };
    let remaining = m.remaining_budget().await;
    for item in items.into_iter().take(remaining) {
        let command: Command =
            serde_json::from_value(item).map_err(|e| BattleError::BadCommand(e.to_string()))?;
        m.enqueue_one(name, command).await?;
    }
    Ok(())
}

async fn send_robot_updates(m: Arc<Match>, name: String, out_tx: mpsc::Sender<Message>) {
    loop {
        m.tick_event.notified().await;
        let Some(robot) = m.robot_snapshot(&name).await else {
            let err = BattleError::SimulationInvariant(format!("robot '{name}' missing from arena"));
            warn!(robot = %name, error = %err, "dropping player session");
            break;
        };
        let Ok(text) = serde_json::to_string(&robot) else {
            break;
        };
        if out_tx.send(Message::Text(text)).await.is_err() {
            break;
        }
        if let Some(winner) = m.winner_name().await {
            let _ = out_tx.send(echo(&format!("{winner} is the winner!"))).await;
            break;
        }
        if !robot.live() {
            let _ = out_tx.send(echo(&format!("*** {name} is no longer alive!"))).await;
            break;
        }
    }
}

fn echo(message: &str) -> Message {
    Message::Text(json!({ "echo": message }).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::ResultSink;

    async fn joined_match(match_id: u32, robot: &str) -> Arc<Match> {
        let sink = ResultSink::connect("sqlite::memory:").await.unwrap();
        let m = Match::spawn(match_id, sink);
        m.join(robot, "secret").await.unwrap();
        m
    }

    #[tokio::test]
    async fn single_command_object_enqueues_one_command() {
        let m = joined_match(501, "bolt").await;
        handle_command_text(&m, "bolt", r#"{"command_type":1,"parameter":0.5}"#).await.unwrap();
    }

    #[tokio::test]
    async fn array_of_commands_enqueues_all() {
        let m = joined_match(502, "bolt").await;
        let text = r#"[{"command_type":3,"parameter":10},{"command_type":6,"parameter":0}]"#;
        handle_command_text(&m, "bolt", text).await.unwrap();
        assert_eq!(m.queued_command_count("bolt").await, 2);
    }

    #[tokio::test]
    async fn commands_before_a_malformed_element_stay_enqueued() {
        let m = joined_match(506, "bolt").await;
        let text = r#"[{"command_type":3,"parameter":10},{"command_type":99,"parameter":0}]"#;
        let err = handle_command_text(&m, "bolt", text).await.unwrap_err();
        assert!(matches!(err, BattleError::BadCommand(_)));
        assert_eq!(m.queued_command_count("bolt").await, 1);
    }

    #[tokio::test]
    async fn unknown_command_kind_is_bad_command() {
        let m = joined_match(503, "bolt").await;
        let err = handle_command_text(&m, "bolt", r#"{"command_type":99,"parameter":0}"#).await.unwrap_err();
        assert!(matches!(err, BattleError::BadCommand(_)));
    }

    #[tokio::test]
    async fn non_numeric_parameter_is_bad_command() {
        let m = joined_match(504, "bolt").await;
        let err = handle_command_text(&m, "bolt", r#"{"command_type":1,"parameter":"fast"}"#).await.unwrap_err();
        assert!(matches!(err, BattleError::BadCommand(_)));
    }

    #[tokio::test]
    async fn null_message_is_ignored() {
        let m = joined_match(505, "bolt").await;
        handle_command_text(&m, "bolt", "null").await.unwrap();
    }
}
