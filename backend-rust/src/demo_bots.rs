//! Scripted opponents for the standing demo arena (match id 0), grounded on
//! the original `PongDriver`/`RadarDriver`/`StillDriver` example players.
//! Unlike the original, which drove these over a loopback WebSocket
//! connection, these run in-process against the match directly — there is
//! no separate player process to connect back to itself.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::entities::{Command, CommandKind, Robot};
use crate::match_runner::Match;

pub async fn run_demo_roster(m: Arc<Match>) {
    let roster: Vec<(&str, fn(&mut BotState, &Robot) -> Vec<Command>)> = vec![
        ("pongbot", pong_next),
        ("radarbot", radar_next),
        ("stillbot", still_next),
    ];
    for (name, driver) in roster {
        tokio::spawn(run_bot(m.clone(), name.to_string(), driver));
    }
}

#[derive(Default)]
pub struct BotState {
    turret_dir: f64,
    radar_pinged_last_time: bool,
    pinged: bool,
}

async fn run_bot(m: Arc<Match>, name: String, driver: fn(&mut BotState, &Robot) -> Vec<Command>) {
    let secret = Uuid::new_v4().to_string();
    if let Err(e) = m.join(&name, &secret).await {
        tracing::warn!(robot = %name, error = %e, "demo bot failed to join");
        return;
    }

    let mut state = BotState { turret_dir: 90.0, ..Default::default() };
    loop {
        m.tick_event.notified().await;
        if m.winner_name().await.is_some() {
            break;
        }
        let Some(robot) = m.robot_snapshot(&name).await else {
            break;
        };
        if !robot.live() {
            break;
        }
        if robot.cmd_q_len.unwrap_or(0) > 0 {
            continue;
        }
        let commands = driver(&mut state, &robot);
        if m.enqueue_commands(&name, commands).await.is_err() {
            break;
        }
        // yield so we don't spin if notify_waiters fires faster than expected
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

fn pong_next(_state: &mut BotState, r: &Robot) -> Vec<Command> {
    if r.bumped_wall || r.got_hit {
        return vec![
            Command { command_type: CommandKind::TurnHull, parameter: -45.0 },
            Command { command_type: CommandKind::TurnTurret, parameter: 45.0 },
            Command { command_type: CommandKind::Accelerate, parameter: 0.0 },
            Command { command_type: CommandKind::Accelerate, parameter: 0.0 },
            Command { command_type: CommandKind::Accelerate, parameter: 0.0 },
        ];
    }
    let heading_drift = ((r.velocity_angle - r.hull_angle + 180.0).rem_euclid(360.0) - 180.0).abs();
    if heading_drift > 1.0 || r.velocity == 0.0 {
        return vec![
            Command { command_type: CommandKind::Accelerate, parameter: 0.0 },
            Command { command_type: CommandKind::Accelerate, parameter: 0.0 },
            Command { command_type: CommandKind::Accelerate, parameter: 0.0 },
            Command { command_type: CommandKind::Accelerate, parameter: 0.0 },
        ];
    }
    if r.radar_ping.is_some() {
        return vec![Command { command_type: CommandKind::Fire, parameter: 100.0 }];
    }
    vec![Command { command_type: CommandKind::TurnTurret, parameter: 2.0 }]
}

fn radar_next(state: &mut BotState, r: &Robot) -> Vec<Command> {
    if r.radar_ping.is_some() {
        if r.weapon_energy >= 3.0 && state.turret_dir.abs() < 5.0 {
            return vec![Command { command_type: CommandKind::Fire, parameter: 100.0 }];
        }
        state.turret_dir = -state.turret_dir / 2.0;
    } else if !state.radar_pinged_last_time {
        state.turret_dir = -state.turret_dir * 2.0;
    }
    state.radar_pinged_last_time = r.radar_ping.is_some();
    state.turret_dir = state.turret_dir.clamp(-15.0, 90.0);
    vec![Command { command_type: CommandKind::TurnTurret, parameter: state.turret_dir }]
}

fn still_next(state: &mut BotState, r: &Robot) -> Vec<Command> {
    if r.radar_ping.is_some() || state.pinged {
        state.pinged = true;
        return vec![Command { command_type: CommandKind::Fire, parameter: 100.0 }];
    }
    vec![Command { command_type: CommandKind::TurnTurret, parameter: 5.0 }]
}
