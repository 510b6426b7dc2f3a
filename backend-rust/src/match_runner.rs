//! A single running match: waiting room, tick loop and command-tick cadence
//! (SPEC_FULL.md §4.4), grounded on the original `Match` dataclass and its
//! `runner_task`, adapted to the tick-based state-machine idiom the teacher
//! used for its own procedure engine.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::{Mutex, Notify, RwLock};
use tracing::{info, warn};

use crate::arena::Arena;
use crate::config::{
    COMMAND_RATE, DEFAULT_MIN_NUM_PLAYERS, DEFAULT_WAIT_TIME_SECS, DEMO_MATCH_ID,
    DEMO_WAIT_TIME_SECS, FPS, MAX_MATCH_PLAYERS,
};
use crate::demo_bots;
use crate::entities::{Command, CommandKind, Robot};
use crate::error::BattleError;
use crate::persistence::ResultSink;

pub enum JoinKind {
    Welcome,
    WelcomeBack,
}

pub struct Match {
    pub match_id: u32,
    pub min_num_players: usize,
    pub wait_time: Duration,
    pub allow_late_entrants: bool,

    started: AtomicBool,
    finished: AtomicBool,

    arena: RwLock<Arena>,
    delay_line: RwLock<Vec<Arena>>,
    command_queues: Mutex<HashMap<String, VecDeque<Command>>>,
    player_secrets: Mutex<HashMap<String, String>>,
    player_connected: Mutex<HashMap<String, bool>>,
    command_tally: Mutex<HashMap<String, HashMap<&'static str, i64>>>,
    result_sink: ResultSink,

    /// Fires once per command tick; mirrors the original `asyncio.Event`
    /// set()/clear() pair via `notify_waiters`.
    pub tick_event: Notify,
}

impl Match {
    /// Creates and starts a new match, spawning its tick-loop task (and, for
    /// the standing demo arena, a handful of scripted opponents).
    pub fn spawn(match_id: u32, result_sink: ResultSink) -> Arc<Match> {
        let is_demo = match_id == DEMO_MATCH_ID;
        let m = Arc::new(Match {
            match_id,
            min_num_players: DEFAULT_MIN_NUM_PLAYERS,
            wait_time: Duration::from_secs(if is_demo { DEMO_WAIT_TIME_SECS } else { DEFAULT_WAIT_TIME_SECS }),
            allow_late_entrants: is_demo,
            started: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            arena: RwLock::new(Arena::new()),
            delay_line: RwLock::new(Vec::new()),
            command_queues: Mutex::new(HashMap::new()),
            player_secrets: Mutex::new(HashMap::new()),
            player_connected: Mutex::new(HashMap::new()),
            command_tally: Mutex::new(HashMap::new()),
            result_sink,
            tick_event: Notify::new(),
        });

        tokio::spawn(run(m.clone()));
        if is_demo {
            tokio::spawn(demo_bots::run_demo_roster(m.clone()));
        }
        m
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub async fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    pub async fn num_live_players(&self) -> usize {
        self.arena.read().await.robots.iter().filter(|r| r.live()).count()
    }

    /// Validates and applies a join/rejoin request, matching the handshake
    /// rules from the original `play_handler`.
    pub async fn join(&self, name: &str, secret: &str) -> Result<JoinKind, BattleError> {
        let mut secrets = self.player_secrets.lock().await;
        let mut connected = self.player_connected.lock().await;

        if secrets.get(name).map(String::as_str) == Some(secret) && !connected.get(name).copied().unwrap_or(false) {
            connected.insert(name.to_string(), true);
            return Ok(JoinKind::WelcomeBack);
        }

        if self.is_started() && !self.allow_late_entrants {
            return Err(BattleError::LateEntrantsDisallowed);
        }

        let mut arena = self.arena.write().await;
        if arena.robots.iter().any(|r| r.name == name) {
            return Err(BattleError::AlreadyJoined(name.to_string()));
        }

        let num_alive = arena.robots.iter().filter(|r| r.live()).count();
        if num_alive >= MAX_MATCH_PLAYERS {
            return Err(BattleError::MatchFull);
        }

        if arena.robots.len() != num_alive {
            let mut queues = self.command_queues.lock().await;
            arena.robots.retain(|r| {
                if !r.live() {
                    info!(match_id = self.match_id, robot = %r.name, "dropping dead robot to make room");
                    queues.remove(&r.name);
                    false
                } else {
                    true
                }
            });
        }

        let mut rng = StdRng::from_entropy();
        arena.robots.push(Robot::new(name, &mut rng));
        drop(arena);

        self.command_queues.lock().await.insert(name.to_string(), VecDeque::new());
        secrets.insert(name.to_string(), secret.to_string());
        connected.insert(name.to_string(), true);
        Ok(JoinKind::Welcome)
    }

    pub async fn mark_disconnected(&self, name: &str) {
        self.player_connected.lock().await.insert(name.to_string(), false);
    }

    /// Number of sub-ticks left in the current command period, the same cap
    /// the original applies as `cmds[:match.arena.remaining]` before walking
    /// an inbound command array.
    pub async fn remaining_budget(&self) -> usize {
        self.arena.read().await.remaining.max(0) as usize
    }

    /// Enqueues commands for a robot, capped to the number of sub-ticks
    /// remaining in the match, mirroring `cmds[:match.arena.remaining]`.
    pub async fn enqueue_commands(&self, name: &str, commands: Vec<Command>) -> Result<(), BattleError> {
        let remaining = self.remaining_budget().await;
        let mut queues = self.command_queues.lock().await;
        let Some(queue) = queues.get_mut(name) else {
            return Err(BattleError::SimulationInvariant(format!(
                "command queue missing for robot '{name}'"
            )));
        };
        for cmd in commands.into_iter().take(remaining) {
            queue.push_back(cmd);
        }
        Ok(())
    }

    /// Enqueues a single already-capped command. Used by the player
    /// command-intake loop, which computes `remaining_budget` once per
    /// inbound message and enqueues parsed elements one at a time so a
    /// malformed element later in the array doesn't roll back ones already
    /// accepted (`runner.py`'s `for cmd in cmds[:remaining]` builds and
    /// appends each `RobotCommand` individually inside the loop body).
    pub async fn enqueue_one(&self, name: &str, command: Command) -> Result<(), BattleError> {
        let mut queues = self.command_queues.lock().await;
        let Some(queue) = queues.get_mut(name) else {
            return Err(BattleError::SimulationInvariant(format!(
                "command queue missing for robot '{name}'"
            )));
        };
        queue.push_back(command);
        Ok(())
    }

    /// Number of commands currently queued for a robot. Used by the session
    /// layer's command-intake tests to check partial-apply-then-stop
    /// behavior without reaching into the queue map directly.
    pub async fn queued_command_count(&self, name: &str) -> usize {
        self.command_queues.lock().await.get(name).map_or(0, VecDeque::len)
    }

    pub async fn robot_snapshot(&self, name: &str) -> Option<Robot> {
        self.arena.read().await.get_robot(name).cloned()
    }

    pub async fn winner_name(&self) -> Option<String> {
        self.arena.read().await.winner.clone()
    }

    pub async fn delay_line_len(&self) -> usize {
        self.delay_line.read().await.len()
    }

    pub async fn delay_line_at(&self, idx: usize) -> Option<Arena> {
        self.delay_line.read().await.get(idx).cloned()
    }
}

/// Drives a match from waiting room through to a declared winner. Runs for
/// the lifetime of the match as its own task.
async fn run(m: Arc<Match>) {
    info!(match_id = m.match_id, min = m.min_num_players, "waiting for players");
    loop {
        if m.num_live_players().await >= m.min_num_players {
            break;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    info!(match_id = m.match_id, wait_secs = m.wait_time.as_secs(), "players joined, starting soon");
    tokio::time::sleep(m.wait_time).await;

    let starting_roster: Vec<String> = {
        let arena = m.arena.read().await;
        arena.robots.iter().map(|r| r.name.clone()).collect()
    };
    info!(match_id = m.match_id, robots = starting_roster.join(", "), "battle starting");
    m.started.store(true, Ordering::Release);

    let mut standing_orders: HashMap<String, Command> = HashMap::new();
    let mut rng = StdRng::from_entropy();

    loop {
        {
            let arena = m.arena.read().await;
            if arena.get_winner().is_some() || arena.remaining <= 0 {
                break;
            }
        }

        let is_command_tick = {
            let mut arena = m.arena.write().await;
            arena.remaining -= 1;
            arena.remaining % COMMAND_RATE as i64 == 0
        };

        if is_command_tick {
            let roster: Vec<String> = {
                let arena = m.arena.read().await;
                arena.robots.iter().map(|r| r.name.clone()).collect()
            };
            standing_orders = roster.iter().map(|n| (n.clone(), Command::idle())).collect();

            {
                let mut arena = m.arena.write().await;
                let queues = m.command_queues.lock().await;
                for robot in arena.robots.iter_mut() {
                    robot.cmd_q_len = queues.get(&robot.name).map(VecDeque::len);
                }
            }

            m.tick_event.notify_waiters();
            tokio::time::sleep(Duration::from_secs_f64(COMMAND_RATE as f64 / FPS as f64)).await;

            {
                let mut queues = m.command_queues.lock().await;
                let mut tally = m.command_tally.lock().await;
                for name in &roster {
                    let next = queues.get_mut(name).and_then(VecDeque::pop_front).unwrap_or_else(Command::idle);
                    if next.command_type != CommandKind::Idle {
                        *tally.entry(name.clone()).or_default().entry(next.command_type.as_str()).or_insert(0) += 1;
                    }
                    standing_orders.insert(name.clone(), next);
                }
            }

            {
                let mut arena = m.arena.write().await;
                arena.reset_flags();
                arena.update_commands(&standing_orders, &mut rng);
            }
            for command in standing_orders.values_mut() {
                if command.command_type == CommandKind::Fire {
                    command.command_type = CommandKind::Idle;
                }
            }
        } else {
            let mut arena = m.arena.write().await;
            arena.update_commands(&standing_orders, &mut rng);
        }

        let mut arena = m.arena.write().await;
        arena.update_arena();
        let snapshot = arena.clone();
        drop(arena);
        m.delay_line.write().await.push(snapshot);
    }

    let mut arena = m.arena.write().await;
    let winner_name = arena
        .get_winner()
        .map(|r| r.name.clone())
        .or_else(|| arena.robots.iter().max_by(|a, b| a.health.total_cmp(&b.health)).map(|r| r.name.clone()));
    arena.winner = winner_name.clone();
    let snapshot = arena.clone();
    drop(arena);
    m.delay_line.write().await.push(snapshot);
    m.finished.store(true, Ordering::Release);
    m.tick_event.notify_waiters();

    match &winner_name {
        Some(name) => info!(match_id = m.match_id, winner = %name, "match finished"),
        None => warn!(match_id = m.match_id, "match finished with no winner"),
    }

    if let Some(name) = winner_name {
        match m.result_sink.record_match_outcome(m.match_id, chrono::Utc::now(), &name).await {
            Ok(row_id) => {
                let tally = m.command_tally.lock().await;
                for (robot, counts) in tally.iter() {
                    for (command, total) in counts.iter() {
                        if let Err(e) = m.result_sink.record_command_tally(row_id, robot, command, *total).await {
                            warn!(match_id = m.match_id, error = %e, "failed to record command tally");
                        }
                    }
                }
            }
            Err(e) => warn!(match_id = m.match_id, error = %e, "failed to record match outcome"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::ResultSink;

    /// A `Match` with no background tick-loop/demo-bot tasks running, for
    /// exercising the join/enqueue bookkeeping directly and deterministically.
    async fn bare_match(match_id: u32) -> Match {
        let result_sink = ResultSink::connect("sqlite::memory:").await.unwrap();
        Match {
            match_id,
            min_num_players: DEFAULT_MIN_NUM_PLAYERS,
            wait_time: Duration::from_secs(DEFAULT_WAIT_TIME_SECS),
            allow_late_entrants: false,
            started: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            arena: RwLock::new(Arena::new()),
            delay_line: RwLock::new(Vec::new()),
            command_queues: Mutex::new(HashMap::new()),
            player_secrets: Mutex::new(HashMap::new()),
            player_connected: Mutex::new(HashMap::new()),
            command_tally: Mutex::new(HashMap::new()),
            result_sink,
            tick_event: Notify::new(),
        }
    }

    #[tokio::test]
    async fn reconnect_with_matching_secret_preserves_identity() {
        let m = bare_match(7).await;
        assert!(matches!(m.join("bolt", "s3cr3t").await.unwrap(), JoinKind::Welcome));
        m.mark_disconnected("bolt").await;

        // A rejoin attempt with the wrong secret while disconnected falls
        // through to the ordinary join path and is rejected as a name
        // collision rather than silently becoming a new robot.
        assert!(matches!(m.join("bolt", "wrong").await, Err(BattleError::AlreadyJoined(_))));

        assert!(matches!(m.join("bolt", "s3cr3t").await.unwrap(), JoinKind::WelcomeBack));
        assert_eq!(m.arena.read().await.robots.len(), 1);
    }

    #[tokio::test]
    async fn join_refuses_duplicate_name() {
        let m = bare_match(7).await;
        m.join("bolt", "s1").await.unwrap();
        assert!(matches!(m.join("bolt", "s2").await, Err(BattleError::AlreadyJoined(_))));
    }

    #[tokio::test]
    async fn join_refuses_after_start_without_late_entrants() {
        let m = bare_match(7).await;
        m.started.store(true, Ordering::Release);
        assert!(matches!(m.join("bolt", "s1").await, Err(BattleError::LateEntrantsDisallowed)));
    }

    #[tokio::test]
    async fn enqueue_commands_caps_at_remaining_sub_ticks() {
        let m = bare_match(7).await;
        m.join("bolt", "s1").await.unwrap();
        m.arena.write().await.remaining = 2;
        let cmds = vec![Command::idle(), Command::idle(), Command::idle(), Command::idle()];
        m.enqueue_commands("bolt", cmds).await.unwrap();
        let queues = m.command_queues.lock().await;
        assert_eq!(queues.get("bolt").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn enqueue_commands_for_unknown_robot_is_simulation_invariant() {
        let m = bare_match(7).await;
        let err = m.enqueue_commands("ghost", vec![Command::idle()]).await.unwrap_err();
        assert!(matches!(err, BattleError::SimulationInvariant(_)));
    }

    #[tokio::test]
    async fn enqueue_one_for_unknown_robot_is_simulation_invariant() {
        let m = bare_match(7).await;
        let err = m.enqueue_one("ghost", Command::idle()).await.unwrap_err();
        assert!(matches!(err, BattleError::SimulationInvariant(_)));
    }

    #[tokio::test]
    async fn dead_robots_are_evicted_to_free_a_slot() {
        let m = bare_match(7).await;
        m.join("stale", "s1").await.unwrap();
        m.arena.write().await.robots[0].health = 0.0;
        m.join("fresh", "s2").await.unwrap();

        let arena = m.arena.read().await;
        assert_eq!(arena.robots.len(), 1);
        assert_eq!(arena.robots[0].name, "fresh");
        drop(arena);
        assert!(!m.command_queues.lock().await.contains_key("stale"));
    }
}
