//! Robot, missile and command types (SPEC_FULL.md §4.1).

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::config::{EXPLODE_FRAMES, MAX_DAMAGE, ROBOT_RADIUS};
use crate::geometry::{normalize_angle, Position};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Robot {
    pub name: String,
    pub position: Position,
    pub velocity: f64,
    pub velocity_angle: f64,
    pub hull_angle: f64,
    pub turret_angle: f64,
    pub radar_angle: f64,
    pub health: f64,
    pub weapon_energy: f64,
    pub radius: f64,
    pub radar_ping: Option<f64>,
    pub got_hit: bool,
    pub bumped_wall: bool,
    pub firing_progress: Option<u32>,
    pub accelerate_progress: Option<u32>,
    pub cmd_q_len: Option<usize>,
}

impl Robot {
    pub fn new(name: impl Into<String>, rng: &mut impl Rng) -> Self {
        Self {
            name: name.into(),
            position: Position::random(rng),
            velocity: 0.0,
            velocity_angle: 0.0,
            hull_angle: rng.gen_range(0.0..360.0),
            turret_angle: 0.0,
            radar_angle: 0.0,
            health: 100.0,
            weapon_energy: MAX_DAMAGE,
            radius: ROBOT_RADIUS,
            radar_ping: None,
            got_hit: false,
            bumped_wall: false,
            firing_progress: None,
            accelerate_progress: None,
            cmd_q_len: None,
        }
    }

    pub fn live(&self) -> bool {
        self.health > 0.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Missile {
    pub position: Position,
    pub angle: f64,
    pub energy: f64,
    pub exploding: bool,
    pub explode_progress: u32,
}

impl Missile {
    pub fn new(position: Position, angle: f64, energy: f64) -> Self {
        Self {
            position,
            angle: normalize_angle(angle),
            energy,
            exploding: false,
            explode_progress: 0,
        }
    }

    /// False once the explosion animation has finished playing and the
    /// missile should be dropped from the arena.
    pub fn live(&self) -> bool {
        self.explode_progress < EXPLODE_FRAMES
    }
}

/// Wire ordinals are stable across the whole protocol and match the
/// original `RobotCommandType` enum member order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum CommandKind {
    Accelerate = 1,
    Fire = 2,
    TurnHull = 3,
    TurnTurret = 4,
    TurnRadar = 5,
    Idle = 6,
}

impl CommandKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CommandKind::Accelerate => "accelerate",
            CommandKind::Fire => "fire",
            CommandKind::TurnHull => "turn_hull",
            CommandKind::TurnTurret => "turn_turret",
            CommandKind::TurnRadar => "turn_radar",
            CommandKind::Idle => "idle",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub command_type: CommandKind,
    pub parameter: f64,
}

impl Command {
    pub fn idle() -> Self {
        Self {
            command_type: CommandKind::Idle,
            parameter: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn new_robot_is_alive_with_full_energy() {
        let mut rng = StdRng::seed_from_u64(1);
        let r = Robot::new("bolt", &mut rng);
        assert!(r.live());
        assert_eq!(r.weapon_energy, MAX_DAMAGE);
        assert_eq!(r.health, 100.0);
    }

    #[test]
    fn missile_expires_after_explode_frames() {
        let mut m = Missile::new(Position::new(0.0, 0.0), 0.0, 1.0);
        assert!(m.live());
        m.exploding = true;
        m.explode_progress = EXPLODE_FRAMES;
        assert!(!m.live());
    }
}
