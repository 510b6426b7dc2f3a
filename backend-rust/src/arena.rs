//! The simulated battle arena: robot/missile physics, collisions and radar
//! sweeps (SPEC_FULL.md §4.3), grounded on the original `Arena.update_*`
//! methods.

use std::collections::HashMap;
use std::f64::consts::PI;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::{
    ARENA_REMAINING_INITIAL, BULLET_VELOCITY, COMMAND_RATE, EXHAUST_FRAMES, EXPLODE_FRAMES,
    FIRING_FRAMES, MAX_DAMAGE, MAX_TURN_ANGLE, MAX_TURN_RADAR_ANGLE, MAX_VELOCITY, MOTOR_POWER,
    WEAPON_RECHARGE_RATE,
};
use crate::entities::{Command, CommandKind, Missile, Robot};
use crate::geometry::{normalize_angle, Position};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Arena {
    pub robots: Vec<Robot>,
    pub missiles: Vec<Missile>,
    pub winner: Option<String>,
    pub remaining: i64,

    #[serde(skip)]
    prior_radar_angle: HashMap<String, f64>,
}

impl Default for Arena {
    fn default() -> Self {
        Self {
            robots: Vec::new(),
            missiles: Vec::new(),
            winner: None,
            remaining: ARENA_REMAINING_INITIAL as i64,
            prior_radar_angle: HashMap::new(),
        }
    }
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_robot(&self, name: &str) -> Option<&Robot> {
        self.robots.iter().find(|r| r.name == name)
    }

    /// Applies one queued command to a robot, mutating arena state (new
    /// missiles) as a side effect.
    pub fn update_robot_command(&mut self, robot_name: &str, command: &Command, rng: &mut impl Rng) {
        let Some(idx) = self.robots.iter().position(|r| r.name == robot_name) else {
            return;
        };
        match command.command_type {
            CommandKind::Accelerate => {
                let robot = &mut self.robots[idx];
                let vx = robot.velocity * (robot.velocity_angle / 180.0 * PI).cos();
                let vy = robot.velocity * (robot.velocity_angle / 180.0 * PI).sin();
                let dx = MOTOR_POWER / COMMAND_RATE as f64 * (robot.hull_angle / 180.0 * PI).cos();
                let dy = MOTOR_POWER / COMMAND_RATE as f64 * (robot.hull_angle / 180.0 * PI).sin();
                robot.velocity = ((vx + dx).powi(2) + (vy + dy).powi(2)).sqrt();
                robot.velocity_angle = (vy + dy).atan2(vx + dx) / PI * 180.0;
                robot.velocity = robot.velocity.min(MAX_VELOCITY);
                if robot.accelerate_progress.is_none() {
                    robot.accelerate_progress = Some(0);
                }
            }
            CommandKind::Fire => {
                let robot = &self.robots[idx];
                let energy_noise = (rng.gen::<f64>() * 2.0 - 1.0) * WEAPON_RECHARGE_RATE;
                let requested_energy = command.parameter.clamp(0.0, MAX_DAMAGE);
                let energy = (robot.weapon_energy.min(requested_energy) + energy_noise).max(0.0);
                let angle = normalize_angle(robot.hull_angle + robot.turret_angle);
                let mut start_position = robot.position;
                start_position.x += 1.01 * robot.radius * (angle / 180.0 * PI).cos();
                start_position.y += 1.01 * robot.radius * (angle / 180.0 * PI).sin();

                let robot = &mut self.robots[idx];
                robot.weapon_energy = (robot.weapon_energy - energy).max(0.0);
                if robot.firing_progress.is_none() {
                    robot.firing_progress = Some(0);
                }

                self.missiles.push(Missile::new(start_position, angle, energy));
            }
            CommandKind::TurnHull => {
                let robot = &mut self.robots[idx];
                robot.hull_angle += (command.parameter / COMMAND_RATE as f64).clamp(-MAX_TURN_ANGLE, MAX_TURN_ANGLE);
                robot.hull_angle = normalize_angle(robot.hull_angle);
                if robot.accelerate_progress.is_none() {
                    robot.accelerate_progress = Some(0);
                }
            }
            CommandKind::TurnTurret => {
                let robot = &mut self.robots[idx];
                robot.turret_angle += command.parameter / COMMAND_RATE as f64;
                robot.turret_angle = normalize_angle(robot.turret_angle);
            }
            CommandKind::TurnRadar => {
                let robot = &mut self.robots[idx];
                robot.radar_angle += (command.parameter / COMMAND_RATE as f64)
                    .clamp(-MAX_TURN_RADAR_ANGLE, MAX_TURN_RADAR_ANGLE);
                robot.radar_angle = normalize_angle(robot.radar_angle);
            }
            CommandKind::Idle => {}
        }
    }

    pub fn update_robot_state(robot: &mut Robot) {
        robot.position.x += (robot.velocity / COMMAND_RATE as f64) * (robot.velocity_angle / 180.0 * PI).cos();
        robot.position.y += (robot.velocity / COMMAND_RATE as f64) * (robot.velocity_angle / 180.0 * PI).sin();
        if robot.position.clip(robot.radius) {
            robot.bumped_wall = true;
        }

        robot.weapon_energy += WEAPON_RECHARGE_RATE / COMMAND_RATE as f64;
        robot.weapon_energy = robot.weapon_energy.min(MAX_DAMAGE);

        if let Some(p) = robot.firing_progress.as_mut() {
            *p += 1;
            if *p >= FIRING_FRAMES {
                robot.firing_progress = None;
            }
        }

        if let Some(p) = robot.accelerate_progress.as_mut() {
            *p += 1;
            if *p >= EXHAUST_FRAMES {
                robot.accelerate_progress = None;
            }
        }
    }

    pub fn update_missile(missile: &mut Missile) {
        if missile.exploding {
            missile.explode_progress += 1;
        } else {
            let v = BULLET_VELOCITY / COMMAND_RATE as f64;
            missile.position.x += v * (missile.angle / 180.0 * PI).cos();
            missile.position.y += v * (missile.angle / 180.0 * PI).sin();
            missile.position.clip(0.0);
        }
    }

    pub fn reset_flags(&mut self) {
        for robot in self.robots.iter_mut() {
            if !robot.live() {
                continue;
            }
            robot.got_hit = false;
            robot.radar_ping = None;
            robot.bumped_wall = false;
        }
    }

    /// Radar detects the nearest robot crossing the sweep arc since the
    /// previous tick, using a signed-angle-frame crossing test.
    pub fn update_radars(&mut self) {
        let snapshot: Vec<(String, Position, f64)> = self
            .robots
            .iter()
            .filter(|r| r.live())
            .map(|r| (r.name.clone(), r.position, r.hull_angle + r.turret_angle + r.radar_angle))
            .collect();

        for robot in self.robots.iter_mut() {
            if !robot.live() {
                continue;
            }
            let base_angle = *self.prior_radar_angle.get(&robot.name).unwrap_or(&0.0);
            for (target_name, target_position, _) in &snapshot {
                if *target_name == robot.name {
                    continue;
                }
                let delta = *target_position - robot.position;
                let target_angle = normalize_angle_signed(delta.angle() - base_angle);
                let now_angle =
                    normalize_angle_signed(robot.hull_angle + robot.turret_angle + robot.radar_angle - base_angle);
                let crossed = (now_angle > 0.0 && target_angle > 0.0 && now_angle > target_angle)
                    || (now_angle < 0.0 && target_angle < 0.0 && now_angle < target_angle);
                if crossed {
                    robot.radar_ping = Some(delta.magnitude());
                    break;
                }
            }
            self.prior_radar_angle.insert(
                robot.name.clone(),
                robot.hull_angle + robot.turret_angle + robot.radar_angle,
            );
        }
    }

    pub fn update_commands(&mut self, commands: &HashMap<String, Command>, rng: &mut impl Rng) {
        let names: Vec<String> = self.robots.iter().filter(|r| r.live()).map(|r| r.name.clone()).collect();
        for name in names {
            let command = commands.get(&name).cloned().unwrap_or_else(Command::idle);
            self.update_robot_command(&name, &command, rng);
        }
    }

    /// Advances the whole arena by one sub-tick: robot motion, missile
    /// ballistics, collision resolution and radar pings.
    pub fn update_arena(&mut self) {
        for robot in self.robots.iter_mut() {
            if !robot.live() {
                robot.velocity = 0.0;
                continue;
            }
            Self::update_robot_state(robot);
        }

        for missile in self.missiles.iter_mut() {
            Self::update_missile(missile);
        }

        for missile in self.missiles.iter_mut() {
            for robot in self.robots.iter_mut() {
                if !robot.live() {
                    continue;
                }
                if (robot.position - missile.position).magnitude() < robot.radius {
                    if !missile.exploding {
                        robot.health -= missile.energy;
                        missile.exploding = true;
                        robot.got_hit = true;
                        break;
                    }
                }
            }
            if missile.position.outside_arena() {
                missile.exploding = true;
                missile.explode_progress = EXPLODE_FRAMES;
            }
        }

        self.missiles.retain(|m| m.live());

        self.update_radars();
    }

    /// Returns the winning robot, if the match has a clear outcome: a sole
    /// survivor, or (if every robot died) the one with the highest health.
    pub fn get_winner(&self) -> Option<&Robot> {
        if self.robots.len() <= 1 {
            return None;
        }
        let remaining: Vec<&Robot> = self.robots.iter().filter(|r| r.live()).collect();
        if remaining.len() == 1 {
            return Some(remaining[0]);
        }
        if remaining.is_empty() {
            return self.robots.iter().max_by(|a, b| a.health.total_cmp(&b.health));
        }
        None
    }
}

fn normalize_angle_signed(angle: f64) -> f64 {
    ((angle + 180.0).rem_euclid(360.0)) - 180.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn seeded() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn accelerate_caps_at_max_velocity() {
        let mut arena = Arena::new();
        let mut rng = seeded();
        let mut robot = Robot::new("bolt", &mut rng);
        robot.hull_angle = 0.0;
        arena.robots.push(robot);
        let cmd = Command { command_type: CommandKind::Accelerate, parameter: 0.0 };
        for _ in 0..50 {
            arena.update_robot_command("bolt", &cmd, &mut rng);
        }
        assert!(arena.get_robot("bolt").unwrap().velocity <= MAX_VELOCITY + 1e-9);
    }

    #[test]
    fn wall_bump_sets_flag_and_clips_position() {
        let mut arena = Arena::new();
        let mut rng = seeded();
        let mut robot = Robot::new("bolt", &mut rng);
        robot.position = Position::new(2.0, 500.0);
        robot.velocity = MAX_VELOCITY;
        robot.velocity_angle = 180.0;
        arena.robots.push(robot);
        Arena::update_robot_state(&mut arena.robots[0]);
        assert!(arena.robots[0].bumped_wall);
        assert!(arena.robots[0].position.x >= arena.robots[0].radius);
    }

    #[test]
    fn fire_depletes_weapon_energy_and_spawns_missile() {
        let mut arena = Arena::new();
        let mut rng = seeded();
        arena.robots.push(Robot::new("bolt", &mut rng));
        let cmd = Command { command_type: CommandKind::Fire, parameter: MAX_DAMAGE };
        arena.update_robot_command("bolt", &cmd, &mut rng);
        assert_eq!(arena.missiles.len(), 1);
        assert!(arena.get_robot("bolt").unwrap().weapon_energy < MAX_DAMAGE);
    }

    #[test]
    fn missile_hit_drains_robot_health() {
        let mut arena = Arena::new();
        let mut rng = seeded();
        let mut robot = Robot::new("bolt", &mut rng);
        robot.position = Position::new(500.0, 500.0);
        arena.robots.push(robot);
        arena.missiles.push(Missile::new(Position::new(500.0, 500.0), 0.0, 10.0));
        arena.update_arena();
        assert_eq!(arena.get_robot("bolt").unwrap().health, 90.0);
        assert!(arena.get_robot("bolt").unwrap().got_hit);
    }

    #[test]
    fn winner_is_sole_survivor() {
        let mut arena = Arena::new();
        let mut rng = seeded();
        let mut a = Robot::new("a", &mut rng);
        let mut b = Robot::new("b", &mut rng);
        b.health = 0.0;
        a.position = Position::new(10.0, 10.0);
        b.position = Position::new(900.0, 900.0);
        arena.robots.push(a);
        arena.robots.push(b);
        assert_eq!(arena.get_winner().unwrap().name, "a");
    }

    #[test]
    fn no_winner_with_single_robot() {
        let mut arena = Arena::new();
        let mut rng = seeded();
        arena.robots.push(Robot::new("solo", &mut rng));
        assert!(arena.get_winner().is_none());
    }
}
