//! Tunable simulation constants, carried over from the original Python
//! implementation's `GameParameters` (see SPEC_FULL.md §3).

pub const MAX_VELOCITY: f64 = 3.0;
pub const MAX_TURN_ANGLE: f64 = 15.0;
pub const MAX_TURN_RADAR_ANGLE: f64 = 180.0;
pub const MOTOR_POWER: f64 = 1.0;
pub const BULLET_VELOCITY: f64 = 15.0;
pub const FPS: u32 = 20;
pub const COMMAND_RATE: u32 = 5;
pub const MAX_DAMAGE: f64 = 5.0;
pub const WEAPON_RECHARGE_RATE: f64 = 0.1;
pub const ARENA_WIDTH: f64 = 1000.0;
pub const ARENA_HEIGHT: f64 = 1000.0;
pub const EXPLODE_FRAMES: u32 = 6;
pub const FIRING_FRAMES: u32 = 6;
pub const EXHAUST_FRAMES: u32 = 6;
pub const ROBOT_RADIUS: f64 = 20.0;
pub const ARENA_REMAINING_INITIAL: u32 = 6000;
pub const DELAY: usize = (FPS * 10) as usize;
pub const MAX_MATCH_ID: u32 = 1000;
pub const MAX_MATCH_PLAYERS: usize = 10;

pub const DEFAULT_MIN_NUM_PLAYERS: usize = 2;
pub const DEFAULT_WAIT_TIME_SECS: u64 = 10;
pub const DEMO_MATCH_ID: u32 = 0;
pub const DEMO_WAIT_TIME_SECS: u64 = 1;
