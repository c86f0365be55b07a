//! Synthetic driving scenarios.
//!
//! Each scenario seeds an [`Oracle`] with an ego motion and a cast of
//! actors, then records it. The same (scenario, seed, samples) triple
//! always yields the same scene.

use crate::error::SimError;
use crate::oracle::{Actor, Oracle, KEYFRAME_INTERVAL};
use nalgebra::Vector3;
use nuviz_env::RecordedScene;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::f64::consts::PI;

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScenarioId {
    /// Ego cruising down a straight road with lead and oncoming traffic
    StraightDrive,

    /// Ego turning left across an intersection with cross traffic
    IntersectionTurn,

    /// Straight drive where radars and cameras randomly drop readings
    SensorDropout,

    /// Forty actors on a four-lane road
    DenseTraffic,

    /// Pedestrians stepping in and out of view, no annotated velocities
    PedestrianCrossing,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::StraightDrive,
            ScenarioId::IntersectionTurn,
            ScenarioId::SensorDropout,
            ScenarioId::DenseTraffic,
            ScenarioId::PedestrianCrossing,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::StraightDrive => "straight_drive",
            ScenarioId::IntersectionTurn => "intersection_turn",
            ScenarioId::SensorDropout => "sensor_dropout",
            ScenarioId::DenseTraffic => "dense_traffic",
            ScenarioId::PedestrianCrossing => "pedestrian_crossing",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::StraightDrive => "8 m/s straight road, lead car, oncoming car, parked truck",
            ScenarioId::IntersectionTurn => "Left turn at 0.2 rad/s through crossing traffic",
            ScenarioId::SensorDropout => "Straight drive with 35% radar/camera dropout",
            ScenarioId::DenseTraffic => "40 actors over four lanes, parked and moving",
            ScenarioId::PedestrianCrossing => "Pedestrians appearing and vanishing at a crosswalk",
        }
    }

    /// Seed for this scenario's oracle, decorrelated from other scenarios.
    fn oracle_seed(&self, seed: u64) -> u64 {
        let salt = Self::all().iter().position(|s| s == self).unwrap_or(0) as u64;
        seed.wrapping_mul(0x9e3779b97f4a7c15)
            .wrapping_add(salt.wrapping_mul(0x517cc1b727220a95))
    }

    /// Generates the scene for `seed` with `samples` keyframes.
    ///
    /// # Arguments
    /// * `seed` - Master seed; the scene name embeds it
    /// * `samples` - Number of keyframes (2 Hz)
    pub fn generate(&self, seed: u64, samples: usize) -> Result<RecordedScene, SimError> {
        let oracle = Oracle::new(self.oracle_seed(seed))?;
        let mut oracle = match self {
            ScenarioId::StraightDrive => straight_road(oracle.with_ego_motion(8.0, 0.0)),
            ScenarioId::IntersectionTurn => intersection(oracle.with_ego_motion(5.0, 0.2)),
            ScenarioId::SensorDropout => {
                straight_road(oracle.with_ego_motion(8.0, 0.0).with_dropout(0.35))
            }
            ScenarioId::DenseTraffic => dense_traffic(oracle.with_ego_motion(6.0, 0.0), seed),
            ScenarioId::PedestrianCrossing => crosswalk(
                oracle
                    .with_ego_motion(3.0, 0.0)
                    .with_annotated_velocity(false),
            ),
        };

        let name = format!("{}-{}", self.name(), seed);
        let mut scene = oracle.record(&name, samples)?;
        scene.description = self.description().to_string();
        Ok(scene)
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "straight_drive" | "straightdrive" | "straight" => Ok(ScenarioId::StraightDrive),
            "intersection_turn" | "intersectionturn" | "turn" => Ok(ScenarioId::IntersectionTurn),
            "sensor_dropout" | "sensordropout" | "dropout" => Ok(ScenarioId::SensorDropout),
            "dense_traffic" | "densetraffic" | "dense" => Ok(ScenarioId::DenseTraffic),
            "pedestrian_crossing" | "pedestriancrossing" | "crosswalk" => {
                Ok(ScenarioId::PedestrianCrossing)
            }
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

/// Number of 2 Hz keyframes covering `duration` seconds (at least one).
pub fn samples_for(duration: f64) -> usize {
    if !duration.is_finite() || duration <= 0.0 {
        return 1;
    }
    (duration / KEYFRAME_INTERVAL).round() as usize + 1
}

/// Box extent [width, length, height] for a category.
pub fn typical_size(category: &str) -> [f64; 3] {
    match category {
        "vehicle.car" => [1.9, 4.6, 1.7],
        "vehicle.truck" => [2.5, 7.5, 3.0],
        "vehicle.bus.rigid" => [2.9, 11.0, 3.4],
        "vehicle.bicycle" => [0.6, 1.7, 1.3],
        "vehicle.motorcycle" => [0.8, 2.1, 1.5],
        "movable_object.trafficcone" => [0.4, 0.4, 1.0],
        "movable_object.barrier" => [2.5, 0.5, 1.0],
        c if c.starts_with("human.pedestrian") => [0.7, 0.7, 1.75],
        _ => [1.0, 1.0, 1.0],
    }
}

fn actor(category: &str, x: f64, y: f64) -> Actor {
    let size = typical_size(category);
    Actor::new(category, Vector3::new(x, y, size[2] / 2.0), size)
}

// ============================================================================
// LAYOUTS
// ============================================================================

fn straight_road(mut oracle: Oracle) -> Oracle {
    oracle.spawn(actor("vehicle.car", 20.0, 0.0).with_velocity(Vector3::new(8.5, 0.0, 0.0)));
    oracle.spawn(actor("vehicle.car", 70.0, -3.5).with_velocity(Vector3::new(-10.0, 0.0, 0.0)));
    oracle.spawn(actor("vehicle.truck", 35.0, 4.0));
    oracle.spawn(actor("movable_object.trafficcone", 15.0, -2.2));
    oracle.spawn(actor("movable_object.barrier", 26.0, -2.6).with_yaw(PI / 2.0));
    oracle
}

fn intersection(mut oracle: Oracle) -> Oracle {
    oracle.spawn(actor("vehicle.car", 18.0, -30.0).with_velocity(Vector3::new(0.0, 7.0, 0.0)));
    oracle.spawn(actor("vehicle.car", 12.0, 35.0).with_velocity(Vector3::new(0.0, -6.0, 0.0)));
    oracle.spawn(actor("vehicle.bus.rigid", 32.0, 3.5).with_yaw(PI));
    oracle.spawn(actor("human.pedestrian.adult", 8.0, 9.0).with_velocity(Vector3::new(0.0, -1.2, 0.0)));
    oracle.spawn(actor("vehicle.bicycle", -5.0, -4.0).with_velocity(Vector3::new(4.0, 0.0, 0.0)));
    oracle
}

fn dense_traffic(mut oracle: Oracle, seed: u64) -> Oracle {
    const CATEGORIES: [&str; 6] = [
        "vehicle.car",
        "vehicle.car",
        "vehicle.car",
        "vehicle.truck",
        "vehicle.motorcycle",
        "vehicle.bus.rigid",
    ];
    const LANES: [f64; 4] = [-7.0, -3.5, 3.5, 7.0];

    let mut layout = ChaCha8Rng::seed_from_u64(seed);
    for _ in 0..40 {
        let category = CATEGORIES[layout.gen_range(0..CATEGORIES.len())];
        let lane = LANES[layout.gen_range(0..LANES.len())];
        let x = layout.gen_range(-30.0..120.0);
        let y = lane + layout.gen_range(-0.3..0.3);

        // Right-hand traffic: lanes left of the ego drive against it
        let direction = if lane > 0.0 { -1.0 } else { 1.0 };
        let speed = if layout.gen_bool(0.2) {
            0.0
        } else {
            layout.gen_range(3.0..12.0)
        };
        let yaw = if direction > 0.0 { 0.0 } else { PI };
        oracle.spawn(
            actor(category, x, y)
                .with_yaw(yaw)
                .with_velocity(Vector3::new(direction * speed, 0.0, 0.0)),
        );
    }
    oracle
}

fn crosswalk(mut oracle: Oracle) -> Oracle {
    for i in 0..8 {
        let appear = i as f64 * KEYFRAME_INTERVAL;
        let from_left = i % 2 == 0;
        let (y, vy) = if from_left { (8.0, -1.3) } else { (-8.0, 1.3) };
        oracle.spawn(
            actor("human.pedestrian.adult", 25.0 + i as f64 * 0.8, y)
                .with_velocity(Vector3::new(0.0, vy, 0.0))
                .with_window(appear, appear + 3.0),
        );
    }
    oracle.spawn(
        actor("vehicle.bicycle", 28.0, -12.0)
            .with_velocity(Vector3::new(0.0, 4.0, 0.0))
            .with_window(1.0, f64::INFINITY),
    );
    oracle
}

#[cfg(test)]
mod tests {
    use super::*;
    use nuviz_env::SceneSource;

    #[test]
    fn test_parse_names_and_aliases() {
        for scenario in ScenarioId::all() {
            assert_eq!(scenario.name().parse::<ScenarioId>().unwrap(), scenario);
            assert_eq!(scenario.to_string(), scenario.name());
        }
        assert_eq!("Dropout".parse::<ScenarioId>().unwrap(), ScenarioId::SensorDropout);
        assert!("time_warp".parse::<ScenarioId>().is_err());
    }

    #[test]
    fn test_samples_for_duration() {
        assert_eq!(samples_for(0.0), 1);
        assert_eq!(samples_for(1.0), 3);
        assert_eq!(samples_for(20.0), 41);
        assert_eq!(samples_for(f64::NAN), 1);
    }

    #[test]
    fn test_every_scenario_generates() {
        for scenario in ScenarioId::all() {
            let scene = scenario.generate(42, 4).unwrap();
            assert_eq!(scene.name, format!("{}-42", scenario.name()));
            assert_eq!(scene.samples().unwrap().len(), 4);
        }
    }

    #[test]
    fn test_scenarios_decorrelated() {
        let a = ScenarioId::StraightDrive.generate(1, 2).unwrap();
        let b = ScenarioId::SensorDropout.generate(1, 2).unwrap();
        assert_ne!(a.samples[0].token, b.samples[0].token);
    }

    #[test]
    fn test_dense_traffic_cast() {
        let scene = ScenarioId::DenseTraffic.generate(7, 1).unwrap();
        assert_eq!(scene.samples[0].annotations.len(), 40);
    }

    #[test]
    fn test_crosswalk_has_absent_and_late_objects() {
        let scene = ScenarioId::PedestrianCrossing.generate(3, 12).unwrap();
        let first = scene.samples[0].annotations.len();
        let last = &scene.samples[11].annotations;

        assert!(first < last.len());
        assert!(last.iter().any(|a| !a.is_visible()));
        assert!(last.iter().all(|a| a.velocity.is_none()));
    }
}
