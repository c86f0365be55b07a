//! Ground truth oracle for synthetic scenes.
//!
//! The Oracle maintains the "God's eye view" of a small driving world:
//! - The ego vehicle (constant speed and yaw rate)
//! - Actors moving at constant velocity
//! - A nuScenes-shaped sensor rig (1 lidar, 5 radars, 6 cameras)
//!
//! `record` samples that world every [`KEYFRAME_INTERVAL`] seconds into a
//! [`RecordedScene`], with noisy sensor readings and box annotations.
//! Everything random is drawn from one seeded `ChaCha8Rng`, so a seed
//! always reproduces the same scene byte for byte.

use crate::error::SimError;
use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion, Vector3};
use nuviz_core::category::ObjectClass;
use nuviz_core::config::{CAMERA_CHANNELS, LIDAR_CHANNEL, RADAR_CHANNELS};
use nuviz_core::transform::{EgoState, SensorExtrinsic};
use nuviz_env::{
    Annotation, Calibration, ImageData, PointCloud, Pose, RawPoint, RecordedSample,
    RecordedScene, SensorData, SensorReading, Visibility,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use std::collections::BTreeMap;
use std::f64::consts::{FRAC_PI_2, PI};
use uuid::Builder;

/// Keyframe spacing in seconds (2 Hz, as in nuScenes).
pub const KEYFRAME_INTERVAL: f64 = 0.5;

/// Lidar returns beyond this distance (meters) are dropped.
pub const LIDAR_RANGE: f64 = 70.0;

/// Radar returns beyond this distance (meters) are dropped.
pub const RADAR_RANGE: f64 = 100.0;

const RADAR_HALF_FOV: f64 = PI / 3.0;
const CAMERA_HALF_FOV: f64 = 0.61;

/// Lidar returns per object at 20 m; closer objects get more.
const LIDAR_POINTS_PER_OBJECT: f64 = 48.0;

/// Ground ring radii (meters) and returns per ring.
const GROUND_RINGS: [f64; 3] = [6.0, 12.0, 24.0];
const GROUND_RING_POINTS: usize = 120;

/// Static clutter returns per radar sweep.
const RADAR_CLUTTER: usize = 2;

// ============================================================================
// WORLD STATE
// ============================================================================

/// The ego vehicle: a unicycle with constant speed and yaw rate.
#[derive(Debug, Clone)]
pub struct EgoVehicle {
    /// Position [x, y, z] in meters (global frame)
    pub position: Vector3<f64>,

    /// Heading in radians
    pub yaw: f64,

    /// Forward speed in m/s
    pub speed: f64,

    /// Turn rate in rad/s
    pub yaw_rate: f64,
}

impl EgoVehicle {
    /// The ego's global pose at `timestamp`.
    pub fn pose(&self, timestamp: f64) -> Pose {
        Pose::with_yaw(self.position.into(), self.yaw, timestamp)
    }

    fn step(&mut self, dt: f64) {
        let mid_yaw = self.yaw + self.yaw_rate * dt * 0.5;
        self.position += Vector3::new(mid_yaw.cos(), mid_yaw.sin(), 0.0) * self.speed * dt;
        self.yaw += self.yaw_rate * dt;
    }
}

/// A ground truth object in the simulation.
#[derive(Debug, Clone)]
pub struct Actor {
    /// Oracle-local ID, assigned at spawn
    pub id: u64,

    /// Stable instance token, assigned at spawn
    pub object_id: String,

    /// Dataset category, e.g. `vehicle.car`
    pub category: String,

    /// Box center [x, y, z] in meters (global frame)
    pub position: Vector3<f64>,

    /// Velocity [vx, vy, vz] in m/s
    pub velocity: Vector3<f64>,

    /// Heading in radians
    pub yaw: f64,

    /// Box extent [width, length, height]
    pub size: [f64; 3],

    /// First time the object is annotated
    pub appear_at: f64,

    /// After this time the object is annotated as absent
    pub vanish_at: f64,
}

impl Actor {
    /// Creates a parked object.
    pub fn new(category: &str, position: Vector3<f64>, size: [f64; 3]) -> Self {
        Self {
            id: 0,
            object_id: String::new(),
            category: category.to_string(),
            position,
            velocity: Vector3::zeros(),
            yaw: 0.0,
            size,
            appear_at: f64::NEG_INFINITY,
            vanish_at: f64::INFINITY,
        }
    }

    /// Sets the velocity; the heading follows the direction of travel.
    pub fn with_velocity(mut self, velocity: Vector3<f64>) -> Self {
        if velocity.xy().norm() > 1e-3 {
            self.yaw = velocity.y.atan2(velocity.x);
        }
        self.velocity = velocity;
        self
    }

    /// Sets the heading.
    pub fn with_yaw(mut self, yaw: f64) -> Self {
        self.yaw = yaw;
        self
    }

    /// Limits when the object is present.
    pub fn with_window(mut self, appear_at: f64, vanish_at: f64) -> Self {
        self.appear_at = appear_at;
        self.vanish_at = vanish_at;
        self
    }

    /// True once the object has entered the scene.
    pub fn is_spawned(&self, t: f64) -> bool {
        t >= self.appear_at
    }

    /// True while the object is observable.
    pub fn is_visible(&self, t: f64) -> bool {
        self.is_spawned(t) && t <= self.vanish_at
    }

    /// Box frame -> global frame.
    pub fn isometry(&self) -> Isometry3<f64> {
        Isometry3::from_parts(
            Translation3::from(self.position),
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), self.yaw),
        )
    }
}

/// One mounted sensor: its calibration and the validated extrinsic.
#[derive(Debug, Clone)]
struct SimSensor {
    calibration: Calibration,
    extrinsic: SensorExtrinsic,
}

// ============================================================================
// ORACLE
// ============================================================================

/// The Oracle - owns ground truth and records it as a scene.
pub struct Oracle {
    /// Master seed
    seed: u64,

    /// RNG for noise, dropouts and tokens
    rng: ChaCha8Rng,

    ego: EgoVehicle,

    /// All actors, keyed by ID (ordered, so iteration is deterministic)
    actors: BTreeMap<u64, Actor>,

    next_id: u64,

    /// Current simulation time (seconds)
    current_time: f64,

    sensors: Vec<SimSensor>,

    /// Lidar range noise standard deviation (meters)
    range_noise_std: f64,

    /// Probability that a radar or camera reading is missing from a sample
    dropout_probability: f64,

    /// Whether annotations carry the true velocity
    annotate_velocity: bool,

    /// Camera frame size in pixels
    image_size: (u32, u32),
}

impl Oracle {
    /// Creates an Oracle with the ego parked at the origin, heading +x.
    pub fn new(seed: u64) -> Result<Self, SimError> {
        let image_size = (320, 180);
        Ok(Self {
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
            ego: EgoVehicle {
                position: Vector3::zeros(),
                yaw: 0.0,
                speed: 0.0,
                yaw_rate: 0.0,
            },
            actors: BTreeMap::new(),
            next_id: 0,
            current_time: 0.0,
            sensors: mount_rig(image_size)?,
            range_noise_std: 0.03,
            dropout_probability: 0.0,
            annotate_velocity: true,
            image_size,
        })
    }

    /// Sets the time of the first keyframe.
    pub fn with_start_time(mut self, t: f64) -> Self {
        self.current_time = t;
        self
    }

    /// Sets the ego's constant speed (m/s) and yaw rate (rad/s).
    pub fn with_ego_motion(mut self, speed: f64, yaw_rate: f64) -> Self {
        self.ego.speed = speed;
        self.ego.yaw_rate = yaw_rate;
        self
    }

    /// Sets the lidar range noise standard deviation.
    pub fn with_range_noise(mut self, std_dev: f64) -> Self {
        self.range_noise_std = std_dev;
        self
    }

    /// Sets the per-reading dropout probability for radars and cameras.
    pub fn with_dropout(mut self, probability: f64) -> Self {
        self.dropout_probability = probability.clamp(0.0, 1.0);
        self
    }

    /// Chooses whether annotations carry velocities.
    pub fn with_annotated_velocity(mut self, enabled: bool) -> Self {
        self.annotate_velocity = enabled;
        self
    }

    /// Sets the camera frame size and re-derives the camera intrinsics.
    pub fn with_image_size(mut self, width: u32, height: u32) -> Result<Self, SimError> {
        if width == 0 || height == 0 {
            return Err(SimError::Scenario(format!(
                "image size {}x{} is empty",
                width, height
            )));
        }
        self.image_size = (width, height);
        self.sensors = mount_rig(self.image_size)?;
        Ok(self)
    }

    /// Adds an actor and returns its ID.
    pub fn spawn(&mut self, mut actor: Actor) -> u64 {
        let id = self.next_id;
        self.next_id += 1;

        actor.id = id;
        actor.object_id = next_token(&mut self.rng);
        self.actors.insert(id, actor);

        id
    }

    /// Advances the world by `dt` seconds.
    pub fn step(&mut self, dt: f64) {
        self.current_time += dt;
        self.ego.step(dt);

        // Simple constant-velocity model
        for actor in self.actors.values_mut() {
            actor.position += actor.velocity * dt;
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Returns the current simulation time.
    pub fn time(&self) -> f64 {
        self.current_time
    }

    pub fn ego(&self) -> &EgoVehicle {
        &self.ego
    }

    /// Returns a specific actor by ID.
    pub fn actor(&self, id: u64) -> Option<&Actor> {
        self.actors.get(&id)
    }

    /// Returns all actors in ID order.
    pub fn actors(&self) -> impl Iterator<Item = &Actor> {
        self.actors.values()
    }

    /// Returns the rig calibrations.
    pub fn calibrations(&self) -> Vec<Calibration> {
        self.sensors.iter().map(|s| s.calibration.clone()).collect()
    }

    /// Records `samples` keyframes into a new scene, advancing the world.
    ///
    /// # Errors
    /// * `Scenario` - `samples` is zero or the noise setting is invalid
    pub fn record(&mut self, name: &str, samples: usize) -> Result<RecordedScene, SimError> {
        if samples == 0 {
            return Err(SimError::Scenario(format!("{} has no samples", name)));
        }

        let mut scene = RecordedScene::new(name, self.calibrations());
        for _ in 0..samples {
            let sample = self.capture_sample()?;
            scene.push_sample(sample);
            self.step(KEYFRAME_INTERVAL);
        }
        Ok(scene)
    }

    /// Captures the current world as one keyframe.
    pub fn capture_sample(&mut self) -> Result<RecordedSample, SimError> {
        let noise = Normal::new(0.0, self.range_noise_std)
            .map_err(|e| SimError::Scenario(format!("range noise: {}", e)))?;

        let t = self.current_time;
        let ego_pose = self.ego.pose(t);
        let ego = EgoState::new(ego_pose)?;

        let Self {
            rng,
            actors,
            sensors,
            dropout_probability,
            annotate_velocity,
            image_size,
            ..
        } = self;
        let visible: Vec<&Actor> = actors.values().filter(|a| a.is_visible(t)).collect();

        let mut readings = Vec::with_capacity(sensors.len());
        for sensor in sensors.iter() {
            let channel = sensor.calibration.sensor.as_str();
            let sensor_to_world = ego.vehicle_to_global() * sensor.extrinsic.isometry();
            let world_to_sensor = sensor_to_world.inverse();

            let data = if channel == LIDAR_CHANNEL {
                SensorData::Points(lidar_sweep(rng, &visible, sensor, &world_to_sensor, &noise))
            } else if rng.gen_bool(*dropout_probability) {
                continue;
            } else if RADAR_CHANNELS.contains(&channel) {
                SensorData::Points(radar_sweep(rng, &visible, &world_to_sensor))
            } else {
                SensorData::Image(render_camera(&visible, sensor, &world_to_sensor, *image_size))
            };

            readings.push(SensorReading {
                sensor: channel.to_string(),
                timestamp: t,
                data,
            });
        }

        let mut annotations = Vec::new();
        for actor in actors.values().filter(|a| a.is_spawned(t)) {
            let pose = Pose::with_yaw(actor.position.into(), actor.yaw, t);
            annotations.push(Annotation {
                token: next_token(rng),
                object_id: actor.object_id.clone(),
                category: actor.category.clone(),
                translation: pose.translation,
                size: actor.size,
                rotation: pose.rotation,
                velocity: (*annotate_velocity).then_some([actor.velocity.x, actor.velocity.y]),
                visibility: if actor.is_visible(t) {
                    Visibility::Visible
                } else {
                    Visibility::Absent
                },
                timestamp: t,
            });
        }

        Ok(RecordedSample {
            token: next_token(rng),
            timestamp: t,
            ego_pose,
            readings,
            annotations,
        })
    }
}

// ============================================================================
// SENSOR MODELS
// ============================================================================

/// A nuScenes-style token: 32 hex digits drawn from the oracle RNG.
fn next_token(rng: &mut ChaCha8Rng) -> String {
    Builder::from_random_bytes(rng.gen())
        .into_uuid()
        .simple()
        .to_string()
}

fn yaw_rotation(yaw: f64) -> [f64; 4] {
    Pose::with_yaw([0.0; 3], yaw, 0.0).rotation
}

/// Builds the 12-sensor rig. Every sensor frame is x-forward, z-up.
fn mount_rig(image_size: (u32, u32)) -> Result<Vec<SimSensor>, SimError> {
    let (width, height) = image_size;
    let focal = width as f64 / 2.0 / CAMERA_HALF_FOV.tan();
    let intrinsic = [
        [focal, 0.0, width as f64 / 2.0],
        [0.0, focal, height as f64 / 2.0],
        [0.0, 0.0, 1.0],
    ];

    let radar_mounts: [([f64; 3], f64); 5] = [
        ([3.41, 0.0, 0.5], 0.0),
        ([2.42, 0.8, 0.5], 1.54),
        ([2.42, -0.8, 0.5], -1.54),
        ([-0.56, 0.62, 0.5], 3.05),
        ([-0.56, -0.62, 0.5], -3.05),
    ];
    let camera_mounts: [([f64; 3], f64); 6] = [
        ([1.70, 0.0, 1.51], 0.0),
        ([1.52, 0.49, 1.51], 0.96),
        ([1.52, -0.49, 1.51], -0.96),
        ([0.03, 0.0, 1.57], PI),
        ([1.04, 0.48, 1.56], 1.92),
        ([1.04, -0.48, 1.56], -1.92),
    ];

    let mut calibrations = vec![Calibration::new(
        LIDAR_CHANNEL,
        [0.94, 0.0, 1.84],
        yaw_rotation(-FRAC_PI_2),
    )];
    for (channel, (translation, yaw)) in RADAR_CHANNELS.iter().zip(radar_mounts) {
        calibrations.push(Calibration::new(*channel, translation, yaw_rotation(yaw)));
    }
    for (channel, (translation, yaw)) in CAMERA_CHANNELS.iter().zip(camera_mounts) {
        let mut calibration = Calibration::new(*channel, translation, yaw_rotation(yaw));
        calibration.camera_intrinsic = Some(intrinsic);
        calibrations.push(calibration);
    }

    calibrations
        .into_iter()
        .map(|calibration| -> Result<SimSensor, SimError> {
            let extrinsic = SensorExtrinsic::from_calibration(&calibration)?;
            Ok(SimSensor {
                calibration,
                extrinsic,
            })
        })
        .collect()
}

fn to_f32(p: &Point3<f64>) -> [f32; 3] {
    [p.x as f32, p.y as f32, p.z as f32]
}

/// Lidar sweep: returns scattered over each object's box surface, plus
/// ground rings around the vehicle.
fn lidar_sweep(
    rng: &mut ChaCha8Rng,
    actors: &[&Actor],
    sensor: &SimSensor,
    world_to_sensor: &Isometry3<f64>,
    noise: &Normal<f64>,
) -> PointCloud {
    let mut points = Vec::new();

    for actor in actors {
        let center = world_to_sensor.transform_point(&Point3::from(actor.position));
        let distance = center.coords.norm();
        if distance > LIDAR_RANGE {
            continue;
        }

        let density = (20.0 / distance.max(1.0)).clamp(0.25, 2.0);
        let count = (LIDAR_POINTS_PER_OBJECT * density) as usize;
        let [width, length, height] = actor.size;
        let half = [length / 2.0, width / 2.0, height / 2.0];
        let box_to_sensor = world_to_sensor * actor.isometry();

        for _ in 0..count {
            // Uniform on the box, then pushed out onto one face
            let mut local = [0.0; 3];
            for (axis, extent) in half.iter().enumerate() {
                local[axis] = rng.gen_range(-1.0..=1.0) * extent;
            }
            let face = rng.gen_range(0..3);
            local[face] = if rng.gen_bool(0.5) { half[face] } else { -half[face] };

            let p = box_to_sensor.transform_point(&Point3::from(local));
            let range = p.coords.norm();
            let jittered = p.coords * ((range + noise.sample(rng)) / range.max(1e-6));
            points.push(RawPoint::lidar(
                to_f32(&Point3::from(jittered)),
                rng.gen_range(40.0..220.0),
            ));
        }
    }

    let vehicle_to_sensor = sensor.extrinsic.isometry().inverse();
    for radius in GROUND_RINGS {
        for i in 0..GROUND_RING_POINTS {
            let theta = 2.0 * PI * i as f64 / GROUND_RING_POINTS as f64;
            let r = radius + noise.sample(rng);
            let ground = Point3::new(r * theta.cos(), r * theta.sin(), 0.0);
            points.push(RawPoint::lidar(
                to_f32(&vehicle_to_sensor.transform_point(&ground)),
                rng.gen_range(2.0..30.0),
            ));
        }
    }

    PointCloud::new(points)
}

/// Typical radar cross section (dBsm) of a category.
fn radar_cross_section(category: &str) -> f64 {
    match ObjectClass::from_category(category) {
        Some(ObjectClass::Bus | ObjectClass::Truck | ObjectClass::Trailer) => 20.0,
        Some(ObjectClass::Car | ObjectClass::ConstructionVehicle) => 10.0,
        Some(ObjectClass::Motorcycle | ObjectClass::Bicycle) => 2.0,
        Some(ObjectClass::Pedestrian) => -5.0,
        Some(ObjectClass::Barrier | ObjectClass::TrafficCone) => -8.0,
        None => 0.0,
    }
}

/// Radar sweep: one return per object in the field of view, with its
/// ego-motion compensated velocity, plus static clutter.
fn radar_sweep(
    rng: &mut ChaCha8Rng,
    actors: &[&Actor],
    world_to_sensor: &Isometry3<f64>,
) -> PointCloud {
    let mut points = Vec::new();

    for actor in actors {
        let p = world_to_sensor.transform_point(&Point3::from(actor.position));
        let azimuth = p.y.atan2(p.x);
        if p.coords.norm() > RADAR_RANGE || azimuth.abs() > RADAR_HALF_FOV {
            continue;
        }
        // Compensated velocity is the object's own motion, seen from the sensor axes
        let v = world_to_sensor.transform_vector(&actor.velocity);
        let rcs_db = radar_cross_section(&actor.category) + rng.gen_range(-2.0..2.0);
        points.push(RawPoint::radar(
            [p.x as f32, p.y as f32, 0.0],
            [v.x as f32, v.y as f32],
            10f64.powf(rcs_db / 10.0) as f32,
        ));
    }

    for _ in 0..RADAR_CLUTTER {
        let range = rng.gen_range(5.0..RADAR_RANGE * 0.5);
        let azimuth = rng.gen_range(-RADAR_HALF_FOV..RADAR_HALF_FOV);
        points.push(RawPoint::radar(
            [
                (range * azimuth.cos()) as f32,
                (range * azimuth.sin()) as f32,
                0.0,
            ],
            [0.0, 0.0],
            rng.gen_range(0.1..1.0),
        ));
    }

    PointCloud::new(points)
}

/// Renders a flat-shaded frame: sky, ground, and one rectangle per object
/// in view, painted far to near in its class colour.
fn render_camera(
    actors: &[&Actor],
    sensor: &SimSensor,
    world_to_sensor: &Isometry3<f64>,
    (width, height): (u32, u32),
) -> ImageData {
    let (w, h) = (width as usize, height as usize);
    let mut rgb = vec![0u8; w * h * 3];
    for (row, line) in rgb.chunks_mut(w * 3).enumerate() {
        let color = if row < h / 2 {
            let shade = (row * 60 / h.max(1)) as u8;
            [120 + shade, 160 + shade, 210]
        } else {
            [88, 88, 92]
        };
        for pixel in line.chunks_mut(3) {
            pixel.copy_from_slice(&color);
        }
    }

    let [[focal, _, cx], [_, _, cy], _] = sensor.calibration.camera_intrinsic.unwrap_or([
        [1.0, 0.0, 0.0],
        [0.0, 1.0, 0.0],
        [0.0, 0.0, 1.0],
    ]);

    let mut in_view: Vec<(f64, Point3<f64>, &Actor)> = actors
        .iter()
        .map(|a| {
            let p = world_to_sensor.transform_point(&Point3::from(a.position));
            (p.x, p, *a)
        })
        .filter(|(depth, _, _)| *depth > 1.0)
        .collect();
    in_view.sort_by(|a, b| b.0.total_cmp(&a.0));

    for (depth, p, actor) in in_view {
        let u = cx - focal * p.y / depth;
        let v = cy - focal * p.z / depth;
        let [width_m, length_m, height_m] = actor.size;
        let half_u = focal * width_m.max(length_m) / 2.0 / depth;
        let half_v = focal * height_m / 2.0 / depth;

        let u0 = (u - half_u).floor().max(0.0) as usize;
        let u1 = ((u + half_u).ceil().max(0.0) as usize).min(w);
        let v0 = (v - half_v).floor().max(0.0) as usize;
        let v1 = ((v + half_v).ceil().max(0.0) as usize).min(h);
        let color = ObjectClass::from_category(&actor.category)
            .map(|c| c.color())
            .unwrap_or([200, 200, 200]);

        for row in v0..v1 {
            for col in u0..u1 {
                let i = (row * w + col) * 3;
                rgb[i..i + 3].copy_from_slice(&color);
            }
        }
    }

    ImageData::Raw { width, height, rgb }
}
