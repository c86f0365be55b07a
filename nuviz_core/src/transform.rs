//! The Transform Engine - global frame <-> ego vehicle frame
//!
//! Every measurement and annotation is re-expressed in the frame of the
//! vehicle at the current sample. Poses compose as rigid isometries
//! (unit quaternion + translation); Euler angles are never used for
//! composition.
//!
//! ```text
//! vehicle_pose = inverse(ego_pose) ∘ global_pose
//! global_pose  = ego_pose ∘ vehicle_pose
//! ```

use crate::error::ConvertError;
use nalgebra::{Isometry3, Point3, Quaternion, Translation3, UnitQuaternion, Vector3};
use nuviz_env::{Calibration, Pose};

/// Maximum deviation of a quaternion norm from 1 accepted as a rotation.
pub const QUATERNION_NORM_TOLERANCE: f64 = 1e-3;

/// Validates a `[w, x, y, z]` quaternion and normalizes away rounding noise.
///
/// # Errors
/// `ConvertError::InvalidPose` if the norm deviates from 1 by more than
/// [`QUATERNION_NORM_TOLERANCE`] or any component is not finite.
pub fn unit_quaternion(rotation: &[f64; 4]) -> Result<UnitQuaternion<f64>, ConvertError> {
    let [w, x, y, z] = *rotation;
    let q = Quaternion::new(w, x, y, z);
    let norm = q.norm();

    if !norm.is_finite() || (norm - 1.0).abs() > QUATERNION_NORM_TOLERANCE {
        return Err(ConvertError::InvalidPose { norm });
    }

    Ok(UnitQuaternion::new_normalize(q))
}

/// Builds a rigid isometry from a translation and a `[w, x, y, z]` rotation.
pub fn isometry(translation: &[f64; 3], rotation: &[f64; 4]) -> Result<Isometry3<f64>, ConvertError> {
    let rotation = unit_quaternion(rotation)?;
    let translation = Translation3::new(translation[0], translation[1], translation[2]);
    Ok(Isometry3::from_parts(translation, rotation))
}

/// Converts a pose to an isometry, validating its orientation.
pub fn pose_to_isometry(pose: &Pose) -> Result<Isometry3<f64>, ConvertError> {
    isometry(&pose.translation, &pose.rotation)
}

/// Converts an isometry back to a timestamped pose.
pub fn isometry_to_pose(iso: &Isometry3<f64>, timestamp: f64) -> Pose {
    let t = iso.translation.vector;
    let q = iso.rotation.quaternion();
    Pose::new([t.x, t.y, t.z], [q.w, q.i, q.j, q.k], timestamp)
}

/// Yaw (rotation about +z) of a rotation, in radians.
pub fn yaw_of(rotation: &UnitQuaternion<f64>) -> f64 {
    let (_roll, _pitch, yaw) = rotation.euler_angles();
    yaw
}

// ============================================================================
// EGO STATE
// ============================================================================

/// The ego vehicle's pose at one sample, with both transform directions
/// precomputed.
///
/// Created once per sample and never mutated; every conversion call takes
/// it explicitly.
#[derive(Debug, Clone)]
pub struct EgoState {
    /// Sample time in seconds
    pub timestamp: f64,

    /// Ego pose in the global frame, as recorded
    pub pose: Pose,

    /// vehicle frame -> global frame
    vehicle_to_global: Isometry3<f64>,

    /// global frame -> vehicle frame
    global_to_vehicle: Isometry3<f64>,
}

impl EgoState {
    /// Validates the ego pose and precomputes its inverse.
    pub fn new(pose: Pose) -> Result<Self, ConvertError> {
        let vehicle_to_global = pose_to_isometry(&pose)?;
        Ok(Self {
            timestamp: pose.timestamp,
            pose,
            vehicle_to_global,
            global_to_vehicle: vehicle_to_global.inverse(),
        })
    }

    /// An ego vehicle sitting at the global origin.
    pub fn identity(timestamp: f64) -> Self {
        Self {
            timestamp,
            pose: Pose::at([0.0; 3], timestamp),
            vehicle_to_global: Isometry3::identity(),
            global_to_vehicle: Isometry3::identity(),
        }
    }

    pub fn vehicle_to_global(&self) -> &Isometry3<f64> {
        &self.vehicle_to_global
    }

    pub fn global_to_vehicle(&self) -> &Isometry3<f64> {
        &self.global_to_vehicle
    }

    /// Ego heading in the global frame, in radians.
    pub fn yaw(&self) -> f64 {
        yaw_of(&self.vehicle_to_global.rotation)
    }
}

// ============================================================================
// FRAME CONVERSIONS
// ============================================================================

/// Re-expresses a global pose in the vehicle frame of `ego`.
///
/// The result keeps the input's timestamp.
pub fn to_vehicle_frame(pose: &Pose, ego: &EgoState) -> Result<Pose, ConvertError> {
    let global = pose_to_isometry(pose)?;
    Ok(isometry_to_pose(&(ego.global_to_vehicle * global), pose.timestamp))
}

/// Inverse of [`to_vehicle_frame`]: vehicle-relative pose -> global pose.
pub fn to_global_frame(pose: &Pose, ego: &EgoState) -> Result<Pose, ConvertError> {
    let local = pose_to_isometry(pose)?;
    Ok(isometry_to_pose(&(ego.vehicle_to_global * local), pose.timestamp))
}

/// Moves a bare global point into the vehicle frame (rotation + translation).
pub fn point_to_vehicle_frame(point: &Point3<f64>, ego: &EgoState) -> Point3<f64> {
    ego.global_to_vehicle.transform_point(point)
}

/// Moves a bare vehicle-frame point into the global frame.
pub fn point_to_global_frame(point: &Point3<f64>, ego: &EgoState) -> Point3<f64> {
    ego.vehicle_to_global.transform_point(point)
}

/// Rotates a global direction (e.g. a velocity) into the vehicle frame.
/// Translation does not apply to vectors.
pub fn vector_to_vehicle_frame(vector: &Vector3<f64>, ego: &EgoState) -> Vector3<f64> {
    ego.global_to_vehicle.transform_vector(vector)
}

// ============================================================================
// SENSOR EXTRINSICS
// ============================================================================

/// Fixed sensor -> vehicle transform from a calibration record.
#[derive(Debug, Clone)]
pub struct SensorExtrinsic {
    pub sensor: String,
    sensor_to_vehicle: Isometry3<f64>,
}

impl SensorExtrinsic {
    /// Validates the calibration's rotation.
    pub fn from_calibration(calibration: &Calibration) -> Result<Self, ConvertError> {
        Ok(Self {
            sensor: calibration.sensor.clone(),
            sensor_to_vehicle: isometry(&calibration.translation, &calibration.rotation)?,
        })
    }

    pub fn isometry(&self) -> &Isometry3<f64> {
        &self.sensor_to_vehicle
    }

    /// Sensor-frame point -> vehicle-frame point.
    pub fn transform_point(&self, point: [f32; 3]) -> [f32; 3] {
        let p = Point3::new(point[0] as f64, point[1] as f64, point[2] as f64);
        let v = self.sensor_to_vehicle.transform_point(&p);
        [v.x as f32, v.y as f32, v.z as f32]
    }

    /// Sensor-frame vector -> vehicle-frame vector (rotation only).
    pub fn rotate_vector(&self, vector: [f32; 3]) -> [f32; 3] {
        let v = Vector3::new(vector[0] as f64, vector[1] as f64, vector[2] as f64);
        let r = self.sensor_to_vehicle.transform_vector(&v);
        [r.x as f32, r.y as f32, r.z as f32]
    }

    /// The sensor's mounting pose in the vehicle frame.
    pub fn pose(&self) -> Pose {
        isometry_to_pose(&self.sensor_to_vehicle, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;
    use std::f64::consts::FRAC_PI_2;

    fn assert_pose_eq(a: &Pose, b: &Pose) {
        for i in 0..3 {
            assert_relative_eq!(a.translation[i], b.translation[i], epsilon = 1e-9);
        }
        // q and -q encode the same rotation
        let dot: f64 = (0..4).map(|i| a.rotation[i] * b.rotation[i]).sum();
        assert_relative_eq!(dot.abs(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_identity_ego_is_noop() {
        let ego = EgoState::identity(0.0);
        let pose = Pose::with_yaw([3.0, -2.0, 1.0], 0.3, 0.0);

        let local = to_vehicle_frame(&pose, &ego).unwrap();
        assert_pose_eq(&local, &pose);
    }

    #[test]
    fn test_yawed_ego_rotates_offsets() {
        // Ego at (10, 0) facing +y; an object at (10, 5) is 5m straight ahead.
        let ego = EgoState::new(Pose::with_yaw([10.0, 0.0, 0.0], FRAC_PI_2, 1.0)).unwrap();
        let object = Pose::with_yaw([10.0, 5.0, 0.0], FRAC_PI_2, 1.0);

        let local = to_vehicle_frame(&object, &ego).unwrap();
        assert_relative_eq!(local.translation[0], 5.0, epsilon = 1e-9);
        assert_relative_eq!(local.translation[1], 0.0, epsilon = 1e-9);
        // Same heading as ego -> identity relative rotation
        assert_relative_eq!(local.rotation[0].abs(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_point_ignores_orientation_of_input() {
        let ego = EgoState::new(Pose::with_yaw([1.0, 1.0, 0.0], FRAC_PI_2, 0.0)).unwrap();
        let p = point_to_vehicle_frame(&Point3::new(1.0, 3.0, 2.0), &ego);
        assert_relative_eq!(p.x, 2.0, epsilon = 1e-9);
        assert_relative_eq!(p.y, 0.0, epsilon = 1e-9);
        assert_relative_eq!(p.z, 2.0, epsilon = 1e-9);

        let back = point_to_global_frame(&p, &ego);
        assert_relative_eq!(back.y, 3.0, epsilon = 1e-9);
    }

    #[test]
    fn test_vector_excludes_translation() {
        let ego = EgoState::new(Pose::with_yaw([100.0, 50.0, 0.0], FRAC_PI_2, 0.0)).unwrap();
        let v = vector_to_vehicle_frame(&Vector3::new(0.0, 2.0, 0.0), &ego);
        assert_relative_eq!(v.x, 2.0, epsilon = 1e-9);
        assert_relative_eq!(v.y, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_invalid_quaternion_rejected() {
        let bad = Pose::new([0.0; 3], [0.5, 0.0, 0.0, 0.0], 0.0);
        assert!(matches!(
            EgoState::new(bad),
            Err(ConvertError::InvalidPose { .. })
        ));

        let ego = EgoState::identity(0.0);
        let nan = Pose::new([0.0; 3], [f64::NAN, 0.0, 0.0, 0.0], 0.0);
        assert!(to_vehicle_frame(&nan, &ego).is_err());
    }

    #[test]
    fn test_slightly_denormalized_quaternion_accepted() {
        let q = unit_quaternion(&[1.0005, 0.0, 0.0, 0.0]).unwrap();
        assert_relative_eq!(q.quaternion().norm(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_near_identity_rotation_is_stable() {
        let tiny = 1e-9_f64;
        let ego = EgoState::new(Pose::with_yaw([0.0; 3], tiny, 0.0)).unwrap();
        let pose = Pose::with_yaw([1000.0, 0.0, 0.0], -tiny, 0.0);

        let local = to_vehicle_frame(&pose, &ego).unwrap();
        assert_relative_eq!(local.translation[0], 1000.0, epsilon = 1e-5);
        assert!(local.translation[1].abs() < 1e-5);
    }

    #[test]
    fn test_sensor_extrinsic_maps_points_and_vectors() {
        // Sensor 1m forward, rotated 90 degrees left.
        let half = FRAC_PI_2 / 2.0;
        let calib = Calibration::new("RADAR_FRONT", [1.0, 0.0, 0.5], [half.cos(), 0.0, 0.0, half.sin()]);
        let ext = SensorExtrinsic::from_calibration(&calib).unwrap();

        let p = ext.transform_point([2.0, 0.0, 0.0]);
        assert_relative_eq!(p[0], 1.0, epsilon = 1e-5);
        assert_relative_eq!(p[1], 2.0, epsilon = 1e-5);
        assert_relative_eq!(p[2], 0.5, epsilon = 1e-5);

        let v = ext.rotate_vector([3.0, 0.0, 0.0]);
        assert_relative_eq!(v[0], 0.0, epsilon = 1e-5);
        assert_relative_eq!(v[1], 3.0, epsilon = 1e-5);
    }

    fn arb_pose() -> impl Strategy<Value = Pose> {
        (
            prop::array::uniform3(-500.0f64..500.0),
            -3.1f64..3.1,
            -1.5f64..1.5,
            -3.1f64..3.1,
        )
            .prop_map(|(t, roll, pitch, yaw)| {
                let q = UnitQuaternion::from_euler_angles(roll, pitch, yaw);
                let q = q.quaternion();
                Pose::new(t, [q.w, q.i, q.j, q.k], 0.0)
            })
    }

    proptest! {
        #[test]
        fn test_vehicle_frame_roundtrip(pose in arb_pose(), ego_pose in arb_pose()) {
            let ego = EgoState::new(ego_pose).unwrap();
            let global = to_global_frame(&pose, &ego).unwrap();
            let back = to_vehicle_frame(&global, &ego).unwrap();

            for i in 0..3 {
                prop_assert!((back.translation[i] - pose.translation[i]).abs() < 1e-6);
            }
            let dot: f64 = (0..4).map(|i| back.rotation[i] * pose.rotation[i]).sum();
            prop_assert!((dot.abs() - 1.0).abs() < 1e-9);
        }
    }
}
