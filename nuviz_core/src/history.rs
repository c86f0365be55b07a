//! The History/Future Engine - per-object trajectories around the current sample
//!
//! Annotations are indexed once per scene: an arena of every annotation plus,
//! per object id, the arena indices ordered by timestamp. Window queries are
//! then two binary searches instead of a rescan of the whole scene.
//!
//! Both queries express their result in the vehicle frame of the *current*
//! sample, so a past trajectory renders relative to where the ego is now.
//!
//! ```text
//!         history (oldest first)          future (nearest first)
//!   |-------x-------x-------x=======>-------o-------o-------o
//!   t_now - window           t_now                   t_now + window
//! ```

use crate::error::ConvertError;
use crate::transform::{to_vehicle_frame, EgoState};
use nalgebra::Vector3;
use nuviz_env::{Annotation, Pose, SampleInfo, SceneSource, TIME_EPSILON};
use std::collections::HashMap;
use tracing::debug;

/// A derived pose on an object's trajectory.
#[derive(Debug, Clone, PartialEq)]
pub struct TrajectorySample {
    /// Pose in the current vehicle frame, stamped with its absolute time
    pub pose: Pose,

    /// Seconds relative to the query time (negative in the past)
    pub relative_time: f64,
}

/// Default look-back for velocity estimation in seconds.
pub const DEFAULT_LOOK_BACK: f64 = 3.0;

/// Time-ordered annotation index keyed by object id.
#[derive(Debug, Clone)]
pub struct AnnotationIndex {
    /// Every annotation of the scene, in insertion order
    arena: Vec<Annotation>,

    /// object_id -> arena indices, sorted by timestamp
    tracks: HashMap<String, Vec<usize>>,

    /// Objects slower than this (m/s) get no prediction
    min_speed: f64,

    /// History window the velocity of a prediction is estimated over
    look_back: f64,
}

impl Default for AnnotationIndex {
    fn default() -> Self {
        Self {
            arena: Vec::new(),
            tracks: HashMap::new(),
            min_speed: 0.0,
            look_back: DEFAULT_LOOK_BACK,
        }
    }
}

impl AnnotationIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the stationary threshold for [`AnnotationIndex::future`].
    pub fn with_min_speed(mut self, min_speed: f64) -> Self {
        self.min_speed = min_speed;
        self
    }

    /// Sets the history window [`AnnotationIndex::future`] estimates
    /// velocity over.
    pub fn with_look_back(mut self, look_back: f64) -> Self {
        self.look_back = look_back;
        self
    }

    /// Indexes every annotation of the given samples.
    pub fn build(source: &dyn SceneSource, samples: &[SampleInfo]) -> Result<Self, ConvertError> {
        let mut index = Self::new();
        for sample in samples {
            for annotation in source.annotations(sample.timestamp)? {
                index.insert(annotation);
            }
        }
        debug!(
            "Indexed {} annotations of {} objects",
            index.len(),
            index.object_count()
        );
        Ok(index)
    }

    /// Adds one annotation, keeping its object's track time-ordered.
    pub fn insert(&mut self, annotation: Annotation) {
        let slot = self.arena.len();
        let timestamp = annotation.timestamp;
        let track = self.tracks.entry(annotation.object_id.clone()).or_default();
        self.arena.push(annotation);

        let arena = &self.arena;
        let pos = track.partition_point(|&i| arena[i].timestamp <= timestamp);
        track.insert(pos, slot);
    }

    /// Total number of indexed annotations.
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Number of distinct objects.
    pub fn object_count(&self) -> usize {
        self.tracks.len()
    }

    /// Annotations of `object_id` with timestamp in `[from, to]`, oldest first.
    /// Absent-flagged annotations are included.
    pub fn window(&self, object_id: &str, from: f64, to: f64) -> Vec<&Annotation> {
        let Some(track) = self.tracks.get(object_id) else {
            return Vec::new();
        };
        let start = track.partition_point(|&i| self.arena[i].timestamp < from - TIME_EPSILON);
        let end = track.partition_point(|&i| self.arena[i].timestamp <= to + TIME_EPSILON);
        track[start..end.max(start)]
            .iter()
            .map(|&i| &self.arena[i])
            .collect()
    }

    /// Reconstructs an object's trajectory over `[t_now - window, t_now]`.
    ///
    /// # Arguments
    /// * `object_id` - Stable object identity
    /// * `t_now` - Current sample time
    /// * `window` - Look-back duration in seconds
    /// * `ego` - Ego state at `t_now`; every pose is expressed in its frame
    ///
    /// # Returns
    /// Visible samples, oldest first. Empty if the object has no record in
    /// the window.
    pub fn history(
        &self,
        object_id: &str,
        t_now: f64,
        window: f64,
        ego: &EgoState,
    ) -> Result<Vec<TrajectorySample>, ConvertError> {
        self.window(object_id, t_now - window, t_now)
            .into_iter()
            .filter(|a| a.is_visible())
            .map(|a| {
                Ok(TrajectorySample {
                    pose: to_vehicle_frame(&a.pose(), ego)?,
                    relative_time: a.timestamp - t_now,
                })
            })
            .collect()
    }

    /// Global velocity of an object at `t_now`.
    ///
    /// Needs at least two visible samples within `[t_now - look_back, t_now]`. A
    /// finite, non-zero annotated velocity on the newest sample wins over the
    /// finite difference of the two newest samples.
    ///
    /// # Returns
    /// `(newest visible annotation, velocity)` or `None`
    pub fn estimate_velocity(
        &self,
        object_id: &str,
        t_now: f64,
        look_back: f64,
    ) -> Option<(&Annotation, Vector3<f64>)> {
        let visible: Vec<&Annotation> = self
            .window(object_id, t_now - look_back, t_now)
            .into_iter()
            .filter(|a| a.is_visible())
            .collect();

        let [.., prev, last] = visible.as_slice() else {
            return None;
        };

        if let Some([vx, vy]) = last.velocity {
            if vx.is_finite() && vy.is_finite() && (vx != 0.0 || vy != 0.0) {
                return Some((*last, Vector3::new(vx, vy, 0.0)));
            }
        }

        let dt = last.timestamp - prev.timestamp;
        if dt <= TIME_EPSILON {
            return None;
        }
        let delta = Vector3::from(last.translation) - Vector3::from(prev.translation);
        Some((*last, delta / dt))
    }

    /// Extrapolates an object's pose at `steps` evenly spaced offsets up to
    /// `window` seconds after `t_now`, with constant velocity and constant
    /// orientation.
    ///
    /// # Returns
    /// Predicted samples, nearest first. Empty with fewer than two visible
    /// samples in the history window (see [`AnnotationIndex::with_look_back`])
    /// or when the object is slower than the stationary
    /// threshold.
    pub fn future(
        &self,
        object_id: &str,
        t_now: f64,
        window: f64,
        steps: usize,
        ego: &EgoState,
    ) -> Result<Vec<TrajectorySample>, ConvertError> {
        if steps == 0 || window <= 0.0 {
            return Ok(Vec::new());
        }

        let Some((last, velocity)) = self.estimate_velocity(object_id, t_now, self.look_back)
        else {
            return Ok(Vec::new());
        };
        if velocity.norm() < self.min_speed {
            return Ok(Vec::new());
        }

        let origin = Vector3::from(last.translation);
        (1..=steps)
            .map(|step| {
                let offset = step as f64 * window / steps as f64;
                let dt = t_now + offset - last.timestamp;
                let position = origin + velocity * dt;
                let global = Pose::new(position.into(), last.rotation, t_now + offset);
                Ok(TrajectorySample {
                    pose: to_vehicle_frame(&global, ego)?,
                    relative_time: offset,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nuviz_env::{Visibility, IDENTITY_ROTATION};
    use proptest::prelude::*;

    fn annotation(object_id: &str, t: f64, x: f64) -> Annotation {
        Annotation {
            token: format!("{}-{}", object_id, t),
            object_id: object_id.to_string(),
            category: "vehicle.car".to_string(),
            translation: [x, 0.0, 0.0],
            size: [1.8, 4.5, 1.5],
            rotation: IDENTITY_ROTATION,
            velocity: None,
            visibility: Visibility::Visible,
            timestamp: t,
        }
    }

    fn linear_index() -> AnnotationIndex {
        let mut index = AnnotationIndex::new();
        // Inserted out of order on purpose
        index.insert(annotation("obj", 1.0, 2.0));
        index.insert(annotation("obj", 0.0, 0.0));
        index.insert(annotation("obj", 0.5, 1.0));
        index
    }

    #[test]
    fn test_history_linear_object() {
        let index = linear_index();
        let ego = EgoState::identity(1.0);

        let history = index.history("obj", 1.0, 3.0, &ego).unwrap();
        let xs: Vec<f64> = history.iter().map(|s| s.pose.translation[0]).collect();
        assert_eq!(xs.len(), 3);
        assert_relative_eq!(xs[0], 0.0, epsilon = 1e-9);
        assert_relative_eq!(xs[1], 1.0, epsilon = 1e-9);
        assert_relative_eq!(xs[2], 2.0, epsilon = 1e-9);
        assert_relative_eq!(history[0].relative_time, -1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_future_linear_object() {
        let index = linear_index();
        let ego = EgoState::identity(1.0);

        let future = index.future("obj", 1.0, 3.0, 6, &ego).unwrap();
        assert_eq!(future.len(), 6);
        for (i, sample) in future.iter().enumerate() {
            let step = (i + 1) as f64;
            assert_relative_eq!(sample.pose.translation[0], 2.0 + 2.0 * (step / 6.0 * 3.0), epsilon = 1e-9);
            assert_relative_eq!(sample.relative_time, step * 0.5, epsilon = 1e-9);
            assert_eq!(sample.pose.rotation, IDENTITY_ROTATION);
        }
    }

    #[test]
    fn test_history_uses_current_ego_frame() {
        let index = linear_index();
        // Ego has moved to x = 2: the object sits at its origin now.
        let ego = EgoState::new(Pose::at([2.0, 0.0, 0.0], 1.0)).unwrap();

        let history = index.history("obj", 1.0, 3.0, &ego).unwrap();
        assert_relative_eq!(history[0].pose.translation[0], -2.0, epsilon = 1e-9);
        assert_relative_eq!(history[2].pose.translation[0], 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_single_sample_has_no_future() {
        let mut index = AnnotationIndex::new();
        index.insert(annotation("lonely", 0.0, 5.0));
        let ego = EgoState::identity(0.0);

        assert!(index.future("lonely", 0.0, 3.0, 6, &ego).unwrap().is_empty());
        assert_eq!(index.history("lonely", 0.0, 3.0, &ego).unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_object_is_empty_not_error() {
        let index = linear_index();
        let ego = EgoState::identity(1.0);
        assert!(index.history("ghost", 1.0, 3.0, &ego).unwrap().is_empty());
        assert!(index.future("ghost", 1.0, 3.0, 6, &ego).unwrap().is_empty());
    }

    #[test]
    fn test_absent_sample_skipped_not_terminating() {
        let mut index = linear_index();
        index.insert(Annotation {
            visibility: Visibility::Absent,
            ..annotation("obj", 0.25, 0.5)
        });
        let ego = EgoState::identity(1.0);

        let history = index.history("obj", 1.0, 3.0, &ego).unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(index.window("obj", 0.0, 1.0).len(), 4);
    }

    #[test]
    fn test_explicit_velocity_preferred() {
        let mut index = AnnotationIndex::new();
        index.insert(annotation("obj", 0.0, 0.0));
        index.insert(Annotation {
            velocity: Some([0.0, 4.0]),
            ..annotation("obj", 0.5, 1.0)
        });
        let ego = EgoState::identity(0.5);

        let future = index.future("obj", 0.5, 1.0, 2, &ego).unwrap();
        assert_relative_eq!(future[1].pose.translation[0], 1.0, epsilon = 1e-9);
        assert_relative_eq!(future[1].pose.translation[1], 4.0, epsilon = 1e-9);
    }

    #[test]
    fn test_nan_velocity_falls_back_to_difference() {
        let mut index = AnnotationIndex::new();
        index.insert(annotation("obj", 0.0, 0.0));
        index.insert(Annotation {
            velocity: Some([f64::NAN, f64::NAN]),
            ..annotation("obj", 0.5, 1.0)
        });

        let (_, v) = index.estimate_velocity("obj", 0.5, 3.0).unwrap();
        assert_relative_eq!(v.x, 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_stationary_object_not_predicted() {
        let mut index = AnnotationIndex::new().with_min_speed(0.1);
        index.insert(annotation("parked", 0.0, 3.0));
        index.insert(annotation("parked", 0.5, 3.01));
        let ego = EgoState::identity(0.5);

        assert!(index.future("parked", 0.5, 3.0, 6, &ego).unwrap().is_empty());
    }

    #[test]
    fn test_velocity_needs_two_samples_in_history_window() {
        let mut index = AnnotationIndex::new().with_look_back(1.0);
        index.insert(annotation("obj", 0.0, 0.0));
        index.insert(annotation("obj", 2.0, 4.0));
        let ego = EgoState::identity(2.0);

        // Only t = 2 falls inside [1, 2]; a longer horizon does not widen it
        assert_eq!(index.history("obj", 2.0, 1.0, &ego).unwrap().len(), 1);
        assert!(index.future("obj", 2.0, 3.0, 6, &ego).unwrap().is_empty());

        let wide = index.with_look_back(3.0);
        assert_eq!(wide.future("obj", 2.0, 3.0, 6, &ego).unwrap().len(), 6);
    }

    proptest! {
        #[test]
        fn test_history_stays_in_window(
            times in prop::collection::vec(0.0f64..20.0, 1..40),
            t_now in 0.0f64..20.0,
            window in 0.0f64..5.0,
        ) {
            let mut index = AnnotationIndex::new();
            for (i, t) in times.iter().enumerate() {
                index.insert(annotation("obj", *t, i as f64));
            }
            let ego = EgoState::identity(t_now);

            let history = index.history("obj", t_now, window, &ego).unwrap();
            for pair in history.windows(2) {
                prop_assert!(pair[0].pose.timestamp <= pair[1].pose.timestamp);
            }
            for sample in &history {
                prop_assert!(sample.pose.timestamp <= t_now + TIME_EPSILON);
                prop_assert!(sample.pose.timestamp >= t_now - window - TIME_EPSILON);
            }
            let expected = times
                .iter()
                .filter(|t| **t <= t_now + TIME_EPSILON && **t >= t_now - window - TIME_EPSILON)
                .count();
            prop_assert_eq!(history.len(), expected);
        }
    }
}
