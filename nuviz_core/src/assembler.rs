//! The Frame Assembler - per-scene orchestration
//!
//! ```text
//! INIT ──> ( LOAD ──> TRANSFORM ──> CONVERT ──> ASSEMBLE ) x N ──> DONE
//! ```
//!
//! - **INIT**: resolve and cap the sample list, load every adapter, declare
//!   all streams in the metadata packet
//! - **LOAD**: fetch the sample's ego pose
//! - **TRANSFORM**: validate it into an `EgoState`
//! - **CONVERT**: run every adapter against that `EgoState`
//! - **ASSEMBLE**: merge their primitives into one frame and pack it
//! - **DONE**: finish the packer and log the scene summary
//!
//! A failing adapter only loses its own streams for that sample. A missing
//! ego pose, an invalid ego orientation or a packer invariant violation
//! aborts the scene.

use crate::adapters::{default_adapters, SampleContext, SceneContext, StreamAdapter};
use crate::config::ConverterConfig;
use crate::error::ConvertError;
use crate::packer::ProtocolPacker;
use crate::protocol::{
    FrameMessage, LogInfo, MetadataMessage, Primitive, PrimitiveType, StreamMetadata,
    StreamPrimitives, VehiclePose,
};
use crate::transform::EgoState;
use nuviz_env::{PacketSink, SceneSource};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::{debug, info, warn};

// ============================================================================
// PHASES
// ============================================================================

/// Stage of a scene conversion, used in logs and scene errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionPhase {
    Init,
    Load,
    Transform,
    Convert,
    Assemble,
    Done,
}

impl fmt::Display for ConversionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "INIT",
            Self::Load => "LOAD",
            Self::Transform => "TRANSFORM",
            Self::Convert => "CONVERT",
            Self::Assemble => "ASSEMBLE",
            Self::Done => "DONE",
        };
        write!(f, "{}", name)
    }
}

// ============================================================================
// FRAME BUILDER
// ============================================================================

/// Collects one sample's primitives, refusing streams metadata never declared.
pub struct FrameBuilder<'a> {
    declared: &'a HashMap<String, PrimitiveType>,
    timestamp: f64,
    vehicle_pose: VehiclePose,
    streams: Vec<StreamPrimitives>,
    skipped: Vec<SkippedStream>,
}

impl<'a> FrameBuilder<'a> {
    pub fn new(
        declared: &'a HashMap<String, PrimitiveType>,
        timestamp: f64,
        vehicle_pose: VehiclePose,
    ) -> Self {
        Self {
            declared,
            timestamp,
            vehicle_pose,
            streams: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// An empty builder for the same frame, merged back on success.
    pub fn scratch(&self) -> FrameBuilder<'a> {
        Self::new(self.declared, self.timestamp, self.vehicle_pose)
    }

    /// Appends a primitive to a declared stream.
    pub fn push(&mut self, stream: &str, primitive: Primitive) -> Result<(), ConvertError> {
        let expected = self
            .declared
            .get(stream)
            .ok_or_else(|| ConvertError::UnknownStream(stream.to_string()))?;
        if primitive.primitive_type() != *expected {
            return Err(ConvertError::scene(format!(
                "{} declared as {:?}, got {:?}",
                stream,
                expected,
                primitive.primitive_type()
            )));
        }

        match self.streams.iter_mut().find(|s| s.stream == stream) {
            Some(existing) => existing.primitives.push(primitive),
            None => self.streams.push(StreamPrimitives {
                stream: stream.to_string(),
                primitives: vec![primitive],
            }),
        }
        Ok(())
    }

    /// Records a partial omission from `stream` (one object, one return)
    /// while the rest of the adapter's output stays in the frame.
    pub fn skip(&mut self, stream: &str, reason: impl Into<String>) {
        self.skipped.push(SkippedStream {
            stream: stream.to_string(),
            timestamp: self.timestamp,
            reason: reason.into(),
        });
    }

    /// Moves every stream and recorded omission of `other` into this frame.
    pub fn merge(&mut self, other: FrameBuilder<'_>) {
        self.skipped.extend(other.skipped);
        for part in other.streams {
            match self.streams.iter_mut().find(|s| s.stream == part.stream) {
                Some(existing) => existing.primitives.extend(part.primitives),
                None => self.streams.push(part),
            }
        }
    }

    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn stream_names(&self) -> Vec<&str> {
        self.streams.iter().map(|s| s.stream.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn build(self) -> FrameMessage {
        FrameMessage {
            timestamp: self.timestamp,
            vehicle_pose: self.vehicle_pose,
            streams: self.streams,
        }
    }
}

// ============================================================================
// SCENE REPORT
// ============================================================================

/// A stream left out of one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedStream {
    pub stream: String,
    pub timestamp: f64,
    pub reason: String,
}

/// Outcome of one scene conversion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneReport {
    pub scene: String,

    /// Samples selected after the cap
    pub samples: usize,

    /// Frame packets written
    pub frames: usize,

    /// Streams declared in metadata
    pub streams: usize,

    pub start_time: f64,
    pub end_time: f64,

    pub skipped: Vec<SkippedStream>,
}

impl SceneReport {
    /// Number of skips per stream name.
    pub fn skipped_by_stream(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for skip in &self.skipped {
            *counts.entry(skip.stream.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// True if every declared stream made it into every frame it was due in.
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

// ============================================================================
// SCENE CONVERTER
// ============================================================================

/// One registered adapter and its per-scene status.
struct AdapterSlot {
    adapter: Box<dyn StreamAdapter>,
    streams: Vec<String>,
    /// Set when `load` failed; the adapter sits the scene out
    disabled: Option<String>,
}

/// Converts scenes into packet streams through a registered adapter list.
///
/// # Example
///
/// ```ignore
/// let mut converter = SceneConverter::new(ConverterConfig::default());
/// let mut sink = DirectorySink::create("out/scene-0001")?;
/// let report = converter.convert_scene(&scene, &mut sink)?;
/// ```
pub struct SceneConverter {
    config: ConverterConfig,
    slots: Vec<AdapterSlot>,
}

impl SceneConverter {
    /// A converter with the full nuScenes adapter set.
    pub fn new(config: ConverterConfig) -> Self {
        let adapters = default_adapters(&config);
        Self::with_adapters(config, adapters)
    }

    /// A converter with a custom adapter list, run in the given order.
    pub fn with_adapters(config: ConverterConfig, adapters: Vec<Box<dyn StreamAdapter>>) -> Self {
        Self {
            config,
            slots: adapters
                .into_iter()
                .map(|adapter| AdapterSlot {
                    adapter,
                    streams: Vec::new(),
                    disabled: None,
                })
                .collect(),
        }
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    /// Converts one scene into `sink`.
    ///
    /// # Returns
    /// The scene report, including every skipped (stream, sample) pair.
    ///
    /// # Errors
    /// Scene-level failures only; per-stream failures land in the report.
    pub fn convert_scene(
        &mut self,
        source: &dyn SceneSource,
        sink: &mut dyn PacketSink,
    ) -> Result<SceneReport, ConvertError> {
        let scene_name = source.scene_name().to_string();
        let phase = ConversionPhase::Init;
        self.config.validate()?;

        // ------------------------------------------------------------------
        // INIT
        // ------------------------------------------------------------------
        let mut samples = source.samples()?;
        if samples.is_empty() {
            return Err(ConvertError::scene(format!("{}: {} has no samples", phase, scene_name)));
        }
        if samples.windows(2).any(|w| w[1].timestamp < w[0].timestamp) {
            return Err(ConvertError::scene(format!(
                "{}: {} samples are not in timestamp order",
                phase, scene_name
            )));
        }
        if let Some(cap) = self.config.max_samples {
            samples.truncate(cap);
        }

        let scene_ctx = SceneContext {
            source,
            samples: &samples,
            config: &self.config,
        };

        let mut declared_streams: Vec<StreamMetadata> = Vec::new();
        for slot in &mut self.slots {
            slot.disabled = match slot.adapter.load(&scene_ctx) {
                Ok(()) => None,
                Err(e) => {
                    warn!("{}: adapter {} disabled: {}", scene_name, slot.adapter.name(), e);
                    Some(e.to_string())
                }
            };
            let metadata = slot.adapter.get_metadata();
            slot.streams = metadata.iter().map(|m| m.name.clone()).collect();
            if slot.disabled.is_none() {
                declared_streams.extend(metadata);
            }
        }

        let mut declared: HashMap<String, PrimitiveType> = HashMap::new();
        for stream in &declared_streams {
            if declared
                .insert(stream.name.clone(), stream.primitive_type)
                .is_some()
            {
                return Err(ConvertError::scene(format!(
                    "{}: stream {} declared twice",
                    phase, stream.name
                )));
            }
        }

        let start_time = samples[0].timestamp;
        let end_time = samples[samples.len() - 1].timestamp;
        let metadata = MetadataMessage::new(
            LogInfo {
                scene: scene_name.clone(),
                start_time,
                end_time,
            },
            declared_streams,
        );

        let mut report = SceneReport {
            scene: scene_name.clone(),
            samples: samples.len(),
            streams: declared.len(),
            start_time,
            end_time,
            ..SceneReport::default()
        };

        let mut packer = ProtocolPacker::new(sink);
        packer.write_metadata(metadata)?;
        info!(
            "{}: converting {} samples, {} streams",
            scene_name,
            samples.len(),
            declared.len()
        );

        // ------------------------------------------------------------------
        // PER SAMPLE
        // ------------------------------------------------------------------
        for (index, sample) in samples.iter().enumerate() {
            let t = sample.timestamp;

            // LOAD
            let ego_pose = source.ego_pose(t).map_err(|e| {
                ConvertError::scene(format!("{} t={:.6}: ego pose: {}", ConversionPhase::Load, t, e))
            })?;

            // TRANSFORM
            let ego = EgoState::new(ego_pose).map_err(|e| {
                ConvertError::scene(format!("{} t={:.6}: {}", ConversionPhase::Transform, t, e))
            })?;

            // CONVERT
            let ctx = SampleContext {
                source,
                sample,
                index,
                samples: &samples,
                ego: &ego,
            };
            let vehicle_pose = VehiclePose {
                position: ego.pose.translation,
                orientation: ego.pose.rotation,
            };
            let mut frame = FrameBuilder::new(&declared, t, vehicle_pose);

            for slot in &mut self.slots {
                if let Some(reason) = &slot.disabled {
                    for stream in &slot.streams {
                        report.skipped.push(SkippedStream {
                            stream: stream.clone(),
                            timestamp: t,
                            reason: reason.clone(),
                        });
                    }
                    continue;
                }

                let mut part = frame.scratch();
                match slot.adapter.convert_message(&ctx, &mut part) {
                    Ok(()) => frame.merge(part),
                    // An undeclared stream is a metadata bug, not a data gap.
                    Err(ConvertError::UnknownStream(stream)) => {
                        return Err(ConvertError::UnknownStream(stream));
                    }
                    Err(e) => {
                        for stream in &slot.streams {
                            warn!("{}: {} skipped at t={:.6}: {}", scene_name, stream, t, e);
                            report.skipped.push(SkippedStream {
                                stream: stream.clone(),
                                timestamp: t,
                                reason: e.to_string(),
                            });
                        }
                    }
                }
            }

            // ASSEMBLE
            report.skipped.append(&mut frame.skipped);
            debug!(
                "{} t={:.6}: {} streams",
                ConversionPhase::Assemble,
                t,
                frame.stream_names().len()
            );
            packer.write_frame(frame.build())?;
        }

        // ------------------------------------------------------------------
        // DONE
        // ------------------------------------------------------------------
        packer.finish()?;
        report.frames = packer.frames_written();

        info!(
            "{} {}: {} samples, {} frames, {} skipped streams",
            ConversionPhase::Done,
            scene_name,
            report.samples,
            report.frames,
            report.skipped.len()
        );
        for (stream, count) in report.skipped_by_stream() {
            info!("  {} skipped in {} of {} samples", stream, count, report.samples);
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packer::StreamReader;
    use crate::protocol::{Polyline, PrimitiveType};
    use nuviz_env::{Calibration, MemorySink, Pose, RecordedSample, RecordedScene};

    /// Emits one fixed polyline, or fails on samples listed in `fail_at`.
    struct FlakyAdapter {
        stream: &'static str,
        fail_at: Vec<usize>,
    }

    impl StreamAdapter for FlakyAdapter {
        fn name(&self) -> &str {
            self.stream
        }

        fn load(&mut self, _scene: &SceneContext<'_>) -> Result<(), ConvertError> {
            Ok(())
        }

        fn get_metadata(&self) -> Vec<StreamMetadata> {
            vec![StreamMetadata::new(self.stream, PrimitiveType::Polyline)]
        }

        fn convert_message(
            &mut self,
            sample: &SampleContext<'_>,
            frame: &mut FrameBuilder<'_>,
        ) -> Result<(), ConvertError> {
            if self.fail_at.contains(&sample.index) {
                return Err(ConvertError::missing(self.stream, sample.timestamp()));
            }
            frame.push(self.stream, Primitive::Polyline(Polyline::default()))
        }
    }

    /// Writes to a stream it never declared.
    struct RogueAdapter;

    impl StreamAdapter for RogueAdapter {
        fn name(&self) -> &str {
            "rogue"
        }

        fn load(&mut self, _scene: &SceneContext<'_>) -> Result<(), ConvertError> {
            Ok(())
        }

        fn get_metadata(&self) -> Vec<StreamMetadata> {
            Vec::new()
        }

        fn convert_message(
            &mut self,
            _sample: &SampleContext<'_>,
            frame: &mut FrameBuilder<'_>,
        ) -> Result<(), ConvertError> {
            frame.push("/undeclared", Primitive::Polyline(Polyline::default()))
        }
    }

    /// Declares a stream but can never load.
    struct UnloadableAdapter;

    impl StreamAdapter for UnloadableAdapter {
        fn name(&self) -> &str {
            "unloadable"
        }

        fn load(&mut self, _scene: &SceneContext<'_>) -> Result<(), ConvertError> {
            Err(ConvertError::scene("calibration unavailable"))
        }

        fn get_metadata(&self) -> Vec<StreamMetadata> {
            vec![StreamMetadata::new("/unloadable", PrimitiveType::Polyline)]
        }

        fn convert_message(
            &mut self,
            _sample: &SampleContext<'_>,
            frame: &mut FrameBuilder<'_>,
        ) -> Result<(), ConvertError> {
            frame.push("/unloadable", Primitive::Polyline(Polyline::default()))
        }
    }

    fn scene(n: usize) -> RecordedScene {
        let mut scene = RecordedScene::new("scene-test", vec![Calibration::new("LIDAR_TOP", [0.0; 3], [1.0, 0.0, 0.0, 0.0])]);
        for i in 0..n {
            let t = i as f64 * 0.5;
            scene.push_sample(RecordedSample {
                token: format!("s{}", i),
                timestamp: t,
                ego_pose: Pose::at([i as f64, 0.0, 0.0], t),
                readings: Vec::new(),
                annotations: Vec::new(),
            });
        }
        scene
    }

    fn flaky(stream: &'static str, fail_at: Vec<usize>) -> Box<dyn StreamAdapter> {
        Box::new(FlakyAdapter { stream, fail_at })
    }

    #[test]
    fn test_failing_adapter_only_loses_its_stream() {
        let mut converter = SceneConverter::with_adapters(
            ConverterConfig::default(),
            vec![flaky("/a", vec![1]), flaky("/b", vec![])],
        );
        let mut sink = MemorySink::new();
        let report = converter.convert_scene(&scene(3), &mut sink).unwrap();

        assert_eq!(report.frames, 3);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].stream, "/a");
        assert_eq!(report.skipped[0].timestamp, 0.5);

        let decoded = StreamReader::decode_all(&sink.packets).unwrap();
        assert_eq!(decoded.frames[1].stream_names().collect::<Vec<_>>(), vec!["/b"]);
        assert_eq!(decoded.frames[2].stream_names().count(), 2);
    }

    #[test]
    fn test_unloadable_adapter_left_out_of_metadata() {
        let unloadable: Box<dyn StreamAdapter> = Box::new(UnloadableAdapter);
        let mut converter = SceneConverter::with_adapters(
            ConverterConfig::default(),
            vec![unloadable, flaky("/b", vec![])],
        );
        let mut sink = MemorySink::new();
        let report = converter.convert_scene(&scene(2), &mut sink).unwrap();

        assert_eq!(report.streams, 1);
        assert_eq!(report.skipped_by_stream()["/unloadable"], 2);
        assert!(report.skipped[0].reason.contains("calibration unavailable"));

        let decoded = StreamReader::decode_all(&sink.packets).unwrap();
        assert!(!decoded.metadata.declares("/unloadable"));
        assert!(decoded.metadata.declares("/b"));
        assert_eq!(decoded.frames.len(), 2);
    }

    #[test]
    fn test_sample_cap_applied() {
        let config = ConverterConfig::default().with_max_samples(2);
        let mut converter = SceneConverter::with_adapters(config, vec![flaky("/a", vec![])]);
        let mut sink = MemorySink::new();
        let report = converter.convert_scene(&scene(5), &mut sink).unwrap();

        assert_eq!(report.samples, 2);
        assert_eq!(report.end_time, 0.5);
        assert_eq!(sink.packets.len(), 3);
        assert_eq!(sink.index.unwrap().frame_timestamps, vec![0.0, 0.5]);
    }

    #[test]
    fn test_vehicle_pose_carried_in_frame() {
        let mut converter =
            SceneConverter::with_adapters(ConverterConfig::default(), vec![flaky("/a", vec![])]);
        let mut sink = MemorySink::new();
        converter.convert_scene(&scene(2), &mut sink).unwrap();

        let decoded = StreamReader::decode_all(&sink.packets).unwrap();
        assert_eq!(decoded.frames[1].vehicle_pose.position, [1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_undeclared_stream_aborts_scene() {
        let mut converter =
            SceneConverter::with_adapters(ConverterConfig::default(), vec![Box::new(RogueAdapter)]);
        let mut sink = MemorySink::new();
        assert!(matches!(
            converter.convert_scene(&scene(2), &mut sink),
            Err(ConvertError::UnknownStream(_))
        ));
    }

    #[test]
    fn test_duplicate_declaration_aborts_scene() {
        let mut converter = SceneConverter::with_adapters(
            ConverterConfig::default(),
            vec![flaky("/a", vec![]), flaky("/a", vec![])],
        );
        let mut sink = MemorySink::new();
        assert!(matches!(
            converter.convert_scene(&scene(2), &mut sink),
            Err(ConvertError::Scene(_))
        ));
    }

    #[test]
    fn test_empty_scene_is_scene_error() {
        let mut converter = SceneConverter::new(ConverterConfig::default());
        let mut sink = MemorySink::new();
        assert!(matches!(
            converter.convert_scene(&scene(0), &mut sink),
            Err(ConvertError::Scene(_))
        ));
        assert!(sink.packets.is_empty());
    }

    #[test]
    fn test_invalid_ego_pose_aborts_scene() {
        let mut bad = scene(2);
        bad.samples[1].ego_pose.rotation = [0.0; 4];
        let mut converter =
            SceneConverter::with_adapters(ConverterConfig::default(), vec![flaky("/a", vec![])]);
        let mut sink = MemorySink::new();

        let err = converter.convert_scene(&bad, &mut sink).unwrap_err();
        assert!(err.to_string().contains("TRANSFORM"));
    }

    #[test]
    fn test_frame_builder_merges_same_stream() {
        let declared: HashMap<String, PrimitiveType> =
            [("/a".to_string(), PrimitiveType::Polyline)].into_iter().collect();
        let pose = VehiclePose {
            position: [0.0; 3],
            orientation: [1.0, 0.0, 0.0, 0.0],
        };
        let mut frame = FrameBuilder::new(&declared, 0.0, pose);
        frame.push("/a", Primitive::Polyline(Polyline::default())).unwrap();

        let mut part = frame.scratch();
        part.push("/a", Primitive::Polyline(Polyline::default())).unwrap();
        assert!(part.push("/a", Primitive::Points(Default::default())).is_err());
        frame.merge(part);

        let msg = frame.build();
        assert_eq!(msg.streams.len(), 1);
        assert_eq!(msg.streams[0].primitives.len(), 2);
    }
}
