//! Wire format of the visualization stream.
//!
//! A stream is one metadata packet followed by one frame packet per sample.
//! Every packet is a bincode-encoded [`Envelope`]:
//!
//! ```text
//! +-------+---------+------------------------------------+
//! | magic | version | body                               |
//! | NVIZ  | u16     | Metadata(MetadataMessage)          |
//! |       |         |   or Frame(FrameMessage)           |
//! +-------+---------+------------------------------------+
//! ```
//!
//! Geometry is stored as plain arrays so the format does not depend on the
//! math library's layout.

use crate::error::ConvertError;
use bincode::config::standard;
use bincode::{Decode, Encode};

/// Leading bytes of every packet.
pub const MAGIC: [u8; 4] = *b"NVIZ";

/// Current wire format version.
pub const PROTOCOL_VERSION: u16 = 1;

/// 8-bit RGBA colour.
pub type Rgba = [u8; 4];

// ============================================================================
// METADATA
// ============================================================================

/// Geometric kind of a stream's primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum PrimitiveType {
    Point,
    Image,
    Polygon,
    Polyline,
}

/// Frame in which a stream's coordinates are expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum CoordinateFrame {
    /// Relative to the ego vehicle at the frame's timestamp
    VehicleRelative,
    /// No transform applies (images)
    Identity,
}

/// Display hints. Unset fields fall back to the viewer's defaults.
#[derive(Debug, Clone, Default, PartialEq, Encode, Decode)]
pub struct StreamStyle {
    pub fill_color: Option<Rgba>,
    pub stroke_color: Option<Rgba>,
    pub stroke_width: Option<f32>,
    pub radius_pixels: Option<f32>,
    pub extruded: Option<bool>,
    pub height: Option<f32>,
}

/// A named style selected by a primitive's `classes`.
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct StyleClass {
    pub name: String,
    pub style: StreamStyle,
}

/// Sensor mounting pose in the vehicle frame.
#[derive(Debug, Clone, Copy, PartialEq, Encode, Decode)]
pub struct SensorPose {
    pub translation: [f64; 3],
    /// [w, x, y, z]
    pub rotation: [f64; 4],
}

/// Declaration of one stream.
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct StreamMetadata {
    pub name: String,
    pub primitive_type: PrimitiveType,
    pub coordinate: CoordinateFrame,
    pub style: StreamStyle,
    pub style_classes: Vec<StyleClass>,
    pub sensor_pose: Option<SensorPose>,
}

impl StreamMetadata {
    /// Declares a vehicle-relative stream with default style.
    pub fn new(name: impl Into<String>, primitive_type: PrimitiveType) -> Self {
        Self {
            name: name.into(),
            primitive_type,
            coordinate: CoordinateFrame::VehicleRelative,
            style: StreamStyle::default(),
            style_classes: Vec::new(),
            sensor_pose: None,
        }
    }

    pub fn with_coordinate(mut self, coordinate: CoordinateFrame) -> Self {
        self.coordinate = coordinate;
        self
    }

    pub fn with_style(mut self, style: StreamStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_style_classes(mut self, classes: Vec<StyleClass>) -> Self {
        self.style_classes = classes;
        self
    }

    pub fn with_sensor_pose(mut self, pose: SensorPose) -> Self {
        self.sensor_pose = Some(pose);
        self
    }
}

/// Scene-level information.
#[derive(Debug, Clone, Default, PartialEq, Encode, Decode)]
pub struct LogInfo {
    pub scene: String,
    pub start_time: f64,
    pub end_time: f64,
}

/// First packet of a stream: every stream any frame may reference.
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct MetadataMessage {
    pub version: u16,
    pub log_info: LogInfo,
    pub streams: Vec<StreamMetadata>,
}

impl MetadataMessage {
    pub fn new(log_info: LogInfo, streams: Vec<StreamMetadata>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            log_info,
            streams,
        }
    }

    /// Looks up a declared stream.
    pub fn stream(&self, name: &str) -> Option<&StreamMetadata> {
        self.streams.iter().find(|s| s.name == name)
    }

    /// True if `name` is declared.
    pub fn declares(&self, name: &str) -> bool {
        self.stream(name).is_some()
    }
}

// ============================================================================
// PRIMITIVES
// ============================================================================

/// A named per-point attribute, `stride` values per point.
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct PointAttribute {
    pub name: String,
    pub stride: u32,
    pub values: Vec<f32>,
}

/// A point cloud in the vehicle frame.
#[derive(Debug, Clone, Default, PartialEq, Encode, Decode)]
pub struct PointSet {
    /// Flat [x0, y0, z0, x1, y1, z1, ...]
    pub points: Vec<f32>,
    /// Flat RGBA per point
    pub colors: Option<Vec<u8>>,
    pub attributes: Vec<PointAttribute>,
}

impl PointSet {
    pub fn len(&self) -> usize {
        self.points.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Looks up an attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&PointAttribute> {
        self.attributes.iter().find(|a| a.name == name)
    }
}

/// An encoded image.
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct ImagePrimitive {
    pub data: Vec<u8>,
    pub width_px: u32,
    pub height_px: u32,
}

/// A closed outline.
#[derive(Debug, Clone, Default, PartialEq, Encode, Decode)]
pub struct Polygon {
    pub vertices: Vec<[f32; 3]>,
    pub id: Option<String>,
    pub classes: Vec<String>,
}

/// An open path.
#[derive(Debug, Clone, Default, PartialEq, Encode, Decode)]
pub struct Polyline {
    pub vertices: Vec<[f32; 3]>,
    pub id: Option<String>,
    pub classes: Vec<String>,
}

/// One drawable unit.
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub enum Primitive {
    Points(PointSet),
    Image(ImagePrimitive),
    Polygon(Polygon),
    Polyline(Polyline),
}

impl Primitive {
    pub fn primitive_type(&self) -> PrimitiveType {
        match self {
            Self::Points(_) => PrimitiveType::Point,
            Self::Image(_) => PrimitiveType::Image,
            Self::Polygon(_) => PrimitiveType::Polygon,
            Self::Polyline(_) => PrimitiveType::Polyline,
        }
    }
}

// ============================================================================
// FRAMES
// ============================================================================

/// Ego pose in the global frame.
#[derive(Debug, Clone, Copy, PartialEq, Encode, Decode)]
pub struct VehiclePose {
    pub position: [f64; 3],
    /// [w, x, y, z]
    pub orientation: [f64; 4],
}

/// All primitives of one stream within a frame.
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct StreamPrimitives {
    pub stream: String,
    pub primitives: Vec<Primitive>,
}

/// Everything drawn at one sample.
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct FrameMessage {
    pub timestamp: f64,
    pub vehicle_pose: VehiclePose,
    pub streams: Vec<StreamPrimitives>,
}

impl FrameMessage {
    /// Primitives of one stream, if present in this frame.
    pub fn stream(&self, name: &str) -> Option<&StreamPrimitives> {
        self.streams.iter().find(|s| s.stream == name)
    }

    pub fn stream_names(&self) -> impl Iterator<Item = &str> {
        self.streams.iter().map(|s| s.stream.as_str())
    }
}

// ============================================================================
// PACKETS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub enum PacketBody {
    Metadata(MetadataMessage),
    Frame(FrameMessage),
}

#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct Envelope {
    pub magic: [u8; 4],
    pub version: u16,
    pub body: PacketBody,
}

/// Wraps a body in an envelope and encodes it.
pub fn encode_packet(body: PacketBody) -> Result<Vec<u8>, ConvertError> {
    let envelope = Envelope {
        magic: MAGIC,
        version: PROTOCOL_VERSION,
        body,
    };
    bincode::encode_to_vec(&envelope, standard()).map_err(|e| ConvertError::Encode(e.to_string()))
}

/// Decodes one packet, checking magic and version before the body.
pub fn decode_packet(bytes: &[u8]) -> Result<PacketBody, ConvertError> {
    let ((magic, version), _): (([u8; 4], u16), usize) =
        bincode::decode_from_slice(bytes, standard())
            .map_err(|e| ConvertError::Decode(e.to_string()))?;

    if magic != MAGIC {
        return Err(ConvertError::Decode(format!("bad magic {:?}", magic)));
    }
    if version != PROTOCOL_VERSION {
        return Err(ConvertError::Decode(format!(
            "unsupported protocol version {} (expected {})",
            version, PROTOCOL_VERSION
        )));
    }

    let (envelope, read): (Envelope, usize) = bincode::decode_from_slice(bytes, standard())
        .map_err(|e| ConvertError::Decode(e.to_string()))?;
    if read != bytes.len() {
        return Err(ConvertError::Decode(format!(
            "{} trailing bytes after packet",
            bytes.len() - read
        )));
    }
    Ok(envelope.body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frame() -> FrameMessage {
        FrameMessage {
            timestamp: 1.5,
            vehicle_pose: VehiclePose {
                position: [1.0, 2.0, 0.0],
                orientation: [1.0, 0.0, 0.0, 0.0],
            },
            streams: vec![StreamPrimitives {
                stream: "/object/boxes".to_string(),
                primitives: vec![Primitive::Polygon(Polygon {
                    vertices: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0]],
                    id: Some("obj-1".to_string()),
                    classes: vec!["car".to_string()],
                })],
            }],
        }
    }

    #[test]
    fn test_frame_packet_decodes() {
        let bytes = encode_packet(PacketBody::Frame(sample_frame())).unwrap();
        assert_eq!(&bytes[..4], b"NVIZ");

        match decode_packet(&bytes).unwrap() {
            PacketBody::Frame(frame) => {
                assert_eq!(frame, sample_frame());
                assert_eq!(frame.stream_names().collect::<Vec<_>>(), vec!["/object/boxes"]);
            }
            other => panic!("expected frame, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut bytes = encode_packet(PacketBody::Frame(sample_frame())).unwrap();
        bytes[0] = b'X';
        assert!(matches!(decode_packet(&bytes), Err(ConvertError::Decode(_))));
    }

    #[test]
    fn test_future_version_rejected() {
        let envelope = Envelope {
            magic: MAGIC,
            version: PROTOCOL_VERSION + 1,
            body: PacketBody::Frame(sample_frame()),
        };
        let bytes = bincode::encode_to_vec(&envelope, standard()).unwrap();
        let err = decode_packet(&bytes).unwrap_err();
        assert!(err.to_string().contains("unsupported protocol version"));
    }

    #[test]
    fn test_truncated_packet_rejected() {
        let bytes = encode_packet(PacketBody::Frame(sample_frame())).unwrap();
        assert!(decode_packet(&bytes[..bytes.len() - 3]).is_err());
    }

    #[test]
    fn test_metadata_lookup() {
        let meta = MetadataMessage::new(
            LogInfo::default(),
            vec![StreamMetadata::new("/lidar/points", PrimitiveType::Point)],
        );
        assert!(meta.declares("/lidar/points"));
        assert!(!meta.declares("/radar/front"));
        assert_eq!(meta.version, PROTOCOL_VERSION);
    }
}
