//! nuviz Core - driving-scene recordings to a visualization packet stream
//!
//! Turns each sample of a recorded scene into one self-describing frame:
//! 1. **Transform Engine**: global frame <-> moving ego frame, as rigid isometries
//! 2. **Stream Adapters**: lidar, radar, camera, annotations and ego path,
//!    each a `StreamAdapter`
//! 3. **History/Future Engine**: per-object trails and constant-velocity
//!    predictions over an indexed annotation arena
//! 4. **Frame Assembler**: runs the adapters per sample, isolating failures
//! 5. **Protocol Packer**: metadata packet first, then one packet per frame
//!
//! Data only ever flows upward:
//!
//! ```text
//! SceneSource -> EgoState -> adapters -> FrameBuilder -> ProtocolPacker -> PacketSink
//! ```

pub mod adapters;
pub mod assembler;
pub mod category;
pub mod config;
pub mod error;
pub mod history;
pub mod packer;
pub mod protocol;
pub mod transform;

pub use adapters::{
    default_adapters, AnnotationAdapter, CameraAdapter, LidarAdapter, PoseAdapter, RadarAdapter,
    SampleContext, SceneContext, StreamAdapter,
};
pub use assembler::{ConversionPhase, FrameBuilder, SceneConverter, SceneReport, SkippedStream};
pub use category::ObjectClass;
pub use config::ConverterConfig;
pub use error::ConvertError;
pub use history::{AnnotationIndex, TrajectorySample};
pub use packer::{DecodedStream, ProtocolPacker, StreamReader};
pub use protocol::{
    decode_packet, encode_packet, FrameMessage, MetadataMessage, PacketBody, Primitive,
    PrimitiveType, StreamMetadata, PROTOCOL_VERSION,
};
pub use transform::{to_global_frame, to_vehicle_frame, EgoState, SensorExtrinsic};
