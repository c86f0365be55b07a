//! The Protocol Packer - metadata once, then one packet per frame.
//!
//! The packer owns the stream-level invariants:
//! - metadata is packet 0 and is written exactly once
//! - every stream a frame references was declared in metadata
//! - frames arrive in timestamp order
//!
//! [`StreamReader`] checks the same invariants on the way back in.

use crate::error::ConvertError;
use crate::protocol::{
    decode_packet, encode_packet, FrameMessage, MetadataMessage, PacketBody, PrimitiveType,
};
use nuviz_env::{PacketSink, StreamIndex};
use std::collections::HashMap;
use tracing::debug;

/// Serializes a scene into a packet sink.
pub struct ProtocolPacker<'a> {
    sink: &'a mut dyn PacketSink,
    metadata: Option<MetadataMessage>,
    next_index: usize,
    frame_timestamps: Vec<f64>,
}

impl<'a> ProtocolPacker<'a> {
    pub fn new(sink: &'a mut dyn PacketSink) -> Self {
        Self {
            sink,
            metadata: None,
            next_index: 0,
            frame_timestamps: Vec::new(),
        }
    }

    /// Writes the metadata packet (packet 0).
    pub fn write_metadata(&mut self, metadata: MetadataMessage) -> Result<(), ConvertError> {
        if self.metadata.is_some() {
            return Err(ConvertError::MetadataAlreadyWritten);
        }
        let bytes = encode_packet(PacketBody::Metadata(metadata.clone()))?;
        self.sink.write_packet(self.next_index, &bytes)?;
        debug!(
            "Metadata: {} streams, {} bytes",
            metadata.streams.len(),
            bytes.len()
        );
        self.next_index += 1;
        self.metadata = Some(metadata);
        Ok(())
    }

    /// Writes one frame packet.
    ///
    /// # Errors
    /// * `MetadataMissing` - no metadata packet yet
    /// * `UnknownStream` - the frame references an undeclared stream
    /// * `OutOfOrder` - the frame is older than the previous one
    pub fn write_frame(&mut self, frame: FrameMessage) -> Result<(), ConvertError> {
        let metadata = self.metadata.as_ref().ok_or(ConvertError::MetadataMissing)?;

        if let Some(name) = frame.stream_names().find(|name| !metadata.declares(name)) {
            return Err(ConvertError::UnknownStream(name.to_string()));
        }
        if let Some(&previous) = self.frame_timestamps.last() {
            if frame.timestamp < previous {
                return Err(ConvertError::OutOfOrder {
                    previous,
                    current: frame.timestamp,
                });
            }
        }

        let timestamp = frame.timestamp;
        let bytes = encode_packet(PacketBody::Frame(frame))?;
        self.sink.write_packet(self.next_index, &bytes)?;
        self.next_index += 1;
        self.frame_timestamps.push(timestamp);
        Ok(())
    }

    /// Number of frame packets written.
    pub fn frames_written(&self) -> usize {
        self.frame_timestamps.len()
    }

    /// Closes the stream and hands its index to the sink.
    pub fn finish(&mut self) -> Result<StreamIndex, ConvertError> {
        let metadata = self.metadata.as_ref().ok_or(ConvertError::MetadataMissing)?;
        let index = StreamIndex {
            start_time: metadata.log_info.start_time,
            end_time: metadata.log_info.end_time,
            frame_timestamps: self.frame_timestamps.clone(),
        };
        self.sink.finish(&index)?;
        Ok(index)
    }
}

/// A fully decoded packet stream.
#[derive(Debug, Clone)]
pub struct DecodedStream {
    pub metadata: MetadataMessage,
    pub frames: Vec<FrameMessage>,
}

/// Incremental decoder that re-checks the stream invariants.
#[derive(Debug, Default)]
pub struct StreamReader {
    metadata: Option<MetadataMessage>,
    declared: HashMap<String, PrimitiveType>,
    frames: Vec<FrameMessage>,
}

impl StreamReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes and validates the next packet.
    pub fn push(&mut self, bytes: &[u8]) -> Result<(), ConvertError> {
        match decode_packet(bytes)? {
            PacketBody::Metadata(metadata) => {
                if self.metadata.is_some() {
                    return Err(ConvertError::MetadataAlreadyWritten);
                }
                self.declared = metadata
                    .streams
                    .iter()
                    .map(|s| (s.name.clone(), s.primitive_type))
                    .collect();
                self.metadata = Some(metadata);
            }
            PacketBody::Frame(frame) => {
                if self.metadata.is_none() {
                    return Err(ConvertError::MetadataMissing);
                }
                for stream in &frame.streams {
                    let Some(expected) = self.declared.get(&stream.stream) else {
                        return Err(ConvertError::UnknownStream(stream.stream.clone()));
                    };
                    if let Some(bad) = stream
                        .primitives
                        .iter()
                        .find(|p| p.primitive_type() != *expected)
                    {
                        return Err(ConvertError::Decode(format!(
                            "{} declared as {:?} but carries {:?}",
                            stream.stream,
                            expected,
                            bad.primitive_type()
                        )));
                    }
                }
                if let Some(previous) = self.frames.last().map(|f| f.timestamp) {
                    if frame.timestamp < previous {
                        return Err(ConvertError::OutOfOrder {
                            previous,
                            current: frame.timestamp,
                        });
                    }
                }
                self.frames.push(frame);
            }
        }
        Ok(())
    }

    /// Returns the decoded stream.
    pub fn finish(self) -> Result<DecodedStream, ConvertError> {
        let metadata = self.metadata.ok_or(ConvertError::MetadataMissing)?;
        Ok(DecodedStream {
            metadata,
            frames: self.frames,
        })
    }

    /// Decodes an ordered packet sequence in one go.
    pub fn decode_all<B: AsRef<[u8]>>(packets: &[B]) -> Result<DecodedStream, ConvertError> {
        let mut reader = Self::new();
        for packet in packets {
            reader.push(packet.as_ref())?;
        }
        reader.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{
        LogInfo, Polyline, Primitive, StreamMetadata, StreamPrimitives, VehiclePose,
    };
    use nuviz_env::MemorySink;

    fn metadata() -> MetadataMessage {
        MetadataMessage::new(
            LogInfo {
                scene: "scene-0001".to_string(),
                start_time: 0.0,
                end_time: 1.0,
            },
            vec![StreamMetadata::new("/vehicle/trajectory", PrimitiveType::Polyline)],
        )
    }

    fn frame(timestamp: f64, stream: &str) -> FrameMessage {
        FrameMessage {
            timestamp,
            vehicle_pose: VehiclePose {
                position: [0.0; 3],
                orientation: [1.0, 0.0, 0.0, 0.0],
            },
            streams: vec![StreamPrimitives {
                stream: stream.to_string(),
                primitives: vec![Primitive::Polyline(Polyline {
                    vertices: vec![[0.0; 3], [1.0, 0.0, 0.0]],
                    ..Polyline::default()
                })],
            }],
        }
    }

    #[test]
    fn test_pack_and_read_back() {
        let mut sink = MemorySink::new();
        let mut packer = ProtocolPacker::new(&mut sink);
        packer.write_metadata(metadata()).unwrap();
        packer.write_frame(frame(0.0, "/vehicle/trajectory")).unwrap();
        packer.write_frame(frame(0.5, "/vehicle/trajectory")).unwrap();
        let index = packer.finish().unwrap();

        assert_eq!(index.frame_timestamps, vec![0.0, 0.5]);
        assert_eq!(sink.packets.len(), 3);
        assert!(sink.is_finished());

        let decoded = StreamReader::decode_all(&sink.packets).unwrap();
        assert_eq!(decoded.metadata.log_info.scene, "scene-0001");
        assert_eq!(decoded.frames.len(), 2);
    }

    #[test]
    fn test_undeclared_stream_fails_loudly() {
        let mut sink = MemorySink::new();
        let mut packer = ProtocolPacker::new(&mut sink);
        packer.write_metadata(metadata()).unwrap();

        let err = packer.write_frame(frame(0.0, "/radar/radar_front")).unwrap_err();
        assert!(matches!(err, ConvertError::UnknownStream(ref s) if s == "/radar/radar_front"));
        assert_eq!(packer.frames_written(), 0);
    }

    #[test]
    fn test_frame_before_metadata_rejected() {
        let mut sink = MemorySink::new();
        let mut packer = ProtocolPacker::new(&mut sink);
        assert!(matches!(
            packer.write_frame(frame(0.0, "/vehicle/trajectory")),
            Err(ConvertError::MetadataMissing)
        ));
    }

    #[test]
    fn test_metadata_written_once() {
        let mut sink = MemorySink::new();
        let mut packer = ProtocolPacker::new(&mut sink);
        packer.write_metadata(metadata()).unwrap();
        assert!(matches!(
            packer.write_metadata(metadata()),
            Err(ConvertError::MetadataAlreadyWritten)
        ));
    }

    #[test]
    fn test_time_regression_rejected() {
        let mut sink = MemorySink::new();
        let mut packer = ProtocolPacker::new(&mut sink);
        packer.write_metadata(metadata()).unwrap();
        packer.write_frame(frame(1.0, "/vehicle/trajectory")).unwrap();
        assert!(matches!(
            packer.write_frame(frame(0.5, "/vehicle/trajectory")),
            Err(ConvertError::OutOfOrder { .. })
        ));
    }

    #[test]
    fn test_reader_requires_metadata_first() {
        let bytes = encode_packet(PacketBody::Frame(frame(0.0, "/vehicle/trajectory"))).unwrap();
        let mut reader = StreamReader::new();
        assert!(matches!(reader.push(&bytes), Err(ConvertError::MetadataMissing)));
    }

    #[test]
    fn test_reader_rejects_type_mismatch() {
        let meta = encode_packet(PacketBody::Metadata(MetadataMessage::new(
            LogInfo::default(),
            vec![StreamMetadata::new("/vehicle/trajectory", PrimitiveType::Polygon)],
        )))
        .unwrap();
        let frame = encode_packet(PacketBody::Frame(frame(0.0, "/vehicle/trajectory"))).unwrap();

        let mut reader = StreamReader::new();
        reader.push(&meta).unwrap();
        assert!(matches!(reader.push(&frame), Err(ConvertError::Decode(_))));
    }
}
