//! Output sinks for encoded protocol packets.

use crate::error::EnvError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File extension of packet files written by [`DirectorySink`].
pub const PACKET_EXTENSION: &str = "nviz";

/// Name of the index file written by [`DirectorySink::finish`].
pub const INDEX_FILE: &str = "index.json";

/// Summary of a finished packet stream.
///
/// Packet 0 is always the metadata packet; `frame_timestamps[i]` is the
/// timestamp of packet `i + 1`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamIndex {
    pub start_time: f64,
    pub end_time: f64,
    pub frame_timestamps: Vec<f64>,
}

/// Destination for an ordered sequence of encoded packets.
///
/// # Packet Flow
///
/// ```text
/// Packer                       Sink
///   |-- write_packet(0, meta) -->|
///   |-- write_packet(1, f1) ---->|
///   |-- ...                      |
///   |-- finish(index) ---------->|
/// ```
pub trait PacketSink {
    /// Stores one encoded packet at position `index`.
    fn write_packet(&mut self, index: usize, bytes: &[u8]) -> Result<(), EnvError>;

    /// Flushes the stream and records its index.
    fn finish(&mut self, index: &StreamIndex) -> Result<(), EnvError>;
}

/// True for names of the form `<index>-frame.nviz`.
fn is_packet_file(name: &str) -> bool {
    name.strip_suffix(PACKET_EXTENSION)
        .and_then(|stem| stem.strip_suffix("-frame."))
        .is_some_and(|index| !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()))
}

/// Writes one file per packet into a directory: `<dir>/<index>-frame.nviz`.
#[derive(Debug)]
pub struct DirectorySink {
    dir: PathBuf,
    written: usize,
}

impl DirectorySink {
    /// Creates the directory (and parents) if needed.
    ///
    /// Packet files and the index left by an earlier stream in the same
    /// directory are removed; other files are left alone.
    ///
    /// # Errors
    /// `EnvError::Io` if the directory cannot be created or cleared.
    pub fn create(dir: impl AsRef<Path>) -> Result<Self, EnvError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let mut removed = 0;
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            let stale = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name == INDEX_FILE || is_packet_file(name));
            if stale && path.is_file() {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        if removed > 0 {
            debug!("Removed {} stale files from {}", removed, dir.display());
        }

        Ok(Self { dir, written: 0 })
    }

    /// Path of the packet file at `index`.
    pub fn packet_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("{}-frame.{}", index, PACKET_EXTENSION))
    }

    /// Output directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of packets written so far.
    pub fn written(&self) -> usize {
        self.written
    }

    /// Reads back every packet file in index order.
    pub fn read_packets(dir: impl AsRef<Path>) -> Result<Vec<Vec<u8>>, EnvError> {
        let dir = dir.as_ref();
        let mut packets = Vec::new();
        loop {
            let path = dir.join(format!("{}-frame.{}", packets.len(), PACKET_EXTENSION));
            if !path.exists() {
                break;
            }
            packets.push(fs::read(path)?);
        }
        Ok(packets)
    }

    /// Reads the index file of a finished stream.
    pub fn read_index(dir: impl AsRef<Path>) -> Result<StreamIndex, EnvError> {
        let bytes = fs::read(dir.as_ref().join(INDEX_FILE))?;
        serde_json::from_slice(&bytes).map_err(EnvError::parse)
    }
}

impl PacketSink for DirectorySink {
    fn write_packet(&mut self, index: usize, bytes: &[u8]) -> Result<(), EnvError> {
        fs::write(self.packet_path(index), bytes)?;
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self, index: &StreamIndex) -> Result<(), EnvError> {
        let json = serde_json::to_vec_pretty(index).map_err(EnvError::parse)?;
        fs::write(self.dir.join(INDEX_FILE), json)?;
        debug!("Finished {} packets in {}", self.written, self.dir.display());
        Ok(())
    }
}

/// Keeps packets in memory; used by tests and embedders.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pub packets: Vec<Vec<u8>>,
    pub index: Option<StreamIndex>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once `finish` has been called.
    pub fn is_finished(&self) -> bool {
        self.index.is_some()
    }
}

impl PacketSink for MemorySink {
    fn write_packet(&mut self, index: usize, bytes: &[u8]) -> Result<(), EnvError> {
        if index != self.packets.len() {
            return Err(EnvError::parse(format!(
                "packet index {} out of sequence (expected {})",
                index,
                self.packets.len()
            )));
        }
        self.packets.push(bytes.to_vec());
        Ok(())
    }

    fn finish(&mut self, index: &StreamIndex) -> Result<(), EnvError> {
        self.index = Some(index.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_sink_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("scene-0001");

        let mut sink = DirectorySink::create(&out).unwrap();
        sink.write_packet(0, b"meta").unwrap();
        sink.write_packet(1, b"frame-1").unwrap();
        sink.finish(&StreamIndex {
            start_time: 0.0,
            end_time: 0.0,
            frame_timestamps: vec![0.0],
        })
        .unwrap();

        assert_eq!(sink.written(), 2);
        assert!(out.join("0-frame.nviz").exists());

        let packets = DirectorySink::read_packets(&out).unwrap();
        assert_eq!(packets, vec![b"meta".to_vec(), b"frame-1".to_vec()]);

        let index = DirectorySink::read_index(&out).unwrap();
        assert_eq!(index.frame_timestamps, vec![0.0]);
    }

    #[test]
    fn test_recreate_clears_previous_stream() {
        let dir = tempfile::tempdir().unwrap();
        let index = |n: usize| StreamIndex {
            start_time: 0.0,
            end_time: 0.0,
            frame_timestamps: vec![0.0; n],
        };

        let mut first = DirectorySink::create(dir.path()).unwrap();
        for i in 0..5 {
            first.write_packet(i, format!("old-{}", i).as_bytes()).unwrap();
        }
        first.finish(&index(4)).unwrap();
        fs::write(dir.path().join("notes.txt"), b"keep").unwrap();

        let mut second = DirectorySink::create(dir.path()).unwrap();
        assert!(!dir.path().join(INDEX_FILE).exists());
        second.write_packet(0, b"meta").unwrap();
        second.write_packet(1, b"frame-1").unwrap();
        second.finish(&index(1)).unwrap();

        let packets = DirectorySink::read_packets(dir.path()).unwrap();
        assert_eq!(packets, vec![b"meta".to_vec(), b"frame-1".to_vec()]);
        assert_eq!(DirectorySink::read_index(dir.path()).unwrap().frame_timestamps.len(), 1);
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn test_packet_file_names() {
        assert!(is_packet_file("0-frame.nviz"));
        assert!(is_packet_file("12-frame.nviz"));
        assert!(!is_packet_file("-frame.nviz"));
        assert!(!is_packet_file("a-frame.nviz"));
        assert!(!is_packet_file("run.json"));
    }

    #[test]
    fn test_memory_sink_rejects_gaps() {
        let mut sink = MemorySink::new();
        sink.write_packet(0, b"meta").unwrap();
        assert!(sink.write_packet(2, b"frame").is_err());
        assert!(!sink.is_finished());
    }
}
