//! Chunked, randomly addressable frame store.
//!
//! Layout on disk:
//!
//! ```text
//! <store>/metadata.json        {"chunksize": 100, "frame_min": 0, "frame_max": 249, "extension": "png"}
//! <store>/000000/000000.png    first frame of chunk 0
//! <store>/000000/index.json    optional [{"frame_number": 0, "frame_time": 0.0}, ...]
//! <store>/000001/...
//! ```
//!
//! Frame `frame_min + i` lives in chunk `i / chunksize` at position
//! `i % chunksize`. `frame_max` is inclusive.

use image::DynamicImage;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::SourceTimestamp;
use crate::frame::PixelType;
use crate::{Error, Result};

pub const METADATA_FILE: &str = "metadata.json";
const INDEX_FILE: &str = "index.json";

#[derive(Debug, Clone, Deserialize)]
pub struct StoreMetadata {
    pub chunksize: u64,
    pub frame_min: i64,
    pub frame_max: i64,
    #[serde(default = "default_extension")]
    pub extension: String,
}

fn default_extension() -> String {
    "png".to_string()
}

#[derive(Debug, Clone, Deserialize)]
struct IndexEntry {
    frame_number: i64,
    frame_time: f64,
}

pub struct StoreSource {
    root: PathBuf,
    meta: StoreMetadata,
    width: u32,
    height: u32,
    pixel_type: PixelType,
    next: u64,
    chunk_index: HashMap<u64, Vec<IndexEntry>>,
    frames_read: Vec<SourceTimestamp>,
}

impl StoreSource {
    pub fn is_store(dir: &Path) -> bool {
        dir.join(METADATA_FILE).is_file()
    }

    pub fn open(root: &Path) -> Result<Self> {
        let meta_path = root.join(METADATA_FILE);
        if !meta_path.is_file() {
            return Err(Error::not_found(&meta_path));
        }
        let meta: StoreMetadata = serde_json::from_str(&std::fs::read_to_string(&meta_path)?)?;
        if meta.chunksize == 0 {
            return Err(Error::Configuration(format!(
                "{}: chunksize must be greater than zero",
                meta_path.display()
            )));
        }
        if meta.frame_max < meta.frame_min {
            return Err(Error::Configuration(format!(
                "{}: frame_max {} precedes frame_min {}",
                meta_path.display(),
                meta.frame_max,
                meta.frame_min
            )));
        }

        let mut store = Self {
            root: root.to_path_buf(),
            meta,
            width: 0,
            height: 0,
            pixel_type: PixelType::U8,
            next: 0,
            chunk_index: HashMap::new(),
            frames_read: Vec::new(),
        };
        let first = image::open(store.frame_path(0))?;
        store.width = first.width();
        store.height = first.height();
        store.pixel_type = PixelType::of(&first);

        log::info!(
            "frame store {}: frames {}..={}, chunksize {}",
            root.display(),
            store.meta.frame_min,
            store.meta.frame_max,
            store.meta.chunksize
        );
        Ok(store)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel_type(&self) -> PixelType {
        self.pixel_type
    }

    /// Number of frames in the store.
    pub fn len(&self) -> u64 {
        (self.meta.frame_max - self.meta.frame_min + 1) as u64
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sequential read; stops once `frame_max` has been served.
    pub fn read(&mut self) -> Result<Option<DynamicImage>> {
        let frame = self.read_at(self.next)?;
        if frame.is_some() {
            self.next += 1;
        }
        Ok(frame)
    }

    /// Seek to position `index` (0-based from `frame_min`).
    pub fn read_at(&mut self, index: u64) -> Result<Option<DynamicImage>> {
        if index >= self.len() {
            return Ok(None);
        }
        let image = image::open(self.frame_path(index))?;
        let stamp = self.timestamp_for(index)?;
        self.frames_read.push(stamp);
        Ok(Some(image))
    }

    pub fn frame_timestamps(&self) -> &[SourceTimestamp] {
        &self.frames_read
    }

    pub fn release(&mut self) {
        self.chunk_index.clear();
    }

    fn frame_path(&self, index: u64) -> PathBuf {
        let chunk = index / self.meta.chunksize;
        let offset = index % self.meta.chunksize;
        self.root
            .join(format!("{:06}", chunk))
            .join(format!("{:06}.{}", offset, self.meta.extension))
    }

    fn timestamp_for(&mut self, index: u64) -> Result<SourceTimestamp> {
        let chunk = index / self.meta.chunksize;
        let offset = (index % self.meta.chunksize) as usize;
        if !self.chunk_index.contains_key(&chunk) {
            let path = self
                .root
                .join(format!("{:06}", chunk))
                .join(INDEX_FILE);
            let entries = if path.is_file() {
                serde_json::from_str(&std::fs::read_to_string(&path)?)?
            } else {
                Vec::new()
            };
            self.chunk_index.insert(chunk, entries);
        }
        let frame = self.meta.frame_min + index as i64;
        Ok(self
            .chunk_index
            .get(&chunk)
            .and_then(|entries| entries.get(offset))
            .map(|e| SourceTimestamp {
                frame: e.frame_number,
                time: e.frame_time,
            })
            .unwrap_or(SourceTimestamp {
                frame,
                time: f64::NAN,
            }))
    }
}
