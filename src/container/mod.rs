//! Masked-video container.
//!
//! One SQLite file holds the logical layout:
//!
//! ```text
//! /mask                 u8  [frames, H, W]  one frame per chunk
//!   attrs: has_finished, expected_fps, is_light_background
//! /full_data            u8  [snapshots, H, W]  one frame per chunk
//!   attrs: save_interval, expected_fps
//! /normalization_range  f32 [frames, 2]  (non-8-bit sources only)
//! /video_metadata       table, one record per probed frame
//! /timestamp/raw        i64 [frames]
//! /timestamp/time       f64 [frames]
//! ```
//!
//! A dataset's logical length is its capacity; rows that were never written
//! read back as zeros. Image datasets grow in steps of `GROWTH_STEP` rows and
//! are trimmed to the written length by `finalize_datasets`.
//!
//! `/mask` carries `has_finished = 0` from creation until `finish()`. Readers
//! must treat a file with `has_finished = 0` as incomplete.

pub mod codec;

use image::GrayImage;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::probe::{Column, VideoMetadata};
use crate::{Error, Result};
use codec::{Dtype, Element};

pub const MASK: &str = "/mask";
pub const FULL_DATA: &str = "/full_data";
pub const NORMALIZATION_RANGE: &str = "/normalization_range";
pub const VIDEO_METADATA: &str = "/video_metadata";
pub const TIMESTAMP_RAW: &str = "/timestamp/raw";
pub const TIMESTAMP_TIME: &str = "/timestamp/time";

/// Rows added whenever an image dataset runs out of capacity.
pub const GROWTH_STEP: u64 = 1000;
/// Rows per chunk for 1D/2D numeric arrays.
const ARRAY_CHUNK_ROWS: u64 = 4096;

const IMAGE_ATTRIBUTES: [(&str, &str); 5] = [
    ("CLASS", "IMAGE"),
    ("IMAGE_SUBCLASS", "IMAGE_GRAYSCALE"),
    ("IMAGE_WHITE_IS_ZERO", "0"),
    ("DISPLAY_ORIGIN", "UL"),
    ("IMAGE_VERSION", "1.2"),
];

fn ensure_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS datasets (
          name TEXT PRIMARY KEY,
          dtype TEXT NOT NULL,
          row_shape TEXT NOT NULL,
          capacity INTEGER NOT NULL,
          chunk_rows INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS attributes (
          dataset TEXT NOT NULL,
          key TEXT NOT NULL,
          value TEXT NOT NULL,
          PRIMARY KEY (dataset, key)
        );

        CREATE TABLE IF NOT EXISTS chunks (
          dataset TEXT NOT NULL,
          chunk INTEGER NOT NULL,
          rows INTEGER NOT NULL,
          checksum BLOB NOT NULL,
          payload BLOB NOT NULL,
          PRIMARY KEY (dataset, chunk)
        );

        CREATE TABLE IF NOT EXISTS tables (
          name TEXT NOT NULL,
          field TEXT NOT NULL,
          position INTEGER NOT NULL,
          kind TEXT NOT NULL,
          payload TEXT NOT NULL,
          PRIMARY KEY (name, field)
        );
        "#,
    )?;
    Ok(())
}

/// Written length and allocated capacity of a growable image dataset.
#[derive(Clone, Copy, Debug, Default)]
struct Extent {
    len: u64,
    capacity: u64,
}

// ----------------------------------------------------------------------------
// Writer
// ----------------------------------------------------------------------------

pub struct ContainerWriter {
    conn: Connection,
    path: PathBuf,
    width: u32,
    height: u32,
    images: HashMap<&'static str, Extent>,
}

impl ContainerWriter {
    /// Create a fresh container at `path`, replacing any existing file.
    ///
    /// `initial_frames` sizes `/mask` up front (expected frame count, or 1
    /// when unknown).
    pub fn create(path: &Path, width: u32, height: u32, initial_frames: u64) -> Result<Self> {
        if path.exists() {
            log::debug!("replacing existing container {}", path.display());
            std::fs::remove_file(path)?;
        }
        let conn = Connection::open(path)?;
        ensure_schema(&conn)?;

        let mut writer = Self {
            conn,
            path: path.to_path_buf(),
            width,
            height,
            images: HashMap::new(),
        };
        writer.create_image_dataset(MASK, initial_frames.max(1))?;
        writer.create_image_dataset(FULL_DATA, 1)?;
        writer.set_attribute(MASK, "has_finished", 0)?;
        log::info!(
            "container {} created ({}x{}, {} frames reserved)",
            path.display(),
            width,
            height,
            initial_frames.max(1)
        );
        Ok(writer)
    }

    fn create_image_dataset(&mut self, name: &'static str, capacity: u64) -> Result<()> {
        let shape = serde_json::to_string(&[self.height, self.width])?;
        self.conn.execute(
            "INSERT INTO datasets (name, dtype, row_shape, capacity, chunk_rows) VALUES (?1, ?2, ?3, ?4, 1)",
            params![name, Dtype::U8.name(), shape, capacity as i64],
        )?;
        for (key, value) in IMAGE_ATTRIBUTES {
            self.set_attribute(name, key, value)?;
        }
        self.images.insert(name, Extent { len: 0, capacity });
        Ok(())
    }

    pub fn set_attribute<V: Serialize>(&self, dataset: &str, key: &str, value: V) -> Result<()> {
        let json = serde_json::to_string(&value)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO attributes (dataset, key, value) VALUES (?1, ?2, ?3)",
            params![dataset, key, json],
        )?;
        Ok(())
    }

    /// Frames written so far to an image dataset.
    pub fn len(&self, dataset: &str) -> u64 {
        self.images.get(dataset).map(|e| e.len).unwrap_or(0)
    }

    fn extent(&self, dataset: &str) -> Result<(&'static str, Extent)> {
        self.images
            .get_key_value(dataset)
            .map(|(k, v)| (*k, *v))
            .ok_or_else(|| Error::Corrupt {
                path: self.path.clone(),
                reason: format!("{} is not an image dataset", dataset),
            })
    }

    pub fn append_frame(&mut self, dataset: &str, frame: &GrayImage) -> Result<()> {
        self.append_frames(dataset, std::slice::from_ref(frame))
    }

    /// Append `frames` after the last written row, growing capacity if needed.
    pub fn append_frames(&mut self, dataset: &str, frames: &[GrayImage]) -> Result<()> {
        if frames.is_empty() {
            return Ok(());
        }
        let (name, mut extent) = self.extent(dataset)?;
        let end = extent.len + frames.len() as u64;
        let grow = end > extent.capacity;
        if grow {
            extent.capacity = end + GROWTH_STEP;
            log::debug!("{} grown to {} frames", name, extent.capacity);
        }

        let tx = self.conn.transaction()?;
        {
            let mut insert = tx.prepare_cached(
                "INSERT OR REPLACE INTO chunks (dataset, chunk, rows, checksum, payload) VALUES (?1, ?2, 1, ?3, ?4)",
            )?;
            for (i, frame) in frames.iter().enumerate() {
                if frame.dimensions() != (self.width, self.height) {
                    return Err(Error::Format(format!(
                        "frame is {}x{}, container expects {}x{}",
                        frame.width(),
                        frame.height(),
                        self.width,
                        self.height
                    )));
                }
                let (payload, sum) = codec::encode(frame.as_raw(), Dtype::U8)?;
                insert.execute(params![
                    name,
                    (extent.len + i as u64) as i64,
                    sum.to_vec(),
                    payload
                ])?;
            }
        }
        if grow {
            tx.execute(
                "UPDATE datasets SET capacity = ?2 WHERE name = ?1",
                params![name, extent.capacity as i64],
            )?;
        }
        tx.commit()?;

        extent.len = end;
        self.images.insert(name, extent);
        Ok(())
    }

    /// Forget rows at and after `len`. Capacity is left alone.
    pub fn truncate(&mut self, dataset: &str, len: u64) -> Result<()> {
        let (name, mut extent) = self.extent(dataset)?;
        if len >= extent.len {
            return Ok(());
        }
        self.conn.execute(
            "DELETE FROM chunks WHERE dataset = ?1 AND chunk >= ?2",
            params![name, len as i64],
        )?;
        extent.len = len;
        self.images.insert(name, extent);
        Ok(())
    }

    /// Shrink every image dataset to the number of rows actually written.
    pub fn finalize_datasets(&mut self) -> Result<()> {
        let names: Vec<&'static str> = self.images.keys().copied().collect();
        for name in names {
            let (_, mut extent) = self.extent(name)?;
            self.conn.execute(
                "DELETE FROM chunks WHERE dataset = ?1 AND chunk >= ?2",
                params![name, extent.len as i64],
            )?;
            self.conn.execute(
                "UPDATE datasets SET capacity = ?2 WHERE name = ?1",
                params![name, extent.len as i64],
            )?;
            extent.capacity = extent.len;
            self.images.insert(name, extent);
            log::debug!("{} trimmed to {} frames", name, extent.len);
        }
        Ok(())
    }

    /// Write a complete numeric array with row shape `row_shape`.
    pub fn write_array<T: Element>(&mut self, name: &str, row_shape: &[u64], data: &[T]) -> Result<()> {
        let row_elems = row_shape.iter().product::<u64>().max(1) as usize;
        if data.len() % row_elems != 0 {
            return Err(Error::Format(format!(
                "{}: {} values do not fill rows of {}",
                name,
                data.len(),
                row_elems
            )));
        }
        let rows = (data.len() / row_elems) as u64;

        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM chunks WHERE dataset = ?1", params![name])?;
        tx.execute(
            "INSERT OR REPLACE INTO datasets (name, dtype, row_shape, capacity, chunk_rows) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                name,
                T::DTYPE.name(),
                serde_json::to_string(row_shape)?,
                rows as i64,
                ARRAY_CHUNK_ROWS as i64
            ],
        )?;
        {
            let mut insert = tx.prepare_cached(
                "INSERT INTO chunks (dataset, chunk, rows, checksum, payload) VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for (index, chunk) in data
                .chunks(ARRAY_CHUNK_ROWS as usize * row_elems)
                .enumerate()
            {
                let (payload, sum) = codec::encode(&codec::to_bytes(chunk), T::DTYPE)?;
                insert.execute(params![
                    name,
                    index as i64,
                    (chunk.len() / row_elems) as i64,
                    sum.to_vec(),
                    payload
                ])?;
            }
        }
        tx.commit()?;
        log::debug!("{} written ({} rows)", name, rows);
        Ok(())
    }

    /// Store a metadata table column by column.
    pub fn write_table(&mut self, name: &str, table: &VideoMetadata) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM tables WHERE name = ?1", params![name])?;
        {
            let mut insert = tx.prepare_cached(
                "INSERT INTO tables (name, field, position, kind, payload) VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for (position, (field, column)) in table.columns().iter().enumerate() {
                let (kind, payload) = match column {
                    // NaN has no JSON form; null stands in for it
                    Column::Numeric(values) => (
                        "numeric",
                        serde_json::to_string(
                            &values
                                .iter()
                                .map(|v| if v.is_nan() { None } else { Some(*v) })
                                .collect::<Vec<_>>(),
                        )?,
                    ),
                    Column::Text(values) => ("text", serde_json::to_string(values)?),
                };
                insert.execute(params![name, field, position as i64, kind, payload])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Mark the run complete. Nothing may be written afterwards.
    pub fn finish(self) -> Result<()> {
        self.set_attribute(MASK, "has_finished", 1)?;
        self.conn.close().map_err(|(_, e)| Error::Sqlite(e))?;
        log::info!("container {} finished", self.path.display());
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Reader
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
pub struct DatasetInfo {
    pub name: String,
    pub dtype: Dtype,
    /// Logical shape: `[capacity, row_shape...]`.
    pub shape: Vec<u64>,
    pub chunk_rows: u64,
}

impl DatasetInfo {
    fn row_elems(&self) -> usize {
        self.shape[1..].iter().product::<u64>().max(1) as usize
    }
}

pub struct ContainerReader {
    conn: Connection,
    path: PathBuf,
}

impl ContainerReader {
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::not_found(path));
        }
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    fn corrupt(&self, reason: impl Into<String>) -> Error {
        Error::Corrupt {
            path: self.path.clone(),
            reason: reason.into(),
        }
    }

    pub fn datasets(&self) -> Result<Vec<DatasetInfo>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM datasets ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        names.iter().map(|n| self.dataset(n)).collect()
    }

    pub fn dataset(&self, name: &str) -> Result<DatasetInfo> {
        let row = self
            .conn
            .query_row(
                "SELECT dtype, row_shape, capacity, chunk_rows FROM datasets WHERE name = ?1",
                params![name],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                },
            )
            .optional()?;
        let Some((dtype, row_shape, capacity, chunk_rows)) = row else {
            return Err(Error::NotFound(format!("dataset {}", name)));
        };
        let dtype =
            Dtype::parse(&dtype).ok_or_else(|| self.corrupt(format!("{}: dtype {}", name, dtype)))?;
        let row_shape: Vec<u64> = serde_json::from_str(&row_shape)?;
        let mut shape = vec![capacity.max(0) as u64];
        shape.extend(row_shape);
        Ok(DatasetInfo {
            name: name.to_string(),
            dtype,
            shape,
            chunk_rows: chunk_rows.max(1) as u64,
        })
    }

    pub fn shape(&self, name: &str) -> Result<Vec<u64>> {
        Ok(self.dataset(name)?.shape)
    }

    pub fn attribute(&self, dataset: &str, key: &str) -> Result<Option<Value>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM attributes WHERE dataset = ?1 AND key = ?2",
                params![dataset, key],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|s| serde_json::from_str(&s).map_err(Error::from))
            .transpose()
    }

    pub fn attributes(&self, dataset: &str) -> Result<Vec<(String, Value)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, value FROM attributes WHERE dataset = ?1 ORDER BY key")?;
        let rows = stmt
            .query_map(params![dataset], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter()
            .map(|(k, v)| Ok((k, serde_json::from_str(&v)?)))
            .collect()
    }

    pub fn has_finished(&self) -> Result<bool> {
        Ok(self
            .attribute(MASK, "has_finished")?
            .and_then(|v| v.as_i64())
            == Some(1))
    }

    fn chunk(&self, info: &DatasetInfo, index: u64) -> Result<Option<Vec<u8>>> {
        let row: Option<(Vec<u8>, Vec<u8>)> = self
            .conn
            .query_row(
                "SELECT checksum, payload FROM chunks WHERE dataset = ?1 AND chunk = ?2",
                params![info.name, index as i64],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((sum, payload)) = row else {
            return Ok(None);
        };
        codec::decode(&payload, &sum, info.dtype)
            .map(Some)
            .map_err(|e| self.corrupt(format!("{} chunk {}: {}", info.name, index, e)))
    }

    /// Frame `index` of an image dataset; unwritten rows are all zeros.
    pub fn read_frame(&self, dataset: &str, index: u64) -> Result<GrayImage> {
        let info = self.dataset(dataset)?;
        if info.dtype != Dtype::U8 || info.shape.len() != 3 {
            return Err(self.corrupt(format!("{} is not an image dataset", dataset)));
        }
        if index >= info.shape[0] {
            return Err(Error::NotFound(format!(
                "{} frame {} (length {})",
                dataset, index, info.shape[0]
            )));
        }
        let (h, w) = (info.shape[1] as u32, info.shape[2] as u32);
        match self.chunk(&info, index)? {
            Some(raw) => GrayImage::from_raw(w, h, raw)
                .ok_or_else(|| self.corrupt(format!("{} frame {} has wrong size", dataset, index))),
            None => Ok(GrayImage::new(w, h)),
        }
    }

    /// Whole numeric array, flattened row-major.
    pub fn read_array<T: Element>(&self, name: &str) -> Result<Vec<T>> {
        let info = self.dataset(name)?;
        if info.dtype != T::DTYPE {
            return Err(self.corrupt(format!(
                "{} holds {}, not {}",
                name,
                info.dtype.name(),
                T::DTYPE.name()
            )));
        }
        let row_elems = info.row_elems();
        let rows = info.shape[0];
        let mut out = Vec::with_capacity(rows as usize * row_elems);
        let chunks = rows.div_ceil(info.chunk_rows);
        for index in 0..chunks {
            let expected_rows = info.chunk_rows.min(rows - index * info.chunk_rows) as usize;
            match self.chunk(&info, index)? {
                Some(raw) => {
                    let mut values = codec::from_bytes::<T>(&raw);
                    values.resize(expected_rows * row_elems, T::default());
                    out.extend(values);
                }
                None => out.extend(std::iter::repeat(T::default()).take(expected_rows * row_elems)),
            }
        }
        Ok(out)
    }

    pub fn read_table(&self, name: &str) -> Result<VideoMetadata> {
        let mut stmt = self
            .conn
            .prepare("SELECT field, kind, payload FROM tables WHERE name = ?1 ORDER BY position")?;
        let rows = stmt
            .query_map(params![name], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let mut columns = Vec::with_capacity(rows.len());
        for (field, kind, payload) in rows {
            let column = match kind.as_str() {
                "numeric" => {
                    let values: Vec<Option<f64>> = serde_json::from_str(&payload)?;
                    Column::Numeric(values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
                }
                "text" => Column::Text(serde_json::from_str(&payload)?),
                other => return Err(self.corrupt(format!("{}.{}: kind {}", name, field, other))),
            };
            columns.push((field, column));
        }
        VideoMetadata::from_columns(columns)
    }

    /// Decode every stored chunk, returning how many were checked.
    pub fn verify(&self) -> Result<u64> {
        let mut checked = 0;
        for info in self.datasets()? {
            let chunks = info.shape[0].div_ceil(info.chunk_rows);
            for index in 0..chunks {
                if self.chunk(&info, index)?.is_some() {
                    checked += 1;
                }
            }
        }
        Ok(checked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(value: u8) -> GrayImage {
        GrayImage::from_pixel(6, 4, image::Luma([value]))
    }

    #[test]
    fn frames_round_trip_and_unwritten_rows_are_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.db");

        let mut writer = ContainerWriter::create(&path, 6, 4, 10).unwrap();
        writer.append_frames(MASK, &[frame(5), frame(9)]).unwrap();
        assert_eq!(writer.len(MASK), 2);
        drop(writer);

        let reader = ContainerReader::open(&path).unwrap();
        assert_eq!(reader.shape(MASK).unwrap(), vec![10, 4, 6]);
        assert_eq!(reader.read_frame(MASK, 1).unwrap(), frame(9));
        assert_eq!(reader.read_frame(MASK, 7).unwrap(), frame(0));
        assert!(!reader.has_finished().unwrap());
    }

    #[test]
    fn capacity_grows_in_steps_and_is_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.db");

        let mut writer = ContainerWriter::create(&path, 6, 4, 1).unwrap();
        writer
            .append_frames(MASK, &[frame(1), frame(2), frame(3)])
            .unwrap();
        let grown = ContainerReader::open(&path).unwrap().shape(MASK).unwrap();
        assert_eq!(grown[0], 3 + GROWTH_STEP);
        writer.append_frame(FULL_DATA, &frame(1)).unwrap();

        writer.truncate(MASK, 2).unwrap();
        writer.finalize_datasets().unwrap();
        writer.finish().unwrap();

        let reader = ContainerReader::open(&path).unwrap();
        assert_eq!(reader.shape(MASK).unwrap(), vec![2, 4, 6]);
        assert_eq!(reader.shape(FULL_DATA).unwrap(), vec![1, 4, 6]);
        assert!(reader.has_finished().unwrap());
        assert_eq!(reader.verify().unwrap(), 3);
    }

    #[test]
    fn image_attributes_are_set() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.db");
        let writer = ContainerWriter::create(&path, 6, 4, 1).unwrap();
        writer.set_attribute(FULL_DATA, "save_interval", 100).unwrap();
        drop(writer);

        let reader = ContainerReader::open(&path).unwrap();
        assert_eq!(
            reader.attribute(MASK, "CLASS").unwrap(),
            Some(Value::from("IMAGE"))
        );
        assert_eq!(
            reader.attribute(FULL_DATA, "save_interval").unwrap(),
            Some(Value::from(100))
        );
        assert_eq!(reader.attribute(MASK, "missing").unwrap(), None);
    }

    #[test]
    fn arrays_span_multiple_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.db");
        let raw: Vec<i64> = (0..(ARRAY_CHUNK_ROWS as i64 + 10)).collect();
        let ranges = vec![0.0f32, 10.0, 5.0, 20.0];

        let mut writer = ContainerWriter::create(&path, 6, 4, 1).unwrap();
        writer.write_array(TIMESTAMP_RAW, &[], &raw).unwrap();
        writer.write_array(NORMALIZATION_RANGE, &[2], &ranges).unwrap();
        writer.finish().unwrap();

        let reader = ContainerReader::open(&path).unwrap();
        assert_eq!(reader.read_array::<i64>(TIMESTAMP_RAW).unwrap(), raw);
        assert_eq!(reader.shape(NORMALIZATION_RANGE).unwrap(), vec![2, 2]);
        assert_eq!(reader.read_array::<f32>(NORMALIZATION_RANGE).unwrap(), ranges);
        assert!(reader.read_array::<f64>(TIMESTAMP_RAW).is_err());
    }

    #[test]
    fn metadata_table_keeps_column_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.db");
        let table = VideoMetadata::from_columns(vec![
            ("pkt_size".into(), Column::Numeric(vec![10.0, f64::NAN])),
            ("pict_type".into(), Column::Text(vec!["I".into(), "P".into()])),
        ])
        .unwrap();

        let mut writer = ContainerWriter::create(&path, 6, 4, 1).unwrap();
        writer.write_table(VIDEO_METADATA, &table).unwrap();
        writer.finish().unwrap();

        let back = ContainerReader::open(&path)
            .unwrap()
            .read_table(VIDEO_METADATA)
            .unwrap();
        assert_eq!(back.fields().collect::<Vec<_>>(), vec!["pkt_size", "pict_type"]);
        let sizes = back.numeric("pkt_size").unwrap();
        assert_eq!(sizes[0], 10.0);
        assert!(sizes[1].is_nan());
        assert_eq!(back.column("pict_type"), table.column("pict_type"));
    }

    #[test]
    fn create_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.db");
        std::fs::write(&path, b"stale").unwrap();
        let writer = ContainerWriter::create(&path, 6, 4, 1).unwrap();
        writer.finish().unwrap();
        assert!(ContainerReader::open(&path).unwrap().has_finished().unwrap());
    }

    #[test]
    fn wrong_frame_size_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = ContainerWriter::create(&dir.path().join("out.db"), 6, 4, 1).unwrap();
        let err = writer
            .append_frame(MASK, &GrayImage::new(3, 3))
            .err()
            .unwrap();
        assert!(matches!(err, Error::Format(_)));
        assert_eq!(writer.len(MASK), 0);
    }
}
