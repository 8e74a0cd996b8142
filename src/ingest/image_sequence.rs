//! Directory of numbered TIFF images.
//!
//! File stems end in `_X<number>` (e.g. `plate3_X0001.tif`). Frames are served
//! in numeric order, independent of directory listing order. The numbering
//! must be contiguous.

use image::DynamicImage;
use std::path::{Path, PathBuf};

use crate::frame::PixelType;
use crate::{Error, Result};

const INDEX_MARKER: &str = "_X";

pub struct ImageSequenceSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    width: u32,
    height: u32,
    pixel_type: PixelType,
    next: usize,
}

impl ImageSequenceSource {
    pub fn open(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(Error::not_found(dir));
        }

        let mut numbered = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if !is_tiff(&path) {
                continue;
            }
            let index = sequence_index(&path).ok_or_else(|| {
                Error::Configuration(format!(
                    "{} does not carry a {}<number> sequence index",
                    path.display(),
                    INDEX_MARKER
                ))
            })?;
            numbered.push((index, path));
        }
        if numbered.is_empty() {
            return Err(Error::Configuration(format!(
                "no .tif images found in {}",
                dir.display()
            )));
        }

        numbered.sort_by_key(|(index, _)| *index);
        for pair in numbered.windows(2) {
            if pair[1].0 != pair[0].0 + 1 {
                return Err(Error::Configuration(format!(
                    "image sequence in {} is not contiguous: {} is followed by {}",
                    dir.display(),
                    pair[0].0,
                    pair[1].0
                )));
            }
        }
        let files: Vec<PathBuf> = numbered.into_iter().map(|(_, path)| path).collect();

        let first = image::open(&files[0])?;
        let (width, height) = (first.width(), first.height());
        let pixel_type = PixelType::of(&first);

        log::info!(
            "image sequence {}: {} frames, {}x{} {:?}",
            dir.display(),
            files.len(),
            width,
            height,
            pixel_type
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            files,
            width,
            height,
            pixel_type,
            next: 0,
        })
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

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn read(&mut self) -> Result<Option<DynamicImage>> {
        let frame = self.read_at(self.next as u64)?;
        if frame.is_some() {
            self.next += 1;
        }
        Ok(frame)
    }

    pub fn read_at(&mut self, index: u64) -> Result<Option<DynamicImage>> {
        let Some(path) = usize::try_from(index).ok().and_then(|i| self.files.get(i)) else {
            return Ok(None);
        };
        Ok(Some(image::open(path)?))
    }

    pub fn release(&mut self) {
        log::debug!(
            "image sequence {} released after {} frames",
            self.dir.display(),
            self.next
        );
    }
}

fn is_tiff(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("tif") || e.eq_ignore_ascii_case("tiff"))
}

fn sequence_index(path: &Path) -> Option<u64> {
    let stem = path.file_stem()?.to_str()?;
    let (_, digits) = stem.rsplit_once(INDEX_MARKER)?;
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GrayImage;

    fn write_frame(dir: &Path, name: &str, value: u8) {
        GrayImage::from_pixel(4, 3, image::Luma([value]))
            .save(dir.join(name))
            .unwrap();
    }

    #[test]
    fn frames_are_served_in_numeric_order() {
        let dir = tempfile::tempdir().unwrap();
        write_frame(dir.path(), "run_X10.tif", 30);
        write_frame(dir.path(), "run_X8.tif", 10);
        write_frame(dir.path(), "run_X9.tif", 20);

        let mut source = ImageSequenceSource::open(dir.path()).unwrap();
        assert_eq!((source.width(), source.height()), (4, 3));
        assert_eq!(source.pixel_type(), PixelType::U8);

        let values: Vec<u8> = std::iter::from_fn(|| source.read().unwrap())
            .map(|f| f.to_luma8().get_pixel(0, 0)[0])
            .collect();
        assert_eq!(values, vec![10, 20, 30]);
    }

    #[test]
    fn numbering_gap_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        write_frame(dir.path(), "run_X1.tif", 1);
        write_frame(dir.path(), "run_X3.tif", 3);

        let err = ImageSequenceSource::open(dir.path()).err().unwrap();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn missing_directory_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = ImageSequenceSource::open(&dir.path().join("absent"))
            .err()
            .unwrap();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn random_access_past_end_is_none() {
        let dir = tempfile::tempdir().unwrap();
        write_frame(dir.path(), "a_X0.tif", 5);
        let mut source = ImageSequenceSource::open(dir.path()).unwrap();
        assert!(source.read_at(0).unwrap().is_some());
        assert!(source.read_at(1).unwrap().is_none());
    }
}
