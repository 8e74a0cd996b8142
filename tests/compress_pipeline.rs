use std::path::Path;

use image::{GrayImage, ImageBuffer, Luma};
use tempfile::tempdir;

use masked_video::container::{self, ContainerReader};
use masked_video::frame::prepare_frame;
use masked_video::{compress_video, CompressConfig, Error, ToolPaths, VideoSource};

fn config(buffer_size: usize, interval: u64) -> CompressConfig {
    CompressConfig {
        buffer_size: Some(buffer_size),
        save_full_interval: Some(interval),
        ..CompressConfig::default()
    }
}

/// Light field with a dark square at `(x0, y0)`.
fn subject_frame(w: u32, h: u32, x0: u32, y0: u32, field: u16, subject: u16) -> Vec<u16> {
    let mut pixels = vec![field; (w * h) as usize];
    for y in y0..y0 + 12 {
        for x in x0..x0 + 12 {
            pixels[(y * w + x) as usize] = subject;
        }
    }
    pixels
}

#[test]
fn two_hundred_fifty_frames_in_windows_of_twenty_five() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("run.db");
    let uri = "stub://64x48?frames=250";

    let summary = compress_video(uri, &out, &config(25, 100), &ToolPaths::none()).unwrap();
    assert_eq!(summary.frames, 250);
    assert_eq!(summary.full_frames, 3);
    assert!(!summary.normalized);

    let reader = ContainerReader::open(&out).unwrap();
    assert!(reader.has_finished().unwrap());
    assert_eq!(reader.shape(container::MASK).unwrap(), vec![250, 48, 64]);
    assert_eq!(reader.shape(container::FULL_DATA).unwrap(), vec![3, 48, 64]);
    assert!(reader.read_array::<f32>(container::NORMALIZATION_RANGE).is_err());

    // snapshots are the unmasked frames 1, 101 and 201
    let mut source = VideoSource::open(uri, &ToolPaths::none()).unwrap();
    for (snapshot, frame_index) in [(0u64, 0u64), (1, 100), (2, 200)] {
        let expected = prepare_frame(source.read_at(frame_index).unwrap().unwrap()).image;
        assert_eq!(
            reader.read_frame(container::FULL_DATA, snapshot).unwrap(),
            expected
        );
    }
}

#[test]
fn kept_pixels_are_original_values_and_subject_is_kept() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("run.db");
    let uri = "stub://64x48?frames=60";
    compress_video(uri, &out, &config(20, 1000), &ToolPaths::none()).unwrap();

    let reader = ContainerReader::open(&out).unwrap();
    let mut source = VideoSource::open(uri, &ToolPaths::none()).unwrap();
    let mut background_zeroed = 0usize;
    for i in 0..60u64 {
        let original = prepare_frame(source.read_at(i).unwrap().unwrap()).image;
        let stored = reader.read_frame(container::MASK, i).unwrap();
        for (&s, &o) in stored.as_raw().iter().zip(original.as_raw()) {
            assert!(s == 0 || s == o);
            // subject pixels always survive masking
            if o == 40 {
                assert_eq!(s, 40, "frame {} lost a subject pixel", i);
            }
            if s == 0 {
                background_zeroed += 1;
            }
        }
    }
    assert!(background_zeroed > 0);
}

#[test]
fn empty_source_still_finishes() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("empty.db");
    let summary =
        compress_video("stub://64x48?frames=0", &out, &config(25, 100), &ToolPaths::none())
            .unwrap();
    assert_eq!(summary.frames, 0);

    let reader = ContainerReader::open(&out).unwrap();
    assert!(reader.has_finished().unwrap());
    assert_eq!(reader.shape(container::MASK).unwrap()[0], 0);
    assert_eq!(reader.shape(container::FULL_DATA).unwrap()[0], 0);
}

#[test]
fn snapshot_count_matches_ceiling_for_several_lengths() {
    let dir = tempdir().unwrap();
    for (frames, interval) in [(1u64, 4u64), (4, 4), (5, 4), (9, 2)] {
        let out = dir.path().join(format!("run_{}_{}.db", frames, interval));
        let uri = format!("stub://48x40?frames={}", frames);
        let summary = compress_video(&uri, &out, &config(3, interval), &ToolPaths::none()).unwrap();
        assert_eq!(summary.frames, frames);
        assert_eq!(summary.full_frames, frames.div_ceil(interval));
    }
}

#[test]
fn trailing_blank_frame_mid_window_is_dropped() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("run.db");
    let summary = compress_video(
        "stub://64x48?frames=30&blank_tail=1",
        &out,
        &config(25, 100),
        &ToolPaths::none(),
    )
    .unwrap();
    assert!(summary.dropped_blank_tail);
    assert_eq!(summary.frames, 29);

    let reader = ContainerReader::open(&out).unwrap();
    assert_eq!(reader.shape(container::MASK).unwrap()[0], 29);
    for i in 0..29 {
        let frame = reader.read_frame(container::MASK, i).unwrap();
        assert!(frame.as_raw().iter().any(|&p| p != 0));
    }
}

#[test]
fn sixteen_bit_tiff_sequence_stores_normalization_ranges() {
    let dir = tempdir().unwrap();
    let frames_dir = dir.path().join("frames");
    std::fs::create_dir(&frames_dir).unwrap();
    let (w, h) = (64u32, 48u32);
    for i in 0..6u32 {
        let pixels = subject_frame(w, h, 20 + i, 18, 50_000, 10_000 + i as u16);
        let image: ImageBuffer<Luma<u16>, Vec<u16>> = ImageBuffer::from_raw(w, h, pixels).unwrap();
        image
            .save(frames_dir.join(format!("plate_X{:04}.tif", i + 1)))
            .unwrap();
    }

    let out = dir.path().join("run.db");
    let summary = compress_video(
        frames_dir.to_str().unwrap(),
        &out,
        &config(3, 100),
        &ToolPaths::none(),
    )
    .unwrap();
    assert_eq!(summary.frames, 6);
    assert!(summary.normalized);

    let reader = ContainerReader::open(&out).unwrap();
    assert_eq!(
        reader.shape(container::NORMALIZATION_RANGE).unwrap(),
        vec![6, 2]
    );
    let ranges = reader
        .read_array::<f32>(container::NORMALIZATION_RANGE)
        .unwrap();
    for i in 0..6 {
        assert_eq!(ranges[i * 2], 10_000.0 + i as f32);
        assert_eq!(ranges[i * 2 + 1], 50_000.0);
    }
    // rescaled field is 255, the subject clamps to 1
    let snapshot = reader.read_frame(container::FULL_DATA, 0).unwrap();
    assert_eq!(snapshot.get_pixel(0, 0)[0], 255);
    assert_eq!(snapshot.get_pixel(25, 20)[0], 1);
}

#[test]
fn constant_sixteen_bit_last_frame_is_kept() {
    let dir = tempdir().unwrap();
    let frames_dir = dir.path().join("frames");
    std::fs::create_dir(&frames_dir).unwrap();
    let (w, h) = (64u32, 48u32);
    for i in 0..4u32 {
        let pixels = if i < 3 {
            subject_frame(w, h, 20 + i, 18, 50_000, 10_000)
        } else {
            vec![1000; (w * h) as usize]
        };
        let image: ImageBuffer<Luma<u16>, Vec<u16>> = ImageBuffer::from_raw(w, h, pixels).unwrap();
        image
            .save(frames_dir.join(format!("plate_X{:04}.tif", i + 1)))
            .unwrap();
    }

    let out = dir.path().join("run.db");
    let summary = compress_video(
        frames_dir.to_str().unwrap(),
        &out,
        &config(3, 100),
        &ToolPaths::none(),
    )
    .unwrap();
    assert!(!summary.dropped_blank_tail);
    assert_eq!(summary.frames, 4);

    let reader = ContainerReader::open(&out).unwrap();
    assert_eq!(reader.shape(container::MASK).unwrap()[0], 4);
    let ranges = reader
        .read_array::<f32>(container::NORMALIZATION_RANGE)
        .unwrap();
    assert_eq!(&ranges[6..], &[1000.0, 1000.0]);
}

#[test]
fn image_sequence_gap_aborts_before_writing() {
    let dir = tempdir().unwrap();
    let frames_dir = dir.path().join("frames");
    std::fs::create_dir(&frames_dir).unwrap();
    for i in [1, 2, 4] {
        GrayImage::from_pixel(16, 16, Luma([100u8]))
            .save(frames_dir.join(format!("a_X{}.tif", i)))
            .unwrap();
    }

    let out = dir.path().join("run.db");
    let err = compress_video(
        frames_dir.to_str().unwrap(),
        &out,
        &config(3, 100),
        &ToolPaths::none(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
    assert!(!out.exists());
}

fn write_store(root: &Path, frames: u32, chunksize: u32) {
    std::fs::write(
        root.join("metadata.json"),
        format!(
            r#"{{"chunksize": {}, "frame_min": 0, "frame_max": {}, "extension": "png"}}"#,
            chunksize,
            frames - 1
        ),
    )
    .unwrap();
    for chunk in 0..frames.div_ceil(chunksize) {
        let chunk_dir = root.join(format!("{:06}", chunk));
        std::fs::create_dir_all(&chunk_dir).unwrap();
        let mut index = Vec::new();
        for offset in 0..chunksize {
            let i = chunk * chunksize + offset;
            if i >= frames {
                break;
            }
            let pixels: Vec<u8> = subject_frame(64, 48, 20 + i % 4, 18, 200, 40)
                .into_iter()
                .map(|v| v as u8)
                .collect();
            GrayImage::from_raw(64, 48, pixels)
                .unwrap()
                .save(chunk_dir.join(format!("{:06}.png", offset)))
                .unwrap();
            // recorded every other source frame
            index.push(format!(
                r#"{{"frame_number": {}, "frame_time": {}}}"#,
                i * 2,
                i as f64 * 0.08
            ));
        }
        std::fs::write(chunk_dir.join("index.json"), format!("[{}]", index.join(","))).unwrap();
    }
}

#[test]
fn frame_store_timestamps_come_from_its_index() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("store");
    std::fs::create_dir(&store).unwrap();
    write_store(&store, 10, 4);

    let out = dir.path().join("run.db");
    let summary = compress_video(
        store.to_str().unwrap(),
        &out,
        &config(5, 100),
        &ToolPaths::none(),
    )
    .unwrap();
    assert_eq!(summary.frames, 10);

    let reader = ContainerReader::open(&out).unwrap();
    let raw = reader.read_array::<i64>(container::TIMESTAMP_RAW).unwrap();
    let time = reader.read_array::<f64>(container::TIMESTAMP_TIME).unwrap();
    // indices 0, 2, 4, ... are rescaled by their common step
    assert_eq!(raw, (0..10).collect::<Vec<i64>>());
    assert_eq!(time.len(), 10);
    assert!((time[9] - 0.72).abs() < 1e-9);
}

#[test]
fn missing_input_is_not_found() {
    let dir = tempdir().unwrap();
    let err = compress_video(
        "/no/such/recording.avi",
        &dir.path().join("run.db"),
        &CompressConfig::default(),
        &ToolPaths::none(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}
