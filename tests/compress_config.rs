use std::sync::Mutex;

use tempfile::Builder;

use masked_video::{CompressConfig, Error, ToolPaths};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "MASKVID_CONFIG",
        "MASKVID_EXPECTED_FPS",
        "MASKVID_BUFFER_SIZE",
        "MASKVID_SAVE_FULL_INTERVAL",
        "MASKVID_MAX_FRAME",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_toml_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = Builder::new().suffix(".toml").tempfile().expect("temp config");
    std::fs::write(
        file.path(),
        r#"
        expected_fps = 30
        save_full_interval = 900

        [mask]
        min_area = 50
        is_light_background = false

        [background]
        is_subtraction = true
        frame_gap = 5
        "#,
    )
    .expect("write config");

    std::env::set_var("MASKVID_CONFIG", file.path());
    std::env::set_var("MASKVID_BUFFER_SIZE", "15");

    let cfg = CompressConfig::load().expect("load config");
    assert_eq!(cfg.expected_fps, 30);
    assert_eq!(cfg.window_size(), 15);
    assert_eq!(cfg.full_interval(), 900);
    assert_eq!(cfg.mask.min_area, 50);
    assert_eq!(cfg.mask.max_area, 5000);
    assert!(!cfg.mask.is_light_background);
    assert!(cfg.background.is_subtraction);
    assert_eq!(cfg.background.buffer_size, 100);
    assert_eq!(cfg.background.frame_gap, 5);

    clear_env();
}

#[test]
fn loads_json_file_with_defaults_for_missing_sections() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = Builder::new().suffix(".json").tempfile().expect("temp config");
    std::fs::write(file.path(), r#"{ "max_frame": 1000, "mask": { "dilation_size": 5 } }"#)
        .expect("write config");

    let cfg = CompressConfig::load_from(Some(file.path())).expect("load config");
    assert_eq!(cfg.max_frame, 1000);
    assert_eq!(cfg.mask.dilation_size, 5);
    assert_eq!(cfg.mask.thresh_block_size, 61);
    assert_eq!(cfg.expected_fps, 25);
    assert_eq!(cfg.full_interval(), 200 * 25);
}

#[test]
fn malformed_env_override_is_a_configuration_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();
    std::env::set_var("MASKVID_EXPECTED_FPS", "fast");

    let err = CompressConfig::load().expect_err("non-numeric fps must fail");
    assert!(matches!(err, Error::Configuration(_)));

    clear_env();
}

#[test]
fn zero_fps_from_env_fails_validation() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();
    std::env::set_var("MASKVID_EXPECTED_FPS", "0");

    assert!(matches!(
        CompressConfig::load(),
        Err(Error::Configuration(_))
    ));

    clear_env();
}

#[test]
fn missing_config_file_is_reported() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();
    let err = CompressConfig::load_from(Some(std::path::Path::new("/no/such/config.toml")))
        .expect_err("missing file");
    assert!(matches!(err, Error::Configuration(_)));
}

#[test]
fn tool_env_override_wins_and_missing_override_falls_back() {
    let _guard = ENV_LOCK.lock().unwrap();

    let decoder = tempfile::NamedTempFile::new().expect("temp decoder");
    std::env::set_var("MASKVID_FFMPEG", decoder.path());
    std::env::set_var("MASKVID_FFPROBE", "/no/such/ffprobe");

    let tools = ToolPaths::resolve();
    assert_eq!(tools.ffmpeg.as_deref(), Some(decoder.path()));
    assert_eq!(tools.ffprobe, which::which("ffprobe").ok());

    std::env::remove_var("MASKVID_FFMPEG");
    std::env::remove_var("MASKVID_FFPROBE");
}
