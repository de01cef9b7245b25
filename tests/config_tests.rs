use std::path::PathBuf;

use stereo_viewer::config::{Configuration, StereoMode};

#[test]
fn empty_document_uses_defaults() {
    let cfg: Configuration = serde_yaml::from_str("{}").unwrap();
    let cfg = cfg.validated().unwrap();
    assert_eq!(cfg.stereo_mode, StereoMode::SideBySide);
    assert_eq!(cfg.presenter.material_path, "/Root/Material");
    assert!((cfg.presenter.pixels_per_meter - 10_000.0).abs() < f32::EPSILON);
    assert!(cfg.asset_bundle_path.is_none());
}

#[test]
fn parse_kebab_case_config() {
    let yaml = r##"
asset-bundle-path: "/opt/stereo/assets"
stereo-mode: anaglyph
load-timeout-ms: 2500
presenter:
  material-path: /Scene/Card
  left-parameter: Left
  right-parameter: Right
  pixels-per-meter: 5000
  corner-radius: 0.0
camera:
  viewing-distance: 0.5
colors:
  background: "#000000"
font: DejaVu Sans
"##;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    let cfg = cfg.validated().unwrap();
    assert_eq!(cfg.asset_bundle_path, Some(PathBuf::from("/opt/stereo/assets")));
    assert_eq!(cfg.stereo_mode, StereoMode::Anaglyph);
    assert_eq!(cfg.load_timeout().unwrap().as_millis(), 2500);
    assert_eq!(cfg.presenter.material_path, "/Scene/Card");
    assert_eq!(cfg.presenter.left_parameter, "Left");
    assert!((cfg.presenter.pixels_per_meter - 5000.0).abs() < f32::EPSILON);
    assert!((cfg.camera.viewing_distance - 0.5).abs() < f32::EPSILON);
    assert!((cfg.camera.fov_y_degrees - 45.0).abs() < f32::EPSILON);
    assert_eq!(cfg.colors.font, "#F8FAFC");
    assert_eq!(cfg.font.as_deref(), Some("DejaVu Sans"));
}

#[test]
fn unknown_keys_are_rejected() {
    let yaml = "stereo-mode: side-by-side\nframe-rate: 60\n";
    assert!(serde_yaml::from_str::<Configuration>(yaml).is_err());
}

#[test]
fn unknown_mode_is_rejected() {
    assert!(serde_yaml::from_str::<Configuration>("stereo-mode: top-bottom").is_err());
}

#[test]
fn validation_rejects_bad_values() {
    let cases = [
        "presenter:\n  pixels-per-meter: 0\n",
        "presenter:\n  corner-radius: -1\n",
        "presenter:\n  left-parameter: Eye\n  right-parameter: Eye\n",
        "presenter:\n  material-path: \"  \"\n",
        "camera:\n  fov-y-degrees: 180\n",
        "load-timeout-ms: 0\n",
        "colors:\n  font: not-a-colour\n",
    ];
    for yaml in cases {
        let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
        assert!(cfg.validated().is_err(), "accepted: {yaml}");
    }
}

#[test]
fn reads_from_file() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("config.yaml");
    std::fs::write(&path, "stereo-mode: right\n").unwrap();
    let cfg = Configuration::from_yaml_file(&path).unwrap();
    assert_eq!(cfg.stereo_mode, StereoMode::Right);
    assert!(Configuration::from_yaml_file(tmp.path().join("missing.yaml")).is_err());
}
