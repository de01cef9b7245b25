use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use palette::{Srgb, Srgba};
use serde::Deserialize;

/// Pixels of the left eye image that map onto one meter of plane.
pub const DEFAULT_PIXELS_PER_METER: f32 = 10_000.0;
/// Corner radius of the presented plane, in meters.
pub const DEFAULT_CORNER_RADIUS: f32 = 0.01;
/// Template path inside the asset bundle.
pub const DEFAULT_MATERIAL_PATH: &str = "/Root/Material";
pub const DEFAULT_LEFT_PARAMETER: &str = "LeftEye";
pub const DEFAULT_RIGHT_PARAMETER: &str = "RightEye";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StereoMode {
    /// Left eye in the left half of the window, right eye in the right half.
    #[default]
    SideBySide,
    /// Red channel from the left eye, green/blue from the right eye.
    Anaglyph,
    /// Only the left eye image.
    Left,
    /// Only the right eye image.
    Right,
}

impl StereoMode {
    pub fn next(self) -> Self {
        match self {
            StereoMode::SideBySide => StereoMode::Anaglyph,
            StereoMode::Anaglyph => StereoMode::Left,
            StereoMode::Left => StereoMode::Right,
            StereoMode::Right => StereoMode::SideBySide,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            StereoMode::SideBySide => "side-by-side",
            StereoMode::Anaglyph => "anaglyph",
            StereoMode::Left => "left",
            StereoMode::Right => "right",
        }
    }
}

impl fmt::Display for StereoMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StereoMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "side-by-side" => Ok(StereoMode::SideBySide),
            "anaglyph" => Ok(StereoMode::Anaglyph),
            "left" => Ok(StereoMode::Left),
            "right" => Ok(StereoMode::Right),
            other => anyhow::bail!(
                "unknown stereo mode '{other}' (expected side-by-side, anaglyph, left or right)"
            ),
        }
    }
}

/// Settings consumed by the stereo presenter when it binds a pack to the scene.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct PresenterSettings {
    /// Template looked up in the asset bundle.
    pub material_path: String,
    /// Texture slot receiving the left eye image.
    pub left_parameter: String,
    /// Texture slot receiving the right eye image.
    pub right_parameter: String,
    /// Scale from left-image pixels to plane meters.
    pub pixels_per_meter: f32,
    /// Rounded corner radius of the plane, in meters.
    pub corner_radius: f32,
}

impl Default for PresenterSettings {
    fn default() -> Self {
        Self {
            material_path: DEFAULT_MATERIAL_PATH.to_string(),
            left_parameter: DEFAULT_LEFT_PARAMETER.to_string(),
            right_parameter: DEFAULT_RIGHT_PARAMETER.to_string(),
            pixels_per_meter: DEFAULT_PIXELS_PER_METER,
            corner_radius: DEFAULT_CORNER_RADIUS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct CameraSettings {
    /// Distance from the eye point to the plane, in meters.
    pub viewing_distance: f32,
    /// Vertical field of view, in degrees.
    pub fov_y_degrees: f32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            viewing_distance: 0.25,
            fov_y_degrees: 45.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct ColorSettings {
    pub background: String,
    pub font: String,
    pub error: String,
}

impl Default for ColorSettings {
    fn default() -> Self {
        Self {
            background: "#111827".to_string(),
            font: "#F8FAFC".to_string(),
            error: "#F87171".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Configuration {
    /// Directory containing `scene.yaml`; the embedded bundle is used when unset.
    pub asset_bundle_path: Option<PathBuf>,
    /// How the two eye images reach the display.
    pub stereo_mode: StereoMode,
    /// Upper bound on resolving and decoding one eye image; unbounded when unset.
    pub load_timeout_ms: Option<u64>,
    /// Material, parameter and plane sizing used by the presenter.
    pub presenter: PresenterSettings,
    pub camera: CameraSettings,
    pub colors: ColorSettings,
    /// Font family for the status overlay.
    pub font: Option<String>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            asset_bundle_path: None,
            stereo_mode: StereoMode::default(),
            load_timeout_ms: None,
            presenter: PresenterSettings::default(),
            camera: CameraSettings::default(),
            colors: ColorSettings::default(),
            font: None,
        }
    }
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&s)?)
    }

    pub fn load_timeout(&self) -> Option<Duration> {
        self.load_timeout_ms.map(Duration::from_millis)
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        let presenter = &self.presenter;
        ensure!(
            presenter.pixels_per_meter.is_finite() && presenter.pixels_per_meter > 0.0,
            "presenter.pixels-per-meter must be positive"
        );
        ensure!(
            presenter.corner_radius.is_finite() && presenter.corner_radius >= 0.0,
            "presenter.corner-radius must not be negative"
        );
        ensure!(
            !presenter.material_path.trim().is_empty(),
            "presenter.material-path must not be empty"
        );
        ensure!(
            !presenter.left_parameter.is_empty() && !presenter.right_parameter.is_empty(),
            "presenter eye parameter names must not be empty"
        );
        ensure!(
            presenter.left_parameter != presenter.right_parameter,
            "presenter.left-parameter and presenter.right-parameter must differ"
        );
        ensure!(
            self.camera.viewing_distance.is_finite() && self.camera.viewing_distance > 0.0,
            "camera.viewing-distance must be positive"
        );
        ensure!(
            self.camera.fov_y_degrees > 0.0 && self.camera.fov_y_degrees < 180.0,
            "camera.fov-y-degrees must be between 0 and 180"
        );
        if let Some(timeout) = self.load_timeout_ms {
            ensure!(timeout > 0, "load-timeout-ms must be greater than zero");
        }
        for (name, value) in [
            ("colors.background", &self.colors.background),
            ("colors.font", &self.colors.font),
            ("colors.error", &self.colors.error),
        ] {
            parse_hex_color(value).with_context(|| format!("invalid {name} '{value}'"))?;
        }
        Ok(self)
    }
}

/// Parse `#RRGGBB` or `#RRGGBBAA` into straight sRGB components in `0.0..=1.0`.
pub fn parse_hex_color(input: &str) -> Result<[f32; 4]> {
    let trimmed = input.trim();
    ensure!(!trimmed.is_empty(), "colour must not be empty");

    if let Ok(rgba) = Srgba::<u8>::from_str(trimmed) {
        let rgba: Srgba<f32> = rgba.into_format();
        return Ok([rgba.red, rgba.green, rgba.blue, rgba.alpha]);
    }

    let rgb = Srgb::<u8>::from_str(trimmed)
        .map_err(|err| anyhow::anyhow!("not a hex colour: {err}"))?;
    let rgb: Srgb<f32> = rgb.into_format();
    Ok([rgb.red, rgb.green, rgb.blue, 1.0])
}
