pub mod status_overlay;
pub mod stereo_renderer;
pub mod texture;

use palette::{LinSrgba, Srgba};

/// Straight sRGB components to the linear clear colour wgpu expects.
pub fn to_wgpu_color(rgba: [f32; 4]) -> wgpu::Color {
    let linear: LinSrgba = Srgba::new(rgba[0], rgba[1], rgba[2], rgba[3]).into_linear();
    wgpu::Color {
        r: linear.red as f64,
        g: linear.green as f64,
        b: linear.blue as f64,
        a: linear.alpha as f64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_colour_is_linearised() {
        let white = to_wgpu_color([1.0, 1.0, 1.0, 1.0]);
        assert!((white.r - 1.0).abs() < 1e-6);
        let grey = to_wgpu_color([0.5, 0.5, 0.5, 1.0]);
        assert!(grey.r < 0.25 && grey.r > 0.2);
        assert_eq!(grey.a, 1.0);
    }
}
