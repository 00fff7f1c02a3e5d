use epaint::Color32;

/// Lookup table mapping a normalised level onto colours.
pub trait ColorPalette: Send + Sync {
    /// Colour at index `i`, clamped to the table.
    fn color(&self, i: usize) -> Color32;

    /// Colour for `value` in `0.0..=1.0`; values outside are clamped.
    fn color_normalized(&self, value: f32) -> Color32 {
        let last = self.len().saturating_sub(1);
        let index = (value.clamp(0.0, 1.0) * last as f32).round() as usize;
        self.color(index)
    }

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Black through blue and red to white, the classic "hot iron" ramp with a
/// blue toe for weak signals.
#[derive(Debug, Clone)]
pub struct HotIronBluePalette {
    colors: Vec<Color32>,
}

impl HotIronBluePalette {
    const ANCHORS: [(f32, f32, f32, f32); 7] = [
        (0.00, 0.00, 0.00, 0.00),
        (0.15, 0.00, 0.00, 0.50),
        (0.35, 0.45, 0.00, 0.60),
        (0.55, 0.85, 0.10, 0.10),
        (0.75, 1.00, 0.55, 0.00),
        (0.90, 1.00, 0.90, 0.20),
        (1.00, 1.00, 1.00, 1.00),
    ];

    pub fn new() -> Self {
        let colors = (0..256)
            .map(|i| lerp_anchors(&Self::ANCHORS, i as f32 / 255.0))
            .collect();
        Self { colors }
    }
}

impl Default for HotIronBluePalette {
    fn default() -> Self {
        Self::new()
    }
}

impl ColorPalette for HotIronBluePalette {
    fn color(&self, i: usize) -> Color32 {
        self.colors[i.min(self.colors.len() - 1)]
    }

    fn len(&self) -> usize {
        self.colors.len()
    }
}

fn lerp_anchors(anchors: &[(f32, f32, f32, f32)], t: f32) -> Color32 {
    let t = t.clamp(0.0, 1.0);
    let mut i = 0;
    while i + 2 < anchors.len() && anchors[i + 1].0 < t {
        i += 1;
    }
    let (t0, r0, g0, b0) = anchors[i];
    let (t1, r1, g1, b1) = anchors[i + 1];
    let frac = if (t1 - t0).abs() < f32::EPSILON {
        0.0
    } else {
        (t - t0) / (t1 - t0)
    };
    let channel = |a: f32, b: f32| ((a + frac * (b - a)) * 255.0).round().clamp(0.0, 255.0) as u8;
    Color32::from_rgb(channel(r0, r1), channel(g0, g1), channel(b0, b1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ends_of_the_ramp() {
        let palette = HotIronBluePalette::new();
        assert_eq!(palette.len(), 256);
        assert_eq!(palette.color_normalized(0.0), Color32::BLACK);
        assert_eq!(palette.color_normalized(1.0), Color32::WHITE);
        assert_eq!(palette.color_normalized(-3.0), Color32::BLACK);
        assert_eq!(palette.color(10_000), Color32::WHITE);
    }

    #[test]
    fn test_brightness_grows_along_the_ramp() {
        let palette = HotIronBluePalette::new();
        let luma = |c: Color32| c.r() as u32 + c.g() as u32 + c.b() as u32;
        assert!(luma(palette.color_normalized(0.2)) < luma(palette.color_normalized(0.8)));
    }
}
