use std::time::Instant;

use epaint::{Color32, ColorImage};

use crate::ema::Ema;
use crate::palette::{ColorPalette, HotIronBluePalette};
use crate::raster::{blank_image, blit_rows};
use crate::spectrum::SpectrumBuffer;

/// Marks a column no spectrum bin mapped to. Below any normalised power.
const NO_POWER: f32 = -1.0;
const LEGEND_STEP: usize = 3;
const LEGEND_BORDER: usize = 2;

/// Reduce a spectrum to one pixel row, keeping the strongest bin per column.
///
/// `row` receives normalised power in `0.0..=1.0` relative to the palette
/// window, or a value below zero where no bin landed.
pub fn reduce_row(power: &[f32], palette_start_db: f32, palette_size_db: f32, row: &mut [f32]) {
    row.fill(NO_POWER);
    if row.is_empty() || power.is_empty() {
        return;
    }
    let last = row.len() - 1;
    let width_per_bin = row.len() as f64 / power.len() as f64;
    for (i, &p) in power.iter().enumerate() {
        let level = ((p - palette_start_db) / palette_size_db).clamp(0.0, 1.0);
        let x = ((width_per_bin * i as f64).round() as usize).min(last);
        if level > row[x] {
            row[x] = level;
        }
    }
}

/// Scrolling waterfall kept as two images: the one being shown and the one
/// the next row is drawn into.
pub struct WaterfallPlot {
    images: [ColorImage; 2],
    draw_index: usize,
    row_max: Vec<f32>,
    palette: Box<dyn ColorPalette>,
    palette_start_db: f32,
    palette_size_db: f32,
    fps: Ema,
    frames: u32,
    last_fps_update: Instant,
    rendering_info: String,
}

impl WaterfallPlot {
    pub fn new(width: usize, history: usize) -> Self {
        let width = width.max(1);
        let history = history.max(1);
        Self {
            images: [blank_image(width, history), blank_image(width, history)],
            draw_index: 0,
            row_max: vec![NO_POWER; width],
            palette: Box::new(HotIronBluePalette::new()),
            palette_start_db: -90.0,
            palette_size_db: 65.0,
            fps: Ema::new(3),
            frames: 0,
            last_fps_update: Instant::now(),
            rendering_info: String::new(),
        }
    }

    /// Scroll the history down by one row and draw `spectrum` on top.
    pub fn add_new_data(&mut self, spectrum: &SpectrumBuffer) {
        reduce_row(
            spectrum.power(),
            self.palette_start_db,
            self.palette_size_db,
            &mut self.row_max,
        );

        let previous = self.draw_index;
        self.draw_index = (self.draw_index + 1) % 2;
        let [first, second] = &mut self.images;
        let (src, dst) = if previous == 0 {
            (&*first, second)
        } else {
            (&*second, first)
        };
        blit_rows(src, dst, 1);

        // Columns without a bin repeat the colour to their left.
        let mut last_valid = self.palette.color(0);
        for (pixel, &level) in dst.pixels.iter_mut().zip(&self.row_max) {
            if level >= 0.0 {
                last_valid = self.palette.color_normalized(level);
            }
            *pixel = last_valid;
        }

        self.update_rendering_info(spectrum);
    }

    fn update_rendering_info(&mut self, spectrum: &SpectrumBuffer) {
        self.frames += 1;
        let elapsed = self.last_fps_update.elapsed();
        if elapsed.as_millis() > 1000 {
            self.fps.add(self.frames as f64 / elapsed.as_secs_f64());
            self.frames = 0;
            self.last_fps_update = Instant::now();
        }
        let bins = spectrum.len();
        let (shown, suffix) = if bins >= 10_000 {
            (bins / 1000, "k")
        } else {
            (bins, "")
        };
        self.rendering_info = format!(
            "RBW {:.1}kHz / FFT bins: {}{} / {:.1}fps",
            spectrum.axis().bin_size_hz() / 1000.0,
            shown,
            suffix,
            self.fps.value()
        );
    }

    /// The most recently completed image.
    pub fn frame(&self) -> &ColorImage {
        &self.images[self.draw_index]
    }

    /// Normalised levels of the last drawn row, negative where no bin landed.
    pub fn last_row_levels(&self) -> &[f32] {
        &self.row_max
    }

    pub fn width(&self) -> usize {
        self.images[0].size[0]
    }

    pub fn history_size(&self) -> usize {
        self.images[0].size[1]
    }

    /// Resize the history, keeping as many of the newest rows as fit.
    pub fn set_history_size(&mut self, history: usize) {
        let history = history.max(1);
        let width = self.width();
        for image in &mut self.images {
            let mut resized = blank_image(width, history);
            blit_rows(image, &mut resized, 0);
            *image = resized;
        }
    }

    pub fn set_palette_start(&mut self, db: f32) {
        self.palette_start_db = db;
    }

    pub fn set_palette_size(&mut self, db: f32) {
        self.palette_size_db = db;
    }

    pub fn rendering_info(&self) -> &str {
        &self.rendering_info
    }

    /// Colour scale swatch, 100 % at the top down to 0 % at the bottom,
    /// framed on the top, right and bottom edges.
    pub fn scale_legend(&self, width: usize, height: usize) -> ColorImage {
        let mut legend = blank_image(width, height);
        if width == 0 || height == 0 {
            return legend;
        }
        for top in (0..height).step_by(LEGEND_STEP) {
            let color = self
                .palette
                .color_normalized(1.0 - top as f32 / height as f32);
            let bottom = (top + LEGEND_STEP).min(height);
            legend.pixels[top * width..bottom * width].fill(color);
        }

        let border = LEGEND_BORDER.min(height).min(width);
        legend.pixels[..border * width].fill(Color32::DARK_GRAY);
        legend.pixels[(height - border) * width..].fill(Color32::DARK_GRAY);
        for row in legend.pixels.chunks_mut(width) {
            row[width - border..].fill(Color32::DARK_GRAY);
        }
        legend
    }
}
