use epaint::{Color32, ColorImage};

/// Opaque black image of the given size.
pub fn blank_image(width: usize, height: usize) -> ColorImage {
    ColorImage {
        size: [width, height],
        source_size: [width as f32, height as f32].into(),
        pixels: vec![Color32::BLACK; width * height],
    }
}

/// Copy the rows of `src` into `dst` starting at `dst_row`, clipping whatever
/// falls outside `dst`. Widths may differ; columns are clipped too.
pub fn blit_rows(src: &ColorImage, dst: &mut ColorImage, dst_row: usize) {
    let [src_w, src_h] = src.size;
    let [dst_w, dst_h] = dst.size;
    let cols = src_w.min(dst_w);
    for y in 0..src_h {
        let target = y + dst_row;
        if target >= dst_h {
            break;
        }
        let from = y * src_w;
        let to = target * dst_w;
        dst.pixels[to..to + cols].copy_from_slice(&src.pixels[from..from + cols]);
    }
}
