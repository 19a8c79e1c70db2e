// Software raster surface: the drawing canvas.
//
// Paths are built with `move_to`/`line_to` in logical units; each `line_to`
// strokes one round-capped segment, scaled by the device pixel ratio, straight
// into the pixel buffer. Snapshots are PNG-encoded copies of the whole buffer.

use std::io::Cursor;

use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, ImageFormat};
use tracing::trace;

use crate::error::Error;
use crate::gamma::GammaLut;
use crate::types::{BACKGROUND, Composite, FrameBuffer, Point, Rgb, StrokeStyle, Viewport};

/// Per-channel distance from the background still counted as "paper".
/// Absorbs faint anti-aliasing residue.
pub const EMPTY_TOLERANCE: u8 = 15;

pub struct Surface {
    dpr: f32,
    frame: FrameBuffer,
    lut: GammaLut,
    pen: Option<Point>, // current path position (logical units)
}

impl Surface {
    /// A surface of `logical_width` x `logical_height` backed by
    /// `logical * dpr` device pixels, filled with the background.
    pub fn new(logical_width: u32, logical_height: u32, dpr: f32) -> Self {
        let dpr = if dpr.is_finite() && dpr > 0.0 { dpr } else { 1.0 };
        let device = |logical: u32| ((logical as f32 * dpr).floor() as usize).max(1);
        let frame = FrameBuffer::filled(device(logical_width), device(logical_height), BACKGROUND);
        Self {
            dpr,
            frame,
            lut: GammaLut::new(),
            pen: None,
        }
    }

    /// Device pixels across.
    pub fn width(&self) -> usize {
        self.frame.width
    }

    /// Device pixels down.
    pub fn height(&self) -> usize {
        self.frame.height
    }

    pub fn dpr(&self) -> f32 {
        self.dpr
    }

    pub fn frame(&self) -> &FrameBuffer {
        &self.frame
    }

    /// Translate a page position into the surface's logical coordinates.
    ///
    /// The offset of the surface on the page is removed, the result is scaled
    /// by (device pixels / displayed size), then divided by the device pixel
    /// ratio so that the stroke lands under the pointer.
    pub fn map_from_page(&self, page: Point, viewport: &Viewport) -> Point {
        let sx = if viewport.width > 0.0 { self.frame.width as f32 / viewport.width } else { 1.0 };
        let sy = if viewport.height > 0.0 { self.frame.height as f32 / viewport.height } else { 1.0 };
        Point::new(
            (page.x - viewport.left) * sx / self.dpr,
            (page.y - viewport.top) * sy / self.dpr,
        )
    }

    /* ---------- path construction ---------- */

    /// Forget the current path.
    pub fn begin_path(&mut self) {
        self.pen = None;
    }

    pub fn move_to(&mut self, p: Point) {
        self.pen = Some(p);
    }

    /// Stroke from the pen to `p` and move the pen there.
    /// Without a pen this behaves like `move_to`.
    pub fn line_to(&mut self, p: Point, style: &StrokeStyle) {
        if let Some(from) = self.pen {
            self.stroke_segment(from, p, style);
        }
        self.pen = Some(p);
    }

    /// End the path. Nothing is drawn back to the start point.
    pub fn close_path(&mut self) {
        self.pen = None;
    }

    /* ---------- fills ---------- */

    pub fn fill(&mut self, color: Rgb) {
        self.frame.pixels.fill(color.to_u32());
    }

    /// Wipe back to paper.
    pub fn clear(&mut self) {
        self.fill(BACKGROUND);
    }

    /// True when every pixel is within `tolerance` of the background.
    pub fn is_blank(&self, tolerance: u8) -> bool {
        self.frame
            .pixels
            .iter()
            .all(|&px| Rgb::from_u32(px).near(BACKGROUND, tolerance))
    }

    /* ---------- snapshots ---------- */

    /// Encode the whole buffer as a PNG.
    pub fn encode_png(&self) -> Result<Vec<u8>, Error> {
        let mut rgb = Vec::with_capacity(self.frame.pixels.len() * 3);
        for &px in &self.frame.pixels {
            let c = Rgb::from_u32(px);
            rgb.extend_from_slice(&[c.0, c.1, c.2]);
        }

        let mut out = Cursor::new(Vec::new());
        PngEncoder::new(&mut out).write_image(
            &rgb,
            self.frame.width as u32,
            self.frame.height as u32,
            ExtendedColorType::Rgb8,
        )?;
        Ok(out.into_inner())
    }

    /// Wipe to background and draw a PNG at the origin, one image pixel per
    /// device pixel. Parts that do not fit are clipped.
    pub fn draw_png(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let img = image::load_from_memory_with_format(bytes, ImageFormat::Png)?.to_rgb8();
        self.clear();

        let w = (img.width() as usize).min(self.frame.width);
        let h = (img.height() as usize).min(self.frame.height);
        for y in 0..h {
            for x in 0..w {
                let p = img.get_pixel(x as u32, y as u32);
                self.frame.pixels[y * self.frame.width + x] = Rgb(p[0], p[1], p[2]).to_u32();
            }
        }
        trace!(w, h, "restored snapshot");
        Ok(())
    }

    /* ---------- rasterization ---------- */

    /// Stroke one segment with round caps. Pixels are covered by their
    /// distance to the segment, with a one pixel soft edge.
    fn stroke_segment(&mut self, a: Point, b: Point, style: &StrokeStyle) {
        let half = style.width * self.dpr * 0.5;
        if half <= 0.0 {
            return;
        }
        let (ax, ay) = (a.x * self.dpr, a.y * self.dpr);
        let (bx, by) = (b.x * self.dpr, b.y * self.dpr);

        let reach = half + 1.0;
        let x0 = (ax.min(bx) - reach).floor().max(0.0) as usize;
        let y0 = (ay.min(by) - reach).floor().max(0.0) as usize;
        let x1 = ((ax.max(bx) + reach).ceil().max(0.0) as usize).min(self.frame.width);
        let y1 = ((ay.max(by) + reach).ceil().max(0.0) as usize).min(self.frame.height);

        let src = match style.composite {
            Composite::SourceOver => style.color,
            Composite::DestinationOut => BACKGROUND,
        };

        let (dx, dy) = (bx - ax, by - ay);
        let len2 = dx * dx + dy * dy;

        for y in y0..y1 {
            for x in x0..x1 {
                // Pixel centers sit at half-integer positions.
                let (px, py) = (x as f32 + 0.5, y as f32 + 0.5);
                let t = if len2 > 0.0 {
                    (((px - ax) * dx + (py - ay) * dy) / len2).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                let (cx, cy) = (ax + dx * t - px, ay + dy * t - py);
                let dist = (cx * cx + cy * cy).sqrt();

                let coverage = (half + 0.5 - dist).clamp(0.0, 1.0);
                if coverage > 0.0 {
                    let idx = y * self.frame.width + x;
                    self.frame.pixels[idx] = self.lut.blend(self.frame.pixels[idx], src, coverage);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DEFAULT_INK, ToolState};

    fn pen() -> StrokeStyle {
        ToolState::default().stroke_style()
    }

    fn pixel(s: &Surface, x: usize, y: usize) -> Rgb {
        Rgb::from_u32(s.frame().pixels[y * s.width() + x])
    }

    #[test]
    fn device_size_follows_dpr() {
        let s = Surface::new(100, 50, 2.0);
        assert_eq!((s.width(), s.height()), (200, 100));
    }

    #[test]
    fn fresh_surface_is_blank() {
        assert!(Surface::new(32, 32, 1.0).is_blank(EMPTY_TOLERANCE));
    }

    #[test]
    fn line_paints_under_its_center() {
        let mut s = Surface::new(40, 40, 1.0);
        s.begin_path();
        s.move_to(Point::new(5.5, 20.5));
        s.line_to(Point::new(35.5, 20.5), &pen());
        assert_eq!(pixel(&s, 20, 20), DEFAULT_INK);
        assert_eq!(pixel(&s, 20, 30), BACKGROUND);
        assert!(!s.is_blank(EMPTY_TOLERANCE));
    }

    #[test]
    fn line_to_without_pen_draws_nothing() {
        let mut s = Surface::new(20, 20, 1.0);
        s.begin_path();
        s.line_to(Point::new(10.0, 10.0), &pen());
        assert!(s.is_blank(0));
    }

    #[test]
    fn strokes_scale_with_dpr() {
        let mut s = Surface::new(20, 20, 2.0);
        s.move_to(Point::new(2.0, 10.0));
        s.line_to(Point::new(18.0, 10.0), &pen());
        // Logical y=10 is device row 20; width 3 becomes 6 device pixels.
        assert_eq!(pixel(&s, 20, 20), DEFAULT_INK);
        assert_eq!(pixel(&s, 20, 17), DEFAULT_INK);
        assert_eq!(pixel(&s, 20, 10), BACKGROUND);
    }

    #[test]
    fn eraser_reveals_background() {
        let mut s = Surface::new(40, 40, 1.0);
        s.move_to(Point::new(5.5, 20.5));
        s.line_to(Point::new(35.5, 20.5), &pen());

        let mut tools = ToolState::default();
        tools.toggle_eraser();
        s.begin_path();
        s.move_to(Point::new(0.0, 20.5));
        s.line_to(Point::new(40.0, 20.5), &tools.stroke_style());
        assert!(s.is_blank(EMPTY_TOLERANCE));
    }

    #[test]
    fn png_restores_identical_pixels() {
        let mut s = Surface::new(30, 20, 1.0);
        s.move_to(Point::new(3.0, 3.0));
        s.line_to(Point::new(25.0, 15.0), &pen());
        let png = s.encode_png().unwrap();
        let before = s.frame().clone();

        s.clear();
        s.draw_png(&png).unwrap();
        assert_eq!(s.frame(), &before);
        assert_eq!(s.encode_png().unwrap(), png);
    }

    #[test]
    fn smaller_surface_clips_restored_image() {
        let mut big = Surface::new(40, 40, 1.0);
        big.move_to(Point::new(2.5, 2.5));
        big.line_to(Point::new(38.0, 38.0), &pen());
        let png = big.encode_png().unwrap();

        let mut small = Surface::new(10, 10, 1.0);
        small.draw_png(&png).unwrap();
        assert_eq!(pixel(&small, 2, 2), DEFAULT_INK);
    }

    #[test]
    fn page_points_map_through_layout_scaling() {
        let s = Surface::new(100, 100, 2.0);
        // Displayed at 50x50 CSS pixels, offset by (10, 20) on the page.
        let vp = Viewport { left: 10.0, top: 20.0, width: 50.0, height: 50.0 };
        let p = s.map_from_page(Point::new(35.0, 45.0), &vp);
        // (25 * 200/50) / 2 = 50
        assert_eq!(p, Point::new(50.0, 50.0));
    }
}
