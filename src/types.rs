// Core types shared by the surface, the session and the window loop.

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameBuffer {
    pub width: usize,     // device pixels across
    pub height: usize,    // device pixels down
    pub pixels: Vec<u32>, // each entry is 0x00RRGGBB for minifb
}

impl FrameBuffer {
    /// A buffer where every pixel is `color`.
    pub fn filled(width: usize, height: usize, color: Rgb) -> Self {
        Self {
            width,
            height,
            pixels: vec![color.to_u32(); width * height],
        }
    }
}

/// 8-bit sRGB color.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    #[inline]
    pub const fn from_u32(px: u32) -> Self {
        Rgb((px >> 16) as u8, (px >> 8) as u8, px as u8)
    }

    #[inline]
    pub const fn to_u32(self) -> u32 {
        ((self.0 as u32) << 16) | ((self.1 as u32) << 8) | self.2 as u32
    }

    /// True when every channel differs from `other` by at most `tolerance`.
    #[inline]
    pub fn near(self, other: Rgb, tolerance: u8) -> bool {
        self.0.abs_diff(other.0) <= tolerance
            && self.1.abs_diff(other.1) <= tolerance
            && self.2.abs_diff(other.2) <= tolerance
    }
}

/// Paper color of the surface (#fafafa).
pub const BACKGROUND: Rgb = Rgb(0xfa, 0xfa, 0xfa);
/// Default ink (#2c3e50).
pub const DEFAULT_INK: Rgb = Rgb(0x2c, 0x3e, 0x50);

/// Ink colors bound to the number keys 1..=6.
pub const PALETTE: [Rgb; 6] = [
    DEFAULT_INK,
    Rgb(0xe7, 0x4c, 0x3c), // red
    Rgb(0x34, 0x98, 0xdb), // blue
    Rgb(0x27, 0xae, 0x60), // green
    Rgb(0xf3, 0x9c, 0x12), // orange
    Rgb(0x9b, 0x59, 0xb6), // purple
];

/// A position in logical (CSS-like) units unless stated otherwise.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Where the surface sits on the page and how large it is displayed there.
/// With a native window the offset is zero and the size is the window size.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

/// How a stroke combines with what is already on the surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Composite {
    /// Normal paint.
    SourceOver,
    /// Removes ink. The surface is opaque, so this reveals the background.
    DestinationOut,
}

/// Everything the rasterizer needs to stroke one segment. Caps and joins
/// are always round.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StrokeStyle {
    pub color: Rgb,
    pub width: f32, // logical units
    pub composite: Composite,
}

pub const MIN_STROKE_WIDTH: u32 = 1;
pub const MAX_STROKE_WIDTH: u32 = 20;
pub const DEFAULT_STROKE_WIDTH: u32 = 3;

/// Current pen settings. Not part of the undo history.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ToolState {
    pub color: Rgb,
    pub stroke_width: u32,
    pub eraser: bool,
}

impl Default for ToolState {
    fn default() -> Self {
        Self {
            color: DEFAULT_INK,
            stroke_width: DEFAULT_STROKE_WIDTH,
            eraser: false,
        }
    }
}

impl ToolState {
    /// The eraser is twice as wide as the pen.
    pub fn stroke_style(&self) -> StrokeStyle {
        if self.eraser {
            StrokeStyle {
                color: Rgb(0, 0, 0),
                width: (self.stroke_width * 2) as f32,
                composite: Composite::DestinationOut,
            }
        } else {
            StrokeStyle {
                color: self.color,
                width: self.stroke_width as f32,
                composite: Composite::SourceOver,
            }
        }
    }

    /// Picking a color always returns to the pen.
    pub fn select_color(&mut self, color: Rgb) {
        self.color = color;
        self.eraser = false;
    }

    /// Leaving eraser mode resets the ink to the default color.
    pub fn toggle_eraser(&mut self) {
        self.eraser = !self.eraser;
        if !self.eraser {
            self.color = DEFAULT_INK;
        }
    }

    pub fn set_stroke_width(&mut self, width: u32) {
        self.stroke_width = width.clamp(MIN_STROKE_WIDTH, MAX_STROKE_WIDTH);
    }
}
