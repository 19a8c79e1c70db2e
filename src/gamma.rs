// Lookup tables for gamma-correct blending of anti-aliased stroke edges.
// Visual: soft stroke edges without dark fringes, without a powf per pixel.

use crate::types::Rgb;

pub struct GammaLut {
    // sRGB(0..255) -> linear (0..1) as f32
    srgb_to_linear: [f32; 256],
    // linear(0..1) -> sRGB(0..255) via 4096-step quantization
    // (index = (linear * 4095).round())
    linear_to_srgb: [u8; 4096],
}

impl Default for GammaLut {
    fn default() -> Self {
        Self::new()
    }
}

impl GammaLut {
    /// Build both tables once.
    pub fn new() -> Self {
        let mut s2l = [0.0f32; 256];
        for (v, slot) in s2l.iter_mut().enumerate() {
            let c = v as f32 / 255.0;
            *slot = if c <= 0.04045 { c / 12.92 } else { ((c + 0.055) / 1.055).powf(2.4) };
        }

        let mut l2s = [0u8; 4096];
        for (i, slot) in l2s.iter_mut().enumerate() {
            let l = (i as f32) / 4095.0;
            let s = if l <= 0.003_130_8 { 12.92 * l } else { 1.055 * l.powf(1.0 / 2.4) - 0.055 };
            *slot = (s * 255.0).round().clamp(0.0, 255.0) as u8;
        }

        Self { srgb_to_linear: s2l, linear_to_srgb: l2s }
    }

    #[inline]
    pub fn srgb_u8_to_linear(&self, v: u8) -> f32 {
        self.srgb_to_linear[v as usize]
    }

    #[inline]
    pub fn linear_to_srgb_u8(&self, l: f32) -> u8 {
        let idx = (l.clamp(0.0, 1.0) * 4095.0).round() as usize;
        self.linear_to_srgb[idx]
    }

    /// Mix `src` over the packed pixel `dst` with `coverage` in [0,1].
    /// Full coverage writes `src` exactly; zero coverage leaves `dst` untouched.
    #[inline]
    pub fn blend(&self, dst: u32, src: Rgb, coverage: f32) -> u32 {
        if coverage >= 1.0 {
            return src.to_u32();
        }
        if coverage <= 0.0 {
            return dst;
        }
        let d = Rgb::from_u32(dst);
        let mix = |a: u8, b: u8| {
            let la = self.srgb_u8_to_linear(a);
            let lb = self.srgb_u8_to_linear(b);
            self.linear_to_srgb_u8(la + (lb - la) * coverage)
        };
        Rgb(mix(d.0, src.0), mix(d.1, src.1), mix(d.2, src.2)).to_u32()
    }
}
