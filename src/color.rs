use bytemuck::{Pod, Zeroable};

/// A color with normalized (0.0 to 1.0) RGBA channels.
///
/// This is the format vertices carry to the GPU. Use [`Color::to_packed`] to get a packed 8-bit-per-channel integer.
#[derive(Debug, Clone, Copy, PartialEq, Zeroable, Pod)]
#[repr(C)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Default for Color {
    fn default() -> Self {
        return Color::WHITE;
    }
}

impl Color {
    pub const RED: Color = Color::rgba(1.0, 0.0, 0.0, 1.0);
    pub const GREEN: Color = Color::rgba(0.0, 1.0, 0.0, 1.0);
    pub const BLUE: Color = Color::rgba(0.0, 0.0, 1.0, 1.0);
    pub const WHITE: Color = Color::rgba(1.0, 1.0, 1.0, 1.0);
    pub const NEAR_WHITE: Color = Color::rgba(0.95, 0.95, 0.95, 1.0);
    pub const LIGHT_GREY: Color = Color::rgba(0.8, 0.8, 0.8, 1.0);
    pub const GREY: Color = Color::rgba(0.5, 0.5, 0.5, 1.0);
    pub const DARK_GREY: Color = Color::rgba(0.2, 0.2, 0.2, 1.0);
    pub const NEAR_BLACK: Color = Color::rgba(0.05, 0.05, 0.05, 1.0);
    pub const BLACK: Color = Color::rgba(0.0, 0.0, 0.0, 1.0);
    pub const TRANSPARENT: Color = Color::rgba(1.0, 1.0, 1.0, 0.0);

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Color {
        Color { r, g, b, a }
    }

    pub const fn alpha(mut self, alpha: f32) -> Self {
        self.a = alpha;
        return self;
    }

    pub fn from_rgba8(r: u8, g: u8, b: u8, a: u8) -> Color {
        return Color::rgba(
            r as f32 / 255.0,
            g as f32 / 255.0,
            b as f32 / 255.0,
            a as f32 / 255.0,
        );
    }

    pub fn to_array(self) -> [f32; 4] {
        return [self.r, self.g, self.b, self.a];
    }

    pub fn clamped(self) -> Color {
        return Color::rgba(
            self.r.clamp(0.0, 1.0),
            self.g.clamp(0.0, 1.0),
            self.b.clamp(0.0, 1.0),
            self.a.clamp(0.0, 1.0),
        );
    }

    /// Packs the color into `(a << 24) | (b << 16) | (g << 8) | r`, 8 bits per channel.
    pub fn to_packed(self) -> u32 {
        let c = self.clamped();
        let byte = |v: f32| (v * 255.0).round() as u32 & 0xFF;
        return (byte(c.a) << 24) | (byte(c.b) << 16) | (byte(c.g) << 8) | byte(c.r);
    }

    pub fn from_packed(packed: u32) -> Color {
        return Color::from_rgba8(
            (packed & 0xFF) as u8,
            ((packed >> 8) & 0xFF) as u8,
            ((packed >> 16) & 0xFF) as u8,
            ((packed >> 24) & 0xFF) as u8,
        );
    }

    /// `hue`, `sat` and `value` are expected in 0.0..=1.0. Components outside this range give garbage.
    pub fn from_hsv(hue: f32, sat: f32, value: f32, alpha: f32) -> Color {
        if sat < f32::EPSILON {
            return Color::rgba(value, value, value, alpha);
        }

        let hue = hue * 6.0;
        let face = hue.floor();
        let frac = hue - face;
        let beta = value * (1.0 - sat);
        let falling = value * (1.0 - frac * sat);
        let rising = value * (1.0 - sat * (1.0 - frac));

        let (r, g, b) = match (face as i32).rem_euclid(6) {
            0 => (value, rising, beta),
            1 => (falling, value, beta),
            2 => (beta, value, rising),
            3 => (beta, falling, value),
            4 => (rising, beta, value),
            _ => (value, beta, falling),
        };
        return Color::rgba(r, g, b, alpha);
    }

    /// Returns `[hue, sat, value, alpha]`, treating `self` as RGB.
    pub fn to_hsv(self) -> [f32; 4] {
        let c = self.clamped();
        let upper = c.r.max(c.g).max(c.b);
        let lower = c.r.min(c.g).min(c.b);
        let chroma = upper - lower;

        if chroma <= 0.0 {
            return [0.0, 0.0, upper, c.a];
        }

        let hue = if upper == c.r {
            let h = ((c.g - c.b) / chroma) / 6.0;
            if h < 0.0 { h + 1.0 } else { h }
        } else if upper == c.g {
            (2.0 + (c.b - c.r) / chroma) / 6.0
        } else {
            (4.0 + (c.r - c.g) / chroma) / 6.0
        };

        return [hue, chroma / upper, upper, c.a];
    }

    pub fn blend(self, other: Color, factor: f32) -> Color {
        let inv = 1.0 - factor;
        return Color::rgba(
            self.r * inv + other.r * factor,
            self.g * inv + other.g * factor,
            self.b * inv + other.b * factor,
            self.a * inv + other.a * factor,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_channel_order() {
        let c = Color::from_rgba8(0x11, 0x22, 0x33, 0x44);
        assert_eq!(c.to_packed(), 0x44332211);
        assert_eq!(Color::WHITE.to_packed(), 0xFFFFFFFF);
        assert_eq!(Color::from_packed(0x44332211).to_packed(), 0x44332211);
    }

    #[test]
    fn packing_clamps_out_of_range_channels() {
        let c = Color::rgba(2.0, -1.0, 0.0, 1.0);
        assert_eq!(c.to_packed(), 0xFF0000FF);
    }

    #[test]
    fn hsv_primaries() {
        let red = Color::from_hsv(0.0, 1.0, 1.0, 1.0);
        assert_eq!(red, Color::RED);

        let [h, s, v, _] = Color::BLUE.to_hsv();
        assert!((h - 4.0 / 6.0).abs() < 1e-6);
        assert_eq!(s, 1.0);
        assert_eq!(v, 1.0);

        let grey = Color::from_hsv(0.3, 0.0, 0.5, 1.0);
        assert_eq!(grey, Color::rgba(0.5, 0.5, 0.5, 1.0));
    }
}
