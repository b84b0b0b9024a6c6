// Pixel formats, present modes and small geometric value types shared by
// every description.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    R8G8B8A8Unorm,
    R8G8B8A8UnormSrgb,
    B8G8R8A8Unorm,
    B8G8R8A8UnormSrgb,
    R16Uint,
    R32Uint,
    R32Float,
    R32G32Float,
    R32G32B32Float,
    R32G32B32A32Float,
}

impl Format {
    /// Size of one texel or vertex element in bytes.
    pub fn size_bytes(self) -> u32 {
        match self {
            Format::R16Uint => 2,
            Format::R8G8B8A8Unorm
            | Format::R8G8B8A8UnormSrgb
            | Format::B8G8R8A8Unorm
            | Format::B8G8R8A8UnormSrgb
            | Format::R32Uint
            | Format::R32Float => 4,
            Format::R32G32Float => 8,
            Format::R32G32B32Float => 12,
            Format::R32G32B32A32Float => 16,
        }
    }

    pub fn is_srgb(self) -> bool {
        matches!(self, Format::R8G8B8A8UnormSrgb | Format::B8G8R8A8UnormSrgb)
    }

    /// Formats a swapchain image or color attachment may use.
    pub fn is_color_target(self) -> bool {
        matches!(
            self,
            Format::R8G8B8A8Unorm
                | Format::R8G8B8A8UnormSrgb
                | Format::B8G8R8A8Unorm
                | Format::B8G8R8A8UnormSrgb
        )
    }

    /// Parse the lowercase names used in configuration files.
    pub fn from_name(name: &str) -> Option<Self> {
        let format = match name.to_lowercase().as_str() {
            "rgba8" | "rgba8_unorm" => Format::R8G8B8A8Unorm,
            "rgba8_srgb" | "rgba8_unorm_srgb" => Format::R8G8B8A8UnormSrgb,
            "bgra8" | "bgra8_unorm" => Format::B8G8R8A8Unorm,
            "bgra8_srgb" | "bgra8_unorm_srgb" => Format::B8G8R8A8UnormSrgb,
            _ => return None,
        };
        Some(format)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PresentMode {
    /// No vsync, lowest latency, may tear.
    Immediate,
    /// No vsync, no tearing, newest frame replaces the queued one.
    Mailbox,
    /// Vsync. Every backend supports it.
    Fifo,
    FifoRelaxed,
}

impl PresentMode {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "immediate" => Some(PresentMode::Immediate),
            "mailbox" => Some(PresentMode::Mailbox),
            "fifo" => Some(PresentMode::Fifo),
            "fifo_relaxed" => Some(PresentMode::FifoRelaxed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Size2D {
    pub width: u32,
    pub height: u32,
}

impl Size2D {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn area(self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl fmt::Display for Size2D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Linear RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ColorF {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl ColorF {
    pub const BLACK: ColorF = ColorF::new(0.0, 0.0, 0.0, 1.0);
    pub const TRANSPARENT: ColorF = ColorF::new(0.0, 0.0, 0.0, 0.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }

    /// Encode into the byte layout of an 8-bit color target format.
    ///
    /// sRGB formats get the sRGB transfer function applied to the color
    /// channels; alpha always stays linear.
    pub fn encode(self, format: Format) -> Option<[u8; 4]> {
        let (r, g, b) = if format.is_srgb() {
            (linear_to_srgb(self.r), linear_to_srgb(self.g), linear_to_srgb(self.b))
        } else {
            (self.r, self.g, self.b)
        };
        let [r, g, b, a] = [r, g, b, self.a].map(unorm8);
        match format {
            Format::R8G8B8A8Unorm | Format::R8G8B8A8UnormSrgb => Some([r, g, b, a]),
            Format::B8G8R8A8Unorm | Format::B8G8R8A8UnormSrgb => Some([b, g, r, a]),
            _ => None,
        }
    }
}

fn unorm8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn linear_to_srgb(v: f32) -> f32 {
    let v = v.clamp(0.0, 1.0);
    if v <= 0.003_130_8 {
        v * 12.92
    } else {
        1.055 * v.powf(1.0 / 2.4) - 0.055
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    pub fn from_size(size: Size2D) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: size.width as f32,
            height: size.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_swizzles_bgra() {
        let red = ColorF::new(1.0, 0.0, 0.0, 1.0);
        assert_eq!(red.encode(Format::R8G8B8A8Unorm), Some([255, 0, 0, 255]));
        assert_eq!(red.encode(Format::B8G8R8A8Unorm), Some([0, 0, 255, 255]));
        assert_eq!(red.encode(Format::R32Float), None);
    }

    #[test]
    fn encode_applies_srgb_curve_to_color_only() {
        let grey = ColorF::new(0.5, 0.5, 0.5, 0.5);
        let [r, g, b, a] = grey.encode(Format::R8G8B8A8UnormSrgb).unwrap();
        assert_eq!((r, g, b), (188, 188, 188));
        assert_eq!(a, 128);
    }

    #[test]
    fn names_parse_case_insensitively() {
        assert_eq!(Format::from_name("BGRA8"), Some(Format::B8G8R8A8Unorm));
        assert_eq!(PresentMode::from_name("Mailbox"), Some(PresentMode::Mailbox));
        assert_eq!(PresentMode::from_name("vsync"), None);
    }
}
