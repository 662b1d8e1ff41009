//! RGBA color with normalized float channels
//!
//! Colors are stored exactly as given; no channel clamping is applied by the
//! settings store. Hex helpers exist for the CLI host.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// RGBA color, each channel nominally in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    pub const WHITE: Rgba = Rgba::new(1.0, 1.0, 1.0, 1.0);
    pub const BLACK: Rgba = Rgba::new(0.0, 0.0, 0.0, 1.0);
    pub const RED: Rgba = Rgba::new(1.0, 0.0, 0.0, 1.0);
    pub const GREEN: Rgba = Rgba::new(0.0, 1.0, 0.0, 1.0);
    pub const BLUE: Rgba = Rgba::new(0.0, 0.0, 1.0, 1.0);
    pub const YELLOW: Rgba = Rgba::new(1.0, 0.92, 0.016, 1.0);
    pub const CYAN: Rgba = Rgba::new(0.0, 1.0, 1.0, 1.0);
    pub const MAGENTA: Rgba = Rgba::new(1.0, 0.0, 1.0, 1.0);
    pub const GRAY: Rgba = Rgba::new(0.5, 0.5, 0.5, 1.0);

    /// Palette used when randomizing a character
    pub const PALETTE: [Rgba; 8] = [
        Rgba::RED,
        Rgba::GREEN,
        Rgba::BLUE,
        Rgba::YELLOW,
        Rgba::CYAN,
        Rgba::MAGENTA,
        Rgba::WHITE,
        Rgba::GRAY,
    ];

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn is_finite(&self) -> bool {
        self.r.is_finite() && self.g.is_finite() && self.b.is_finite() && self.a.is_finite()
    }

    /// Parse a hex color string
    /// Supports both 6-digit (RRGGBB) and 8-digit (AARRGGBB) formats,
    /// with or without a leading '#'. 6-digit colors are fully opaque.
    pub fn parse_hex(input: &str) -> Option<Self> {
        let hex = input.trim();
        let hex = hex.strip_prefix('#').unwrap_or(hex);
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }

        let argb = match hex.len() {
            6 => 0xFF00_0000 | u32::from_str_radix(hex, 16).ok()?,
            8 => u32::from_str_radix(hex, 16).ok()?,
            _ => return None,
        };

        Some(Self::from_argb32(argb))
    }

    pub fn from_argb32(argb: u32) -> Self {
        let channel = |shift: u32| ((argb >> shift) & 0xFF) as f32 / 255.0;
        Self {
            a: channel(24),
            r: channel(16),
            g: channel(8),
            b: channel(0),
        }
    }

    /// Pack into ARGB, clamping each channel to a byte
    pub fn to_argb32(&self) -> u32 {
        let byte = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u32;
        (byte(self.a) << 24) | (byte(self.r) << 16) | (byte(self.g) << 8) | byte(self.b)
    }

    /// Format as "#AARRGGBB"
    pub fn to_hex_string(&self) -> String {
        format!("#{:08X}", self.to_argb32())
    }
}

impl Default for Rgba {
    fn default() -> Self {
        Self::WHITE
    }
}

impl fmt::Display for Rgba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex_string())
    }
}

impl FromStr for Rgba {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_hex(s).ok_or_else(|| format!("invalid hex color '{s}' (expected RRGGBB or AARRGGBB)"))
    }
}
