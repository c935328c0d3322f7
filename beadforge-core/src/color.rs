//! Palette colors and reserved cell values.

use serde::{Deserialize, Serialize};

/// Cell value for a structural gap: not rendered, not voiced.
pub const SKIP: u8 = 254;

/// Cell value for a palette hole: rendered as a checkerboard and flagged.
pub const EMPTY: u8 = 255;

/// Largest palette size addressable by a cell byte.
pub const MAX_PALETTE_LEN: usize = SKIP as usize;

/// Returns `true` for the reserved `SKIP` and `EMPTY` values.
#[must_use]
pub const fn is_reserved(index: u8) -> bool {
    index == SKIP || index == EMPTY
}

/// A palette entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
    /// Alpha channel; absent means fully opaque.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub a: Option<u8>,
    /// Human label shown in the palette.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Single-character symbol used on printed charts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
}

impl Color {
    /// Create an opaque color.
    #[must_use]
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self {
            r,
            g,
            b,
            a: None,
            name: None,
            symbol: None,
        }
    }

    /// Create a color with an explicit alpha channel.
    #[must_use]
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self {
            r,
            g,
            b,
            a: Some(a),
            name: None,
            symbol: None,
        }
    }

    /// Attach a display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Effective alpha (255 when absent).
    #[must_use]
    pub fn alpha(&self) -> u8 {
        self.a.unwrap_or(u8::MAX)
    }

    /// Whether the color is less than fully opaque.
    #[must_use]
    pub fn is_translucent(&self) -> bool {
        self.alpha() < u8::MAX
    }

    /// Relative luminance in `[0, 1]` (Rec. 709 weights, no gamma).
    #[must_use]
    pub fn luminance(&self) -> f32 {
        (0.2126 * f32::from(self.r) + 0.7152 * f32::from(self.g) + 0.0722 * f32::from(self.b))
            / 255.0
    }

    /// Squared Euclidean distance in RGB space.
    #[must_use]
    pub fn distance_sq(&self, other: &Self) -> u32 {
        let dr = i32::from(self.r) - i32::from(other.r);
        let dg = i32::from(self.g) - i32::from(other.g);
        let db = i32::from(self.b) - i32::from(other.b);
        dr.unsigned_abs().pow(2) + dg.unsigned_abs().pow(2) + db.unsigned_abs().pow(2)
    }

    /// `#rrggbb` hex string.
    #[must_use]
    pub fn hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::rgb(255, 255, 255)
    }
}
