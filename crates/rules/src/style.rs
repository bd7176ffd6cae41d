//! Redaction appearance

use serde::{Deserialize, Serialize};

/// RGB color with components in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb { r: 0.0, g: 0.0, b: 0.0 };
    pub const WHITE: Rgb = Rgb { r: 1.0, g: 1.0, b: 1.0 };

    /// Builds a color, clamping each component into `[0, 1]`.
    /// Non-finite components become 0.
    pub fn new(r: f32, g: f32, b: f32) -> Self {
        let clamp = |v: f32| if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 };
        Self {
            r: clamp(r),
            g: clamp(g),
            b: clamp(b),
        }
    }

    pub fn luminance(&self) -> f32 {
        0.299 * self.r + 0.587 * self.g + 0.114 * self.b
    }

    pub fn components(&self) -> [f32; 3] {
        [self.r, self.g, self.b]
    }
}

impl Default for Rgb {
    fn default() -> Self {
        Rgb::BLACK
    }
}

/// Placeholder label and fill color stamped over every redacted region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RedactionStyle {
    pub placeholder_text: String,
    pub fill_color: Rgb,
}

impl RedactionStyle {
    pub const DEFAULT_PLACEHOLDER: &'static str = "[REDACTED]";

    pub fn new(placeholder_text: impl Into<String>, fill_color: Rgb) -> Self {
        let fill_color = Rgb::new(fill_color.r, fill_color.g, fill_color.b);
        Self {
            placeholder_text: placeholder_text.into(),
            fill_color,
        }
    }

    /// Foreground for the placeholder: white on dark fills, black on light ones.
    pub fn text_color(&self) -> Rgb {
        if self.fill_color.luminance() < 0.5 {
            Rgb::WHITE
        } else {
            Rgb::BLACK
        }
    }
}

impl Default for RedactionStyle {
    fn default() -> Self {
        Self {
            placeholder_text: Self::DEFAULT_PLACEHOLDER.to_string(),
            fill_color: Rgb::BLACK,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_style() {
        let style = RedactionStyle::default();
        assert_eq!(style.placeholder_text, "[REDACTED]");
        assert_eq!(style.fill_color, Rgb::BLACK);
        assert_eq!(style.text_color(), Rgb::WHITE);
    }

    #[test]
    fn test_light_fill_uses_dark_text() {
        let style = RedactionStyle::new("X", Rgb::new(1.0, 1.0, 0.8));
        assert_eq!(style.text_color(), Rgb::BLACK);
    }

    #[test]
    fn test_components_are_clamped() {
        let c = Rgb::new(-1.0, 2.0, f32::NAN);
        assert_eq!(c.components(), [0.0, 1.0, 0.0]);
    }
}
