//! Per-cell presentation attributes.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HAlign {
    Left,
    Center,
    Right,
    Fill,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VAlign {
    Top,
    Middle,
    Bottom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Alignment {
    pub horizontal: HAlign,
    pub vertical: VAlign,
}

impl Alignment {
    pub const LEFT: Alignment = Alignment {
        horizontal: HAlign::Left,
        vertical: VAlign::Top,
    };
    pub const RIGHT: Alignment = Alignment {
        horizontal: HAlign::Right,
        vertical: VAlign::Top,
    };
    pub const CENTER: Alignment = Alignment {
        horizontal: HAlign::Center,
        vertical: VAlign::Middle,
    };
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Font {
    pub name: String,
    pub size: f32,
    pub bold: bool,
    pub italic: bool,
}

impl Font {
    pub fn new(name: impl Into<String>, size: f32) -> Self {
        Font {
            name: name.into(),
            size,
            bold: false,
            italic: false,
        }
    }

    pub fn bold(mut self) -> Self {
        self.bold = true;
        self
    }
}

/// 0xRRGGBB
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color(pub u32);

impl Color {
    pub const BLACK: Color = Color(0x000000);
    pub const WHITE: Color = Color(0xFFFFFF);

    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Color(u32::from(r) << 16 | u32::from(g) << 8 | u32::from(b))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BorderStyle {
    None,
    #[default]
    Thin,
    Medium,
    Thick,
    Dashed,
    Dotted,
    Double,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Insets {
    pub top: i32,
    pub left: i32,
    pub bottom: i32,
    pub right: i32,
}

impl Insets {
    pub fn uniform(v: i32) -> Self {
        Insets {
            top: v,
            left: v,
            bottom: v,
            right: v,
        }
    }
}

/// A merged region anchored at its top-left cell: `width` columns by `height` rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub width: usize,
    pub height: usize,
}

impl Span {
    pub fn new(width: usize, height: usize) -> Self {
        Span { width, height }
    }

    /// A 1x1 (or degenerate) span merges nothing.
    pub fn is_trivial(&self) -> bool {
        self.width <= 1 && self.height <= 1 || self.width == 0 || self.height == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_rgb() {
        assert_eq!(Color::rgb(0x12, 0x34, 0x56), Color(0x123456));
    }

    #[test]
    fn test_trivial_span() {
        assert!(Span::new(1, 1).is_trivial());
        assert!(Span::new(3, 0).is_trivial());
        assert!(!Span::new(1, 2).is_trivial());
    }
}
