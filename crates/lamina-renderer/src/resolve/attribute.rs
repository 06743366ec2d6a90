use std::fmt;

use lamina_core::color::{self, Color, DEFAULT_PALETTE};
use lamina_core::marker::Marker;
use lamina_io::Column;

use crate::diagnostics::{Diagnostics, Warning};

/// A value type that bindings can resolve to.
pub trait Attribute: Clone + PartialEq + fmt::Debug {
    /// Name used in messages.
    const KIND: &'static str;

    /// Reads one table cell; `None` when the cell cannot be interpreted.
    fn from_cell(column: &Column, row: usize) -> Option<Self>;

    /// Applies the numeric scale factor of the resolution.
    fn scaled(self, _factor: f64) -> Self {
        self
    }

    /// Candidate values for random draws and for hashing unmapped groups,
    /// or `None` when the attribute has no such set.
    fn choices(_palette: Option<&str>, _diagnostics: &mut Diagnostics) -> Option<Vec<Self>> {
        None
    }

    /// Value written into alignment padding.
    fn padding() -> Self;
}

impl Attribute for f64 {
    const KIND: &'static str = "number";

    fn from_cell(column: &Column, row: usize) -> Option<Self> {
        column.number(row).filter(|n| n.is_finite())
    }

    fn scaled(self, factor: f64) -> Self {
        self * factor
    }

    fn padding() -> Self {
        0.0
    }
}

impl Attribute for bool {
    const KIND: &'static str = "visibility";

    fn from_cell(column: &Column, row: usize) -> Option<Self> {
        column.boolean(row)
    }

    fn padding() -> Self {
        false
    }
}

impl Attribute for Marker {
    const KIND: &'static str = "marker";

    fn from_cell(column: &Column, row: usize) -> Option<Self> {
        if let Some(name) = column.text(row) {
            return name.parse().ok();
        }
        let code = column.number(row)?;
        if code.fract() != 0.0 || !(0.0..=f64::from(u8::MAX)).contains(&code) {
            return None;
        }
        Marker::from_code(code as u8)
    }

    fn choices(_palette: Option<&str>, _diagnostics: &mut Diagnostics) -> Option<Vec<Self>> {
        Some(Marker::ALL.to_vec())
    }

    fn padding() -> Self {
        Marker::Disc
    }
}

impl Attribute for Color {
    const KIND: &'static str = "color";

    /// Hex strings, or integers read as `0xRRGGBB`.
    fn from_cell(column: &Column, row: usize) -> Option<Self> {
        if let Some(text) = column.text(row) {
            return text.parse().ok();
        }
        let hex = column.number(row)?;
        if hex.fract() != 0.0 || !(0.0..=f64::from(0xff_ffff)).contains(&hex) {
            return None;
        }
        Some(Color::from_hex(hex as u32))
    }

    fn choices(palette: Option<&str>, diagnostics: &mut Diagnostics) -> Option<Vec<Self>> {
        Some(named_palette(palette, DEFAULT_PALETTE, diagnostics).to_vec())
    }

    fn padding() -> Self {
        Color::BLACK
    }
}

/// Looks up `name`, falling back to `fallback` (with a warning when `name`
/// is unknown).
pub(crate) fn named_palette(
    name: Option<&str>,
    fallback: &str,
    diagnostics: &mut Diagnostics,
) -> &'static [Color] {
    if let Some(found) = name.and_then(color::palette) {
        return found;
    }
    if let Some(name) = name {
        diagnostics.push(Warning::UnknownPalette {
            name: name.to_string(),
        });
    }
    color::palette(fallback).unwrap_or_else(color::default_palette)
}
