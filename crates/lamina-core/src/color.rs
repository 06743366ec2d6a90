use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An opaque RGB color. Alpha is carried separately as an opacity byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const GRAY: Color = Color::rgb(128, 128, 128);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub const fn from_hex(hex: u32) -> Self {
        Self::rgb((hex >> 16) as u8, (hex >> 8) as u8, hex as u8)
    }

    /// `0x00RRGGBB`.
    pub const fn to_rgb_u32(self) -> u32 {
        ((self.r as u32) << 16) | ((self.g as u32) << 8) | self.b as u32
    }

    /// `0xRRGGBBAA` where the alpha byte is `opacity` when visible and zero
    /// otherwise, whatever the configured opacity.
    pub const fn pack(self, visible: bool, opacity: u8) -> u32 {
        let alpha = if visible { opacity } else { 0 };
        (self.to_rgb_u32() << 8) | alpha as u32
    }

    pub fn to_f32_array(self, opacity: f32) -> [f32; 4] {
        [
            f32::from(self.r) / 255.0,
            f32::from(self.g) / 255.0,
            f32::from(self.b) / 255.0,
            opacity,
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid color '{0}': expected #rgb or #rrggbb")]
pub struct ColorParseError(pub String);

impl FromStr for Color {
    type Err = ColorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ColorParseError(s.to_string());
        let hex = s.trim().strip_prefix('#').ok_or_else(err)?;
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(err());
        }
        match hex.len() {
            6 => u32::from_str_radix(hex, 16)
                .map(Color::from_hex)
                .map_err(|_| err()),
            3 => {
                let mut channels = [0u8; 3];
                for (slot, c) in channels.iter_mut().zip(hex.chars()) {
                    let v = c.to_digit(16).ok_or_else(err)? as u8;
                    *slot = v * 17;
                }
                Ok(Color::rgb(channels[0], channels[1], channels[2]))
            }
            _ => Err(err()),
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl TryFrom<String> for Color {
    type Error = ColorParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_string()
    }
}

// ── Palettes ──────────────────────────────────────────────────────────

/// Palette used when a binding names none, or names one that does not exist.
pub const DEFAULT_PALETTE: &str = "category10";

const CATEGORY10: [Color; 10] = [
    Color::from_hex(0x1f77b4),
    Color::from_hex(0xff7f0e),
    Color::from_hex(0x2ca02c),
    Color::from_hex(0xd62728),
    Color::from_hex(0x9467bd),
    Color::from_hex(0x8c564b),
    Color::from_hex(0xe377c2),
    Color::from_hex(0x7f7f7f),
    Color::from_hex(0xbcbd22),
    Color::from_hex(0x17becf),
];

const TABLEAU10: [Color; 10] = [
    Color::from_hex(0x4e79a7),
    Color::from_hex(0xf28e2c),
    Color::from_hex(0xe15759),
    Color::from_hex(0x76b7b2),
    Color::from_hex(0x59a14f),
    Color::from_hex(0xedc949),
    Color::from_hex(0xaf7aa1),
    Color::from_hex(0xff9da7),
    Color::from_hex(0x9c755f),
    Color::from_hex(0xbab0ab),
];

const DARK2: [Color; 8] = [
    Color::from_hex(0x1b9e77),
    Color::from_hex(0xd95f02),
    Color::from_hex(0x7570b3),
    Color::from_hex(0xe7298a),
    Color::from_hex(0x66a61e),
    Color::from_hex(0xe6ab02),
    Color::from_hex(0xa6761d),
    Color::from_hex(0x666666),
];

const SET1: [Color; 9] = [
    Color::from_hex(0xe41a1c),
    Color::from_hex(0x377eb8),
    Color::from_hex(0x4daf4a),
    Color::from_hex(0x984ea3),
    Color::from_hex(0xff7f00),
    Color::from_hex(0xffff33),
    Color::from_hex(0xa65628),
    Color::from_hex(0xf781bf),
    Color::from_hex(0x999999),
];

const VIRIDIS: [Color; 16] = [
    Color::from_hex(0x440154),
    Color::from_hex(0x481a6c),
    Color::from_hex(0x472f7d),
    Color::from_hex(0x414487),
    Color::from_hex(0x39568c),
    Color::from_hex(0x31688e),
    Color::from_hex(0x2a788e),
    Color::from_hex(0x23888e),
    Color::from_hex(0x1f988b),
    Color::from_hex(0x22a884),
    Color::from_hex(0x35b779),
    Color::from_hex(0x54c568),
    Color::from_hex(0x7ad151),
    Color::from_hex(0xa5db36),
    Color::from_hex(0xd2e21b),
    Color::from_hex(0xfde725),
];

const MAGMA: [Color; 15] = [
    Color::from_hex(0x000004),
    Color::from_hex(0x0c0926),
    Color::from_hex(0x221150),
    Color::from_hex(0x400f74),
    Color::from_hex(0x5f187f),
    Color::from_hex(0x7b2382),
    Color::from_hex(0x982d80),
    Color::from_hex(0xb73779),
    Color::from_hex(0xd3436e),
    Color::from_hex(0xeb5760),
    Color::from_hex(0xf8765c),
    Color::from_hex(0xfd9969),
    Color::from_hex(0xfebb81),
    Color::from_hex(0xfddc9e),
    Color::from_hex(0xfcfdbf),
];

const GRAY: [Color; 8] = [
    Color::from_hex(0x000000),
    Color::from_hex(0x242424),
    Color::from_hex(0x494949),
    Color::from_hex(0x6d6d6d),
    Color::from_hex(0x929292),
    Color::from_hex(0xb6b6b6),
    Color::from_hex(0xdbdbdb),
    Color::from_hex(0xffffff),
];

/// Looks up a named palette.
pub fn palette(name: &str) -> Option<&'static [Color]> {
    match name {
        "category10" => Some(&CATEGORY10),
        "tableau10" => Some(&TABLEAU10),
        "dark2" => Some(&DARK2),
        "set1" => Some(&SET1),
        "viridis" => Some(&VIRIDIS),
        "magma" => Some(&MAGMA),
        "gray" | "grey" => Some(&GRAY),
        _ => None,
    }
}

pub fn default_palette() -> &'static [Color] {
    &CATEGORY10
}
