use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Point marker glyph. The discriminant is the code written to the GPU marker stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[repr(u8)]
pub enum Marker {
    #[default]
    Disc = 0,
    Square = 1,
    Diamond = 2,
    TriangleUp = 3,
    TriangleDown = 4,
    TriangleLeft = 5,
    TriangleRight = 6,
    Star = 7,
    Cross = 8,
    Plus = 9,
    Ring = 10,
    Hbar = 11,
    Vbar = 12,
    Clobber = 13,
}

impl Marker {
    pub const ALL: [Marker; 14] = [
        Marker::Disc,
        Marker::Square,
        Marker::Diamond,
        Marker::TriangleUp,
        Marker::TriangleDown,
        Marker::TriangleLeft,
        Marker::TriangleRight,
        Marker::Star,
        Marker::Cross,
        Marker::Plus,
        Marker::Ring,
        Marker::Hbar,
        Marker::Vbar,
        Marker::Clobber,
    ];

    pub const fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(usize::from(code)).copied()
    }

    pub const fn name(self) -> &'static str {
        match self {
            Marker::Disc => "disc",
            Marker::Square => "square",
            Marker::Diamond => "diamond",
            Marker::TriangleUp => "triangle-up",
            Marker::TriangleDown => "triangle-down",
            Marker::TriangleLeft => "triangle-left",
            Marker::TriangleRight => "triangle-right",
            Marker::Star => "star",
            Marker::Cross => "cross",
            Marker::Plus => "plus",
            Marker::Ring => "ring",
            Marker::Hbar => "hbar",
            Marker::Vbar => "vbar",
            Marker::Clobber => "clobber",
        }
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Marker {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.name() == s)
            .ok_or_else(|| format!("unknown marker '{s}'"))
    }
}
