//! ASPRS point classification codes used by the forestry products.

use crate::ForestryError;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum ClassificationCode {
    Ground = 2,
    LowVegetation = 3,
    MediumVegetation = 4,
    HighVegetation = 5,
}

impl ClassificationCode {
    pub const ALL: [Self; 4] = [
        Self::Ground,
        Self::LowVegetation,
        Self::MediumVegetation,
        Self::HighVegetation,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for ClassificationCode {
    type Error = ForestryError;

    fn try_from(code: u8) -> Result<Self, ForestryError> {
        match code {
            2 => Ok(Self::Ground),
            3 => Ok(Self::LowVegetation),
            4 => Ok(Self::MediumVegetation),
            5 => Ok(Self::HighVegetation),
            other => Err(ForestryError::UnknownClass(other)),
        }
    }
}

impl fmt::Display for ClassificationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ground => "ground",
            Self::LowVegetation => "low vegetation",
            Self::MediumVegetation => "medium vegetation",
            Self::HighVegetation => "high vegetation",
        };
        write!(f, "{name} ({})", self.code())
    }
}

/// A set of classification codes, stored as a bitmask over `0..32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ClassSet(u32);

impl ClassSet {
    pub const GROUND: Self = Self::of(&[ClassificationCode::Ground]);

    pub const HIGH_VEGETATION: Self = Self::of(&[ClassificationCode::HighVegetation]);

    pub const ALL_VEGETATION: Self = Self::of(&[
        ClassificationCode::LowVegetation,
        ClassificationCode::MediumVegetation,
        ClassificationCode::HighVegetation,
    ]);

    pub const ALL_SURFACE: Self = Self::of(&[
        ClassificationCode::Ground,
        ClassificationCode::LowVegetation,
        ClassificationCode::MediumVegetation,
        ClassificationCode::HighVegetation,
    ]);

    pub const fn of(codes: &[ClassificationCode]) -> Self {
        let mut mask = 0_u32;
        let mut i = 0;
        while i < codes.len() {
            mask |= 1_u32 << (codes[i] as u32);
            i += 1;
        }
        Self(mask)
    }

    /// Returns true if points with raw class `code` belong to this set.
    pub fn contains(self, code: u8) -> bool {
        code < 32 && self.0 & (1 << code) != 0
    }

    pub fn is_subset(self, other: Self) -> bool {
        self.0 & !other.0 == 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns the member codes in ascending order.
    pub fn iter(self) -> impl Iterator<Item = u8> {
        (0..32_u8).filter(move |&code| self.contains(code))
    }
}

impl fmt::Display for ClassSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let codes: Vec<String> = self.iter().map(|code| code.to_string()).collect();
        write!(f, "{{{}}}", codes.join(","))
    }
}
