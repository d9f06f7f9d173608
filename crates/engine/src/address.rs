//! Cell addressing.
//!
//! An `Address` identifies one cell on the sheet by zero-based row and
//! column. The textual form is the conventional letters-plus-number
//! encoding: bijective base-26 column letters ('A' = 1) followed by the
//! 1-based row number, so `{row: 0, col: 0}` is "A1" and
//! `{row: 9, col: 26}` is "AA10".

use serde::{Deserialize, Serialize};

/// Exclusive upper bound on row indices.
pub const MAX_ROWS: i32 = 16_384;
/// Exclusive upper bound on column indices.
pub const MAX_COLS: i32 = 16_384;

/// Longest letter run that can encode an in-bounds column.
/// Column 16383 is "XFD"; a fourth letter always overflows the bound.
const MAX_LETTER_COUNT: usize = 3;

/// Zero-based cell coordinate.
///
/// Ordering is row-major (row, then column) so addresses can key sorted
/// maps with deterministic iteration. `Address::NONE` is the canonical
/// invalid value returned by failed parses.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Address {
    pub row: i32,
    pub col: i32,
}

impl Address {
    /// The invalid sentinel. Never compares equal to any valid address.
    pub const NONE: Address = Address { row: -1, col: -1 };

    #[inline]
    pub fn new(row: i32, col: i32) -> Self {
        Self { row, col }
    }

    /// True if both coordinates are non-negative and under the sheet bounds.
    pub fn is_valid(&self) -> bool {
        self.row >= 0 && self.col >= 0 && self.row < MAX_ROWS && self.col < MAX_COLS
    }

    /// Parse the letters-plus-number form.
    ///
    /// Returns [`Address::NONE`] for anything malformed: an empty letter
    /// run, characters other than uppercase letters followed by digits, a
    /// letter run too long to stay in bounds, or a decode that lands
    /// outside the sheet.
    pub fn parse(s: &str) -> Address {
        let letter_count = s.bytes().take_while(|b| b.is_ascii_uppercase()).count();
        let digits = &s[letter_count..];

        if letter_count == 0 || letter_count > MAX_LETTER_COUNT || digits.is_empty() {
            return Address::NONE;
        }
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Address::NONE;
        }

        let mut col: i32 = 0;
        for b in s[..letter_count].bytes() {
            col = col * 26 + i32::from(b - b'A') + 1;
        }

        // i32 parse rejects digit runs that overflow, which are out of
        // bounds anyway.
        let Ok(row) = digits.parse::<i32>() else {
            return Address::NONE;
        };

        let addr = Address::new(row - 1, col - 1);
        if addr.is_valid() {
            addr
        } else {
            Address::NONE
        }
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.is_valid() {
            return Ok(());
        }
        let mut letters = String::new();
        let mut c = self.col;
        loop {
            letters.insert(0, (b'A' + (c % 26) as u8) as char);
            if c < 26 {
                break;
            }
            c = c / 26 - 1;
        }
        write!(f, "{}{}", letters, self.row + 1)
    }
}
