//! Per-tile completion bitset and its text form.
//!
//! The text form is one line per grid row, each a run of `'0'` and `'1'`
//! characters, rows separated by `'\n'`. Parsing ignores all whitespace, so
//! bit `i` is the `i`-th `0`/`1` character of the text.

use std::fmt;

use crate::error::{MosaicError, MosaicResult};

const WORD_BITS: usize = 64;

/// Row-major bitset with one bit per grid cell.
#[derive(Clone, PartialEq, Eq)]
pub struct CompletionBits {
    width: u32,
    height: u32,
    words: Vec<u64>,
}

impl CompletionBits {
    /// All cells clear.
    pub fn new(width: u32, height: u32) -> Self {
        let len = width as usize * height as usize;
        Self {
            width,
            height,
            words: vec![0; len.div_ceil(WORD_BITS)],
        }
    }

    /// All cells set.
    pub fn filled(width: u32, height: u32) -> Self {
        let mut bits = Self::new(width, height);
        for index in 0..bits.len() {
            bits.set_index(index);
        }
        bits
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bit of cell `(col, row)`; cells outside the grid read as clear.
    pub fn get(&self, col: u32, row: u32) -> bool {
        if col >= self.width || row >= self.height {
            return false;
        }
        self.get_index(self.index(col, row))
    }

    /// Sets the bit of cell `(col, row)`, returning whether it was clear.
    pub fn set(&mut self, col: u32, row: u32) -> MosaicResult<bool> {
        if col >= self.width || row >= self.height {
            return Err(MosaicError::OutOfRange(format!(
                "tile ({}, {}) is outside a {}x{} grid",
                col, row, self.width, self.height
            )));
        }
        let index = self.index(col, row);
        let was_clear = !self.get_index(index);
        self.set_index(index);
        Ok(was_clear)
    }

    pub fn count_set(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.count_set() == self.len()
    }

    /// Renders the bitset as rows of `0`/`1` separated by newlines.
    pub fn to_text(&self) -> String {
        let mut text = String::with_capacity(self.len() + self.height as usize);
        for row in 0..self.height {
            if row > 0 {
                text.push('\n');
            }
            for col in 0..self.width {
                text.push(if self.get(col, row) { '1' } else { '0' });
            }
        }
        text
    }

    /// Parses the text form for a `width` x `height` grid.
    pub fn from_text(text: &str, width: u32, height: u32) -> MosaicResult<Self> {
        let mut bits = Self::new(width, height);
        let mut index = 0;
        for c in text.chars().filter(|c| !c.is_whitespace()) {
            let set = match c {
                '0' => false,
                '1' => true,
                other => {
                    return Err(MosaicError::Malformed(format!(
                        "unexpected character {:?} in completion string",
                        other
                    )))
                }
            };
            if index >= bits.len() {
                return Err(MosaicError::Malformed(format!(
                    "completion string has more than {} cells",
                    bits.len()
                )));
            }
            if set {
                bits.set_index(index);
            }
            index += 1;
        }

        if index != bits.len() {
            return Err(MosaicError::Malformed(format!(
                "completion string has {} cells, expected {}",
                index,
                bits.len()
            )));
        }
        Ok(bits)
    }

    fn index(&self, col: u32, row: u32) -> usize {
        row as usize * self.width as usize + col as usize
    }

    fn get_index(&self, index: usize) -> bool {
        self.words[index / WORD_BITS] & (1 << (index % WORD_BITS)) != 0
    }

    fn set_index(&mut self, index: usize) {
        self.words[index / WORD_BITS] |= 1 << (index % WORD_BITS);
    }
}

impl fmt::Debug for CompletionBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionBits")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("set", &self.count_set())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_layout() {
        let mut bits = CompletionBits::new(3, 2);
        bits.set(0, 0).unwrap();
        bits.set(2, 1).unwrap();
        assert_eq!(bits.to_text(), "100\n001");
    }

    #[test]
    fn test_text_round_trip_extremes() {
        for (w, h) in [(1, 1), (3, 3), (7, 5), (64, 2), (65, 1)] {
            let zeros = CompletionBits::new(w, h);
            assert_eq!(CompletionBits::from_text(&zeros.to_text(), w, h).unwrap(), zeros);

            let ones = CompletionBits::filled(w, h);
            assert!(ones.is_complete());
            assert_eq!(CompletionBits::from_text(&ones.to_text(), w, h).unwrap(), ones);
        }
    }

    #[test]
    fn test_text_round_trip_pattern() {
        let mut bits = CompletionBits::new(9, 7);
        for i in 0..63u32 {
            if i % 3 == 0 || i % 7 == 0 {
                bits.set(i % 9, i / 9).unwrap();
            }
        }
        let parsed = CompletionBits::from_text(&bits.to_text(), 9, 7).unwrap();
        assert_eq!(parsed, bits);
        assert_eq!(parsed.count_set(), bits.count_set());
    }

    #[test]
    fn test_whitespace_is_stripped() {
        let bits = CompletionBits::from_text(" 1 0\t1\r\n0 1  1 \n", 3, 2).unwrap();
        assert_eq!(bits.to_text(), "101\n011");
    }

    #[test]
    fn test_malformed_text() {
        assert!(matches!(
            CompletionBits::from_text("10\n01", 3, 2),
            Err(MosaicError::Malformed(_))
        ));
        assert!(matches!(
            CompletionBits::from_text("1001001", 3, 2),
            Err(MosaicError::Malformed(_))
        ));
        assert!(matches!(
            CompletionBits::from_text("102\n011", 3, 2),
            Err(MosaicError::Malformed(_))
        ));
    }

    #[test]
    fn test_set_reports_first_write() {
        let mut bits = CompletionBits::new(2, 2);
        assert!(bits.set(1, 1).unwrap());
        assert!(!bits.set(1, 1).unwrap());
        assert!(bits.get(1, 1));
        assert!(!bits.get(5, 5));
        assert!(matches!(bits.set(2, 0), Err(MosaicError::OutOfRange(_))));
    }

    #[test]
    fn test_empty_grid() {
        let bits = CompletionBits::new(0, 3);
        assert!(bits.is_empty());
        assert!(bits.is_complete());
        assert_eq!(CompletionBits::from_text(&bits.to_text(), 0, 3).unwrap(), bits);
    }
}
