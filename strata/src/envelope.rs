use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// A 2D axis-aligned bounding box in some coordinate reference system.
///
/// `Envelope` is the geometry primitive shared by the spatial index and the
/// mosaic storage. An envelope whose minimum exceeds its maximum on either
/// axis is *empty*; [`Envelope::empty`] is the identity for
/// [`Envelope::expand_to_include`].
///
/// # Examples
///
/// ```rust
/// use strata::Envelope;
///
/// let a = Envelope::new(0.0, 0.0, 10.0, 10.0);
/// let b = Envelope::new(5.0, 5.0, 15.0, 15.0);
/// assert!(a.intersects(&b));
/// assert_eq!(a.union(&b), Envelope::new(0.0, 0.0, 15.0, 15.0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Envelope {
    /// Number of axes an envelope spans.
    pub const DIMENSIONS: usize = 2;

    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Degenerate envelope covering a single point.
    pub fn point(x: f64, y: f64) -> Self {
        Self::new(x, y, x, y)
    }

    pub fn empty() -> Self {
        Self {
            min_x: f64::INFINITY,
            min_y: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            max_y: f64::NEG_INFINITY,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min_x > self.max_x || self.min_y > self.max_y
    }

    /// True when no coordinate is NaN and the envelope is not empty.
    pub fn is_valid(&self) -> bool {
        !(self.min_x.is_nan() || self.min_y.is_nan() || self.max_x.is_nan() || self.max_y.is_nan())
            && !self.is_empty()
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn area(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.width() * self.height()
        }
    }

    pub fn center(&self) -> (f64, f64) {
        ((self.min_x + self.max_x) / 2.0, (self.min_y + self.max_y) / 2.0)
    }

    /// Closed-interval intersection test: touching edges intersect.
    pub fn intersects(&self, other: &Envelope) -> bool {
        !(self.max_x < other.min_x
            || self.min_x > other.max_x
            || self.max_y < other.min_y
            || self.min_y > other.max_y)
    }

    pub fn contains(&self, other: &Envelope) -> bool {
        self.min_x <= other.min_x
            && self.min_y <= other.min_y
            && self.max_x >= other.max_x
            && self.max_y >= other.max_y
    }

    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    pub fn union(&self, other: &Envelope) -> Envelope {
        Envelope {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    pub fn expand_to_include(&mut self, other: &Envelope) {
        *self = self.union(other);
    }

    /// Area added to `self` if it were grown to cover `other`.
    pub fn enlargement(&self, other: &Envelope) -> f64 {
        self.union(other).area() - self.area()
    }

    /// Splits the envelope in halves along its longer axis, then each half
    /// along its own longer axis, giving four cells.
    ///
    /// The cells are returned in a fixed order (first half's two cells, then
    /// the second half's) so that callers relying on the order stay
    /// deterministic.
    pub fn quadrants(&self) -> [Envelope; 4] {
        let (a, b) = self.halves();
        let (a1, a2) = a.halves();
        let (b1, b2) = b.halves();
        [a1, a2, b1, b2]
    }

    fn halves(&self) -> (Envelope, Envelope) {
        if self.width() >= self.height() {
            let mid = (self.min_x + self.max_x) / 2.0;
            (
                Envelope::new(self.min_x, self.min_y, mid, self.max_y),
                Envelope::new(mid, self.min_y, self.max_x, self.max_y),
            )
        } else {
            let mid = (self.min_y + self.max_y) / 2.0;
            (
                Envelope::new(self.min_x, self.min_y, self.max_x, mid),
                Envelope::new(self.min_x, mid, self.max_x, self.max_y),
            )
        }
    }
}

impl Default for Envelope {
    fn default() -> Self {
        Self::empty()
    }
}

impl Display for Envelope {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Envelope([{}, {}] x [{}, {}])",
            self.min_x, self.max_x, self.min_y, self.max_y
        )
    }
}
