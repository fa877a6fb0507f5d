//! Axis-aligned boxes used for regions and cell bounds.

/// Closed axis-aligned box `[min, max]`.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Aabb {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl Aabb {
    pub fn new(min: [f64; 3], max: [f64; 3]) -> Self {
        Self { min, max }
    }

    /// Inverted box that any `expand` call overwrites.
    pub fn empty() -> Self {
        Self {
            min: [f64::INFINITY; 3],
            max: [f64::NEG_INFINITY; 3],
        }
    }

    /// True until at least one point has been added.
    pub fn is_empty(&self) -> bool {
        (0..3).any(|d| self.min[d] > self.max[d])
    }

    pub fn from_points<'a>(pts: impl IntoIterator<Item = &'a [f64; 3]>) -> Self {
        let mut b = Self::empty();
        for p in pts {
            b.expand(p);
        }
        b
    }

    pub fn expand(&mut self, p: &[f64; 3]) {
        for d in 0..3 {
            self.min[d] = self.min[d].min(p[d]);
            self.max[d] = self.max[d].max(p[d]);
        }
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        let mut out = *self;
        for d in 0..3 {
            out.min[d] = out.min[d].min(other.min[d]);
            out.max[d] = out.max[d].max(other.max[d]);
        }
        out
    }

    pub fn contains_closed(&self, p: &[f64; 3]) -> bool {
        (0..3).all(|d| p[d] >= self.min[d] && p[d] <= self.max[d])
    }

    pub fn intersects_closed(&self, other: &Aabb) -> bool {
        (0..3).all(|d| self.min[d] <= other.max[d] && other.min[d] <= self.max[d])
    }

    /// Product of extents; flat boxes have zero volume.
    pub fn volume(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        (0..3).map(|d| self.max[d] - self.min[d]).product()
    }

    /// Axis with the largest extent (ties pick the lower axis).
    pub fn longest_axis(&self) -> usize {
        let ext = |d: usize| self.max[d] - self.min[d];
        let mut best = 0;
        for d in 1..3 {
            if ext(d) > ext(best) {
                best = d;
            }
        }
        best
    }

    /// Length of the box diagonal.
    pub fn diagonal(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        (0..3)
            .map(|d| (self.max[d] - self.min[d]).powi(2))
            .sum::<f64>()
            .sqrt()
    }

    /// Split into lower and upper halves at `cut` along `axis`.
    pub fn split(&self, axis: usize, cut: f64) -> (Aabb, Aabb) {
        let mut lo = *self;
        let mut hi = *self;
        lo.max[axis] = cut;
        hi.min[axis] = cut;
        (lo, hi)
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}
