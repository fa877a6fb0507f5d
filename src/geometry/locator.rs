//! Spatial point lookup for coordinate-based deduplication.
//!
//! With zero tolerance two points match only when their coordinates are
//! bitwise equal (after folding `-0.0` into `0.0`). With a positive tolerance
//! points are bucketed on a uniform hash grid whose cell edge equals the
//! tolerance, and the 27 surrounding buckets are searched.

use hashbrown::HashMap;

#[derive(Clone, Debug)]
enum Index {
    Exact(HashMap<[u64; 3], usize>),
    Grid {
        cell: f64,
        buckets: HashMap<[i64; 3], Vec<usize>>,
    },
}

/// Incremental point locator.
#[derive(Clone, Debug)]
pub struct PointLocator {
    tolerance: f64,
    coords: Vec<[f64; 3]>,
    ids: Vec<usize>,
    index: Index,
}

fn exact_key(p: &[f64; 3]) -> [u64; 3] {
    // -0.0 and 0.0 compare equal but differ in bits
    let canon = |x: f64| if x == 0.0 { 0.0f64 } else { x };
    [canon(p[0]).to_bits(), canon(p[1]).to_bits(), canon(p[2]).to_bits()]
}

impl PointLocator {
    /// Create a locator; `tolerance <= 0` selects exact matching.
    pub fn new(tolerance: f64) -> Self {
        Self::with_capacity(tolerance, 0)
    }

    pub fn with_capacity(tolerance: f64, capacity: usize) -> Self {
        let index = if tolerance > 0.0 {
            Index::Grid {
                cell: tolerance,
                buckets: HashMap::with_capacity(capacity),
            }
        } else {
            Index::Exact(HashMap::with_capacity(capacity))
        };
        Self {
            tolerance: tolerance.max(0.0),
            coords: Vec::with_capacity(capacity),
            ids: Vec::with_capacity(capacity),
            index,
        }
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn len(&self) -> usize {
        self.coords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    fn bucket(cell: f64, p: &[f64; 3]) -> [i64; 3] {
        [
            (p[0] / cell).floor() as i64,
            (p[1] / cell).floor() as i64,
            (p[2] / cell).floor() as i64,
        ]
    }

    /// Id stored for a point within tolerance of `p`, if any.
    pub fn find(&self, p: &[f64; 3]) -> Option<usize> {
        match &self.index {
            Index::Exact(map) => map.get(&exact_key(p)).copied(),
            Index::Grid { cell, buckets } => {
                let b = Self::bucket(*cell, p);
                let tol2 = self.tolerance * self.tolerance;
                let mut best: Option<(f64, usize)> = None;
                for dx in -1..=1 {
                    for dy in -1..=1 {
                        for dz in -1..=1 {
                            let key = [b[0] + dx, b[1] + dy, b[2] + dz];
                            let Some(slots) = buckets.get(&key) else {
                                continue;
                            };
                            for &slot in slots {
                                let q = &self.coords[slot];
                                let d2 = (0..3).map(|d| (q[d] - p[d]).powi(2)).sum::<f64>();
                                if d2 <= tol2 && best.is_none_or(|(bd, _)| d2 < bd) {
                                    best = Some((d2, slot));
                                }
                            }
                        }
                    }
                }
                best.map(|(_, slot)| self.ids[slot])
            }
        }
    }

    /// Record `p` under `id` without checking for an existing match.
    pub fn insert(&mut self, p: [f64; 3], id: usize) {
        let slot = self.coords.len();
        match &mut self.index {
            Index::Exact(map) => {
                map.entry(exact_key(&p)).or_insert(id);
            }
            Index::Grid { cell, buckets } => {
                let b = Self::bucket(*cell, &p);
                buckets.entry(b).or_default().push(slot);
            }
        }
        self.coords.push(p);
        self.ids.push(id);
    }

    /// Return the id of a matching point, or record `p` under `id`.
    /// The boolean is `true` when `p` was newly inserted.
    pub fn insert_unique(&mut self, p: [f64; 3], id: usize) -> (usize, bool) {
        if let Some(found) = self.find(&p) {
            return (found, false);
        }
        self.insert(p, id);
        (id, true)
    }
}
