//! Recursive coordinate bisection over a point sample.
//!
//! A node asked for `k` leaves is cut along the longest axis of its box at
//! the `floor(k/2)/k` quantile of its samples; the lower child gets
//! `floor(k/2)` leaves. Descent sends `x <= cut` to the lower child, so a
//! point on a shared face belongs to the region it bounds from above.

use crate::geometry::aabb::Aabb;

#[derive(Clone, Debug)]
enum Node {
    Leaf { region: usize },
    Split {
        axis: usize,
        cut: f64,
        lower: usize,
        upper: usize,
    },
}

/// Balanced k-d tree with regions numbered in depth-first order.
#[derive(Clone, Debug)]
pub struct KdTree {
    nodes: Vec<Node>,
    leaves: Vec<Aabb>,
}

impl KdTree {
    /// Build `regions` leaves over `bounds`. `samples` is reordered in place.
    /// Identical inputs always give identical trees.
    pub fn build(bounds: Aabb, samples: &mut [[f64; 3]], regions: usize) -> Self {
        let mut tree = KdTree {
            nodes: Vec::with_capacity(2 * regions.max(1)),
            leaves: Vec::with_capacity(regions.max(1)),
        };
        tree.build_node(bounds, samples, regions.max(1));
        tree
    }

    fn build_node(&mut self, bounds: Aabb, samples: &mut [[f64; 3]], k: usize) -> usize {
        let id = self.nodes.len();
        if k == 1 {
            self.nodes.push(Node::Leaf {
                region: self.leaves.len(),
            });
            self.leaves.push(bounds);
            return id;
        }
        self.nodes.push(Node::Leaf { region: usize::MAX });

        let k_lower = k / 2;
        let axis = bounds.longest_axis();
        let cut = quantile_cut(&bounds, samples, axis, k_lower, k);
        let split = itertools::partition(samples.iter_mut(), |p| p[axis] <= cut);
        let (lo_samples, hi_samples) = samples.split_at_mut(split);
        let (lo_box, hi_box) = bounds.split(axis, cut);

        let lower = self.build_node(lo_box, lo_samples, k_lower);
        let upper = self.build_node(hi_box, hi_samples, k - k_lower);
        self.nodes[id] = Node::Split {
            axis,
            cut,
            lower,
            upper,
        };
        id
    }

    pub fn num_regions(&self) -> usize {
        self.leaves.len()
    }

    pub fn region_bounds(&self, region: usize) -> &Aabb {
        &self.leaves[region]
    }

    pub fn regions(&self) -> &[Aabb] {
        &self.leaves
    }

    /// Append every leaf whose closed box intersects `b`.
    pub fn touching(&self, b: &Aabb, out: &mut Vec<usize>) {
        let mut stack = vec![0usize];
        while let Some(node) = stack.pop() {
            match self.nodes[node] {
                Node::Leaf { region } => out.push(region),
                Node::Split {
                    axis,
                    cut,
                    lower,
                    upper,
                } => {
                    if b.min[axis] <= cut {
                        stack.push(lower);
                    }
                    if b.max[axis] >= cut {
                        stack.push(upper);
                    }
                }
            }
        }
    }

    /// Leaf containing `p`.
    pub fn locate(&self, p: &[f64; 3]) -> usize {
        let mut node = 0;
        loop {
            match self.nodes[node] {
                Node::Leaf { region } => return region,
                Node::Split {
                    axis,
                    cut,
                    lower,
                    upper,
                } => node = if p[axis] <= cut { lower } else { upper },
            }
        }
    }
}

/// Cut value leaving `k_lower / k` of the samples at or below it, clamped to
/// the node box. Without samples the box is cut proportionally.
fn quantile_cut(bounds: &Aabb, samples: &mut [[f64; 3]], axis: usize, k_lower: usize, k: usize) -> f64 {
    let (lo, hi) = (bounds.min[axis], bounds.max[axis]);
    let proportional = lo + (hi - lo) * k_lower as f64 / k as f64;
    if samples.is_empty() {
        return proportional;
    }
    let idx = samples.len() * k_lower / k;
    if idx == 0 {
        let (_, first, _) = samples.select_nth_unstable_by(0, |a, b| a[axis].total_cmp(&b[axis]));
        // nothing goes below; keep the cut under the smallest sample
        return proportional.min(first[axis]).max(lo);
    }
    let (below, nth, _) = samples.select_nth_unstable_by(idx, |a, b| a[axis].total_cmp(&b[axis]));
    let upper_of_lower = below
        .iter()
        .map(|p| p[axis])
        .fold(f64::NEG_INFINITY, f64::max);
    let cut = 0.5 * (upper_of_lower + nth[axis]);
    cut.clamp(lo, hi)
}
