//! Bounding volume hierarchy built with the binned surface area heuristic.
//!
//! Nodes are stored in a flat array in depth-first order; the first child
//! of an interior node immediately follows it.

use tessera_math::{constants, Aabb, Ray, Vec3};

use super::triangle::{test_triangle, Triangle, TriangleHit};
use super::Accelerator;

const NUM_BINS: usize = 16;
const MAX_LEAF_TRIANGLES: usize = 4;
const TRAVERSAL_COST: f32 = 1.0;
const INTERSECTION_COST: f32 = 1.0;

#[derive(Debug, Clone, Copy)]
pub(super) enum BvhNode {
    Leaf {
        bound: Aabb,
        start: usize,
        count: usize,
    },
    Interior {
        bound: Aabb,
        /// Index of the second child; the first is the next node.
        second: usize,
        axis: usize,
    },
}

impl BvhNode {
    pub(super) fn bound(&self) -> &Aabb {
        match self {
            BvhNode::Leaf { bound, .. } | BvhNode::Interior { bound, .. } => bound,
        }
    }
}

#[derive(Debug, Default)]
pub struct BvhAccelerator {
    pub(super) nodes: Vec<BvhNode>,
    /// Triangle indices, grouped by leaf.
    pub(super) indices: Vec<usize>,
}

#[derive(Clone, Copy)]
struct BuildInfo {
    bound: Aabb,
    centroid: Vec3,
}

#[derive(Clone, Copy)]
struct Bin {
    bound: Aabb,
    count: usize,
}

impl Default for Bin {
    fn default() -> Self {
        Self {
            bound: Aabb::EMPTY,
            count: 0,
        }
    }
}

/// Bounds grown by a small margin so faces lying in an axis plane
/// still produce a slab of non-zero thickness.
fn padded(bound: Aabb) -> Aabb {
    let margin = Vec3::splat(constants::EPS) * (1.0 + bound.diagonal().max_element());
    Aabb::from_points(bound.min - margin, bound.max + margin)
}

impl BvhAccelerator {
    pub fn build(triangles: &[Triangle]) -> Self {
        let mut bvh = BvhAccelerator {
            nodes: Vec::with_capacity(2 * triangles.len()),
            indices: (0..triangles.len()).collect(),
        };
        if triangles.is_empty() {
            return bvh;
        }
        let info: Vec<BuildInfo> = triangles
            .iter()
            .map(|t| BuildInfo {
                bound: t.bounds(),
                centroid: t.centroid(),
            })
            .collect();
        bvh.build_recursive(&info, 0, triangles.len());
        log::debug!(
            "BVH built with {} nodes for {} triangles",
            bvh.nodes.len(),
            triangles.len()
        );
        bvh
    }

    fn build_recursive(&mut self, info: &[BuildInfo], start: usize, end: usize) -> usize {
        let node_index = self.nodes.len();
        let range = &self.indices[start..end];
        let bound = range
            .iter()
            .fold(Aabb::EMPTY, |acc, &i| Aabb::surrounding(&acc, &info[i].bound));
        let count = end - start;

        if count <= MAX_LEAF_TRIANGLES {
            self.nodes.push(BvhNode::Leaf {
                bound: padded(bound),
                start,
                count,
            });
            return node_index;
        }

        let centroid_bound = range
            .iter()
            .fold(Aabb::EMPTY, |acc, &i| acc.grow(info[i].centroid));
        let axis = centroid_bound.longest_axis();
        let (cmin, cmax) = (centroid_bound.min[axis], centroid_bound.max[axis]);

        // All centroids coincide: split by count
        if cmax - cmin <= 0.0 {
            let mid = start + count / 2;
            return self.push_interior(info, bound, axis, start, mid, end);
        }

        let bin_of = |c: Vec3| -> usize {
            let b = ((c[axis] - cmin) / (cmax - cmin) * NUM_BINS as f32) as usize;
            b.min(NUM_BINS - 1)
        };

        let mut bins = [Bin::default(); NUM_BINS];
        for &i in range {
            let bin = &mut bins[bin_of(info[i].centroid)];
            bin.count += 1;
            bin.bound = Aabb::surrounding(&bin.bound, &info[i].bound);
        }

        // Cost of splitting after each bin
        let mut costs = [0.0f32; NUM_BINS - 1];
        for (split, cost) in costs.iter_mut().enumerate() {
            let (mut b0, mut c0) = (Aabb::EMPTY, 0);
            let (mut b1, mut c1) = (Aabb::EMPTY, 0);
            for bin in &bins[..=split] {
                b0 = Aabb::surrounding(&b0, &bin.bound);
                c0 += bin.count;
            }
            for bin in &bins[split + 1..] {
                b1 = Aabb::surrounding(&b1, &bin.bound);
                c1 += bin.count;
            }
            *cost = TRAVERSAL_COST
                + INTERSECTION_COST
                    * (c0 as f32 * b0.surface_area() + c1 as f32 * b1.surface_area())
                    / bound.surface_area().max(f32::MIN_POSITIVE);
        }

        let (best_split, best_cost) = costs
            .iter()
            .enumerate()
            .fold((0, f32::INFINITY), |acc, (i, &c)| if c < acc.1 { (i, c) } else { acc });

        let leaf_cost = INTERSECTION_COST * count as f32;
        if best_cost >= leaf_cost && count <= 4 * MAX_LEAF_TRIANGLES {
            self.nodes.push(BvhNode::Leaf {
                bound: padded(bound),
                start,
                count,
            });
            return node_index;
        }

        // Partition in place; stable so construction is deterministic
        let (left, right): (Vec<usize>, Vec<usize>) = self.indices[start..end]
            .iter()
            .partition(|&&i| bin_of(info[i].centroid) <= best_split);
        let mut mid = start + left.len();
        self.indices[start..mid].copy_from_slice(&left);
        self.indices[mid..end].copy_from_slice(&right);
        if mid == start || mid == end {
            mid = start + count / 2;
        }
        self.push_interior(info, bound, axis, start, mid, end)
    }

    fn push_interior(
        &mut self,
        info: &[BuildInfo],
        bound: Aabb,
        axis: usize,
        start: usize,
        mid: usize,
        end: usize,
    ) -> usize {
        let node_index = self.nodes.len();
        self.nodes.push(BvhNode::Interior {
            bound: padded(bound),
            second: 0,
            axis,
        });
        self.build_recursive(info, start, mid);
        let second_index = self.build_recursive(info, mid, end);
        if let BvhNode::Interior { second, .. } = &mut self.nodes[node_index] {
            *second = second_index;
        }
        node_index
    }
}

impl Accelerator for BvhAccelerator {
    fn intersect(&self, triangles: &[Triangle], ray: &Ray) -> Option<TriangleHit> {
        if self.nodes.is_empty() {
            return None;
        }

        let mut ray = *ray;
        let inv_dir = ray.direction.recip();
        let mut best = None;
        let mut stack = Vec::with_capacity(64);
        stack.push(0usize);

        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if node.bound().hit(&ray, inv_dir).is_none() {
                continue;
            }
            match *node {
                BvhNode::Leaf { start, count, .. } => {
                    for &i in &self.indices[start..start + count] {
                        test_triangle(triangles, i, &mut ray, &mut best);
                    }
                }
                BvhNode::Interior { second, axis, .. } => {
                    // Visit the near child first
                    if ray.direction[axis] < 0.0 {
                        stack.push(index + 1);
                        stack.push(second);
                    } else {
                        stack.push(second);
                        stack.push(index + 1);
                    }
                }
            }
        }
        best
    }
}
