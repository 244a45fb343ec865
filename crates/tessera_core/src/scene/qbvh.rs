//! Four-wide BVH collapsed from the binary SAH tree.

use tessera_math::{Aabb, Ray};

use super::bvh::{BvhAccelerator, BvhNode};
use super::triangle::{test_triangle, Triangle, TriangleHit};
use super::Accelerator;

#[derive(Debug, Clone, Copy, PartialEq)]
enum QbvhChild {
    Empty,
    Node(usize),
    Leaf { start: usize, count: usize },
}

#[derive(Debug, Clone)]
struct QbvhNode {
    bounds: [Aabb; 4],
    children: [QbvhChild; 4],
}

#[derive(Debug, Default)]
pub struct QbvhAccelerator {
    nodes: Vec<QbvhNode>,
    indices: Vec<usize>,
}

impl QbvhAccelerator {
    pub fn build(triangles: &[Triangle]) -> Self {
        let bvh = BvhAccelerator::build(triangles);
        let mut qbvh = QbvhAccelerator {
            nodes: Vec::new(),
            indices: bvh.indices.clone(),
        };
        if bvh.nodes.is_empty() {
            return qbvh;
        }
        qbvh.collapse(&bvh.nodes, 0);
        log::debug!("QBVH built with {} nodes", qbvh.nodes.len());
        qbvh
    }

    /// Gather up to four descendants of binary node `index` into one node.
    fn collapse(&mut self, bvh: &[BvhNode], index: usize) -> usize {
        let mut slots: Vec<usize> = match bvh[index] {
            BvhNode::Leaf { .. } => vec![index],
            BvhNode::Interior { second, .. } => vec![index + 1, second],
        };
        // Open interior children until four slots are used
        while slots.len() < 4 {
            let Some(pos) = slots
                .iter()
                .position(|&s| matches!(bvh[s], BvhNode::Interior { .. }))
            else {
                break;
            };
            let BvhNode::Interior { second, .. } = bvh[slots[pos]] else {
                break;
            };
            let first = slots[pos] + 1;
            slots[pos] = first;
            slots.insert(pos + 1, second);
        }

        let node_index = self.nodes.len();
        self.nodes.push(QbvhNode {
            bounds: [Aabb::EMPTY; 4],
            children: [QbvhChild::Empty; 4],
        });

        for (k, &slot) in slots.iter().enumerate() {
            let child = match bvh[slot] {
                BvhNode::Leaf { start, count, .. } => QbvhChild::Leaf { start, count },
                BvhNode::Interior { .. } => QbvhChild::Node(self.collapse(bvh, slot)),
            };
            let node = &mut self.nodes[node_index];
            node.bounds[k] = *bvh[slot].bound();
            node.children[k] = child;
        }
        node_index
    }
}

impl Accelerator for QbvhAccelerator {
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
            for (bound, child) in node.bounds.iter().zip(&node.children) {
                if *child == QbvhChild::Empty || bound.hit(&ray, inv_dir).is_none() {
                    continue;
                }
                match *child {
                    QbvhChild::Node(i) => stack.push(i),
                    QbvhChild::Leaf { start, count } => {
                        for &i in &self.indices[start..start + count] {
                            test_triangle(triangles, i, &mut ray, &mut best);
                        }
                    }
                    QbvhChild::Empty => {}
                }
            }
        }
        best
    }
}
