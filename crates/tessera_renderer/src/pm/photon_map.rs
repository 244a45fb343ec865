use std::cmp::Ordering;

use tessera_math::{Aabb, Color, Vec3};

use crate::{RenderError, RenderResult};

/// Light particle stored at a non-specular surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Photon {
    pub p: Vec3,
    /// Flux carried by the particle.
    pub throughput: Color,
    /// Direction toward the previous vertex of the light path.
    pub wi: Vec3,
}

/// Spatial index over photons.
pub trait PhotonMap: Send + Sync {
    fn build(&mut self, photons: Vec<Photon>);

    /// Call `f` for every photon closer than `max_dist2` (squared) to `p`.
    ///
    /// `f` may shrink the radius; subsequent candidates are tested against
    /// the updated value.
    fn collect_photons<'s>(&'s self, p: Vec3, max_dist2: &mut f32, f: &mut dyn FnMut(&'s Photon, &mut f32));

    fn photons(&self) -> &[Photon];
}

/// Create a photon map by name (`kdtree` or `naive`).
pub fn create(ty: &str) -> RenderResult<Box<dyn PhotonMap>> {
    match ty {
        "kdtree" => Ok(Box::new(KdTreePhotonMap::default())),
        "naive" => Ok(Box::new(NaivePhotonMap::default())),
        _ => {
            log::error!("Unsupported photon map implementation '{}'", ty);
            Err(RenderError::Invalid(format!("unknown photon map '{}'", ty)))
        }
    }
}

/// Linear scan over all photons.
#[derive(Debug, Default)]
pub struct NaivePhotonMap {
    photons: Vec<Photon>,
}

impl PhotonMap for NaivePhotonMap {
    fn build(&mut self, photons: Vec<Photon>) {
        self.photons = photons;
    }

    fn collect_photons<'s>(&'s self, p: Vec3, max_dist2: &mut f32, f: &mut dyn FnMut(&'s Photon, &mut f32)) {
        for photon in &self.photons {
            if photon.p.distance_squared(p) < *max_dist2 {
                f(photon, max_dist2);
            }
        }
    }

    fn photons(&self) -> &[Photon] {
        &self.photons
    }
}

const LEAF: u8 = 3;

#[derive(Debug, Clone, Copy)]
struct KdNode {
    split_pos: f32,
    /// Split axis, or [`LEAF`].
    axis: u8,
    /// The left child, when present, directly follows its parent.
    has_left: bool,
    right: Option<u32>,
}

impl KdNode {
    const LEAF: KdNode = KdNode {
        split_pos: 0.0,
        axis: LEAF,
        has_left: false,
        right: None,
    };
}

/// Balanced KD-tree with one photon per node.
///
/// Each node splits its photons at the median along the longest axis of
/// their bound; the median photon is stored in the node itself.
#[derive(Debug, Default)]
pub struct KdTreePhotonMap {
    nodes: Vec<KdNode>,
    data: Vec<Photon>,
}

impl KdTreePhotonMap {
    fn build_recursive(&mut self, node: usize, indices: &mut [usize], photons: &[Photon], next: &mut usize) {
        if let [index] = indices {
            self.nodes[node] = KdNode::LEAF;
            self.data[node] = photons[*index];
            return;
        }

        let bound = indices
            .iter()
            .fold(Aabb::EMPTY, |b, &i| b.grow(photons[i].p));
        let axis = bound.longest_axis();
        let mid = indices.len() / 2;
        indices.select_nth_unstable_by(mid, |&a, &b| {
            photons[a].p[axis]
                .partial_cmp(&photons[b].p[axis])
                .unwrap_or(Ordering::Equal)
                .then(a.cmp(&b))
        });

        let split = photons[indices[mid]];
        self.nodes[node] = KdNode {
            split_pos: split.p[axis],
            axis: axis as u8,
            has_left: false,
            right: None,
        };
        self.data[node] = split;

        let (left, rest) = indices.split_at_mut(mid);
        let right = &mut rest[1..];
        if !left.is_empty() {
            let child = *next;
            *next += 1;
            debug_assert_eq!(child, node + 1);
            self.nodes[node].has_left = true;
            self.build_recursive(child, left, photons, next);
        }
        if !right.is_empty() {
            let child = *next;
            *next += 1;
            self.nodes[node].right = Some(child as u32);
            self.build_recursive(child, right, photons, next);
        }
    }

    fn collect_recursive<'s>(
        &'s self,
        node: usize,
        p: Vec3,
        max_dist2: &mut f32,
        f: &mut dyn FnMut(&'s Photon, &mut f32),
    ) {
        let n = self.nodes[node];
        if n.axis != LEAF {
            let axis = n.axis as usize;
            let d = p[axis] - n.split_pos;
            let dist2 = d * d;
            let left = n.has_left.then_some(node + 1);
            let right = n.right.map(|r| r as usize);
            // Visit the half containing `p` first
            let (near, far) = if p[axis] <= n.split_pos { (left, right) } else { (right, left) };
            if let Some(near) = near {
                self.collect_recursive(near, p, max_dist2, f);
            }
            if let Some(far) = far {
                if dist2 < *max_dist2 {
                    self.collect_recursive(far, p, max_dist2, f);
                }
            }
        }

        let photon = &self.data[node];
        if photon.p.distance_squared(p) < *max_dist2 {
            f(photon, max_dist2);
        }
    }
}

impl PhotonMap for KdTreePhotonMap {
    fn build(&mut self, photons: Vec<Photon>) {
        self.nodes = vec![KdNode::LEAF; photons.len()];
        self.data = photons.clone();
        if photons.is_empty() {
            return;
        }
        let mut indices: Vec<usize> = (0..photons.len()).collect();
        let mut next = 1;
        self.build_recursive(0, &mut indices, &photons, &mut next);
    }

    fn collect_photons<'s>(&'s self, p: Vec3, max_dist2: &mut f32, f: &mut dyn FnMut(&'s Photon, &mut f32)) {
        if !self.nodes.is_empty() {
            self.collect_recursive(0, p, max_dist2, f);
        }
    }

    fn photons(&self) -> &[Photon] {
        &self.data
    }
}
