use glam::Vec2;

/// Piecewise-constant distribution over `0..n`, stored as a CDF.
///
/// Used to pick a triangle on an area light proportionally to its area and
/// to pick PSSMLT seeds proportionally to their luminance.
#[derive(Debug, Clone)]
pub struct DiscreteDistribution1D {
    cdf: Vec<f32>,
}

impl DiscreteDistribution1D {
    pub fn new() -> Self {
        Self { cdf: vec![0.0] }
    }

    /// Append an entry with unnormalized weight `v`.
    pub fn add(&mut self, v: f32) {
        let last = *self.cdf.last().unwrap_or(&0.0);
        self.cdf.push(last + v);
    }

    /// Sum of all weights. Only meaningful before [`normalize`](Self::normalize).
    pub fn sum(&self) -> f32 {
        *self.cdf.last().unwrap_or(&0.0)
    }

    /// Scale the CDF so its last entry is 1.
    ///
    /// Returns false (leaving the CDF untouched) when all weights are zero.
    pub fn normalize(&mut self) -> bool {
        let sum = self.sum();
        if sum <= 0.0 {
            return false;
        }
        let inv_sum = 1.0 / sum;
        for v in &mut self.cdf {
            *v *= inv_sum;
        }
        true
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.cdf.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Select an index for `u` in `[0, 1)`.
    pub fn sample(&self, u: f32) -> usize {
        let upper = self.cdf.partition_point(|&c| c <= u);
        upper.saturating_sub(1).min(self.len().saturating_sub(1))
    }

    /// Select an index and remap `u` to a fresh uniform number within the
    /// selected bucket, so the same sample can drive a second decision.
    pub fn sample_reuse(&self, u: f32) -> (usize, f32) {
        let i = self.sample(u);
        let width = self.cdf[i + 1] - self.cdf[i];
        let reused = if width > 0.0 {
            ((u - self.cdf[i]) / width).clamp(0.0, 1.0 - f32::EPSILON)
        } else {
            0.0
        };
        (i, reused)
    }

    /// Probability of selecting index `i` (after normalization).
    pub fn evaluate_pdf(&self, i: usize) -> f32 {
        self.cdf[i + 1] - self.cdf[i]
    }

    pub fn clear(&mut self) {
        self.cdf.clear();
        self.cdf.push(0.0);
    }
}

impl Default for DiscreteDistribution1D {
    fn default() -> Self {
        Self::new()
    }
}

/// Piecewise-constant distribution over the unit square.
///
/// The square is cut into a `width x height` grid; cell `(x, y)` covers
/// `[x / width, (x + 1) / width) x [y / height, (y + 1) / height)`. Rows are
/// picked from the marginal distribution, columns from the row's
/// conditional distribution.
#[derive(Debug, Clone)]
pub struct DiscreteDistribution2D {
    width: usize,
    height: usize,
    conditional: Vec<DiscreteDistribution1D>,
    marginal: DiscreteDistribution1D,
}

impl DiscreteDistribution2D {
    /// Build from row-major cell weights. Returns `None` when every weight
    /// is zero or the grid is empty.
    pub fn new(weights: &[f32], width: usize, height: usize) -> Option<Self> {
        if width == 0 || height == 0 || weights.len() != width * height {
            return None;
        }

        let mut conditional = Vec::with_capacity(height);
        let mut marginal = DiscreteDistribution1D::new();
        for row in weights.chunks(width) {
            let mut dist = DiscreteDistribution1D::new();
            for &w in row {
                dist.add(w.max(0.0));
            }
            marginal.add(dist.sum());
            // Rows without weight are never selected
            dist.normalize();
            conditional.push(dist);
        }
        if !marginal.normalize() {
            return None;
        }

        Some(Self {
            width,
            height,
            conditional,
            marginal,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Sample a point of the unit square. Returns the point and its density
    /// with respect to area on the square.
    pub fn sample(&self, u: Vec2) -> (Vec2, f32) {
        let (y, v) = self.marginal.sample_reuse(u.y);
        let (x, w) = self.conditional[y].sample_reuse(u.x);
        let p = Vec2::new(
            (x as f32 + w) / self.width as f32,
            (y as f32 + v) / self.height as f32,
        );
        (p, self.cell_pdf(x, y))
    }

    /// Density at `p`; points outside the unit square have density zero.
    pub fn pdf(&self, p: Vec2) -> f32 {
        if !(0.0..=1.0).contains(&p.x) || !(0.0..=1.0).contains(&p.y) {
            return 0.0;
        }
        let x = ((p.x * self.width as f32) as usize).min(self.width - 1);
        let y = ((p.y * self.height as f32) as usize).min(self.height - 1);
        self.cell_pdf(x, y)
    }

    fn cell_pdf(&self, x: usize, y: usize) -> f32 {
        self.marginal.evaluate_pdf(y)
            * self.conditional[y].evaluate_pdf(x)
            * (self.width * self.height) as f32
    }
}
