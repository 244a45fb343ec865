use tessera_core::{
    Camera, Emitter, GeneralizedBsdf, Light, SurfaceGeometry, TransportDirection,
};
use tessera_math::{Color, PdfEval, ProbabilityMeasure, Vec3};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexType {
    None,
    /// First vertex of a subpath, sampled on an emitter.
    EndPoint,
    /// Vertex created by a ray hit.
    Intermediate,
}

/// Vertex of a light or eye subpath.
///
/// `pdf_d` and `weight` are indexed by [`TransportDirection::index`]. The
/// entry of the subpath direction is the density of sampling `wo`, the
/// other entry the density of sampling `wi` in the reverse direction.
#[derive(Clone, Copy)]
pub struct PathVertex<'a> {
    pub ty: VertexType,
    pub transport_dir: TransportDirection,
    pub geom: SurfaceGeometry,
    pub wi: Vec3,
    pub wo: Vec3,
    /// Emitter of an endpoint, or the light or camera that was hit.
    pub emitter: Option<&'a dyn Emitter>,
    pub bsdf: Option<&'a dyn GeneralizedBsdf>,
    pub area_light: Option<&'a dyn Light>,
    pub area_camera: Option<&'a dyn Camera>,
    /// Positional density in area measure, including light selection.
    pub pdf_p: PdfEval,
    pub pdf_d: [PdfEval; 2],
    /// Russian roulette continuation probability.
    pub pdf_rr: PdfEval,
    pub weight: [Color; 2],
}

impl Default for PathVertex<'_> {
    fn default() -> Self {
        Self {
            ty: VertexType::None,
            transport_dir: TransportDirection::EL,
            geom: SurfaceGeometry::default(),
            wi: Vec3::ZERO,
            wo: Vec3::ZERO,
            emitter: None,
            bsdf: None,
            area_light: None,
            area_camera: None,
            pdf_p: PdfEval::zero(ProbabilityMeasure::Area),
            pdf_d: [PdfEval::zero(ProbabilityMeasure::ProjectedSolidAngle); 2],
            pdf_rr: PdfEval::discrete(1.0),
            weight: [Color::ZERO; 2],
        }
    }
}

impl PathVertex<'_> {
    /// True when the directional distribution at the vertex is a delta.
    pub fn degenerated(&self) -> bool {
        self.bsdf.is_some_and(|bsdf| bsdf.degenerated())
    }
}

impl std::fmt::Debug for PathVertex<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathVertex")
            .field("ty", &self.ty)
            .field("transport_dir", &self.transport_dir)
            .field("p", &self.geom.p)
            .field("degenerated", &self.geom.degenerated)
            .field("wi", &self.wi)
            .field("wo", &self.wo)
            .field("area_light", &self.area_light.is_some())
            .field("area_camera", &self.area_camera.is_some())
            .field("pdf_p", &self.pdf_p)
            .field("pdf_d", &self.pdf_d)
            .field("pdf_rr", &self.pdf_rr)
            .finish()
    }
}

/// Arena of path vertices, reused from sample to sample.
///
/// Subpaths refer to vertices by index; [`release`](Self::release) makes
/// every slot available again without freeing memory.
#[derive(Default)]
pub struct PathVertexPool<'a> {
    vertices: Vec<PathVertex<'a>>,
    used: usize,
}

impl<'a> PathVertexPool<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a default-initialized vertex and return its index.
    pub fn construct(&mut self) -> usize {
        if self.used == self.vertices.len() {
            self.vertices.push(PathVertex::default());
        } else {
            self.vertices[self.used] = PathVertex::default();
        }
        self.used += 1;
        self.used - 1
    }

    /// Allocate a vertex initialized to `vertex`.
    pub fn push(&mut self, vertex: PathVertex<'a>) -> usize {
        let index = self.construct();
        self.vertices[index] = vertex;
        index
    }

    pub fn get(&self, index: usize) -> &PathVertex<'a> {
        &self.vertices[index]
    }

    pub fn get_mut(&mut self, index: usize) -> &mut PathVertex<'a> {
        &mut self.vertices[index]
    }

    /// Return every vertex to the pool.
    pub fn release(&mut self) {
        self.used = 0;
    }

    pub fn len(&self) -> usize {
        self.used
    }

    pub fn is_empty(&self) -> bool {
        self.used == 0
    }
}
