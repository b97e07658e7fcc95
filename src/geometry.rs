use geo::Area;
use h3o::{CellIndex, LatLng, Resolution};
use std::fmt;
use std::str::FromStr;

// Anything below this (in square degrees) is treated as a collapsed cell
const MIN_POLYGON_AREA: f64 = 1e-12;

/// Identity of one drawn cell: the resolution it was drawn for plus the
/// native H3 index. Formats as `"<res>-<h3 hex>"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellKey {
    resolution: Resolution,
    cell: CellIndex,
}

impl CellKey {
    pub fn new(resolution: Resolution, cell: CellIndex) -> Self {
        Self { resolution, cell }
    }

    pub fn from_cell(cell: CellIndex) -> Self {
        Self::new(cell.resolution(), cell)
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn cell(&self) -> CellIndex {
        self.cell
    }

    /// Center of the underlying cell.
    pub fn center(&self) -> LatLng {
        LatLng::from(self.cell)
    }
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", u8::from(self.resolution), self.cell)
    }
}

impl FromStr for CellKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (res, cell) = s
            .split_once('-')
            .ok_or_else(|| anyhow::anyhow!("cell key {s:?} is missing a resolution prefix"))?;
        let res: u8 = res.parse()?;
        let resolution = Resolution::try_from(res)?;
        let cell = CellIndex::from_str(cell)?;
        Ok(Self::new(resolution, cell))
    }
}

/// A single polygon vertex in renderer axis order.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LonLat {
    pub lon: f64,
    pub lat: f64,
}

/// Closed polygon in (lon, lat) degrees: the first vertex is repeated last.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Polygon {
    vertices: Vec<LonLat>,
}

impl Polygon {
    pub fn vertices(&self) -> &[LonLat] {
        &self.vertices
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Flattened `[lon, lat, lon, lat, ...]` array, closure included.
    pub fn to_degrees_array(&self) -> Vec<f64> {
        self.vertices.iter().flat_map(|v| [v.lon, v.lat]).collect()
    }

    /// A polygon with fewer than three distinct corners or no area cannot be drawn.
    pub fn is_degenerate(&self) -> bool {
        // closed ring: 3 corners + closure
        if self.vertices.len() < 4 {
            return true;
        }
        let ring: Vec<(f64, f64)> = self.vertices.iter().map(|v| (v.lon, v.lat)).collect();
        let polygon = geo::Polygon::new(geo::LineString::from(ring), vec![]);
        let area = polygon.unsigned_area();
        !area.is_finite() || area <= MIN_POLYGON_AREA
    }
}

/// Converts an H3 boundary (lat, lng order) into a closed renderer polygon.
pub fn polygon_from_boundary(boundary: &[LatLng]) -> Polygon {
    let mut vertices: Vec<LonLat> = boundary
        .iter()
        .map(|ll| LonLat {
            lon: ll.lng(),
            lat: ll.lat(),
        })
        .collect();
    if let Some(first) = vertices.first().copied() {
        vertices.push(first);
    }
    Polygon { vertices }
}

pub fn cell_to_polygon(cell: CellIndex) -> Polygon {
    polygon_from_boundary(&cell.boundary())
}
