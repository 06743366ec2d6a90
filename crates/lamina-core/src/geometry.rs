use std::ops::Mul;

use serde::{Deserialize, Serialize};

/// A 2D point in data, layer, or world coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const ORIGIN: Point = Point { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    pub fn scale(&self, factor: f64) -> Self {
        Self {
            x: self.x * factor,
            y: self.y * factor,
        }
    }
}

/// An axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub min: Point,
    pub max: Point,
}

impl BBox {
    pub fn new(min: Point, max: Point) -> Self {
        Self { min, max }
    }

    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point>) -> Option<Self> {
        let mut bbox: Option<BBox> = None;
        for p in points {
            if !p.x.is_finite() || !p.y.is_finite() {
                continue;
            }
            bbox = Some(match bbox {
                None => BBox::new(*p, *p),
                Some(b) => BBox::new(
                    Point::new(b.min.x.min(p.x), b.min.y.min(p.y)),
                    Point::new(b.max.x.max(p.x), b.max.y.max(p.y)),
                ),
            });
        }
        bbox
    }

    /// Bounding box of two parallel coordinate arrays, skipping non-finite pairs.
    pub fn from_coordinates(x: &[f32], y: &[f32]) -> Option<Self> {
        let points: Vec<Point> = x
            .iter()
            .zip(y)
            .map(|(&x, &y)| Point::new(f64::from(x), f64::from(y)))
            .collect();
        Self::from_points(&points)
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    pub fn center(&self) -> Point {
        Point::new(
            (self.min.x + self.max.x) / 2.0,
            (self.min.y + self.max.y) / 2.0,
        )
    }

    pub fn contains_point(&self, p: &Point) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    pub fn union(&self, other: &BBox) -> Self {
        Self {
            min: Point::new(self.min.x.min(other.min.x), self.min.y.min(other.min.y)),
            max: Point::new(self.max.x.max(other.max.x), self.max.y.max(other.max.y)),
        }
    }
}

/// A polygon with one exterior ring and zero or more holes.
///
/// Rings may or may not repeat their first vertex at the end.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Polygon {
    pub exterior: Vec<Point>,
    #[serde(default)]
    pub interiors: Vec<Vec<Point>>,
}

impl Polygon {
    pub fn new(exterior: Vec<Point>) -> Self {
        Self {
            exterior,
            interiors: Vec::new(),
        }
    }

    pub fn rings(&self) -> impl Iterator<Item = &[Point]> {
        std::iter::once(self.exterior.as_slice()).chain(self.interiors.iter().map(Vec::as_slice))
    }

    pub fn bbox(&self) -> Option<BBox> {
        BBox::from_points(&self.exterior)
    }
}

/// The geometry of one shapes item.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MultiPolygon {
    pub polygons: Vec<Polygon>,
}

impl MultiPolygon {
    pub fn new(polygons: Vec<Polygon>) -> Self {
        Self { polygons }
    }

    pub fn bbox(&self) -> Option<BBox> {
        self.polygons
            .iter()
            .filter_map(Polygon::bbox)
            .reduce(|a, b| a.union(&b))
    }

    /// Closed ring edges `[x0, y0, x1, y1]` over every ring of every polygon.
    pub fn edges(&self) -> Vec<[f32; 4]> {
        let mut edges = Vec::new();
        for polygon in &self.polygons {
            for ring in polygon.rings() {
                push_ring_edges(ring, &mut edges);
            }
        }
        edges
    }

    pub fn edge_count(&self) -> usize {
        self.polygons
            .iter()
            .flat_map(Polygon::rings)
            .map(ring_edge_count)
            .sum()
    }
}

fn ring_is_closed(ring: &[Point]) -> bool {
    ring.len() > 1 && ring.first() == ring.last()
}

fn ring_edge_count(ring: &[Point]) -> usize {
    match ring.len() {
        0 | 1 => 0,
        n if ring_is_closed(ring) => n - 1,
        n => n,
    }
}

fn push_ring_edges(ring: &[Point], out: &mut Vec<[f32; 4]>) {
    if ring.len() < 2 {
        return;
    }
    for w in ring.windows(2) {
        out.push([w[0].x as f32, w[0].y as f32, w[1].x as f32, w[1].y as f32]);
    }
    if !ring_is_closed(ring) {
        let (first, last) = (ring[0], ring[ring.len() - 1]);
        out.push([last.x as f32, last.y as f32, first.x as f32, first.y as f32]);
    }
}

/// A row-major 3×3 matrix acting on column vectors `[x, y, 1]`.
///
/// `a * b` applies `b` first, then `a`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Matrix3 {
    pub rows: [[f64; 3]; 3],
}

impl Matrix3 {
    pub const IDENTITY: Self = Self {
        rows: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
    };

    pub const fn from_rows(rows: [[f64; 3]; 3]) -> Self {
        Self { rows }
    }

    pub const fn from_translation(x: f64, y: f64) -> Self {
        Self {
            rows: [[1.0, 0.0, x], [0.0, 1.0, y], [0.0, 0.0, 1.0]],
        }
    }

    pub const fn from_scale(sx: f64, sy: f64) -> Self {
        Self {
            rows: [[sx, 0.0, 0.0], [0.0, sy, 0.0], [0.0, 0.0, 1.0]],
        }
    }

    /// Counter-clockwise rotation in degrees.
    pub fn from_rotation(degrees: f64) -> Self {
        let (s, c) = degrees.to_radians().sin_cos();
        Self {
            rows: [[c, -s, 0.0], [s, c, 0.0], [0.0, 0.0, 1.0]],
        }
    }

    pub fn apply(&self, p: Point) -> Point {
        let r = &self.rows;
        Point::new(
            r[0][0] * p.x + r[0][1] * p.y + r[0][2],
            r[1][0] * p.x + r[1][1] * p.y + r[1][2],
        )
    }

    /// Uniform scale factor of the linear part (length of the first column).
    pub fn scale_factor(&self) -> f64 {
        self.rows[0][0].hypot(self.rows[1][0])
    }

    pub fn is_finite(&self) -> bool {
        self.rows.iter().flatten().all(|v| v.is_finite())
    }

    /// Column-major layout with each column padded to four floats, as a
    /// uniform-block `mat3` expects.
    pub fn to_padded_columns(&self) -> [f32; 12] {
        let r = &self.rows;
        let mut out = [0.0_f32; 12];
        for col in 0..3 {
            for row in 0..3 {
                out[col * 4 + row] = r[row][col] as f32;
            }
        }
        out
    }

    pub fn approx_eq(&self, other: &Matrix3, eps: f64) -> bool {
        self.rows
            .iter()
            .flatten()
            .zip(other.rows.iter().flatten())
            .all(|(a, b)| (a - b).abs() <= eps)
    }
}

impl Default for Matrix3 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mul for Matrix3 {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        let a = &self.rows;
        let b = &rhs.rows;
        let mut out = [[0.0_f64; 3]; 3];
        for (i, row) in out.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = a[i][0] * b[0][j] + a[i][1] * b[1][j] + a[i][2] * b[2][j];
            }
        }
        Self { rows: out }
    }
}
