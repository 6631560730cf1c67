//! Compartment geometry used to place segments relative to a recording electrode.

use serde::{Deserialize, Serialize};


/// A point in 3D space (um)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Point3 { x, y, z }
    }

    /// Euclidean distance between two points
    pub fn distance(&self, other: &Point3) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2) + (self.z - other.z).powi(2)).sqrt()
    }

    fn lerp(&self, other: &Point3, fraction: f64) -> Point3 {
        Point3 {
            x: self.x + (other.x - self.x) * fraction,
            y: self.y + (other.y - self.y) * fraction,
            z: self.z + (other.z - self.z) * fraction,
        }
    }
}

impl From<(f64, f64, f64)> for Point3 {
    fn from((x, y, z): (f64, f64, f64)) -> Self {
        Point3 { x, y, z }
    }
}

/// An unbranched piece of a cell's morphology defined by 3D points and
/// discretized into `nseg` segments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    /// 3D points along the centroid of the section (um)
    pub points: Vec<Point3>,
    /// Arc length from the start of the section to each point (um)
    pub arc_lengths: Vec<f64>,
    /// Total length of the section (um)
    pub length: f64,
    /// Number of segments
    pub nseg: usize,
    /// Membrane area of each segment (um^2)
    pub areas: Vec<f64>,
    /// Whether the section takes part in the extracellular computation
    #[serde(default)]
    pub extracellular: bool,
}

impl Section {
    /// Generates a cylindrical section through the given points with a constant
    /// diameter (um), arc lengths are accumulated from the points and each segment
    /// gets the lateral area of its piece of the cylinder
    pub fn cylinder(points: Vec<Point3>, diameter: f64, nseg: usize) -> Self {
        let mut arc_lengths = Vec::with_capacity(points.len());
        let mut total = 0.;
        for (n, point) in points.iter().enumerate() {
            if n > 0 {
                total += point.distance(&points[n - 1]);
            }
            arc_lengths.push(total);
        }

        let nseg = nseg.max(1);
        let area = std::f64::consts::PI * diameter * total / nseg as f64;

        Section {
            points,
            arc_lengths,
            length: total,
            nseg,
            areas: vec![area; nseg],
            extracellular: false,
        }
    }

    /// Length of a single segment (um)
    pub fn segment_length(&self) -> f64 {
        self.length / self.nseg as f64
    }

    /// First 3D point of the section if present
    pub fn start(&self) -> Option<Point3> {
        self.points.first().copied()
    }
}

fn interpolate_at(location: f64, normalized: &[f64], points: &[Point3]) -> Point3 {
    let last = normalized.len() - 1;
    if location <= normalized[0] {
        return points[0];
    }
    if location >= normalized[last] {
        return points[last];
    }

    let upper = normalized.partition_point(|&value| value < location).min(last).max(1);
    let lower = upper - 1;
    let span = normalized[upper] - normalized[lower];
    if span <= 0. {
        return points[upper];
    }

    points[lower].lerp(&points[upper], (location - normalized[lower]) / span)
}

/// Calculates the positions of the nodes of a section by linearly interpolating
/// its 3D points along normalized arc length, returns `nseg + 2` positions: the start of
/// the section, the center of every segment and the end of the section,
/// returns `None` if there are no points or the arc lengths do not match the points
pub fn interpolate_segment_positions(
    points: &[Point3],
    arc_lengths: &[f64],
    nseg: usize,
) -> Option<Vec<Point3>> {
    if points.is_empty() || points.len() != arc_lengths.len() {
        return None;
    }

    let total = arc_lengths[arc_lengths.len() - 1];
    if total <= 0. {
        return Some(vec![points[0]; nseg + 2]);
    }

    let normalized: Vec<f64> = arc_lengths.iter().map(|arc| arc / total).collect();

    let mut locations = vec![0.; nseg + 2];
    for (i, location) in locations.iter_mut().enumerate().take(nseg + 1).skip(1) {
        *location = (2 * i - 1) as f64 / (2 * nseg) as f64;
    }
    locations[nseg + 1] = 1.;

    Some(
        locations.iter()
            .map(|&location| interpolate_at(location, &normalized, points))
            .collect()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpolation_of_straight_section() {
        let section = Section::cylinder(
            vec![Point3::new(0., 0., 0.), Point3::new(100., 0., 0.)],
            2.,
            4,
        );

        let nodes = interpolate_segment_positions(&section.points, &section.arc_lengths, section.nseg)
            .unwrap();

        let expected = [0., 12.5, 37.5, 62.5, 87.5, 100.];
        assert_eq!(nodes.len(), expected.len());
        for (node, x) in nodes.iter().zip(expected) {
            assert!((node.x - x).abs() < 1e-9);
            assert_eq!(node.y, 0.);
        }
    }

    #[test]
    fn test_interpolation_of_bent_section() {
        let section = Section::cylinder(
            vec![Point3::new(0., 0., 0.), Point3::new(10., 0., 0.), Point3::new(10., 10., 0.)],
            1.,
            1,
        );

        let nodes = interpolate_segment_positions(&section.points, &section.arc_lengths, 1)
            .unwrap();

        assert!(nodes[1].distance(&Point3::new(10., 0., 0.)) < 1e-9);
        assert!(nodes[2].distance(&Point3::new(10., 10., 0.)) < 1e-9);
        assert!((section.length - 20.).abs() < 1e-12);
    }
}
