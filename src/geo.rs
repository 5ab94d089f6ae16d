//! Geodesic primitives and the grid probe planner.
//!
//! A region's grid density is derived from its physical span: one cell per
//! `MIN_CELL_SIZE` degrees of span, clamped so tiny drags still probe and
//! huge drags stay bounded. Probes are the grid line intersections including
//! the region edges, so an NxM grid yields (N+1)*(M+1) probes.

use serde::{Deserialize, Serialize};

use crate::region::Region;

/// Minimum cell span in decimal degrees (roughly 55m of latitude).
pub const MIN_CELL_SIZE: f64 = 0.0005;

/// Upper bound on grid rows/cols per region.
pub const MAX_GRID: usize = 8;

/// Session-wide cap on planned probes across all regions.
pub const DEFAULT_MAX_POINTS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Axis-aligned rectangular bounds in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl Bounds {
    pub fn center(&self) -> LatLng {
        LatLng::new(
            (self.north + self.south) / 2.0,
            (self.east + self.west) / 2.0,
        )
    }

    pub fn lat_span(&self) -> f64 {
        self.north - self.south
    }

    pub fn lng_span(&self) -> f64 {
        self.east - self.west
    }

    pub fn contains(&self, point: LatLng) -> bool {
        point.lat >= self.south
            && point.lat <= self.north
            && point.lng >= self.west
            && point.lng <= self.east
    }
}

/// Grid density of one region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridConfig {
    pub rows: usize,
    pub cols: usize,
}

impl GridConfig {
    /// Derive density from the physical span of the bounds, clamped to
    /// [1, MAX_GRID] per axis.
    pub fn derive(bounds: &Bounds) -> Self {
        Self {
            rows: axis_cells(bounds.lat_span()),
            cols: axis_cells(bounds.lng_span()),
        }
    }
}

fn axis_cells(span: f64) -> usize {
    let cells = (span / MIN_CELL_SIZE).floor() as isize;
    cells.clamp(1, MAX_GRID as isize) as usize
}

/// One planned imagery lookup, tagged with its owning region.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeCoordinate {
    pub lat: f64,
    pub lng: f64,
    pub region_id: String,
}

/// Plan the probe coordinates for one region: every grid line intersection,
/// edges included, in row-major order.
pub fn plan_region(region: &Region) -> Vec<ProbeCoordinate> {
    let bounds = &region.bounds;
    let grid = &region.grid;
    let mut probes = Vec::with_capacity((grid.rows + 1) * (grid.cols + 1));

    for r in 0..=grid.rows {
        let lat = bounds.south + bounds.lat_span() * (r as f64) / (grid.rows as f64);
        for c in 0..=grid.cols {
            let lng = bounds.west + bounds.lng_span() * (c as f64) / (grid.cols as f64);
            probes.push(ProbeCoordinate {
                lat,
                lng,
                region_id: region.id.clone(),
            });
        }
    }
    probes
}

/// Plan across all regions in their given order, truncated deterministically
/// at `max_points`: when the cap hits, later regions lose probes, never
/// earlier ones.
pub fn plan_all(regions: &[Region], max_points: usize) -> Vec<ProbeCoordinate> {
    let mut probes: Vec<ProbeCoordinate> =
        regions.iter().flat_map(|r| plan_region(r)).collect();
    if probes.len() > max_points {
        tracing::warn!(
            "Probe plan truncated from {} to {} points",
            probes.len(),
            max_points
        );
        probes.truncate(max_points);
    }
    probes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region_with(bounds: Bounds, id: &str) -> Region {
        Region {
            id: id.to_string(),
            number: 0,
            center: bounds.center(),
            label: format!("Area {}", id),
            color: "#ef4444".to_string(),
            grid: GridConfig::derive(&bounds),
            bounds,
        }
    }

    #[test]
    fn derive_clamps_to_grid_limits() {
        // Tiny drag: still one cell per axis
        let tiny = Bounds { north: 0.0001, south: 0.0, east: 0.0001, west: 0.0 };
        assert_eq!(GridConfig::derive(&tiny), GridConfig { rows: 1, cols: 1 });

        // Huge drag: capped
        let huge = Bounds { north: 1.0, south: 0.0, east: 1.0, west: 0.0 };
        assert_eq!(GridConfig::derive(&huge), GridConfig { rows: 8, cols: 8 });

        // Mid-size drag: one cell per MIN_CELL_SIZE of span
        let mid = Bounds { north: 0.0021, south: 0.0, east: 0.0016, west: 0.0 };
        assert_eq!(GridConfig::derive(&mid), GridConfig { rows: 4, cols: 3 });
    }

    #[test]
    fn unit_grid_probes_the_four_corners() {
        let bounds = Bounds { north: 2.0, south: 1.0, east: 20.0, west: 10.0 };
        let mut region = region_with(bounds, "r1");
        region.grid = GridConfig { rows: 1, cols: 1 };

        let probes = plan_region(&region);
        assert_eq!(probes.len(), 4);
        let coords: Vec<(f64, f64)> = probes.iter().map(|p| (p.lat, p.lng)).collect();
        assert_eq!(coords, vec![(1.0, 10.0), (1.0, 20.0), (2.0, 10.0), (2.0, 20.0)]);
    }

    #[test]
    fn probes_cover_grid_intersections_within_bounds() {
        let bounds = Bounds { north: 0.0021, south: 0.0, east: 0.0016, west: 0.0 };
        let region = region_with(bounds, "r1");

        let probes = plan_region(&region);
        assert_eq!(probes.len(), (region.grid.rows + 1) * (region.grid.cols + 1));
        for probe in &probes {
            assert!(bounds.contains(LatLng::new(probe.lat, probe.lng)));
            assert_eq!(probe.region_id, "r1");
        }
    }

    #[test]
    fn plan_all_truncates_deterministically() {
        let bounds = Bounds { north: 0.0021, south: 0.0, east: 0.0021, west: 0.0 };
        let regions = vec![region_with(bounds, "a"), region_with(bounds, "b")];

        // 2 regions x 25 probes, capped at 30: all of "a", head of "b"
        let probes = plan_all(&regions, 30);
        assert_eq!(probes.len(), 30);
        assert!(probes[..25].iter().all(|p| p.region_id == "a"));
        assert!(probes[25..].iter().all(|p| p.region_id == "b"));

        let again = plan_all(&regions, 30);
        assert_eq!(probes, again);

        // Under the cap nothing is dropped
        assert_eq!(plan_all(&regions, 1000).len(), 50);
    }
}
