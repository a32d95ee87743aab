use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use crate::hierarchy::Hierarchy;
use crate::index_space::{Axis, IndexSpace};




/// A sphere in domain coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sphere {
    pub center: [f64; 3],
    pub radius: f64,
}

impl Sphere {
    pub fn volume(&self) -> f64 {
        4.0 / 3.0 * std::f64::consts::PI * self.radius.powi(3)
    }

    pub fn contains(&self, x: [f64; 3]) -> bool {
        (0..3).map(|d| (x[d] - self.center[d]).powi(2)).sum::<f64>() <= self.radius * self.radius
    }

    /// Cells of width `dx` overlapping the sphere's bounding box.
    pub fn bounding_cells(&self, dx: f64) -> IndexSpace {
        let lo = |d: usize| ((self.center[d] - self.radius) / dx).floor() as i64;
        let hi = |d: usize| ((self.center[d] + self.radius) / dx).floor() as i64 + 1;
        IndexSpace::new(lo(0)..hi(0), lo(1)..hi(1), lo(2)..hi(2))
    }
}




/**
 * The cells of a level's lattice that a sphere acts on: those whose centres
 * lie inside it, or the single cell holding the centre if the sphere is
 * smaller than a cell.
 */
pub fn lattice_cells(sphere: &Sphere, dx: f64) -> Vec<(i64, i64, i64)> {
    let bounds = sphere.bounding_cells(dx);
    let center = |i: i64, j: i64, k: i64| [(i as f64 + 0.5) * dx, (j as f64 + 0.5) * dx, (k as f64 + 0.5) * dx];

    let (rj, rk) = (bounds.range(Axis::J).clone(), bounds.range(Axis::K).clone());

    let cells: Vec<_> = bounds
        .range(Axis::I)
        .clone()
        .into_par_iter()
        .flat_map(|i| {
            let mut found = Vec::new();
            for j in rj.clone() {
                for k in rk.clone() {
                    if sphere.contains(center(i, j, k)) {
                        found.push((i, j, k))
                    }
                }
            }
            found
        })
        .collect();

    if cells.is_empty() {
        let c = sphere.center;
        vec![((c[0] / dx).floor() as i64, (c[1] / dx).floor() as i64, (c[2] / dx).floor() as i64)]
    } else {
        cells
    }
}




/**
 * Result of testing a sphere against the grids of one level.
 */
#[derive(Clone, Debug)]
pub struct SphereSearch {
    pub level: usize,
    pub contained: bool,
    pub cells: Vec<(i64, i64, i64)>,
    pub cell_width: f64,
}

impl SphereSearch {

    /// Volume of the lattice cells the sphere acts on.
    pub fn covered_volume(&self) -> f64 {
        self.cells.len() as f64 * self.cell_width.powi(3)
    }

    /**
     * Factor by which a density spread over the sphere must be scaled so
     * that, spread over the lattice cells instead, it carries the same
     * total.
     */
    pub fn rescale(&self, sphere: &Sphere) -> f64 {
        sphere.volume() / self.covered_volume()
    }
}




/**
 * Determine whether the grids of a level together enclose every lattice
 * cell the sphere acts on. The grid extents are known on every process, so
 * every process reaches the same answer.
 */
pub fn find_feedback_sphere(hierarchy: &Hierarchy, level: usize, sphere: &Sphere) -> SphereSearch {
    let dx = hierarchy.cell_width(level);
    let cells = lattice_cells(sphere, dx);
    let grids = hierarchy.grids(level);
    let contained = !grids.is_empty() && cells
        .par_iter()
        .all(|c| grids.iter().any(|g| g.index_space().contains(*c)));

    SphereSearch { level, contained, cells, cell_width: dx }
}
