#![feature(test)]
extern crate test;

use enzo_particles::engine::sphere::{find_feedback_sphere, lattice_cells, Sphere};
use enzo_particles::grid::GridId;
use enzo_particles::hierarchy::Hierarchy;
use enzo_particles::index_space::range3d;




/**
 * A 32^3 root level split into 64 grids of 8^3 cells, and one refined
 * patch over the centre.
 */
fn hierarchy() -> Hierarchy {
    let mut h = Hierarchy::new(0, [32, 32, 32], 2).unwrap();
    let mut id = 0;

    for (i, j, k) in range3d(0..4, 0..4, 0..4).iter() {
        let space = range3d(i * 8..(i + 1) * 8, j * 8..(j + 1) * 8, k * 8..(k + 1) * 8);
        h.add_grid(h.new_grid(GridId(id), 0, 0, space)).unwrap();
        id += 1;
    }
    h.add_grid(h.new_grid(GridId(id), 0, 1, range3d(16..48, 16..48, 16..48))).unwrap();
    h
}




// ============================================================================
#[bench]
fn lattice_of_a_sphere_sixteen_cells_across(b: &mut test::Bencher) {
    let sphere = Sphere { center: [0.5; 3], radius: 0.25 };
    b.iter(|| lattice_cells(&sphere, 1.0 / 32.0).len());
}

#[bench]
fn containment_across_many_grids(b: &mut test::Bencher) {
    let h = hierarchy();
    let sphere = Sphere { center: [0.5; 3], radius: 0.2 };
    b.iter(|| {
        let coarse = find_feedback_sphere(&h, 0, &sphere).contained;
        let fine = find_feedback_sphere(&h, 1, &sphere).contained;
        (coarse, fine)
    });
}
