use crate::{
    concurrency::par_iter_mut1,
    floating_type_mod::FT,
    neighborhood_search::{NeighborhoodCache, PointSortedHashGrid},
    sph_kernels::{Poly6Kernel, SpikyKernel},
    V3,
};

/*
 * SPH field operators. Every function takes the arrays it reads as
 * explicit slices: callers decide whether the operator sees the live
 * state or a predicted/temporary snapshot, and that choice is visible at
 * the call site instead of hidden in captured copies.
 */

/** Sum of poly6 weights over all points within the kernel radius of `origin` (includes `origin`'s own point if it is in the grid). */
pub fn sum_of_kernel_nearby(grid: &PointSortedHashGrid, origin: V3, kernel: &Poly6Kernel) -> FT {
    let mut sum = 0.;
    grid.for_each_nearby_point(origin, kernel.h, |_, neighbor_position| {
        sum += kernel.value((neighbor_position - origin).norm());
    });
    sum
}

/** density[i] = mass * sum of kernel weights over nearby particles. The grid must be freshly built over `positions`. */
pub fn update_densities(
    grid: &PointSortedHashGrid,
    positions: &[V3],
    mass: FT,
    kernel: &Poly6Kernel,
    densities: &mut [FT],
) {
    debug_assert_eq!(positions.len(), densities.len());
    par_iter_mut1(densities, |i, density| {
        *density = mass * sum_of_kernel_nearby(grid, positions[i], kernel);
    });
}

/** SPH interpolation of a scalar field sampled at the particles, evaluated at an arbitrary point. */
pub fn interpolate_scalar(
    grid: &PointSortedHashGrid,
    origin: V3,
    values: &[FT],
    densities: &[FT],
    mass: FT,
    kernel: &Poly6Kernel,
) -> FT {
    let mut sum = 0.;
    grid.for_each_nearby_point(origin, kernel.h, |j, neighbor_position| {
        if densities[j] > 0. {
            let weight = mass / densities[j] * kernel.value((neighbor_position - origin).norm());
            sum += values[j] * weight;
        }
    });
    sum
}

/** SPH interpolation of a vector field sampled at the particles. */
pub fn interpolate_vector(
    grid: &PointSortedHashGrid,
    origin: V3,
    values: &[V3],
    densities: &[FT],
    mass: FT,
    kernel: &Poly6Kernel,
) -> V3 {
    let mut sum = V3::zeros();
    grid.for_each_nearby_point(origin, kernel.h, |j, neighbor_position| {
        if densities[j] > 0. {
            let weight = mass / densities[j] * kernel.value((neighbor_position - origin).norm());
            sum += values[j] * weight;
        }
    });
    sum
}

/**
 * Symmetric SPH gradient of a per-particle scalar field at particle `i`.
 * Coincident neighbors contribute nothing (no direction can be formed).
 */
pub fn gradient_at(
    i: usize,
    values: &[FT],
    positions: &[V3],
    densities: &[FT],
    neighbor_lists: &NeighborhoodCache,
    mass: FT,
    kernel: &SpikyKernel,
) -> V3 {
    let mut sum = V3::zeros();
    let origin = positions[i];

    for j in neighbor_lists.iter(i) {
        let diff = positions[j] - origin;
        let dist = diff.norm();
        if dist > 0. {
            let dir = diff / dist;
            sum += kernel.gradient(dist, dir)
                * (densities[i]
                    * mass
                    * (values[i] / (densities[i] * densities[i]) + values[j] / (densities[j] * densities[j])));
        }
    }
    sum
}

/**
 * Tait equation of state, `p = eos_scale / gamma * ((rho/rho_0)^gamma - 1)`
 * with `eos_scale = rho_0 * c^2`. Negative (tensile) pressure is scaled by
 * `negative_pressure_scale` to suppress clumping at free surfaces.
 */
pub fn pressure_from_eos(
    density: FT,
    target_density: FT,
    eos_scale: FT,
    eos_exponent: FT,
    negative_pressure_scale: FT,
) -> FT {
    let mut pressure = eos_scale / eos_exponent * ((density / target_density).powf(eos_exponent) - 1.);
    if pressure < 0. {
        pressure *= negative_pressure_scale;
    }
    pressure
}

/** SPH Laplacian of a per-particle scalar field at particle `i`. */
pub fn laplacian_at(
    i: usize,
    values: &[FT],
    positions: &[V3],
    densities: &[FT],
    neighbor_lists: &NeighborhoodCache,
    mass: FT,
    kernel: &SpikyKernel,
) -> FT {
    let mut sum = 0.;
    let origin = positions[i];

    for j in neighbor_lists.iter(i) {
        let dist = (positions[j] - origin).norm();
        sum += mass * (values[j] - values[i]) / densities[j] * kernel.second_derivative(dist);
    }
    sum
}

#[cfg(test)]
fn lattice_fixture(spacing: FT) -> (Vec<V3>, PointSortedHashGrid, NeighborhoodCache, FT, Poly6Kernel) {
    use crate::neighborhood_search::DEFAULT_HASH_GRID_RESOLUTION;
    use crate::particle_system::mass_from_target_spacing;
    use crate::vec3f;

    let kernel_radius = 1.8 * spacing;
    let mut positions = Vec::new();
    for k in 0..8 {
        for j in 0..8 {
            for i in 0..8 {
                positions.push(vec3f(i as FT * spacing, j as FT * spacing, k as FT * spacing));
            }
        }
    }

    let mut grid = PointSortedHashGrid::new([DEFAULT_HASH_GRID_RESOLUTION; 3], 2. * kernel_radius);
    grid.build(&positions);

    let mut lists = NeighborhoodCache::new(positions.len());
    lists.build(&grid, &positions, kernel_radius);

    let mass = mass_from_target_spacing(spacing, kernel_radius, 1000.);
    (positions, grid, lists, mass, Poly6Kernel::new(kernel_radius))
}

#[test]
fn density_of_interior_lattice_particle_is_positive_and_bounded() {
    let spacing = 0.05;
    let (positions, grid, _lists, mass, kernel) = lattice_fixture(spacing);

    let mut densities = vec![0.; positions.len()];
    update_densities(&grid, &positions, mass, &kernel, &mut densities);

    // the fixture's simple-cubic arrangement is sparser than the BCC lattice
    // the mass derivation targets, so the interior sits somewhat below rest
    // density (about half of it at this spacing) without ever exceeding it
    let center = positions
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            let c = crate::vec3f(0.175, 0.175, 0.175);
            (*a - c).norm().partial_cmp(&(*b - c).norm()).unwrap()
        })
        .unwrap()
        .0;
    assert!(densities[center] > 450., "density {}", densities[center]);
    assert!(densities[center] < 1000., "density {}", densities[center]);

    // boundary particles see fewer neighbors
    assert!(densities[0] < densities[center]);
}

#[test]
fn constant_field_has_zero_laplacian() {
    let spacing = 0.05;
    let (positions, grid, lists, mass, kernel) = lattice_fixture(spacing);

    let mut densities = vec![0.; positions.len()];
    update_densities(&grid, &positions, mass, &kernel, &mut densities);

    let values = vec![3.5; positions.len()];
    let spiky = SpikyKernel::new(kernel.h);
    for i in [0, 100, 300] {
        let lap = laplacian_at(i, &values, &positions, &densities, &lists, mass, &spiky);
        assert!(lap.abs() < 1e-9, "laplacian of constant field: {}", lap);
    }
}

#[test]
fn gradient_points_up_a_linear_ramp() {
    let spacing = 0.05;
    let (positions, grid, lists, mass, kernel) = lattice_fixture(spacing);

    let mut densities = vec![0.; positions.len()];
    update_densities(&grid, &positions, mass, &kernel, &mut densities);

    // field rising along x, offset so all values stay positive
    let values: Vec<FT> = positions.iter().map(|p| 1. + p.x).collect();
    let spiky = SpikyKernel::new(kernel.h);

    let center = positions
        .iter()
        .position(|p| (p - crate::vec3f(0.15, 0.15, 0.15)).norm() < 1e-9)
        .unwrap();
    let gradient = gradient_at(center, &values, &positions, &densities, &lists, mass, &spiky);
    assert!(gradient.x > 0., "gradient {:?}", gradient);
    assert!(gradient.y.abs() < 1e-9 && gradient.z.abs() < 1e-9, "gradient {:?}", gradient);
}

#[test]
fn vector_interpolation_reproduces_constant_field_in_interior() {
    let spacing = 0.05;
    let (positions, grid, _lists, mass, kernel) = lattice_fixture(spacing);

    let mut densities = vec![0.; positions.len()];
    update_densities(&grid, &positions, mass, &kernel, &mut densities);

    let values = vec![crate::vec3f(0., -1., 0.); positions.len()];
    let interior = crate::vec3f(0.175, 0.175, 0.175);
    let interpolated = interpolate_vector(&grid, interior, &values, &densities, mass, &kernel);

    assert!((interpolated.y + 1.).abs() < 0.2, "interpolated {:?}", interpolated);
    assert!(interpolated.x.abs() < 1e-9 && interpolated.z.abs() < 1e-9);
}

#[test]
fn eos_pressure_vanishes_at_rest_density() {
    let target_density = 1000.;
    let eos_scale = target_density * 100. * 100.;

    assert_eq!(pressure_from_eos(target_density, target_density, eos_scale, 7., 0.), 0.);
    assert!(pressure_from_eos(1.05 * target_density, target_density, eos_scale, 7., 0.) > 0.);
    // under-dense with hard-clamped tensile pressure
    assert_eq!(pressure_from_eos(0.5 * target_density, target_density, eos_scale, 7., 0.), 0.);
    // unscaled tensile pressure stays negative
    assert!(pressure_from_eos(0.5 * target_density, target_density, eos_scale, 7., 1.) < 0.);
}

#[test]
fn interpolation_reproduces_constant_field_in_interior() {
    let spacing = 0.05;
    let (positions, grid, _lists, mass, kernel) = lattice_fixture(spacing);

    let mut densities = vec![0.; positions.len()];
    update_densities(&grid, &positions, mass, &kernel, &mut densities);

    let values = vec![2.0; positions.len()];
    let interior = crate::vec3f(0.175, 0.175, 0.175);
    let interpolated = interpolate_scalar(&grid, interior, &values, &densities, mass, &kernel);

    // Shepard-free SPH interpolation is only approximately partition-of-unity
    assert!((interpolated - 2.0).abs() < 0.3, "interpolated {}", interpolated);
}
