use std::fmt;

use crate::{
    bounding_box::BoundingBox,
    floating_type_mod::FT,
    lattice::BccLatticePointGenerator,
    neighborhood_search::{NeighborhoodCache, PointSortedHashGrid, DEFAULT_HASH_GRID_RESOLUTION},
    sph_kernels::Poly6Kernel,
    vec3f, V3,
};

/** Opaque handle to a registered per-particle scalar channel. */
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScalarChannelId(usize);

/** Opaque handle to a registered per-particle vector channel. */
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VectorChannelId(usize);

/** Appending particles with auxiliary arrays of the wrong length is rejected as a whole. */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MismatchedArrayLengths;

impl fmt::Display for MismatchedArrayLengths {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "velocity/force arrays do not match the number of appended positions")
    }
}

impl std::error::Error for MismatchedArrayLengths {}

pub struct ScalarChannel {
    pub values: Vec<FT>,
    initial_value: FT,
}

pub struct VectorChannel {
    pub values: Vec<V3>,
    initial_value: V3,
}

/**
 * Struct-of-arrays particle ensemble. `positions`, `velocities`, `forces`
 * and every registered channel are index-aligned: particle `i` lives at
 * index `i` in all of them. All growth goes through [`add_particles`],
 * which extends the arrays in lock-step.
 *
 * The ensemble also owns the derived neighbor structures (hash grid and
 * per-particle neighbor lists). Both are caches over the current
 * positions and go stale on any position mutation; the solver rebuilds
 * them at the start of every sub-step.
 *
 * [`add_particles`]: ParticleSystem::add_particles
 */
pub struct ParticleSystem {
    num_particles: usize,
    pub positions: Vec<V3>,
    pub velocities: Vec<V3>,
    pub forces: Vec<V3>,
    // pub so that solver phases can split-borrow single channels next to the
    // neighbor structures; growth still has to go through add_particles
    pub scalar_channels: Vec<ScalarChannel>,
    pub vector_channels: Vec<VectorChannel>,

    mass: FT,
    radius: FT,
    target_density: FT,

    pub grid: PointSortedHashGrid,
    pub neighbor_lists: NeighborhoodCache,
}

impl ParticleSystem {
    pub fn new() -> ParticleSystem {
        let radius = 1e-3;
        ParticleSystem {
            num_particles: 0,
            positions: Vec::new(),
            velocities: Vec::new(),
            forces: Vec::new(),
            scalar_channels: Vec::new(),
            vector_channels: Vec::new(),
            mass: 1e-3,
            radius,
            target_density: 1000.,
            grid: PointSortedHashGrid::new([DEFAULT_HASH_GRID_RESOLUTION; 3], 2. * radius),
            neighbor_lists: NeighborhoodCache::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.num_particles
    }

    pub fn is_empty(&self) -> bool {
        self.num_particles == 0
    }

    pub fn mass(&self) -> FT {
        self.mass
    }

    pub fn set_mass(&mut self, mass: FT) {
        self.mass = mass.max(0.);
    }

    pub fn radius(&self) -> FT {
        self.radius
    }

    pub fn set_radius(&mut self, radius: FT) {
        self.radius = radius.max(0.);
    }

    pub fn target_density(&self) -> FT {
        self.target_density
    }

    pub fn set_target_density(&mut self, target_density: FT) {
        self.target_density = target_density.max(0.);
    }

    pub fn add_scalar_channel(&mut self, initial_value: FT) -> ScalarChannelId {
        let id = ScalarChannelId(self.scalar_channels.len());
        self.scalar_channels.push(ScalarChannel {
            values: vec![initial_value; self.num_particles],
            initial_value,
        });
        id
    }

    pub fn add_vector_channel(&mut self, initial_value: V3) -> VectorChannelId {
        let id = VectorChannelId(self.vector_channels.len());
        self.vector_channels.push(VectorChannel {
            values: vec![initial_value; self.num_particles],
            initial_value,
        });
        id
    }

    pub fn scalars(&self, id: ScalarChannelId) -> &[FT] {
        &self.scalar_channels[id.0].values
    }

    pub fn scalars_mut(&mut self, id: ScalarChannelId) -> &mut [FT] {
        &mut self.scalar_channels[id.0].values
    }

    pub fn vectors(&self, id: VectorChannelId) -> &[V3] {
        &self.vector_channels[id.0].values
    }

    pub fn vectors_mut(&mut self, id: VectorChannelId) -> &mut [V3] {
        &mut self.vector_channels[id.0].values
    }

    /**
     * Append particles at the tail. `new_velocities` and `new_forces` may
     * be empty (zero-filled) but must otherwise match `new_positions` in
     * length; a mismatch rejects the whole append so no array ever grows
     * out of lock-step. Registered channels are extended with their
     * initial value.
     */
    pub fn add_particles(
        &mut self,
        new_positions: &[V3],
        new_velocities: &[V3],
        new_forces: &[V3],
    ) -> Result<(), MismatchedArrayLengths> {
        if !new_velocities.is_empty() && new_velocities.len() != new_positions.len() {
            return Err(MismatchedArrayLengths);
        }
        if !new_forces.is_empty() && new_forces.len() != new_positions.len() {
            return Err(MismatchedArrayLengths);
        }

        let num_added = new_positions.len();
        self.positions.extend_from_slice(new_positions);

        if new_velocities.is_empty() {
            self.velocities.resize(self.num_particles + num_added, V3::zeros());
        } else {
            self.velocities.extend_from_slice(new_velocities);
        }

        if new_forces.is_empty() {
            self.forces.resize(self.num_particles + num_added, V3::zeros());
        } else {
            self.forces.extend_from_slice(new_forces);
        }

        for channel in &mut self.scalar_channels {
            channel.values.resize(self.num_particles + num_added, channel.initial_value);
        }
        for channel in &mut self.vector_channels {
            channel.values.resize(self.num_particles + num_added, channel.initial_value);
        }

        self.num_particles += num_added;
        Ok(())
    }

    /** Rebuild the hash grid over the current positions. Spacing is twice the search radius. */
    pub fn build_neighbor_searcher(&mut self, search_radius: FT) {
        self.grid = PointSortedHashGrid::new([DEFAULT_HASH_GRID_RESOLUTION; 3], 2. * search_radius);
        self.grid.build(&self.positions);
    }

    /** Rebuild the neighbor lists from the grid. Call right after [`build_neighbor_searcher`]. */
    pub fn build_neighbor_lists(&mut self, search_radius: FT) {
        self.neighbor_lists.build(&self.grid, &self.positions, search_radius);
    }

    pub fn neighbor_searcher(&self) -> &PointSortedHashGrid {
        &self.grid
    }

    pub fn neighbor_lists(&self) -> &NeighborhoodCache {
        &self.neighbor_lists
    }
}

pub fn scalar_channel(channels: &[ScalarChannel], id: ScalarChannelId) -> &[FT] {
    &channels[id.0].values
}

pub fn scalar_channel_mut(channels: &mut [ScalarChannel], id: ScalarChannelId) -> &mut [FT] {
    &mut channels[id.0].values
}

/** Disjoint mutable views of two scalar channels of the same ensemble. */
pub fn two_scalar_channels_mut(
    channels: &mut [ScalarChannel],
    a: ScalarChannelId,
    b: ScalarChannelId,
) -> (&mut [FT], &mut [FT]) {
    assert_ne!(a.0, b.0);
    if a.0 < b.0 {
        let (head, tail) = channels.split_at_mut(b.0);
        (&mut head[a.0].values, &mut tail[0].values)
    } else {
        let (head, tail) = channels.split_at_mut(a.0);
        (&mut tail[0].values, &mut head[b.0].values)
    }
}

impl Default for ParticleSystem {
    fn default() -> ParticleSystem {
        ParticleSystem::new()
    }
}

/**
 * Derive the uniform particle mass from the target spacing: sample a BCC
 * lattice around the origin, take the highest poly6 number density any
 * lattice point sees, and choose the mass that makes that density equal
 * the target density.
 */
pub fn mass_from_target_spacing(target_spacing: FT, kernel_radius: FT, target_density: FT) -> FT {
    let bbox = BoundingBox::new(
        vec3f(-1.5 * kernel_radius, -1.5 * kernel_radius, -1.5 * kernel_radius),
        vec3f(1.5 * kernel_radius, 1.5 * kernel_radius, 1.5 * kernel_radius),
    );
    let points = BccLatticePointGenerator::generate(&bbox, target_spacing);

    let kernel = Poly6Kernel::new(kernel_radius);
    let mut max_number_density: FT = 0.;
    for point in &points {
        let sum: FT = points.iter().map(|other| kernel.value((other - point).norm())).sum();
        max_number_density = max_number_density.max(sum);
    }

    if max_number_density > 0. {
        target_density / max_number_density
    } else {
        0.
    }
}

#[test]
fn arrays_stay_index_aligned() {
    let mut particles = ParticleSystem::new();
    let density = particles.add_scalar_channel(0.);
    let tint = particles.add_vector_channel(V3::zeros());

    particles
        .add_particles(&[vec3f(0., 0., 0.), vec3f(1., 0., 0.)], &[], &[])
        .unwrap();
    particles
        .add_particles(&[vec3f(2., 0., 0.)], &[vec3f(0., 1., 0.)], &[vec3f(0., 0., 1.)])
        .unwrap();

    assert_eq!(particles.len(), 3);
    assert_eq!(particles.positions.len(), 3);
    assert_eq!(particles.velocities.len(), 3);
    assert_eq!(particles.forces.len(), 3);
    assert_eq!(particles.scalars(density).len(), 3);
    assert_eq!(particles.vectors(tint).len(), 3);
    assert_eq!(particles.velocities[2], vec3f(0., 1., 0.));
}

#[test]
fn mismatched_append_is_rejected_wholesale() {
    let mut particles = ParticleSystem::new();
    let density = particles.add_scalar_channel(0.);

    let result = particles.add_particles(
        &[vec3f(0., 0., 0.), vec3f(1., 0., 0.)],
        &[vec3f(0., 0., 0.)], // one velocity for two positions
        &[],
    );

    assert_eq!(result, Err(MismatchedArrayLengths));
    assert_eq!(particles.len(), 0);
    assert_eq!(particles.positions.len(), 0);
    assert_eq!(particles.scalars(density).len(), 0);
}

#[test]
fn channels_registered_late_are_backfilled() {
    let mut particles = ParticleSystem::new();
    particles.add_particles(&[vec3f(0., 0., 0.)], &[], &[]).unwrap();

    let water = particles.add_scalar_channel(1.);
    assert_eq!(particles.scalars(water), &[1.]);

    particles.add_particles(&[vec3f(1., 0., 0.)], &[], &[]).unwrap();
    assert_eq!(particles.scalars(water), &[1., 1.]);
}

#[test]
fn derived_mass_reaches_target_density_on_lattice() {
    let target_spacing = 0.02;
    let kernel_radius = 1.8 * target_spacing;
    let target_density = 1000.;

    let mass = mass_from_target_spacing(target_spacing, kernel_radius, target_density);
    assert!(mass > 0.);

    // the densest lattice point must now measure the target density
    let bbox = BoundingBox::new(
        vec3f(-1.5 * kernel_radius, -1.5 * kernel_radius, -1.5 * kernel_radius),
        vec3f(1.5 * kernel_radius, 1.5 * kernel_radius, 1.5 * kernel_radius),
    );
    let points = BccLatticePointGenerator::generate(&bbox, target_spacing);
    let kernel = Poly6Kernel::new(kernel_radius);
    let max_density = points
        .iter()
        .map(|p| {
            mass * points
                .iter()
                .map(|q| kernel.value((q - p).norm()))
                .sum::<FT>()
        })
        .fold(0., FT::max);
    assert!((max_density - target_density).abs() < 1e-6 * target_density);
}
