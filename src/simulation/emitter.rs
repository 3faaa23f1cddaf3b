use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{
    bounding_box::BoundingBox,
    floating_type_mod::{FT, TAU},
    lattice::BccLatticePointGenerator,
    neighborhood_search::{PointHashGrid, DEFAULT_HASH_GRID_RESOLUTION},
    particle_system::ParticleSystem,
    vec3f, V3,
};

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct EmitterConfig {
    /** Volume to fill with particles. */
    pub region: BoundingBox,
    pub spacing: FT,
    pub initial_velocity: V3,
    pub linear_velocity: V3,
    pub angular_velocity: V3,
    pub max_number_of_particles: usize,
    /** Jitter amplitude relative to half the spacing, clamped to [0, 1]. */
    pub jitter: FT,
    pub is_one_shot: bool,
    pub allow_overlapping: bool,
    pub seed: u64,
}

impl Default for EmitterConfig {
    fn default() -> EmitterConfig {
        EmitterConfig {
            region: BoundingBox::new(V3::zeros(), vec3f(1., 1., 1.)),
            spacing: 0.1,
            initial_velocity: V3::zeros(),
            linear_velocity: V3::zeros(),
            angular_velocity: V3::zeros(),
            max_number_of_particles: usize::MAX,
            jitter: 0.,
            is_one_shot: true,
            allow_overlapping: false,
            seed: 0,
        }
    }
}

/**
 * Fills a box region with BCC lattice points (optionally jittered) and
 * appends them as particles. One-shot emitters disable themselves after
 * the first emission; continuous emitters keep topping the region up,
 * skipping lattice points that already have a particle within one
 * spacing. The particle budget stops emission silently once reached.
 */
pub struct VolumeParticleEmitter {
    config: EmitterConfig,
    rng: StdRng,
    number_of_emitted_particles: usize,
    is_enabled: bool,
}

impl VolumeParticleEmitter {
    pub fn new(mut config: EmitterConfig) -> VolumeParticleEmitter {
        config.jitter = config.jitter.clamp(0., 1.);
        VolumeParticleEmitter {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            number_of_emitted_particles: 0,
            is_enabled: true,
        }
    }

    pub fn number_of_emitted_particles(&self) -> usize {
        self.number_of_emitted_particles
    }

    pub fn is_enabled(&self) -> bool {
        self.is_enabled
    }

    /** Emitter velocity field: initial velocity plus the rigid motion of the emitting volume. */
    pub fn velocity_at(&self, point: V3) -> V3 {
        let center = (self.config.region.lower_corner + self.config.region.upper_corner) * 0.5;
        self.config.initial_velocity
            + self.config.linear_velocity
            + self.config.angular_velocity.cross(&(point - center))
    }

    /** Uniformly random point in the emitter region, used to respawn exhausted erosion particles. */
    pub fn random_spawn_point(&mut self) -> V3 {
        let lower = self.config.region.lower_corner;
        let upper = self.config.region.upper_corner;
        vec3f(
            lower.x + self.rng.gen::<FT>() * (upper.x - lower.x),
            lower.y + self.rng.gen::<FT>() * (upper.y - lower.y),
            lower.z + self.rng.gen::<FT>() * (upper.z - lower.z),
        )
    }

    /** Emit into the ensemble; returns the number of particles added this call. */
    pub fn update(&mut self, particles: &mut ParticleSystem) -> usize {
        if !self.is_enabled {
            return 0;
        }

        let new_positions = self.generate_positions(particles);
        let new_velocities: Vec<V3> = new_positions.iter().map(|p| self.velocity_at(*p)).collect();
        let num_new = new_positions.len();

        particles
            .add_particles(&new_positions, &new_velocities, &[])
            .expect("emitted position/velocity arrays are built in lock-step");

        if self.config.is_one_shot {
            self.is_enabled = false;
        }
        num_new
    }

    fn generate_positions(&mut self, particles: &ParticleSystem) -> Vec<V3> {
        let max_jitter_dist = 0.5 * self.config.jitter * self.config.spacing;
        let mut new_positions = Vec::new();

        // continuous emission rejects candidates that already have a particle nearby;
        // the incremental grid also tracks candidates accepted in this very call
        let mut overlap_grid = if !self.config.allow_overlapping && !self.config.is_one_shot {
            let mut grid = PointHashGrid::new([DEFAULT_HASH_GRID_RESOLUTION; 3], 2. * self.config.spacing);
            grid.build(&particles.positions);
            Some(grid)
        } else {
            None
        };

        let region = self.config.region;
        let spacing = self.config.spacing;
        let mut emitted = self.number_of_emitted_particles;
        let max = self.config.max_number_of_particles;
        let rng = &mut self.rng;

        BccLatticePointGenerator::for_each_point(&region, spacing, |point| {
            if emitted >= max {
                return false;
            }
            let candidate = point + uniform_sample_sphere(rng.gen(), rng.gen()) * max_jitter_dist;
            if let Some(grid) = &mut overlap_grid {
                if grid.has_nearby_point(candidate, spacing) {
                    return true;
                }
                grid.add(candidate);
            }
            new_positions.push(candidate);
            emitted += 1;
            true
        });

        self.number_of_emitted_particles = emitted;
        new_positions
    }
}

fn uniform_sample_sphere(u1: FT, u2: FT) -> V3 {
    let y = 1. - 2. * u1;
    let r = (1. - y * y).max(0.).sqrt();
    let phi = TAU * u2;
    vec3f(r * phi.cos(), y, r * phi.sin())
}

#[test]
fn one_shot_emitter_fires_exactly_once() {
    let mut emitter = VolumeParticleEmitter::new(EmitterConfig {
        region: BoundingBox::new(V3::zeros(), vec3f(0.5, 0.5, 0.5)),
        spacing: 0.1,
        ..EmitterConfig::default()
    });

    let mut particles = ParticleSystem::new();
    let first = emitter.update(&mut particles);
    assert!(first > 0);
    assert!(!emitter.is_enabled());

    let second = emitter.update(&mut particles);
    assert_eq!(second, 0);
    assert_eq!(particles.len(), first);
}

#[test]
fn particle_budget_stops_emission_silently() {
    let mut emitter = VolumeParticleEmitter::new(EmitterConfig {
        region: BoundingBox::new(V3::zeros(), vec3f(1., 1., 1.)),
        spacing: 0.1,
        max_number_of_particles: 25,
        ..EmitterConfig::default()
    });

    let mut particles = ParticleSystem::new();
    emitter.update(&mut particles);
    assert_eq!(particles.len(), 25);
    assert_eq!(emitter.number_of_emitted_particles(), 25);
}

#[test]
fn continuous_emitter_does_not_stack_particles() {
    let config = EmitterConfig {
        region: BoundingBox::new(V3::zeros(), vec3f(0.4, 0.4, 0.4)),
        spacing: 0.1,
        is_one_shot: false,
        ..EmitterConfig::default()
    };
    let mut emitter = VolumeParticleEmitter::new(config);

    let mut particles = ParticleSystem::new();
    let first = emitter.update(&mut particles);
    assert!(first > 0);

    // the region is already full, so a second continuous update adds nothing
    let second = emitter.update(&mut particles);
    assert_eq!(second, 0);
}

#[test]
fn emitted_particles_lie_in_region_and_carry_initial_velocity() {
    let region = BoundingBox::new(vec3f(0.1, 0.2, 0.3), vec3f(0.4, 0.5, 0.6));
    let mut emitter = VolumeParticleEmitter::new(EmitterConfig {
        region,
        spacing: 0.05,
        initial_velocity: vec3f(0., -1., 0.),
        ..EmitterConfig::default()
    });

    let mut particles = ParticleSystem::new();
    emitter.update(&mut particles);
    assert!(!particles.is_empty());
    for (p, v) in particles.positions.iter().zip(&particles.velocities) {
        assert!(region.contains(*p));
        assert_eq!(*v, vec3f(0., -1., 0.));
    }
}

#[test]
fn spawn_points_stay_inside_the_region() {
    let region = BoundingBox::new(vec3f(-1., 0., -1.), vec3f(1., 2., 1.));
    let mut emitter = VolumeParticleEmitter::new(EmitterConfig {
        region,
        ..EmitterConfig::default()
    });
    for _ in 0..100 {
        assert!(region.contains(emitter.random_spawn_point()));
    }
}
