use serde::{Deserialize, Serialize};

use crate::{
    bounding_box::BoundingBox,
    collider::RigidBodyCollider,
    emitter::{EmitterConfig, VolumeParticleEmitter},
    erosion::ErosionParams,
    floating_type_mod::FT,
    simulation_parameters::{SimulationParams, TimeStepping},
    solver::PciSphSolver,
    surface::{BoxSurface, HeightfieldTerrain, Surface},
    vec3f, V3,
};

#[derive(PartialEq, Eq, Debug, Clone, Copy, Serialize, Deserialize)]
pub enum SceneKind {
    /** Water column collapsing inside a rigid tank. */
    DamBreak,
    /** Water emitted over an erodible sloped heightfield. */
    TerrainErosion,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SceneConfig {
    pub kind: SceneKind,
    pub target_spacing: FT,
    pub max_number_of_particles: usize,
}

impl Default for SceneConfig {
    fn default() -> SceneConfig {
        SceneConfig {
            kind: SceneKind::DamBreak,
            target_spacing: 0.02,
            max_number_of_particles: 400,
        }
    }
}

/** Configured solver for the selected scene. `params` overrides are applied on top of the scene's defaults. */
pub fn build_solver(scene: SceneConfig, params: Option<SimulationParams>, erosion: ErosionParams) -> PciSphSolver {
    match scene.kind {
        SceneKind::DamBreak => dam_break_solver(scene, params, erosion),
        SceneKind::TerrainErosion => terrain_erosion_solver(scene, params, erosion),
    }
}

fn dam_break_solver(scene: SceneConfig, params: Option<SimulationParams>, erosion: ErosionParams) -> PciSphSolver {
    let domain = BoundingBox::new(V3::zeros(), vec3f(0.25, 0.5, 0.3));
    let spacing = scene.target_spacing;

    let params = params.unwrap_or(SimulationParams {
        target_spacing: spacing,
        pseudo_viscosity_coefficient: 0.,
        time_step_limit_scale: 10.,
        time_stepping: TimeStepping::Adaptive,
        ..SimulationParams::default()
    });
    let mut solver = PciSphSolver::new(params, erosion);

    // the water column sits in a corner of the tank, kept one spacing off the walls
    let mut source_bound = domain;
    source_bound.expand(-spacing);
    let water_column = BoundingBox::new(
        V3::zeros(),
        vec3f(0.15 + 0.001, 0.25 + 0.001, 0.5 * domain.depth() + 0.001),
    );
    solver.set_emitter(VolumeParticleEmitter::new(EmitterConfig {
        region: water_column.intersection(&source_bound),
        spacing,
        max_number_of_particles: scene.max_number_of_particles,
        ..EmitterConfig::default()
    }));

    // the tank: a box with its normals flipped inward
    solver.set_collider(RigidBodyCollider::new(
        Surface::BoxSurface(BoxSurface::new(domain.lower_corner, domain.upper_corner)).flipped(),
    ));

    solver
}

fn terrain_erosion_solver(scene: SceneConfig, params: Option<SimulationParams>, erosion: ErosionParams) -> PciSphSolver {
    let spacing = scene.target_spacing;
    let params = params.unwrap_or(SimulationParams {
        target_spacing: spacing,
        pseudo_viscosity_coefficient: 0.,
        time_step_limit_scale: 10.,
        time_stepping: TimeStepping::Adaptive,
        ..SimulationParams::default()
    });
    let mut solver = PciSphSolver::new(params, erosion);

    // a hillside falling off along +x, 32x32 vertices over roughly 0.6m x 0.6m
    let resolution = 32;
    let cell_size = 0.02;
    let mut heights = Vec::with_capacity(resolution * resolution);
    for _k in 0..resolution {
        for i in 0..resolution {
            heights.push(0.15 * (1. - i as FT / (resolution - 1) as FT));
        }
    }
    let terrain = HeightfieldTerrain::from_heights(resolution, resolution, cell_size, V3::zeros(), heights);
    solver.set_collider(RigidBodyCollider::new(Surface::HeightfieldTerrain(terrain)));

    // rain box above the upper end of the slope
    solver.set_emitter(VolumeParticleEmitter::new(EmitterConfig {
        region: BoundingBox::new(vec3f(0.05, 0.25, 0.2), vec3f(0.2, 0.35, 0.4)),
        spacing,
        max_number_of_particles: scene.max_number_of_particles,
        ..EmitterConfig::default()
    }));

    solver
}

#[test]
fn dam_break_scene_emits_up_to_the_particle_budget() {
    let mut solver = build_solver(SceneConfig::default(), None, ErosionParams::default());
    solver.advance_frame(1. / 60.);

    assert!(solver.particles().len() <= 400);
    assert!(!solver.particles().is_empty());

    let domain = BoundingBox::new(V3::zeros(), vec3f(0.25, 0.5, 0.3));
    for p in solver.particles().positions.iter() {
        assert!(domain.contains(*p), "particle {:?} escaped the tank", p);
    }
}

#[test]
fn terrain_scene_builds_an_erodible_collider() {
    use crate::surface::SurfaceOps;

    let scene = SceneConfig {
        kind: SceneKind::TerrainErosion,
        ..SceneConfig::default()
    };
    let solver = build_solver(scene, None, ErosionParams::default());
    let collider = solver.collider().unwrap();

    assert!(collider.surface.is_erodible());
    assert!(collider.surface.mesh_vertices().is_some());
    // the slope must descend along +x
    let cp_high = collider.surface.closest_point(vec3f(0.02, 1., 0.3));
    let cp_low = collider.surface.closest_point(vec3f(0.6, 1., 0.3));
    assert!(cp_high.y > cp_low.y);
}

#[test]
fn scene_config_roundtrips_through_yaml() {
    let scene = SceneConfig {
        kind: SceneKind::TerrainErosion,
        target_spacing: 0.01,
        max_number_of_particles: 1000,
    };
    let text = serde_yaml::to_string(&scene).unwrap();
    let back: SceneConfig = serde_yaml::from_str(&text).unwrap();
    assert_eq!(back.kind, SceneKind::TerrainErosion);
    assert_eq!(back.max_number_of_particles, 1000);
}
