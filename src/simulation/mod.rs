pub mod bounding_box;
pub mod collider;
pub mod concurrency;
pub mod emitter;
pub mod erosion;
pub mod field_operators;
pub mod lattice;
pub mod neighborhood_search;
pub mod particle_system;
pub mod scene;
pub mod simulation_parameters;
pub mod solver;
pub mod sph_kernels;
pub mod surface;
pub mod transform;

#[cfg(not(feature = "single-precision"))]
pub mod floating_type_mod {
    pub type FT = f64;
    pub use std::f64::consts::{FRAC_1_PI, PI, TAU};
}

#[cfg(feature = "single-precision")]
pub mod floating_type_mod {
    pub type FT = f32;
    pub use std::f32::consts::{FRAC_1_PI, PI, TAU};
}

use floating_type_mod::FT;

use nalgebra::SVector;

pub type V3 = SVector<FT, 3>;
pub type V3I = SVector<i32, 3>;

pub fn vec3f(x: FT, y: FT, z: FT) -> V3 {
    [x, y, z].into()
}

pub fn vec3i(x: i32, y: i32, z: i32) -> V3I {
    [x, y, z].into()
}

#[cfg(test)]
pub fn assert_ft_approx_eq(a: FT, b: FT, eps: FT, msg: impl Fn() -> String) {
    assert!((a - b).abs() <= eps, "{} (left: {}, right: {})", msg(), a, b);
}

pub use bounding_box::BoundingBox;
pub use collider::RigidBodyCollider;
pub use emitter::{EmitterConfig, VolumeParticleEmitter};
pub use erosion::ErosionParams;
pub use particle_system::ParticleSystem;
pub use scene::{build_solver, SceneConfig, SceneKind};
pub use simulation_parameters::{SimulationParams, TimeStepping};
pub use solver::PciSphSolver;
pub use surface::{Surface, SurfaceOps};
pub use transform::Transform;
