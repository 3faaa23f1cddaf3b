use serde::{Deserialize, Serialize};

use crate::{
    emitter::VolumeParticleEmitter,
    floating_type_mod::FT,
    surface::{Surface, SurfaceOps},
    V3,
};

/**
 * Tuned constants of the hydraulic erosion coupling. The defaults come
 * from the dam-break-over-terrain scenario and are not expected to
 * generalize; every scene may override them.
 */
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ErosionParams {
    /** A particle interacts with the terrain within `radius + contact_margin` of it. */
    pub contact_margin: FT,
    pub capacity_coefficient: FT,
    pub capacity_floor: FT,
    /** Share of the over-capacity sediment dropped per step. */
    pub deposit_fraction: FT,
    /** Share of the spare capacity actually eroded per step. */
    pub erode_fraction: FT,
    /** Geometric decay factor applied to the water content every step. */
    pub water_decay: FT,
    pub initial_water: FT,
    /** Water level below which a particle counts as exhausted and respawns. */
    pub water_exhausted_threshold: FT,
    pub speed_scale: FT,
    /** Erosion brush support in heightfield cells. */
    pub brush_radius: i32,
}

impl Default for ErosionParams {
    fn default() -> ErosionParams {
        ErosionParams {
            contact_margin: 0.01,
            capacity_coefficient: 4.,
            capacity_floor: 0.01,
            deposit_fraction: 0.3,
            erode_fraction: 0.3,
            water_decay: 0.95,
            initial_water: 1.,
            water_exhausted_threshold: 1e-3,
            speed_scale: 1.,
            brush_radius: 2,
        }
    }
}

/**
 * Post-integration terrain coupling. For every particle in contact with
 * the terrain, compares its carried sediment against a capacity derived
 * from descent, speed, water content and local slope, then either drops
 * sediment onto the terrain or picks some up. Sediment is measured in the
 * same unit as terrain height, so each deposit/erode call conserves the
 * sum of carried load and weighted terrain height exactly.
 *
 * `old_positions` holds the positions from before this sub-step's
 * integration; the height difference against the committed positions is
 * the particle's descent.
 */
#[allow(clippy::too_many_arguments)]
pub fn apply_erosion(
    params: &ErosionParams,
    particle_radius: FT,
    old_positions: &[V3],
    positions: &mut [V3],
    velocities: &mut [V3],
    water: &mut [FT],
    sediment: &mut [FT],
    terrain: &mut Surface,
    emitter: &mut VolumeParticleEmitter,
) {
    let count = positions.len();
    if count == 0 {
        return;
    }
    let inv_sqrt_count = 1. / (count as FT).sqrt();

    // the params are the single source of truth for the brush size, not
    // whatever the terrain was constructed with
    terrain.set_brush_radius(params.brush_radius);

    for i in 0..count {
        if terrain.closest_distance(positions[i]) > particle_radius + params.contact_margin {
            continue;
        }

        let delta_height = positions[i].y - old_positions[i].y;
        let speed = velocities[i].norm() * inv_sqrt_count * params.speed_scale;
        let slope = (1. - terrain.closest_normal(positions[i]).y).max(0.);
        let capacity = (-delta_height * speed * water[i] * params.capacity_coefficient)
            .max(params.capacity_floor)
            * slope;

        if sediment[i] > capacity || delta_height > 0. {
            // over capacity (or pushed uphill): drop sediment; the uphill case
            // never deposits more than the height deficit it is climbing
            let amount = if delta_height > 0. {
                delta_height.min(sediment[i])
            } else {
                (sediment[i] - capacity) * params.deposit_fraction
            };
            if amount > 0. {
                sediment[i] -= amount;
                terrain.deposit_at(positions[i], amount);
            }
        } else {
            // under capacity: erode, but never more than the particle's own descent
            let amount = ((capacity - sediment[i]) * params.erode_fraction).min(-delta_height);
            if amount > 0. {
                sediment[i] += terrain.erode_at(positions[i], amount);
            }
        }

        water[i] *= params.water_decay;
        if water[i] < params.water_exhausted_threshold {
            positions[i] = emitter.random_spawn_point();
            velocities[i] = V3::zeros();
            sediment[i] = 0.;
            water[i] = params.initial_water;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bounding_box::BoundingBox,
        emitter::EmitterConfig,
        surface::HeightfieldTerrain,
        vec3f,
    };

    fn terrain_and_emitter() -> (Surface, VolumeParticleEmitter) {
        let mut heights = Vec::new();
        for _k in 0..8 {
            for i in 0..8 {
                heights.push(0.05 * i as FT);
            }
        }
        let terrain = Surface::HeightfieldTerrain(HeightfieldTerrain::from_heights(
            8,
            8,
            0.1,
            V3::zeros(),
            heights,
        ));
        let emitter = VolumeParticleEmitter::new(EmitterConfig {
            region: BoundingBox::new(vec3f(0., 0.5, 0.), vec3f(0.1, 0.6, 0.1)),
            ..EmitterConfig::default()
        });
        (terrain, emitter)
    }

    fn terrain_height_sum(terrain: &Surface) -> FT {
        terrain.mesh_vertices().unwrap().iter().map(|v| v.y).sum()
    }

    #[test]
    fn deposit_conserves_sediment_plus_terrain_height() {
        let (mut terrain, mut emitter) = terrain_and_emitter();
        let params = ErosionParams::default();

        let contact = vec3f(0.35, terrain.closest_point(vec3f(0.35, 0., 0.35)).y, 0.35);
        let old_positions = vec![contact];
        let mut positions = vec![contact];
        let mut velocities = vec![V3::zeros()];
        let mut water = vec![1.];
        let mut sediment = vec![0.5];

        let terrain_before = terrain_height_sum(&terrain);
        apply_erosion(
            &params, 0.01, &old_positions, &mut positions, &mut velocities, &mut water, &mut sediment,
            &mut terrain, &mut emitter,
        );

        let dropped = 0.5 - sediment[0];
        assert!(dropped > 0., "stationary particle over flat capacity must deposit");
        assert!((terrain_height_sum(&terrain) - terrain_before - dropped).abs() < 1e-10);
    }

    #[test]
    fn fast_descending_particle_erodes_the_slope() {
        let (mut terrain, mut emitter) = terrain_and_emitter();
        let params = ErosionParams {
            capacity_coefficient: 50.,
            ..ErosionParams::default()
        };

        let surface_y = terrain.closest_point(vec3f(0.35, 0., 0.35)).y;
        let old_positions = vec![vec3f(0.38, surface_y + 0.05, 0.35)];
        let mut positions = vec![vec3f(0.35, surface_y, 0.35)];
        let mut velocities = vec![vec3f(-2., -2., 0.)];
        let mut water = vec![1.];
        let mut sediment = vec![0.];

        let terrain_before = terrain_height_sum(&terrain);
        apply_erosion(
            &params, 0.01, &old_positions, &mut positions, &mut velocities, &mut water, &mut sediment,
            &mut terrain, &mut emitter,
        );

        assert!(sediment[0] > 0., "descending particle under capacity must pick up sediment");
        assert!((terrain_before - terrain_height_sum(&terrain) - sediment[0]).abs() < 1e-10);
    }

    #[test]
    fn erode_brush_width_follows_the_params_not_the_terrain() {
        let (mut terrain, mut emitter) = terrain_and_emitter();
        // the terrain was built with its default brush; the params ask for a narrower one
        let params = ErosionParams {
            capacity_coefficient: 50.,
            brush_radius: 1,
            ..ErosionParams::default()
        };

        let surface_y = terrain.closest_point(vec3f(0.35, 0., 0.35)).y;
        let old_positions = vec![vec3f(0.38, surface_y + 0.05, 0.35)];
        let mut positions = vec![vec3f(0.35, surface_y, 0.35)];
        let mut velocities = vec![vec3f(-2., -2., 0.)];
        let mut water = vec![1.];
        let mut sediment = vec![0.];

        let vertices_before = terrain.mesh_vertices().unwrap();
        apply_erosion(
            &params, 0.01, &old_positions, &mut positions, &mut velocities, &mut water, &mut sediment,
            &mut terrain, &mut emitter,
        );
        let vertices_after = terrain.mesh_vertices().unwrap();

        assert!(sediment[0] > 0.);
        // the contact centers on vertex (4, 4); a one-cell brush never reaches two columns out
        let center = 4 * 8 + 4;
        let two_out = 4 * 8 + 6;
        assert!(vertices_after[center].y < vertices_before[center].y);
        assert_eq!(vertices_after[two_out].y, vertices_before[two_out].y);
    }

    #[test]
    fn erosion_never_exceeds_own_descent() {
        let (mut terrain, mut emitter) = terrain_and_emitter();
        let params = ErosionParams {
            capacity_coefficient: 1e6,
            erode_fraction: 1.,
            ..ErosionParams::default()
        };

        let surface_y = terrain.closest_point(vec3f(0.35, 0., 0.35)).y;
        let descent = 0.002;
        let old_positions = vec![vec3f(0.35, surface_y + descent, 0.35)];
        let mut positions = vec![vec3f(0.35, surface_y, 0.35)];
        let mut velocities = vec![vec3f(-5., -5., 0.)];
        let mut water = vec![1.];
        let mut sediment = vec![0.];

        apply_erosion(
            &params, 0.01, &old_positions, &mut positions, &mut velocities, &mut water, &mut sediment,
            &mut terrain, &mut emitter,
        );

        assert!(sediment[0] <= descent + 1e-12, "picked up {} for a descent of {}", sediment[0], descent);
    }

    #[test]
    fn exhausted_particle_respawns_fresh() {
        let (mut terrain, mut emitter) = terrain_and_emitter();
        let params = ErosionParams::default();
        let spawn_region = BoundingBox::new(vec3f(0., 0.5, 0.), vec3f(0.1, 0.6, 0.1));

        let contact = vec3f(0.35, terrain.closest_point(vec3f(0.35, 0., 0.35)).y, 0.35);
        let old_positions = vec![contact];
        let mut positions = vec![contact];
        let mut velocities = vec![vec3f(1., 0., 0.)];
        let mut water = vec![params.water_exhausted_threshold]; // decays below the threshold this step
        let mut sediment = vec![0.2];

        apply_erosion(
            &params, 0.01, &old_positions, &mut positions, &mut velocities, &mut water, &mut sediment,
            &mut terrain, &mut emitter,
        );

        assert!(spawn_region.contains(positions[0]));
        assert_eq!(velocities[0], V3::zeros());
        assert_eq!(sediment[0], 0.);
        assert_eq!(water[0], params.initial_water);
    }

    #[test]
    fn water_decays_geometrically_on_contact() {
        let (mut terrain, mut emitter) = terrain_and_emitter();
        let params = ErosionParams::default();

        let contact = vec3f(0.35, terrain.closest_point(vec3f(0.35, 0., 0.35)).y, 0.35);
        let old_positions = vec![contact];
        let mut positions = vec![contact];
        let mut velocities = vec![V3::zeros()];
        let mut water = vec![1.];
        let mut sediment = vec![0.];

        apply_erosion(
            &params, 0.01, &old_positions, &mut positions, &mut velocities, &mut water, &mut sediment,
            &mut terrain, &mut emitter,
        );
        assert_eq!(water[0], 0.95);

        // far away from the terrain nothing happens
        positions[0].y += 10.;
        let old_positions = vec![positions[0]];
        apply_erosion(
            &params, 0.01, &old_positions, &mut positions, &mut velocities, &mut water, &mut sediment,
            &mut terrain, &mut emitter,
        );
        assert_eq!(water[0], 0.95);
    }
}
