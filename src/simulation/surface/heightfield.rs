use crate::{bounding_box::BoundingBox, floating_type_mod::FT, surface::SurfaceOps, vec3f, V3};

/**
 * Erodible terrain backed by a regular height grid in the x/z plane.
 * Vertex (i, k) sits at world position
 * `(origin.x + i*cell_size, height, origin.z + k*cell_size)`. Between
 * vertices the surface is the two triangles of each cell, split along the
 * (i, k) to (i+1, k+1) diagonal.
 */
pub struct HeightfieldTerrain {
    resolution_x: usize,
    resolution_z: usize,
    cell_size: FT,
    origin: V3,
    heights: Vec<FT>,
    // erosion brush support, in cells
    brush_radius: i32,
}

impl HeightfieldTerrain {
    pub fn flat(
        resolution_x: usize,
        resolution_z: usize,
        cell_size: FT,
        origin: V3,
        initial_height: FT,
    ) -> HeightfieldTerrain {
        assert!(resolution_x >= 2 && resolution_z >= 2);
        HeightfieldTerrain {
            resolution_x,
            resolution_z,
            cell_size,
            origin,
            heights: vec![initial_height; resolution_x * resolution_z],
            brush_radius: 2,
        }
    }

    pub fn from_heights(
        resolution_x: usize,
        resolution_z: usize,
        cell_size: FT,
        origin: V3,
        heights: Vec<FT>,
    ) -> HeightfieldTerrain {
        assert!(resolution_x >= 2 && resolution_z >= 2);
        assert_eq!(heights.len(), resolution_x * resolution_z);
        HeightfieldTerrain {
            resolution_x,
            resolution_z,
            cell_size,
            origin,
            heights,
            brush_radius: 2,
        }
    }

    pub fn height(&self, i: usize, k: usize) -> FT {
        self.heights[k * self.resolution_x + i]
    }

    fn height_mut(&mut self, i: usize, k: usize) -> &mut FT {
        &mut self.heights[k * self.resolution_x + i]
    }

    pub fn vertex_position(&self, i: usize, k: usize) -> V3 {
        vec3f(
            self.origin.x + i as FT * self.cell_size,
            self.origin.y + self.height(i, k),
            self.origin.z + k as FT * self.cell_size,
        )
    }

    /** Containing cell index and in-cell fractions for a world-space x/z position, clamped to the grid. */
    fn cell_at(&self, other_point: V3) -> (usize, usize, FT, FT) {
        let gx = ((other_point.x - self.origin.x) / self.cell_size)
            .max(0.)
            .min((self.resolution_x - 1) as FT);
        let gz = ((other_point.z - self.origin.z) / self.cell_size)
            .max(0.)
            .min((self.resolution_z - 1) as FT);
        let i = (gx as usize).min(self.resolution_x - 2);
        let k = (gz as usize).min(self.resolution_z - 2);
        (i, k, gx - i as FT, gz - k as FT)
    }

    fn triangle_at(&self, other_point: V3) -> [V3; 3] {
        let (i, k, fx, fz) = self.cell_at(other_point);
        if fx >= fz {
            [
                self.vertex_position(i, k),
                self.vertex_position(i + 1, k),
                self.vertex_position(i + 1, k + 1),
            ]
        } else {
            [
                self.vertex_position(i, k),
                self.vertex_position(i + 1, k + 1),
                self.vertex_position(i, k + 1),
            ]
        }
    }

    /** Barycentric interpolation of the surface height below/above a world position. */
    pub fn height_at(&self, other_point: V3) -> FT {
        let [v1, v2, v3] = self.triangle_at(other_point);
        let denom = (v2.z - v3.z) * (v1.x - v3.x) + (v3.x - v2.x) * (v1.z - v3.z);
        if denom == 0. {
            return v1.y;
        }
        let lambda1 = ((v2.z - v3.z) * (other_point.x - v3.x) + (v3.x - v2.x) * (other_point.z - v3.z)) / denom;
        let lambda2 = ((v3.z - v1.z) * (other_point.x - v3.x) + (v1.x - v3.x) * (other_point.z - v3.z)) / denom;
        let lambda3 = 1. - lambda1 - lambda2;
        lambda1 * v1.y + lambda2 * v2.y + lambda3 * v3.y
    }
}

impl SurfaceOps for HeightfieldTerrain {
    fn closest_point(&self, other_point: V3) -> V3 {
        // vertical projection onto the triangulated surface, clamped to the grid
        let clamped = vec3f(
            other_point
                .x
                .max(self.origin.x)
                .min(self.origin.x + (self.resolution_x - 1) as FT * self.cell_size),
            other_point.y,
            other_point
                .z
                .max(self.origin.z)
                .min(self.origin.z + (self.resolution_z - 1) as FT * self.cell_size),
        );
        vec3f(clamped.x, self.height_at(clamped), clamped.z)
    }

    fn closest_normal(&self, other_point: V3) -> V3 {
        let [v1, v2, v3] = self.triangle_at(other_point);
        let normal = (v2 - v1).cross(&(v3 - v1));
        let norm = normal.norm();
        if norm == 0. {
            return vec3f(0., 1., 0.);
        }
        let normal = normal / norm;
        if normal.y < 0. {
            -normal
        } else {
            normal
        }
    }

    fn is_inside(&self, other_point: V3) -> bool {
        other_point.y < self.closest_point(other_point).y
    }

    fn bounding_box(&self) -> BoundingBox {
        let min_height = self.heights.iter().copied().fold(FT::MAX, FT::min);
        let max_height = self.heights.iter().copied().fold(FT::MIN, FT::max);
        BoundingBox::new(
            vec3f(self.origin.x, self.origin.y + min_height, self.origin.z),
            vec3f(
                self.origin.x + (self.resolution_x - 1) as FT * self.cell_size,
                self.origin.y + max_height,
                self.origin.z + (self.resolution_z - 1) as FT * self.cell_size,
            ),
        )
    }

    fn is_erodible(&self) -> bool {
        true
    }

    fn set_brush_radius(&mut self, brush_radius: i32) {
        self.brush_radius = brush_radius.max(1);
    }

    /** Bilinear distribution of `amount` to the four vertices around `other_point`. Conserves the amount exactly. */
    fn deposit_at(&mut self, other_point: V3, amount: FT) {
        let (i, k, fx, fz) = self.cell_at(other_point);
        *self.height_mut(i, k) += amount * (1. - fx) * (1. - fz);
        *self.height_mut(i + 1, k) += amount * fx * (1. - fz);
        *self.height_mut(i, k + 1) += amount * (1. - fx) * fz;
        *self.height_mut(i + 1, k + 1) += amount * fx * fz;
    }

    /**
     * Removes `amount` of height spread over all vertices within the brush
     * radius, weighted by linear falloff. Returns how much was removed in
     * total (less than `amount` only when the brush covers no vertices).
     */
    fn erode_at(&mut self, other_point: V3, amount: FT) -> FT {
        let (i, k, fx, fz) = self.cell_at(other_point);
        let center_i = i as i32 + if fx >= 0.5 { 1 } else { 0 };
        let center_k = k as i32 + if fz >= 0.5 { 1 } else { 0 };

        let mut brush = Vec::new();
        let mut total_weight = 0.;
        for dk in -self.brush_radius..=self.brush_radius {
            for di in -self.brush_radius..=self.brush_radius {
                let vi = center_i + di;
                let vk = center_k + dk;
                if vi < 0 || vi >= self.resolution_x as i32 || vk < 0 || vk >= self.resolution_z as i32 {
                    continue;
                }
                let distance = ((di * di + dk * dk) as FT).sqrt();
                let weight = 1. - distance / (self.brush_radius as FT + 1.);
                if weight > 0. {
                    brush.push((vi as usize, vk as usize, weight));
                    total_weight += weight;
                }
            }
        }

        if total_weight <= 0. {
            return 0.;
        }
        for (vi, vk, weight) in brush {
            *self.height_mut(vi, vk) -= amount * weight / total_weight;
        }
        amount
    }

    fn mesh_vertices(&self) -> Option<Vec<V3>> {
        let mut vertices = Vec::with_capacity(self.resolution_x * self.resolution_z);
        for k in 0..self.resolution_z {
            for i in 0..self.resolution_x {
                vertices.push(self.vertex_position(i, k));
            }
        }
        Some(vertices)
    }
}

#[cfg(test)]
fn ramp() -> HeightfieldTerrain {
    // height rises linearly with x: h = 0.1 * i
    let mut heights = Vec::new();
    for _k in 0..4 {
        for i in 0..4 {
            heights.push(0.1 * i as FT);
        }
    }
    HeightfieldTerrain::from_heights(4, 4, 0.5, V3::zeros(), heights)
}

#[test]
fn heightfield_interpolates_linearly_on_a_ramp() {
    let terrain = ramp();
    let cp = terrain.closest_point(vec3f(0.75, 5., 0.6));
    assert!((cp.x - 0.75).abs() < 1e-12);
    assert!((cp.z - 0.6).abs() < 1e-12);
    // gx = 1.5 cells, heights step 0.1 per cell
    assert!((cp.y - 0.15).abs() < 1e-12, "height {}", cp.y);

    assert!(terrain.is_inside(vec3f(0.75, 0.1, 0.6)));
    assert!(!terrain.is_inside(vec3f(0.75, 0.2, 0.6)));
}

#[test]
fn heightfield_normal_tilts_against_the_slope() {
    let terrain = ramp();
    let normal = terrain.closest_normal(vec3f(0.75, 1., 0.75));
    assert!(normal.y > 0.);
    assert!(normal.x < 0., "normal should lean against the rising x slope: {:?}", normal);
    assert!((normal.norm() - 1.).abs() < 1e-12);
}

#[test]
fn deposit_is_conservative_and_bilinear() {
    let mut terrain = HeightfieldTerrain::flat(4, 4, 1., V3::zeros(), 0.);
    let before: FT = (0..4).flat_map(|k| (0..4).map(move |i| (i, k))).map(|(i, k)| terrain.height(i, k)).sum();

    terrain.deposit_at(vec3f(1.25, 0., 2.25), 0.8);

    let after: FT = (0..4).flat_map(|k| (0..4).map(move |i| (i, k))).map(|(i, k)| terrain.height(i, k)).sum();
    assert!((after - before - 0.8).abs() < 1e-12);
    // nearest vertex receives the largest share
    assert!(terrain.height(1, 2) > terrain.height(2, 2));
    assert!(terrain.height(1, 2) > terrain.height(1, 3));
}

#[test]
fn erode_returns_what_it_removed() {
    let mut terrain = HeightfieldTerrain::flat(8, 8, 1., V3::zeros(), 1.);
    let before: FT = terrain.mesh_vertices().unwrap().iter().map(|v| v.y).sum();

    let removed = terrain.erode_at(vec3f(4., 1., 4.), 0.25);
    assert!((removed - 0.25).abs() < 1e-12);

    let after: FT = terrain.mesh_vertices().unwrap().iter().map(|v| v.y).sum();
    assert!((before - after - 0.25).abs() < 1e-12);
}
