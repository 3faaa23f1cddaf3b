use crate::{
    bounding_box::BoundingBox,
    surface::{plane::Plane, SurfaceOps},
    vec3f, V3,
};

/** Axis-aligned solid box. Used with a normal flip as the simulation domain walls. */
pub struct BoxSurface {
    pub bound: BoundingBox,
}

impl BoxSurface {
    pub fn new(lower_corner: V3, upper_corner: V3) -> BoxSurface {
        BoxSurface {
            bound: BoundingBox::new(lower_corner, upper_corner),
        }
    }

    fn face_planes(&self) -> [Plane; 6] {
        [
            Plane::new(vec3f(1., 0., 0.), self.bound.upper_corner),
            Plane::new(vec3f(0., 1., 0.), self.bound.upper_corner),
            Plane::new(vec3f(0., 0., 1.), self.bound.upper_corner),
            Plane::new(vec3f(-1., 0., 0.), self.bound.lower_corner),
            Plane::new(vec3f(0., -1., 0.), self.bound.lower_corner),
            Plane::new(vec3f(0., 0., -1.), self.bound.lower_corner),
        ]
    }

    fn clamp_to_bound(&self, other_point: V3) -> V3 {
        vec3f(
            other_point.x.max(self.bound.lower_corner.x).min(self.bound.upper_corner.x),
            other_point.y.max(self.bound.lower_corner.y).min(self.bound.upper_corner.y),
            other_point.z.max(self.bound.lower_corner.z).min(self.bound.upper_corner.z),
        )
    }
}

impl SurfaceOps for BoxSurface {
    fn closest_point(&self, other_point: V3) -> V3 {
        if self.bound.contains(other_point) {
            // inside: nearest of the six face planes
            let planes = self.face_planes();
            let mut result = planes[0].closest_point(other_point);
            let mut distance_squared = (result - other_point).norm_squared();
            for plane in &planes[1..] {
                let candidate = plane.closest_point(other_point);
                let candidate_distance_squared = (candidate - other_point).norm_squared();
                if candidate_distance_squared < distance_squared {
                    result = candidate;
                    distance_squared = candidate_distance_squared;
                }
            }
            result
        } else {
            self.clamp_to_bound(other_point)
        }
    }

    fn closest_normal(&self, other_point: V3) -> V3 {
        let planes = self.face_planes();
        if self.bound.contains(other_point) {
            let mut closest_normal = planes[0].normal;
            let mut min_distance_squared = (planes[0].closest_point(other_point) - other_point).norm_squared();
            for plane in &planes[1..] {
                let distance_squared = (plane.closest_point(other_point) - other_point).norm_squared();
                if distance_squared < min_distance_squared {
                    closest_normal = plane.normal;
                    min_distance_squared = distance_squared;
                }
            }
            closest_normal
        } else {
            // outside: face whose normal best aligns with the offset from the clamped point
            let offset = other_point - self.clamp_to_bound(other_point);
            let mut closest_normal = planes[0].normal;
            let mut max_cosine = closest_normal.dot(&offset);
            for plane in &planes[1..] {
                let cosine = plane.normal.dot(&offset);
                if cosine > max_cosine {
                    closest_normal = plane.normal;
                    max_cosine = cosine;
                }
            }
            closest_normal
        }
    }

    fn bounding_box(&self) -> BoundingBox {
        self.bound
    }
}

#[test]
fn box_closest_point_outside_clamps() {
    let surface = BoxSurface::new(vec3f(0., 0., 0.), vec3f(1., 1., 1.));
    let cp = surface.closest_point(vec3f(2., 0.5, -1.));
    assert!((cp - vec3f(1., 0.5, 0.)).norm() < 1e-12);
}

#[test]
fn box_closest_point_inside_snaps_to_nearest_face() {
    let surface = BoxSurface::new(vec3f(0., 0., 0.), vec3f(1., 1., 1.));
    let cp = surface.closest_point(vec3f(0.5, 0.1, 0.5));
    assert!((cp - vec3f(0.5, 0., 0.5)).norm() < 1e-12);
    assert!((surface.closest_normal(vec3f(0.5, 0.1, 0.5)) - vec3f(0., -1., 0.)).norm() < 1e-12);
}

#[test]
fn box_inside_test_matches_bounds() {
    let surface = BoxSurface::new(vec3f(0., 0., 0.), vec3f(1., 1., 1.));
    assert!(surface.is_inside(vec3f(0.5, 0.5, 0.5)));
    assert!(!surface.is_inside(vec3f(0.5, 1.5, 0.5)));
}
