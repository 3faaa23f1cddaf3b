use crate::{bounding_box::BoundingBox, floating_type_mod::FT, surface::SurfaceOps, vec3f, V3};

/** Unbounded plane through `point` with unit `normal`. */
pub struct Plane {
    pub normal: V3,
    pub point: V3,
}

impl Plane {
    pub fn new(normal: V3, point: V3) -> Plane {
        Plane {
            normal: normal.normalize(),
            point,
        }
    }

    pub fn from_points(point0: V3, point1: V3, point2: V3) -> Plane {
        Plane {
            normal: (point1 - point0).cross(&(point2 - point0)).normalize(),
            point: point0,
        }
    }
}

impl SurfaceOps for Plane {
    fn closest_point(&self, other_point: V3) -> V3 {
        let r = other_point - self.point;
        r - self.normal * self.normal.dot(&r) + self.point
    }

    fn closest_normal(&self, _other_point: V3) -> V3 {
        self.normal
    }

    fn bounding_box(&self) -> BoundingBox {
        let dmax = FT::MAX;
        let eps = FT::EPSILON;

        // axis-aligned planes get a degenerate slab, everything else the whole space
        if (self.normal.dot(&vec3f(1., 0., 0.)) - 1.).abs() < eps {
            BoundingBox::new(self.point - vec3f(0., dmax, dmax), self.point + vec3f(0., dmax, dmax))
        } else if (self.normal.dot(&vec3f(0., 1., 0.)) - 1.).abs() < eps {
            BoundingBox::new(self.point - vec3f(dmax, 0., dmax), self.point + vec3f(dmax, 0., dmax))
        } else if (self.normal.dot(&vec3f(0., 0., 1.)) - 1.).abs() < eps {
            BoundingBox::new(self.point - vec3f(dmax, dmax, 0.), self.point + vec3f(dmax, dmax, 0.))
        } else {
            BoundingBox::new(vec3f(-dmax, -dmax, -dmax), vec3f(dmax, dmax, dmax))
        }
    }
}

#[test]
fn plane_closest_point_projects_orthogonally() {
    let plane = Plane::new(vec3f(0., 0., 1.), vec3f(0., 0., 2.));
    let cp = plane.closest_point(vec3f(3., -1., 7.));
    assert!((cp - vec3f(3., -1., 2.)).norm() < 1e-12);
    assert_eq!(plane.closest_distance(vec3f(3., -1., 7.)), 5.);
    assert!(plane.is_inside(vec3f(0., 0., 0.)));
    assert!(!plane.is_inside(vec3f(0., 0., 3.)));
}

#[test]
fn plane_from_points_orients_by_winding() {
    let plane = Plane::from_points(vec3f(0., 0., 0.), vec3f(1., 0., 0.), vec3f(0., 0., -1.));
    assert!((plane.normal - vec3f(0., 1., 0.)).norm() < 1e-12);
}
