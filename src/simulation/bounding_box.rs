use crate::{floating_type_mod::FT, vec3f, V3};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct BoundingBox {
    pub lower_corner: V3,
    pub upper_corner: V3,
}

impl BoundingBox {
    pub fn new(lower_corner: V3, upper_corner: V3) -> BoundingBox {
        BoundingBox {
            lower_corner,
            upper_corner,
        }
    }

    pub fn empty_at(point: V3) -> BoundingBox {
        BoundingBox::new(point, point)
    }

    pub fn width(&self) -> FT {
        self.upper_corner.x - self.lower_corner.x
    }

    pub fn height(&self) -> FT {
        self.upper_corner.y - self.lower_corner.y
    }

    pub fn depth(&self) -> FT {
        self.upper_corner.z - self.lower_corner.z
    }

    pub fn contains(&self, point: V3) -> bool {
        (0..3).all(|d| self.lower_corner[d] <= point[d] && point[d] <= self.upper_corner[d])
    }

    /** Grow (or shrink, for negative `delta`) the box by `delta` on every side. */
    pub fn expand(&mut self, delta: FT) {
        self.lower_corner -= vec3f(delta, delta, delta);
        self.upper_corner += vec3f(delta, delta, delta);
    }

    /** Component-wise intersection. May produce an inverted (empty) box. */
    pub fn intersection(&self, other: &BoundingBox) -> BoundingBox {
        let mut lower = self.lower_corner;
        let mut upper = self.upper_corner;
        for d in 0..3 {
            lower[d] = FT::max(lower[d], other.lower_corner[d]);
            upper[d] = FT::min(upper[d], other.upper_corner[d]);
        }
        BoundingBox::new(lower, upper)
    }

    pub fn corner(&self, idx: usize) -> V3 {
        vec3f(
            if idx & 1 == 0 { self.lower_corner.x } else { self.upper_corner.x },
            if idx & 2 == 0 { self.lower_corner.y } else { self.upper_corner.y },
            if idx & 4 == 0 { self.lower_corner.z } else { self.upper_corner.z },
        )
    }
}

#[test]
fn bounding_box_expand_and_contains() {
    let mut bbox = BoundingBox::new(vec3f(0., 0., 0.), vec3f(1., 1., 1.));
    assert!(bbox.contains(vec3f(0.5, 0.5, 0.5)));
    assert!(!bbox.contains(vec3f(1.5, 0.5, 0.5)));

    bbox.expand(0.5);
    assert!(bbox.contains(vec3f(1.4, 1.4, 1.4)));
    assert!(bbox.contains(vec3f(-0.4, -0.4, -0.4)));
}

#[test]
fn bounding_box_intersection() {
    let a = BoundingBox::new(vec3f(0., 0., 0.), vec3f(2., 2., 2.));
    let b = BoundingBox::new(vec3f(1., -1., 1.), vec3f(3., 1., 3.));
    let c = a.intersection(&b);
    assert_eq!(c.lower_corner, vec3f(1., 0., 1.));
    assert_eq!(c.upper_corner, vec3f(2., 1., 2.));
}
