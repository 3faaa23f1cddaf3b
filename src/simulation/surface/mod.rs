use crate::{bounding_box::BoundingBox, floating_type_mod::FT, transform::Transform, V3};
use enum_dispatch::enum_dispatch;

pub mod box_surface;
pub mod heightfield;
pub mod plane;

pub use box_surface::BoxSurface;
pub use heightfield::HeightfieldTerrain;
pub use plane::Plane;

/**
 * Capability set every collider surface answers in world space. The two
 * terrain mutation operations default to no-ops so that rigid analytic
 * primitives do not have to mention them.
 */
#[enum_dispatch]
#[allow(unused_variables)]
pub trait SurfaceOps {
    fn closest_point(&self, other_point: V3) -> V3;

    /** Unit normal at the closest surface point. */
    fn closest_normal(&self, other_point: V3) -> V3;

    fn bounding_box(&self) -> BoundingBox;

    fn closest_distance(&self, other_point: V3) -> FT {
        (self.closest_point(other_point) - other_point).norm()
    }

    /** A point is inside when it sits behind the normal of its closest surface point. */
    fn is_inside(&self, other_point: V3) -> bool {
        let cp = self.closest_point(other_point);
        let normal = self.closest_normal(other_point);
        (other_point - cp).dot(&normal) < 0.
    }

    /** Whether [`deposit_at`]/[`erode_at`] actually reshape this surface.
     *
     * [`deposit_at`]: SurfaceOps::deposit_at
     * [`erode_at`]: SurfaceOps::erode_at
     */
    fn is_erodible(&self) -> bool {
        false
    }

    fn deposit_at(&mut self, other_point: V3, amount: FT) {}

    /** How many cells [`erode_at`] spreads its removal over. Ignored by rigid primitives.
     *
     * [`erode_at`]: SurfaceOps::erode_at
     */
    fn set_brush_radius(&mut self, brush_radius: i32) {}

    /** Removes up to `amount` of height around `other_point`; returns how much was actually removed. */
    fn erode_at(&mut self, other_point: V3, amount: FT) -> FT {
        0.
    }

    /** Surface mesh vertices for snapshot export. `None` for surfaces without a mesh representation. */
    fn mesh_vertices(&self) -> Option<Vec<V3>> {
        None
    }
}

/**
 * Rigid transform (plus optional normal flip) wrapped around another
 * surface. Variants stay transform-free in their local frame; placement
 * in the world is this decorator's job.
 */
pub struct TransformedSurface {
    pub surface: Box<Surface>,
    pub transform: Transform,
    pub normal_flipped: bool,
}

impl SurfaceOps for TransformedSurface {
    fn closest_point(&self, other_point: V3) -> V3 {
        self.transform
            .to_world(self.surface.closest_point(self.transform.to_local(other_point)))
    }

    fn closest_normal(&self, other_point: V3) -> V3 {
        let normal = self
            .transform
            .direction_to_world(self.surface.closest_normal(self.transform.to_local(other_point)));
        if self.normal_flipped {
            -normal
        } else {
            normal
        }
    }

    fn closest_distance(&self, other_point: V3) -> FT {
        self.surface.closest_distance(self.transform.to_local(other_point))
    }

    fn is_inside(&self, other_point: V3) -> bool {
        self.normal_flipped != self.surface.is_inside(self.transform.to_local(other_point))
    }

    fn bounding_box(&self) -> BoundingBox {
        let local = self.surface.bounding_box();
        let mut world = BoundingBox::empty_at(self.transform.to_world(local.corner(0)));
        for idx in 1..8 {
            let corner = self.transform.to_world(local.corner(idx));
            world.lower_corner = world.lower_corner.inf(&corner);
            world.upper_corner = world.upper_corner.sup(&corner);
        }
        world
    }

    fn is_erodible(&self) -> bool {
        self.surface.is_erodible()
    }

    fn set_brush_radius(&mut self, brush_radius: i32) {
        self.surface.set_brush_radius(brush_radius);
    }

    fn deposit_at(&mut self, other_point: V3, amount: FT) {
        let local = self.transform.to_local(other_point);
        self.surface.deposit_at(local, amount);
    }

    fn erode_at(&mut self, other_point: V3, amount: FT) -> FT {
        let local = self.transform.to_local(other_point);
        self.surface.erode_at(local, amount)
    }

    fn mesh_vertices(&self) -> Option<Vec<V3>> {
        self.surface
            .mesh_vertices()
            .map(|vertices| vertices.into_iter().map(|v| self.transform.to_world(v)).collect())
    }
}

#[enum_dispatch(SurfaceOps)]
pub enum Surface {
    Plane,
    BoxSurface,
    HeightfieldTerrain,
    TransformedSurface,
}

impl Surface {
    pub fn translated(self, translation: V3) -> Surface {
        Surface::TransformedSurface(TransformedSurface {
            surface: Box::new(self),
            transform: Transform::translation(translation),
            normal_flipped: false,
        })
    }

    pub fn flipped(self) -> Surface {
        Surface::TransformedSurface(TransformedSurface {
            surface: Box::new(self),
            transform: Transform::default(),
            normal_flipped: true,
        })
    }
}

#[test]
fn flipped_surface_inverts_inside_test_and_normal() {
    use crate::vec3f;

    let plane = Surface::Plane(Plane::new(vec3f(0., 1., 0.), V3::zeros()));
    assert!(plane.is_inside(vec3f(0., -1., 0.)));
    assert!(!plane.is_inside(vec3f(0., 1., 0.)));

    let flipped = plane.flipped();
    assert!(!flipped.is_inside(vec3f(0., -1., 0.)));
    assert!(flipped.is_inside(vec3f(0., 1., 0.)));
    assert!((flipped.closest_normal(vec3f(0., 1., 0.)) - vec3f(0., -1., 0.)).norm() < 1e-12);
}

#[test]
fn translated_surface_moves_closest_point() {
    use crate::vec3f;

    let plane = Surface::Plane(Plane::new(vec3f(0., 1., 0.), V3::zeros())).translated(vec3f(0., 2., 0.));
    let cp = plane.closest_point(vec3f(1., 5., -3.));
    assert!((cp - vec3f(1., 2., -3.)).norm() < 1e-12);
    assert_eq!(plane.closest_distance(vec3f(1., 5., -3.)), 3.);
}
