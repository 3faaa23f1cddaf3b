use crate::{
    floating_type_mod::FT,
    surface::{Surface, SurfaceOps},
    V3,
};

/**
 * Kinematic collider: a surface plus a rigid velocity field. The surface
 * never reacts to the fluid dynamically, but erosion may reshape it when
 * it is a heightfield.
 */
pub struct RigidBodyCollider {
    pub surface: Surface,
    pub linear_velocity: V3,
    pub angular_velocity: V3,
    pub rotation_origin: V3,
    friction_coefficient: FT,
}

impl RigidBodyCollider {
    pub fn new(surface: Surface) -> RigidBodyCollider {
        RigidBodyCollider {
            surface,
            linear_velocity: V3::zeros(),
            angular_velocity: V3::zeros(),
            rotation_origin: V3::zeros(),
            friction_coefficient: 0.,
        }
    }

    pub fn friction_coefficient(&self) -> FT {
        self.friction_coefficient
    }

    pub fn set_friction_coefficient(&mut self, friction_coefficient: FT) {
        self.friction_coefficient = friction_coefficient.max(0.);
    }

    /** Rigid velocity field of the collider at a world point. */
    pub fn velocity_at(&self, point: V3) -> V3 {
        self.linear_velocity + self.angular_velocity.cross(&(point - self.rotation_origin))
    }

    fn is_penetrating(&self, position: V3, radius: FT) -> bool {
        self.surface.is_inside(position) || self.surface.closest_distance(position) < radius
    }

    /**
     * Pushes a penetrating particle back onto the legal side of the
     * surface and damps its velocity by restitution and friction. A
     * non-penetrating state is left untouched, so a resolved state is a
     * fixed point of this operation.
     */
    pub fn resolve_collision(&self, radius: FT, restitution: FT, position: &mut V3, velocity: &mut V3) {
        if !self.is_penetrating(*position, radius) {
            return;
        }

        let target_normal = self.surface.closest_normal(*position);
        let target_point = self.surface.closest_point(*position) + target_normal * radius;
        let collider_velocity = self.velocity_at(target_point);

        let relative_velocity = *velocity - collider_velocity;
        let normal_dot = relative_velocity.dot(&target_normal);

        if normal_dot < 0. {
            let relative_velocity_n = target_normal * normal_dot;
            let mut relative_velocity_t = relative_velocity - relative_velocity_n;
            let bounced_n = relative_velocity_n * -restitution;

            let tangential_norm = relative_velocity_t.norm();
            if tangential_norm > 0. {
                let delta_n = (bounced_n - relative_velocity_n).norm();
                let friction_scale = (1. - self.friction_coefficient * delta_n / tangential_norm).max(0.);
                relative_velocity_t *= friction_scale;
            }

            *velocity = bounced_n + relative_velocity_t + collider_velocity;
        }

        *position = target_point;
    }
}

#[cfg(test)]
fn floor_collider() -> RigidBodyCollider {
    use crate::surface::Plane;
    use crate::vec3f;
    RigidBodyCollider::new(Surface::Plane(Plane::new(vec3f(0., 1., 0.), V3::zeros())))
}

#[test]
fn penetrating_particle_is_projected_onto_surface() {
    use crate::vec3f;

    let collider = floor_collider();
    let mut position = vec3f(0.3, -0.05, 0.1);
    let mut velocity = vec3f(0., -2., 0.);
    collider.resolve_collision(0.01, 0., &mut position, &mut velocity);

    assert!((position - vec3f(0.3, 0.01, 0.1)).norm() < 1e-12);
    assert!(velocity.y.abs() < 1e-12, "restitution 0 kills the normal velocity: {:?}", velocity);
}

#[test]
fn resolution_is_idempotent() {
    use crate::vec3f;

    let mut collider = floor_collider();
    collider.set_friction_coefficient(0.2);

    let mut position = vec3f(0., -0.1, 0.);
    let mut velocity = vec3f(1., -3., 0.5);
    collider.resolve_collision(0.01, 0.5, &mut position, &mut velocity);

    let (position_once, velocity_once) = (position, velocity);
    collider.resolve_collision(0.01, 0.5, &mut position, &mut velocity);

    assert!((position - position_once).norm() < 1e-12);
    assert!((velocity - velocity_once).norm() < 1e-12);
}

#[test]
fn restitution_reflects_normal_component() {
    use crate::vec3f;

    let collider = floor_collider();
    let mut position = vec3f(0., -0.001, 0.);
    let mut velocity = vec3f(0., -4., 0.);
    collider.resolve_collision(0.01, 0.5, &mut position, &mut velocity);

    assert!((velocity.y - 2.).abs() < 1e-12);
}

#[test]
fn friction_damps_tangential_velocity_but_never_reverses_it() {
    use crate::vec3f;

    let mut collider = floor_collider();
    collider.set_friction_coefficient(100.);

    let mut position = vec3f(0., -0.001, 0.);
    let mut velocity = vec3f(1., -1., 0.);
    collider.resolve_collision(0.01, 0., &mut position, &mut velocity);

    assert_eq!(velocity.x, 0., "excess friction clamps to zero, never negative");
    assert!(velocity.z.abs() < 1e-12);
}

#[test]
fn separating_contact_keeps_velocity() {
    use crate::vec3f;

    let collider = floor_collider();
    let mut position = vec3f(0., 0.005, 0.);
    let mut velocity = vec3f(0., 3., 0.);
    collider.resolve_collision(0.01, 0., &mut position, &mut velocity);

    // still pushed to the contact offset, but an already separating velocity is untouched
    assert!((position.y - 0.01).abs() < 1e-12);
    assert_eq!(velocity, vec3f(0., 3., 0.));
}

#[test]
fn negative_friction_is_clamped_at_the_setter() {
    let mut collider = floor_collider();
    collider.set_friction_coefficient(-3.);
    assert_eq!(collider.friction_coefficient(), 0.);
}
