use crate::{floating_type_mod::FT, V3};
use nalgebra::UnitQuaternion;
use serde::{Deserialize, Serialize};

/** Rigid transform (rotation followed by translation) between a surface's local frame and world space. */
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Transform {
    pub translation: V3,
    pub orientation: UnitQuaternion<FT>,
}

impl Default for Transform {
    fn default() -> Transform {
        Transform {
            translation: V3::zeros(),
            orientation: UnitQuaternion::identity(),
        }
    }
}

impl Transform {
    pub fn translation(translation: V3) -> Transform {
        Transform {
            translation,
            orientation: UnitQuaternion::identity(),
        }
    }

    pub fn to_local(&self, point_in_world: V3) -> V3 {
        self.orientation.inverse_transform_vector(&(point_in_world - self.translation))
    }

    pub fn to_world(&self, point_in_local: V3) -> V3 {
        self.orientation.transform_vector(&point_in_local) + self.translation
    }

    /** Directions only rotate; they do not translate. */
    pub fn direction_to_local(&self, dir_in_world: V3) -> V3 {
        self.orientation.inverse_transform_vector(&dir_in_world)
    }

    pub fn direction_to_world(&self, dir_in_local: V3) -> V3 {
        self.orientation.transform_vector(&dir_in_local)
    }
}

#[test]
fn transform_roundtrip() {
    use crate::vec3f;

    let transform = Transform {
        translation: vec3f(1., 2., 3.),
        orientation: UnitQuaternion::from_euler_angles(0.3, -0.2, 1.1),
    };

    let p = vec3f(0.5, -0.25, 2.0);
    let roundtrip = transform.to_world(transform.to_local(p));
    assert!((roundtrip - p).norm() < 1e-10);

    let d = vec3f(0., 1., 0.);
    let rotated = transform.direction_to_world(transform.direction_to_local(d));
    assert!((rotated - d).norm() < 1e-10);
}
