use crate::{floating_type_mod::FT, vec3f, V3};
use serde::{Deserialize, Serialize};

/** How a frame interval is divided into simulation sub-steps. */
#[derive(PartialEq, Debug, Clone, Copy, Serialize, Deserialize)]
pub enum TimeStepping {
    /** Always split the frame into exactly this many equal sub-steps. */
    Fixed { sub_steps: u32 },
    /** Derive the sub-step count from the CFL condition and the current force magnitudes. */
    Adaptive,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SimulationParams {
    pub target_density: FT,
    pub target_spacing: FT,
    // kernel radius is given relative to the target spacing
    pub relative_kernel_radius: FT,

    pub viscosity_coefficient: FT,
    // velocity filtering applied after each step, not a physical viscosity
    pub pseudo_viscosity_coefficient: FT,
    pub drag_coefficient: FT,
    pub gravity: V3,

    pub restitution: FT,
    pub friction: FT,

    // stiffness exponent of the equation-of-state pressure path
    pub eos_exponent: FT,
    pub speed_of_sound: FT,
    pub negative_pressure_scale: FT,
    pub max_density_error_ratio: FT,
    pub max_number_of_iterations: u32,

    pub time_stepping: TimeStepping,
    pub time_step_limit_scale: FT,
}

impl SimulationParams {
    pub fn kernel_radius(&self) -> FT {
        self.relative_kernel_radius * self.target_spacing
    }
}

impl Default for SimulationParams {
    fn default() -> SimulationParams {
        SimulationParams {
            target_density: 1000.,
            target_spacing: 0.1,
            relative_kernel_radius: 1.8,
            viscosity_coefficient: 0.01,
            pseudo_viscosity_coefficient: 10.,
            drag_coefficient: 1e-4,
            gravity: vec3f(0., -9.8, 0.),
            restitution: 0.,
            friction: 0.,
            eos_exponent: 7.,
            speed_of_sound: 100.,
            negative_pressure_scale: 0.,
            max_density_error_ratio: 0.01,
            max_number_of_iterations: 5,
            time_stepping: TimeStepping::Adaptive,
            time_step_limit_scale: 1.,
        }
    }
}

#[test]
fn params_roundtrip_through_yaml() {
    let mut params = SimulationParams::default();
    params.time_stepping = TimeStepping::Fixed { sub_steps: 4 };
    params.viscosity_coefficient = 0.02;

    let text = serde_yaml::to_string(&params).unwrap();
    let back: SimulationParams = serde_yaml::from_str(&text).unwrap();

    assert_eq!(back.time_stepping, TimeStepping::Fixed { sub_steps: 4 });
    assert_eq!(back.viscosity_coefficient, 0.02);
    assert_eq!(back.gravity, params.gravity);
}

#[test]
fn kernel_radius_scales_with_spacing() {
    let mut params = SimulationParams::default();
    params.target_spacing = 0.02;
    params.relative_kernel_radius = 1.8;
    crate::assert_ft_approx_eq(params.kernel_radius(), 0.036, 1e-12, || "kernel radius".to_string());
}
