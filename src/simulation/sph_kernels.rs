use crate::{
    floating_type_mod::{FT, PI},
    V3,
};

/**
 * Sixth-degree polynomial ("poly6") smoothing kernel. Smooth and twice
 * differentiable everywhere inside the support, so it is used for density
 * sums and field interpolation.
 *
 * W(d) = 315 / (64 pi h^3) * (1 - d^2/h^2)^3  for d < h, 0 otherwise.
 */
#[derive(Clone, Copy, Debug)]
pub struct Poly6Kernel {
    pub h: FT,
    h2: FT,
    h3: FT,
    h5: FT,
}

impl Poly6Kernel {
    pub fn new(kernel_radius: FT) -> Poly6Kernel {
        let h = kernel_radius;
        let h2 = h * h;
        let h3 = h2 * h;
        Poly6Kernel { h, h2, h3, h5: h2 * h3 }
    }

    pub fn value(&self, distance: FT) -> FT {
        if distance * distance >= self.h2 {
            return 0.;
        }
        let x = 1. - distance * distance / self.h2;
        315. / (64. * PI * self.h3) * x * x * x
    }

    pub fn first_derivative(&self, distance: FT) -> FT {
        if distance >= self.h {
            return 0.;
        }
        let x = 1. - distance * distance / self.h2;
        -945. / (32. * PI * self.h5) * distance * x * x
    }

    /** dW/dx along `direction`, the unit vector from the neighbor toward the query point. */
    pub fn gradient(&self, distance: FT, direction: V3) -> V3 {
        direction * -self.first_derivative(distance)
    }

    pub fn second_derivative(&self, distance: FT) -> FT {
        if distance * distance >= self.h2 {
            return 0.;
        }
        let x = distance * distance / self.h2;
        945. / (32. * PI * self.h5) * (1. - x) * (3. * x - 1.)
    }
}

/**
 * Spiky kernel, W(d) = 15 / (pi h^3) * (1 - d/h)^3 for d < h. Its first
 * derivative stays steep toward d = 0 which keeps the pressure gradient
 * repulsive for near-coincident particles; the second derivative serves as
 * the viscosity Laplacian.
 */
#[derive(Clone, Copy, Debug)]
pub struct SpikyKernel {
    pub h: FT,
    h3: FT,
    h4: FT,
    h5: FT,
}

impl SpikyKernel {
    pub fn new(kernel_radius: FT) -> SpikyKernel {
        let h = kernel_radius;
        let h2 = h * h;
        let h3 = h2 * h;
        SpikyKernel {
            h,
            h3,
            h4: h2 * h2,
            h5: h3 * h2,
        }
    }

    pub fn value(&self, distance: FT) -> FT {
        if distance >= self.h {
            return 0.;
        }
        let x = 1. - distance / self.h;
        15. / (PI * self.h3) * x * x * x
    }

    pub fn first_derivative(&self, distance: FT) -> FT {
        if distance >= self.h {
            return 0.;
        }
        let x = 1. - distance / self.h;
        -45. / (PI * self.h4) * x * x
    }

    /** dW/dx along `direction`, the unit vector from the neighbor toward the query point. */
    pub fn gradient(&self, distance: FT, direction: V3) -> V3 {
        direction * -self.first_derivative(distance)
    }

    pub fn second_derivative(&self, distance: FT) -> FT {
        if distance >= self.h {
            return 0.;
        }
        let x = 1. - distance / self.h;
        90. / (PI * self.h5) * x
    }
}

#[test]
fn poly6_kernel_integrates_to_one() {
    use crate::vec3f;

    let h = 0.2;
    let kernel = Poly6Kernel::new(h);
    let grid_size = 60;
    let cube_len = 2. * h / grid_size as FT;
    let cube_volume = cube_len * cube_len * cube_len;

    let mut integral = 0.;
    for k in 0..grid_size {
        for j in 0..grid_size {
            for i in 0..grid_size {
                let p = vec3f(
                    (i as FT + 0.5) * cube_len - h,
                    (j as FT + 0.5) * cube_len - h,
                    (k as FT + 0.5) * cube_len - h,
                );
                integral += kernel.value(p.norm()) * cube_volume;
            }
        }
    }

    println!("poly6 integral over support: {}", integral);
    assert!(integral > 0.99 && integral < 1.01);
}

#[test]
fn spiky_kernel_integrates_to_one() {
    use crate::vec3f;

    let h = 0.2;
    let kernel = SpikyKernel::new(h);
    let grid_size = 80;
    let cube_len = 2. * h / grid_size as FT;
    let cube_volume = cube_len * cube_len * cube_len;

    let mut integral = 0.;
    for k in 0..grid_size {
        for j in 0..grid_size {
            for i in 0..grid_size {
                let p = vec3f(
                    (i as FT + 0.5) * cube_len - h,
                    (j as FT + 0.5) * cube_len - h,
                    (k as FT + 0.5) * cube_len - h,
                );
                integral += kernel.value(p.norm()) * cube_volume;
            }
        }
    }

    println!("spiky integral over support: {}", integral);
    assert!(integral > 0.97 && integral < 1.03);
}

#[test]
fn kernels_vanish_at_support_boundary() {
    let h = 0.1;
    let poly6 = Poly6Kernel::new(h);
    let spiky = SpikyKernel::new(h);

    for kernel_radius_multiplier in [1.0, 1.0000001, 1.5, 10.0] {
        let d: FT = h * kernel_radius_multiplier;
        assert_eq!(poly6.value(d), 0.);
        assert_eq!(poly6.first_derivative(d), 0.);
        assert_eq!(poly6.second_derivative(d), 0.);
        assert_eq!(spiky.value(d), 0.);
        assert_eq!(spiky.first_derivative(d), 0.);
        assert_eq!(spiky.second_derivative(d), 0.);
    }

    // continuous approach to the boundary from below
    let just_inside = h * 0.999999;
    assert!(poly6.value(just_inside).abs() < 1e-6 * poly6.value(0.));
    assert!(spiky.value(just_inside).abs() < 1e-6 * spiky.value(0.));
}

#[test]
fn spiky_first_derivative_matches_finite_difference() {
    let h = 0.25;
    let kernel = SpikyKernel::new(h);
    let eps = 1e-7;

    for frac in [0.1, 0.3, 0.5, 0.7, 0.9] {
        let d: FT = h * frac;
        let approx = (kernel.value(d + eps) - kernel.value(d - eps)) / (2. * eps);
        let analytical = kernel.first_derivative(d);
        assert!(
            (approx - analytical).abs() < 1e-3 * analytical.abs().max(1.),
            "d={}: approx={} analytical={}",
            d,
            approx,
            analytical
        );
    }
}
