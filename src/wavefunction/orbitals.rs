//! Single-particle orbitals used to fill Slater matrices.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// A single-particle orbital φ(r) with analytic derivatives.
pub trait Orbital {
    fn value(&self, r: &Vector3<f64>) -> f64;

    fn gradient(&self, r: &Vector3<f64>) -> Vector3<f64>;

    fn laplacian(&self, r: &Vector3<f64>) -> f64;

    /// Value, gradient and Laplacian in one call.
    fn vgl(&self, r: &Vector3<f64>) -> (f64, Vector3<f64>, f64) {
        (self.value(r), self.gradient(r), self.laplacian(r))
    }

    /// Numerical gradient using central difference.
    fn numerical_gradient(&self, r: &Vector3<f64>, h: f64) -> Vector3<f64> {
        let mut grad = Vector3::zeros();
        for axis in 0..3 {
            let mut r_fwd = *r;
            let mut r_bwd = *r;
            r_fwd[axis] += h;
            r_bwd[axis] -= h;
            grad[axis] = (self.value(&r_fwd) - self.value(&r_bwd)) / (2.0 * h);
        }
        grad
    }

    /// Numerical Laplacian using central difference.
    fn numerical_laplacian(&self, r: &Vector3<f64>, h: f64) -> f64 {
        let phi = self.value(r);
        let mut laplacian = 0.0;
        for axis in 0..3 {
            let mut r_fwd = *r;
            let mut r_bwd = *r;
            r_fwd[axis] += h;
            r_bwd[axis] -= h;
            laplacian += (self.value(&r_fwd) - 2.0 * phi + self.value(&r_bwd)) / (h * h);
        }
        laplacian
    }
}

/// Gaussian orbital exp(-α|r - c|²); smooth everywhere, including at the
/// centre, so it is the orbital of the Slater-Jastrow builder.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct GaussianOrbital {
    pub alpha: f64,
    pub center: Vector3<f64>,
}

impl Orbital for GaussianOrbital {
    fn value(&self, r: &Vector3<f64>) -> f64 {
        (-self.alpha * (r - self.center).norm_squared()).exp()
    }

    fn gradient(&self, r: &Vector3<f64>) -> Vector3<f64> {
        let dr = r - self.center;
        dr * (-2.0 * self.alpha * (-self.alpha * dr.norm_squared()).exp())
    }

    fn laplacian(&self, r: &Vector3<f64>) -> f64 {
        let r2 = (r - self.center).norm_squared();
        (4.0 * self.alpha * self.alpha * r2 - 6.0 * self.alpha) * (-self.alpha * r2).exp()
    }

    fn vgl(&self, r: &Vector3<f64>) -> (f64, Vector3<f64>, f64) {
        let dr = r - self.center;
        let r2 = dr.norm_squared();
        let e = (-self.alpha * r2).exp();
        let a = self.alpha;
        (e, dr * (-2.0 * a * e), (4.0 * a * a * r2 - 6.0 * a) * e)
    }
}

/// Affine orbital c + s·r. Harmonic, so its Laplacian vanishes.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AffineOrbital {
    pub constant: f64,
    pub slope: Vector3<f64>,
}

impl Orbital for AffineOrbital {
    fn value(&self, r: &Vector3<f64>) -> f64 {
        self.constant + self.slope.dot(r)
    }

    fn gradient(&self, _r: &Vector3<f64>) -> Vector3<f64> {
        self.slope
    }

    fn laplacian(&self, _r: &Vector3<f64>) -> f64 {
        0.0
    }
}
