//! Distance functors evaluated inside the Jastrow factors.
//!
//! Functors are stateless after construction and may be shared freely.

use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::error::{Result, WfnError};

/// A pair correlation function u(r) with first and second derivatives.
pub trait RadialFunctor: Send {
    fn evaluate(&self, r: f64) -> f64;

    /// (u, du/dr, d²u/dr²)
    fn evaluate_vgl(&self, r: f64) -> (f64, f64, f64);

    fn cutoff_radius(&self) -> f64;
}

/// Padé form u(r) = a r / (1 + b r).
///
/// `a` is the cusp du/dr at r = 0: ½ for antiparallel and ¼ for parallel
/// electron pairs, −Z for an electron-ion pair. With `b = 0` it is linear.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct PadeFunctor {
    pub a: f64,
    pub b: f64,
}

impl RadialFunctor for PadeFunctor {
    fn evaluate(&self, r: f64) -> f64 {
        self.a * r / (1.0 + self.b * r)
    }

    fn evaluate_vgl(&self, r: f64) -> (f64, f64, f64) {
        let denom = 1.0 + self.b * r;
        let u = self.a * r / denom;
        let du = self.a / (denom * denom);
        let d2u = -2.0 * self.a * self.b / (denom * denom * denom);
        (u, du, d2u)
    }

    fn cutoff_radius(&self) -> f64 {
        f64::INFINITY
    }
}

/// Uniform cubic B-spline on [0, cutoff].
///
/// With `M` parameters the grid has `M` intervals of width Δ = cutoff / M.
/// The spline coefficients are `c[1..=M]` = parameters, `c[M+1] = c[M+2] = 0`,
/// and `c[0] = c[2] − 2Δ·cusp` so that du/dr(0) equals the cusp. The last
/// parameter must be zero, which makes u, du/dr and d²u/dr² all vanish at
/// the cutoff; past it the functor extrapolates flat (identically zero).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BsplineFunctor {
    cutoff: f64,
    cusp: f64,
    delta: f64,
    coefs: Vec<f64>,
}

impl BsplineFunctor {
    pub fn new(cutoff: f64, cusp: f64, params: &[f64]) -> Result<Self> {
        if params.is_empty() {
            return Err(WfnError::InvalidConfig("B-spline needs at least one parameter".into()));
        }
        if !(cutoff > 0.0 && cutoff.is_finite()) {
            return Err(WfnError::InvalidConfig(format!("B-spline cutoff {cutoff} must be positive")));
        }
        if let Some(&last) = params.last().filter(|&&c| c != 0.0) {
            return Err(WfnError::InvalidConfig(format!(
                "last B-spline parameter is {last}; it must be 0 for a smooth cutoff"
            )));
        }
        let m = params.len();
        let delta = cutoff / m as f64;
        let mut coefs = vec![0.0; m + 3];
        coefs[1..=m].copy_from_slice(params);
        coefs[0] = coefs[2] - 2.0 * delta * cusp;
        Ok(Self { cutoff, cusp, delta, coefs })
    }

    pub fn cusp(&self) -> f64 {
        self.cusp
    }

    fn num_intervals(&self) -> usize {
        self.coefs.len() - 3
    }

    fn spline_vgl(&self, r: f64) -> (f64, f64, f64) {
        let t = r / self.delta;
        let i = (t.floor() as usize).min(self.num_intervals() - 1);
        let f = t - i as f64;
        let f2 = f * f;
        let f3 = f2 * f;
        let c = &self.coefs[i..i + 4];
        let b = [
            (1.0 - f).powi(3) / 6.0,
            (3.0 * f3 - 6.0 * f2 + 4.0) / 6.0,
            (-3.0 * f3 + 3.0 * f2 + 3.0 * f + 1.0) / 6.0,
            f3 / 6.0,
        ];
        let db = [
            -0.5 * (1.0 - f) * (1.0 - f),
            0.5 * (3.0 * f2 - 4.0 * f),
            0.5 * (-3.0 * f2 + 2.0 * f + 1.0),
            0.5 * f2,
        ];
        let d2b = [1.0 - f, 3.0 * f - 2.0, 1.0 - 3.0 * f, f];
        let mut out = (0.0, 0.0, 0.0);
        for k in 0..4 {
            out.0 += c[k] * b[k];
            out.1 += c[k] * db[k];
            out.2 += c[k] * d2b[k];
        }
        (out.0, out.1 / self.delta, out.2 / (self.delta * self.delta))
    }
}

impl RadialFunctor for BsplineFunctor {
    fn evaluate(&self, r: f64) -> f64 {
        self.evaluate_vgl(r).0
    }

    fn evaluate_vgl(&self, r: f64) -> (f64, f64, f64) {
        if r >= self.cutoff {
            return (self.spline_vgl(self.cutoff).0, 0.0, 0.0);
        }
        self.spline_vgl(r)
    }

    fn cutoff_radius(&self) -> f64 {
        self.cutoff
    }
}

/// Value, gradient and Hessian of a triplet functor with respect to
/// (r_12, r_1I, r_2I).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TripletVgh {
    pub value: f64,
    pub grad: [f64; 3],
    pub hess: [[f64; 3]; 3],
}

/// An electron-electron-ion correlation g(r_12, r_1I, r_2I), symmetric under
/// exchange of the two ion distances.
pub trait TripletFunctor: Send {
    fn evaluate(&self, r_12: f64, r_1i: f64, r_2i: f64) -> f64;

    fn evaluate_vgh(&self, r_12: f64, r_1i: f64, r_2i: f64) -> TripletVgh;

    fn cutoff_radius(&self) -> f64;
}

/// One term c · r_12^l (r_1I^m r_2I^n + r_1I^n r_2I^m).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct PolyTerm {
    pub l: u32,
    pub m: u32,
    pub n: u32,
    pub coef: f64,
}

/// Polynomial three-body functor with a smooth ion cutoff:
/// g = P(r_12, r_1I, r_2I) · (r_1I − L)^C (r_2I − L)^C for r_1I, r_2I < L,
/// and zero otherwise.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PolynomialFunctor3D {
    pub cutoff: f64,
    pub cutoff_power: u32,
    pub terms: Vec<PolyTerm>,
}

/// (x^k, k x^(k-1), k(k-1) x^(k-2)) without negative powers.
fn mono(x: f64, k: u32) -> (f64, f64, f64) {
    match k {
        0 => (1.0, 0.0, 0.0),
        1 => (x, 1.0, 0.0),
        _ => {
            let kf = k as f64;
            let xm2 = x.powi(k as i32 - 2);
            (xm2 * x * x, kf * xm2 * x, kf * (kf - 1.0) * xm2)
        }
    }
}

impl PolynomialFunctor3D {
    /// All terms with l ≤ max_order and m ≤ n ≤ max_order, coefficients drawn
    /// from N(0, scale).
    pub fn random<R: Rng + ?Sized>(
        cutoff: f64,
        cutoff_power: u32,
        max_order: u32,
        scale: f64,
        rng: &mut R,
    ) -> Result<Self> {
        let dist = Normal::new(0.0, scale)
            .map_err(|e| WfnError::InvalidConfig(format!("bad coefficient scale: {e}")))?;
        let mut terms = Vec::new();
        for l in 0..=max_order {
            for m in 0..=max_order {
                for n in m..=max_order {
                    terms.push(PolyTerm { l, m, n, coef: dist.sample(rng) });
                }
            }
        }
        Ok(Self { cutoff, cutoff_power, terms })
    }
}

impl TripletFunctor for PolynomialFunctor3D {
    fn evaluate(&self, r_12: f64, r_1i: f64, r_2i: f64) -> f64 {
        self.evaluate_vgh(r_12, r_1i, r_2i).value
    }

    fn evaluate_vgh(&self, s: f64, a: f64, b: f64) -> TripletVgh {
        if a >= self.cutoff || b >= self.cutoff {
            return TripletVgh::default();
        }
        // Polynomial part and its partials: index 0 = s, 1 = a, 2 = b.
        let (mut p, mut ps, mut pa, mut pb) = (0.0, 0.0, 0.0, 0.0);
        let (mut pss, mut paa, mut pbb, mut psa, mut psb, mut pab) = (0.0, 0.0, 0.0, 0.0, 0.0, 0.0);
        for t in &self.terms {
            let (sl, dsl, d2sl) = mono(s, t.l);
            let (am, dam, d2am) = mono(a, t.m);
            let (an, dan, d2an) = mono(a, t.n);
            let (bm, dbm, d2bm) = mono(b, t.m);
            let (bn, dbn, d2bn) = mono(b, t.n);
            let q = am * bn + an * bm;
            let qa = dam * bn + dan * bm;
            let qb = am * dbn + an * dbm;
            let qaa = d2am * bn + d2an * bm;
            let qbb = am * d2bn + an * d2bm;
            let qab = dam * dbn + dan * dbm;
            let c = t.coef;
            p += c * sl * q;
            ps += c * dsl * q;
            pss += c * d2sl * q;
            pa += c * sl * qa;
            pb += c * sl * qb;
            paa += c * sl * qaa;
            pbb += c * sl * qbb;
            pab += c * sl * qab;
            psa += c * dsl * qa;
            psb += c * dsl * qb;
        }

        let (ha, dha, d2ha) = mono(a - self.cutoff, self.cutoff_power);
        let (hb, dhb, d2hb) = mono(b - self.cutoff, self.cutoff_power);

        let value = p * ha * hb;
        let gs = ps * ha * hb;
        let ga = (pa * ha + p * dha) * hb;
        let gb = (pb * hb + p * dhb) * ha;
        let gss = pss * ha * hb;
        let gaa = (paa * ha + 2.0 * pa * dha + p * d2ha) * hb;
        let gbb = (pbb * hb + 2.0 * pb * dhb + p * d2hb) * ha;
        let gsa = (psa * ha + ps * dha) * hb;
        let gsb = (psb * hb + ps * dhb) * ha;
        let gab = pab * ha * hb + pa * ha * dhb + pb * dha * hb + p * dha * dhb;

        TripletVgh {
            value,
            grad: [gs, ga, gb],
            hess: [[gss, gsa, gsb], [gsa, gaa, gab], [gsb, gab, gbb]],
        }
    }

    fn cutoff_radius(&self) -> f64 {
        self.cutoff
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn check_radial<F: RadialFunctor>(f: &F, r: f64) {
        let h = 1e-5;
        let (u, du, d2u) = f.evaluate_vgl(r);
        assert_relative_eq!(u, f.evaluate(r));
        assert_relative_eq!(du, (f.evaluate(r + h) - f.evaluate(r - h)) / (2.0 * h), epsilon = 1e-7);
        assert_relative_eq!(
            d2u,
            (f.evaluate(r + h) - 2.0 * u + f.evaluate(r - h)) / (h * h),
            epsilon = 1e-4
        );
    }

    #[test]
    fn test_pade_derivatives() {
        let f = PadeFunctor { a: 0.5, b: 1.3 };
        for r in [0.1, 0.7, 2.5] {
            check_radial(&f, r);
        }
        assert_relative_eq!(f.evaluate_vgl(0.0).1, 0.5);
    }

    #[test]
    fn test_pade_linear_limit() {
        let f = PadeFunctor { a: -1.0, b: 0.0 };
        assert_eq!(f.evaluate(1.5), -1.5);
        assert_eq!(f.evaluate_vgl(3.0), (-3.0, -1.0, 0.0));
    }

    #[test]
    fn test_bspline_cusp_and_derivatives() {
        let f = BsplineFunctor::new(3.0, -0.5, &[0.4, 0.3, 0.2, 0.1, 0.05, 0.0]).unwrap();
        assert_relative_eq!(f.evaluate_vgl(0.0).1, -0.5, epsilon = 1e-12);
        for r in [0.23, 1.1, 1.77, 2.9] {
            check_radial(&f, r);
        }
    }

    #[test]
    fn test_bspline_smooth_at_cutoff() {
        let f = BsplineFunctor::new(2.0, 0.0, &[0.3, 0.2, 0.1, 0.0]).unwrap();
        assert_eq!(f.evaluate_vgl(5.0), (0.0, 0.0, 0.0));
        let (u, du, d2u) = f.evaluate_vgl(2.0 - 1e-9);
        assert_relative_eq!(u, 0.0, epsilon = 1e-12);
        assert_relative_eq!(du, 0.0, epsilon = 1e-8);
        assert_relative_eq!(d2u, 0.0, epsilon = 1e-7);
    }

    #[test]
    fn test_bspline_rejects_bad_input() {
        assert!(BsplineFunctor::new(2.0, 0.0, &[]).is_err());
        assert!(BsplineFunctor::new(-1.0, 0.0, &[0.0]).is_err());
        assert!(matches!(
            BsplineFunctor::new(2.0, 0.0, &[0.3, 0.2, 0.1, 0.06]),
            Err(WfnError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_polynomial3d_symmetric_and_vanishes_past_cutoff() {
        let mut rng = StdRng::seed_from_u64(5);
        let g = PolynomialFunctor3D::random(2.5, 3, 2, 0.1, &mut rng).unwrap();
        assert_relative_eq!(g.evaluate(0.8, 0.6, 1.4), g.evaluate(0.8, 1.4, 0.6), epsilon = 1e-14);
        assert_eq!(g.evaluate(0.8, 2.6, 0.3), 0.0);
        assert_relative_eq!(g.evaluate(0.8, 2.5 - 1e-6, 0.3), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_polynomial3d_gradient_and_hessian() {
        let mut rng = StdRng::seed_from_u64(9);
        let g = PolynomialFunctor3D::random(3.0, 3, 2, 0.2, &mut rng).unwrap();
        let x = [0.9, 1.1, 0.7];
        let h = 1e-5;
        let vgh = g.evaluate_vgh(x[0], x[1], x[2]);
        let eval = |y: [f64; 3]| g.evaluate(y[0], y[1], y[2]);
        let grad_at = |y: [f64; 3]| g.evaluate_vgh(y[0], y[1], y[2]).grad;
        for k in 0..3 {
            let mut fwd = x;
            let mut bwd = x;
            fwd[k] += h;
            bwd[k] -= h;
            assert_relative_eq!(vgh.grad[k], (eval(fwd) - eval(bwd)) / (2.0 * h), epsilon = 1e-7, max_relative = 1e-6);
            let (gf, gb) = (grad_at(fwd), grad_at(bwd));
            for m in 0..3 {
                assert_relative_eq!(vgh.hess[m][k], (gf[m] - gb[m]) / (2.0 * h), epsilon = 1e-6, max_relative = 1e-6);
            }
        }
    }
}
