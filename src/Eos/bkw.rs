use crate::Eos::EosModel;
use crate::Thermochemistry::species_thermo::R;
use nalgebra::{DMatrix, DVector};

/// Becker-Kistiakowsky-Wilson equation of state,
///
///   P·V/(n·R·T) = 1 + x·e^(β·x),   x = κ·Σ n_j·k_j / (V·(T+Θ)^α),
///
/// with per-species geometric covolumes k_j in cm³/mol and one of the
/// empirical calibrations below. All departures from the ideal gas follow
/// analytically from this compressibility factor, so pressure, chemical
/// potentials and the energetic residuals stay mutually consistent.
#[derive(Debug, Clone)]
pub struct Bkw {
    pub alpha: f64,
    pub beta: f64,
    pub kappa: f64,
    pub theta: f64,
    pub set_name: &'static str,
}

impl Bkw {
    /// Mader's TNT calibration, for oxygen-deficient CHNO explosives
    pub fn bkw_tnt() -> Self {
        Bkw {
            alpha: 0.5,
            beta: 0.09585,
            kappa: 12.685,
            theta: 400.0,
            set_name: "BKW-TNT",
        }
    }

    /// Mader's RDX calibration, for oxygen-balanced CHNO explosives
    pub fn bkw_rdx() -> Self {
        Bkw {
            alpha: 0.5,
            beta: 0.16,
            kappa: 10.91,
            theta: 400.0,
            set_name: "BKW-RDX",
        }
    }

    /// Hobbs-Baer BKWS calibration
    pub fn bkws() -> Self {
        Bkw {
            alpha: 0.5,
            beta: 0.298,
            kappa: 10.50,
            theta: 6620.0,
            set_name: "BKWS",
        }
    }

    /// BKWC calibration of Fried and Souers
    pub fn bkwc() -> Self {
        Bkw {
            alpha: 0.5,
            beta: 0.403,
            kappa: 10.86,
            theta: 5441.0,
            set_name: "BKWC",
        }
    }

    /// q = κ / (V·(T+Θ)^α), so that x = q·Σ n_j·k_j
    fn q(&self, t: f64, v_gas: f64) -> f64 {
        self.kappa / (v_gas * (t + self.theta).powf(self.alpha))
    }

    fn x(&self, t: f64, v_gas: f64, n: &[f64], covolumes: &[f64]) -> f64 {
        let nk: f64 = n.iter().zip(covolumes).map(|(nj, kj)| nj * kj).sum();
        self.q(t, v_gas) * nk
    }
}

impl EosModel for Bkw {
    fn name(&self) -> String {
        self.set_name.to_string()
    }

    fn needs_covolumes(&self) -> bool {
        true
    }

    fn pressure(&self, t: f64, v_gas: f64, n: &[f64], covolumes: &[f64]) -> f64 {
        let n_tot: f64 = n.iter().sum();
        let x = self.x(t, v_gas, n, covolumes);
        let f = 1.0 + x * (self.beta * x).exp();
        n_tot * R * t / v_gas * 1e6 * f
    }

    fn dp_dt(&self, t: f64, v_gas: f64, n: &[f64], covolumes: &[f64]) -> f64 {
        let n_tot: f64 = n.iter().sum();
        let x = self.x(t, v_gas, n, covolumes);
        let ebx = (self.beta * x).exp();
        let f = 1.0 + x * ebx;
        // df/dx
        let fp = ebx * (1.0 + self.beta * x);
        let c = n_tot * R / v_gas * 1e6;
        // dx/dT = -alpha*x/(T+theta)
        c * (f - fp * self.alpha * x * t / (t + self.theta))
    }

    fn dp_dv(&self, t: f64, v_gas: f64, n: &[f64], covolumes: &[f64]) -> f64 {
        let n_tot: f64 = n.iter().sum();
        let x = self.x(t, v_gas, n, covolumes);
        let ebx = (self.beta * x).exp();
        let f = 1.0 + x * ebx;
        let fp = ebx * (1.0 + self.beta * x);
        let c = n_tot * R * t / v_gas * 1e6;
        // dx/dV = -x/V
        -c / v_gas * (f + x * fp)
    }

    fn mu_correction(&self, t: f64, v_gas: f64, n: &[f64], covolumes: &[f64]) -> DVector<f64> {
        let n_tot: f64 = n.iter().sum();
        let q = self.q(t, v_gas);
        let x = self.x(t, v_gas, n, covolumes);
        let ebx = (self.beta * x).exp();
        // integral of (f-1)/n dn along the isotherm plus the direct covolume term
        let common = (ebx - 1.0) / self.beta;
        DVector::from_iterator(
            n.len(),
            covolumes.iter().map(|kj| common + n_tot * q * kj * ebx),
        )
    }

    fn mu_correction_jacobian(
        &self,
        t: f64,
        v_gas: f64,
        n: &[f64],
        covolumes: &[f64],
    ) -> DMatrix<f64> {
        let n_tot: f64 = n.iter().sum();
        let q = self.q(t, v_gas);
        let x = self.x(t, v_gas, n, covolumes);
        let ebx = (self.beta * x).exp();
        let m = n.len();
        let mut jac = DMatrix::zeros(m, m);
        for j in 0..m {
            for k in 0..m {
                let kj = covolumes[j];
                let kk = covolumes[k];
                jac[(j, k)] = q * ebx * (kj + kk + n_tot * self.beta * q * kj * kk);
            }
        }
        jac
    }

    fn residual_energy(&self, t: f64, v_gas: f64, n: &[f64], covolumes: &[f64]) -> f64 {
        let n_tot: f64 = n.iter().sum();
        let x = self.x(t, v_gas, n, covolumes);
        let ebx = (self.beta * x).exp();
        n_tot * R * t * t * self.alpha * x * ebx / (t + self.theta)
    }

    fn residual_entropy(&self, t: f64, v_gas: f64, n: &[f64], covolumes: &[f64]) -> f64 {
        let n_tot: f64 = n.iter().sum();
        let x = self.x(t, v_gas, n, covolumes);
        let ebx = (self.beta * x).exp();
        -n_tot
            * R
            * ((ebx - 1.0) / self.beta - self.alpha * x * t * ebx / (t + self.theta))
    }

    fn residual_cv(&self, t: f64, v_gas: f64, n: &[f64], covolumes: &[f64]) -> f64 {
        let n_tot: f64 = n.iter().sum();
        let x = self.x(t, v_gas, n, covolumes);
        let ebx = (self.beta * x).exp();
        let tt = t / (t + self.theta);
        n_tot
            * R
            * self.alpha
            * x
            * ebx
            * tt
            * (2.0 - self.alpha * t * (1.0 + self.beta * x) / (t + self.theta) - tt)
    }
}
