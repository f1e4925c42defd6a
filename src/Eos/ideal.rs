use crate::Eos::EosModel;
use crate::Thermochemistry::species_thermo::R;
use nalgebra::{DMatrix, DVector};

/// P·V = n·R·T with every residual identically zero. Useful as a reference for
/// gas-phase combustion problems at moderate pressure, and as the limit the
/// dense-gas models must recover at large volume.
#[derive(Debug, Clone, Default)]
pub struct IdealGas;

impl EosModel for IdealGas {
    fn name(&self) -> String {
        "ideal gas".to_string()
    }

    fn needs_covolumes(&self) -> bool {
        false
    }

    fn pressure(&self, t: f64, v_gas: f64, n: &[f64], _covolumes: &[f64]) -> f64 {
        let n_tot: f64 = n.iter().sum();
        // mol/kg * J/(mol K) * K / (cm3/kg) = J/cm3 = 1e6 Pa
        n_tot * R * t / v_gas * 1e6
    }

    fn dp_dt(&self, _t: f64, v_gas: f64, n: &[f64], _covolumes: &[f64]) -> f64 {
        let n_tot: f64 = n.iter().sum();
        n_tot * R / v_gas * 1e6
    }

    fn dp_dv(&self, t: f64, v_gas: f64, n: &[f64], _covolumes: &[f64]) -> f64 {
        let n_tot: f64 = n.iter().sum();
        -n_tot * R * t / (v_gas * v_gas) * 1e6
    }

    fn mu_correction(&self, _t: f64, _v_gas: f64, n: &[f64], _covolumes: &[f64]) -> DVector<f64> {
        DVector::zeros(n.len())
    }

    fn mu_correction_jacobian(
        &self,
        _t: f64,
        _v_gas: f64,
        n: &[f64],
        _covolumes: &[f64],
    ) -> DMatrix<f64> {
        DMatrix::zeros(n.len(), n.len())
    }

    fn residual_energy(&self, _t: f64, _v_gas: f64, _n: &[f64], _covolumes: &[f64]) -> f64 {
        0.0
    }

    fn residual_entropy(&self, _t: f64, _v_gas: f64, _n: &[f64], _covolumes: &[f64]) -> f64 {
        0.0
    }

    fn residual_cv(&self, _t: f64, _v_gas: f64, _n: &[f64], _covolumes: &[f64]) -> f64 {
        0.0
    }
}
