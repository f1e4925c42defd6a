use enum_dispatch::enum_dispatch;
use nalgebra::{DMatrix, DVector};

/// Becker-Kistiakowsky-Wilson equation of state for dense detonation gases
pub mod bkw;
/// ideal gas closure, the zero-correction reference implementation
pub mod ideal;

#[cfg(test)]
mod eos_tests;

pub use bkw::Bkw;
pub use ideal::IdealGas;

/// Equation of state of the gaseous phase on the working unit basis: moles in
/// mol per kg of mixture, gas volume in cm³ per kg, temperature in K, pressure
/// in Pa. Energetic residuals are the departure from the ideal gas at the same
/// (T, V, n) and come back in J/kg (energy), J/(kg·K) (entropy, heat capacity).
///
/// Chemical potential corrections are dimensionless (per RT); the equilibrium
/// solver adds them to the ideal-gas chemical potential of each gas species.
#[enum_dispatch]
pub trait EosModel {
    fn name(&self) -> String;

    /// true if the model needs a covolume for every gas species it sees
    fn needs_covolumes(&self) -> bool;

    /// pressure in Pa
    fn pressure(&self, t: f64, v_gas: f64, n: &[f64], covolumes: &[f64]) -> f64;

    /// (∂P/∂T) at constant volume and composition, Pa/K
    fn dp_dt(&self, t: f64, v_gas: f64, n: &[f64], covolumes: &[f64]) -> f64;

    /// (∂P/∂V) at constant temperature and composition, Pa per cm³/kg
    fn dp_dv(&self, t: f64, v_gas: f64, n: &[f64], covolumes: &[f64]) -> f64;

    /// non-ideal part of μ_j/RT for every gas species
    fn mu_correction(&self, t: f64, v_gas: f64, n: &[f64], covolumes: &[f64]) -> DVector<f64>;

    /// ∂(μ_j/RT correction)/∂n_k, a symmetric matrix
    fn mu_correction_jacobian(
        &self,
        t: f64,
        v_gas: f64,
        n: &[f64],
        covolumes: &[f64],
    ) -> DMatrix<f64>;

    /// residual internal energy U - U_ideal, J/kg
    fn residual_energy(&self, t: f64, v_gas: f64, n: &[f64], covolumes: &[f64]) -> f64;

    /// residual entropy S - S_ideal at the same (T, V, n), J/(kg·K)
    fn residual_entropy(&self, t: f64, v_gas: f64, n: &[f64], covolumes: &[f64]) -> f64;

    /// residual constant-volume heat capacity, J/(kg·K)
    fn residual_cv(&self, t: f64, v_gas: f64, n: &[f64], covolumes: &[f64]) -> f64;
}

/// the closed set of EOS models a computation can select
#[enum_dispatch(EosModel)]
#[derive(Debug, Clone)]
pub enum EosEnum {
    IdealGas,
    Bkw,
}
