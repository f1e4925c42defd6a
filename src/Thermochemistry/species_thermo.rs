use crate::errors::KiDetError;
use serde::{Deserialize, Serialize};

/// Universal gas constant in J/(mol·K)
pub const R: f64 = 8.314462618;
/// standard state pressure of the polynomial data, Pa (1 atm)
pub const P_ATM: f64 = 101325.0;

/// phase tag of a species in the product library
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Gas,
    Liquid,
    Solid,
}

impl Phase {
    pub fn is_condensed(&self) -> bool {
        !matches!(self, Phase::Gas)
    }
}

fn cp(t: f64, a: &[f64; 7]) -> f64 {
    R * (a[0] + a[1] * t + a[2] * t.powi(2) + a[3] * t.powi(3) + a[4] * t.powi(4))
}
fn dh(t: f64, a: &[f64; 7]) -> f64 {
    R * t
        * (a[0]
            + a[1] * t / 2.0
            + a[2] * t.powi(2) / 3.0
            + a[3] * t.powi(3) / 4.0
            + a[4] * t.powi(4) / 5.0
            + a[5] / t)
}
fn ds(t: f64, a: &[f64; 7]) -> f64 {
    R * (a[0] * t.ln()
        + a[1] * t
        + a[2] * t.powi(2) / 2.0
        + a[3] * t.powi(3) / 3.0
        + a[4] * t.powi(4) / 4.0
        + a[6])
}

/// one fitted polynomial segment: NASA7 coefficients valid on [t_min, t_max]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NasaRange {
    pub t_min: f64,
    pub t_max: f64,
    pub coeffs: [f64; 7],
}

/// NASA7 two-range polynomial representation of one species. Heat capacity,
/// enthalpy (including the heat of formation, elements at 298.15 K reference)
/// and entropy come straight from the segment polynomials; the Gibbs energy is
/// G(T) = H(T) - T*S(T) by construction, not an independent fit.
///
/// Requesting a temperature outside the union of the two ranges is an
/// `OutOfRange` error, never a silent extrapolation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeciesThermo {
    pub low: NasaRange,
    pub high: NasaRange,
}

impl SpeciesThermo {
    fn select(&self, t: f64) -> Result<&[f64; 7], KiDetError> {
        if t >= self.low.t_min && t <= self.low.t_max {
            Ok(&self.low.coeffs)
        } else if t > self.high.t_min && t <= self.high.t_max {
            Ok(&self.high.coeffs)
        } else {
            Err(KiDetError::OutOfRange {
                temperature: t,
                range: format!(
                    "{} - {} K",
                    self.low.t_min.min(self.high.t_min),
                    self.low.t_max.max(self.high.t_max)
                ),
            })
        }
    }

    pub fn t_range(&self) -> (f64, f64) {
        (
            self.low.t_min.min(self.high.t_min),
            self.low.t_max.max(self.high.t_max),
        )
    }

    /// heat capacity Cp(T), J/(mol·K)
    #[allow(non_snake_case)]
    pub fn Cp(&self, t: f64) -> Result<f64, KiDetError> {
        Ok(cp(t, self.select(t)?))
    }
    /// enthalpy H(T), J/mol, referenced to elements at 298.15 K
    pub fn dh(&self, t: f64) -> Result<f64, KiDetError> {
        Ok(dh(t, self.select(t)?))
    }
    /// entropy S(T) at the standard state pressure, J/(mol·K)
    pub fn ds(&self, t: f64) -> Result<f64, KiDetError> {
        Ok(ds(t, self.select(t)?))
    }
    /// Gibbs free energy G(T) = H(T) - T*S(T), J/mol
    pub fn dg(&self, t: f64) -> Result<f64, KiDetError> {
        let a = self.select(t)?;
        Ok(dh(t, a) - t * ds(t, a))
    }
}
