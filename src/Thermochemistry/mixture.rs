use crate::Thermochemistry::species_lib::Reactant;
use crate::errors::KiDetError;
use std::collections::{BTreeMap, BTreeSet};

/// A reactant formulation on the 1 kg basis used by every solver downstream.
///
/// Mass fractions are normalized on construction, so callers may pass parts by
/// weight (e.g. 95.0 / 5.0) instead of fractions. The initial density is the
/// loading density of the charge in g/cm³, not the theoretical maximum density
/// of the ingredients.
#[derive(Debug, Clone)]
pub struct Mixture {
    pub components: Vec<(Reactant, f64)>,
    /// charge loading density, g/cm³
    pub initial_density: f64,
}

impl Mixture {
    pub fn new(
        components: Vec<(Reactant, f64)>,
        initial_density: f64,
    ) -> Result<Self, KiDetError> {
        if components.is_empty() {
            return Err(KiDetError::InvalidComposition(
                "mixture has no components".to_string(),
            ));
        }
        if !(initial_density > 0.0) {
            return Err(KiDetError::InvalidComposition(format!(
                "initial density must be positive, got {}",
                initial_density
            )));
        }
        let mut total = 0.0;
        for (r, w) in &components {
            if !(*w > 0.0) {
                return Err(KiDetError::InvalidComposition(format!(
                    "mass fraction of {} must be positive, got {}",
                    r.name, w
                )));
            }
            total += w;
        }
        let components = components
            .into_iter()
            .map(|(r, w)| (r, w / total))
            .collect();
        Ok(Mixture {
            components,
            initial_density,
        })
    }

    /// initial specific volume, cm³/kg
    pub fn initial_volume(&self) -> f64 {
        1000.0 / self.initial_density
    }

    /// elemental abundance vector b0 in mol of atoms per kg of mixture
    pub fn element_totals(&self) -> BTreeMap<String, f64> {
        let mut totals: BTreeMap<String, f64> = BTreeMap::new();
        for (r, w) in &self.components {
            // moles of reactant per kg of mixture
            let n_r = w * 1000.0 / r.molar_mass;
            for (el, count) in &r.composition {
                *totals.entry(el.clone()).or_insert(0.0) += n_r * count;
            }
        }
        totals
    }

    pub fn elements(&self) -> BTreeSet<String> {
        self.element_totals().into_keys().collect()
    }

    /// specific internal energy of the unreacted charge, J/kg. The cold charge
    /// carries only chemical energy: formation enthalpies of the ingredients at
    /// 298.15 K, the pV term of a solid at 1 atm being negligible.
    pub fn specific_energy(&self) -> f64 {
        self.components
            .iter()
            .map(|(r, w)| w * 1000.0 / r.molar_mass * r.dh_formation)
            .sum()
    }
}
