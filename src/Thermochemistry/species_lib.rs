use crate::Thermochemistry::molmass::calculate_molar_mass;
use crate::Thermochemistry::species_thermo::{Phase, SpeciesThermo};
use crate::errors::KiDetError;
use prettytable::{Table, row};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// One product species of the equilibrium calculation.
///
/// `covolume` is the BKW geometric covolume in cm³/mol (gas species only, 0.0
/// means "no covolume data"); `molar_volume` is the molar volume of a condensed
/// species in cm³/mol, 0.0 for gases. The atomic composition and molar mass are
/// recomputed from the formula on load so the library file cannot contradict
/// itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Species {
    pub name: String,
    pub formula: String,
    pub phase: Phase,
    pub covolume: f64,
    pub molar_volume: f64,
    pub thermo: SpeciesThermo,
    #[serde(skip)]
    pub molar_mass: f64,
    #[serde(skip)]
    pub composition: BTreeMap<String, f64>,
}

impl Species {
    fn finalize(&mut self) -> Result<(), KiDetError> {
        let (molar_mass, composition) = calculate_molar_mass(&self.formula)?;
        self.molar_mass = molar_mass;
        self.composition = composition;
        Ok(())
    }
}

/// An energetic reactant: formula, standard heat of formation in J/mol and
/// crystal (theoretical maximum) density in g/cm³.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reactant {
    pub name: String,
    pub formula: String,
    /// heat of formation at 298.15 K, J/mol
    pub dh_formation: f64,
    /// crystal density, g/cm³
    pub density: f64,
    #[serde(skip)]
    pub molar_mass: f64,
    #[serde(skip)]
    pub composition: BTreeMap<String, f64>,
}

impl Reactant {
    fn finalize(&mut self) -> Result<(), KiDetError> {
        let (molar_mass, composition) = calculate_molar_mass(&self.formula)?;
        self.molar_mass = molar_mass;
        self.composition = composition;
        Ok(())
    }
}

const SPECIES_BASE: &str = include_str!("species_base.json");

/// Library of product species and reactants. The JSON storage keeps species in
/// arrays, not maps, so that the declaration order of the file is the order
/// every solver sees them in: identical inputs give identical species
/// orderings and therefore identical iteration histories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeciesLibrary {
    pub products: Vec<Species>,
    pub reactants: Vec<Reactant>,
}

impl SpeciesLibrary {
    /// library embedded in the binary; always available, no file system access
    pub fn built_in() -> Result<Self, KiDetError> {
        Self::from_json(SPECIES_BASE)
    }

    pub fn from_json(json: &str) -> Result<Self, KiDetError> {
        let mut lib: SpeciesLibrary = serde_json::from_str(json)?;
        for sp in &mut lib.products {
            sp.finalize()?;
        }
        for r in &mut lib.reactants {
            r.finalize()?;
        }
        Ok(lib)
    }

    pub fn load(path: &Path) -> Result<Self, KiDetError> {
        let file = File::open(path)?;
        let mut lib: SpeciesLibrary = serde_json::from_reader(BufReader::new(file))?;
        for sp in &mut lib.products {
            sp.finalize()?;
        }
        for r in &mut lib.reactants {
            r.finalize()?;
        }
        Ok(lib)
    }

    pub fn save(&self, path: &Path) -> Result<(), KiDetError> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }

    pub fn get_product(&self, name: &str) -> Result<&Species, KiDetError> {
        self.products
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| KiDetError::SubstanceNotFound(name.to_string()))
    }

    pub fn get_reactant(&self, name: &str) -> Result<&Reactant, KiDetError> {
        self.reactants
            .iter()
            .find(|r| r.name == name)
            .ok_or_else(|| KiDetError::SubstanceNotFound(name.to_string()))
    }

    /// Product species whose composition only uses the given elements, in
    /// library order. This is the candidate set the equilibrium solver works
    /// with for a mixture containing exactly those elements.
    pub fn products_for_elements(&self, elements: &BTreeSet<String>) -> Vec<Species> {
        self.products
            .iter()
            .filter(|sp| sp.composition.keys().all(|el| elements.contains(el)))
            .cloned()
            .collect()
    }

    /// human-readable table of the product species
    pub fn pretty_print_products(&self) {
        let mut table = Table::new();
        table.add_row(row![
            "species", "formula", "phase", "M, g/mol", "k, cm3/mol", "v, cm3/mol", "T range, K"
        ]);
        for sp in &self.products {
            let (t_min, t_max) = sp.thermo.t_range();
            table.add_row(row![
                sp.name,
                sp.formula,
                format!("{:?}", sp.phase),
                format!("{:.3}", sp.molar_mass),
                format!("{:.0}", sp.covolume),
                format!("{:.1}", sp.molar_volume),
                format!("{:.0} - {:.0}", t_min, t_max)
            ]);
        }
        table.printstd();
    }

    /// human-readable table of the reactants
    pub fn pretty_print_reactants(&self) {
        let mut table = Table::new();
        table.add_row(row![
            "reactant", "formula", "M, g/mol", "dHf, kJ/mol", "rho, g/cm3"
        ]);
        for r in &self.reactants {
            table.add_row(row![
                r.name,
                r.formula,
                format!("{:.3}", r.molar_mass),
                format!("{:.2}", r.dh_formation / 1000.0),
                format!("{:.3}", r.density)
            ]);
        }
        table.printstd();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_built_in_library_loads_and_is_consistent() {
        let lib = SpeciesLibrary::built_in().unwrap();
        assert!(lib.products.len() >= 15);
        assert!(lib.reactants.len() >= 7);

        let h2o = lib.get_product("H2O").unwrap();
        assert_relative_eq!(h2o.molar_mass, 18.015, epsilon = 1e-2);
        assert_eq!(h2o.phase, Phase::Gas);
        assert!(h2o.covolume > 0.0);

        let graphite = lib.get_product("C(gr)").unwrap();
        assert!(graphite.phase.is_condensed());
        assert!(graphite.molar_volume > 0.0);

        let rdx = lib.get_reactant("RDX").unwrap();
        assert_relative_eq!(rdx.molar_mass, 222.12, epsilon = 0.1);
        assert_eq!(rdx.composition["N"], 6.0);
    }

    #[test]
    fn test_formation_enthalpies_of_products() {
        // dh(298.15) of a product is its heat of formation; reference values
        // in kJ/mol from the JANAF tables
        let lib = SpeciesLibrary::built_in().unwrap();
        let cases = [
            ("H2O", -241.83),
            ("CO2", -393.52),
            ("CO", -110.53),
            ("OH", 38.99),
            ("NO", 90.29),
            ("NH3", -45.90),
            ("CH4", -74.87),
        ];
        for (name, dhf_kj) in cases {
            let sp = lib.get_product(name).unwrap();
            let dh = sp.thermo.dh(298.15).unwrap() / 1000.0;
            assert_relative_eq!(dh, dhf_kj, epsilon = 1.0);
        }
        // elements in their reference state have zero formation enthalpy
        for name in ["N2", "O2", "H2", "C(gr)", "Al(cr)"] {
            let sp = lib.get_product(name).unwrap();
            assert!(
                sp.thermo.dh(298.15).unwrap().abs() < 500.0,
                "{} should have ~0 formation enthalpy",
                name
            );
        }
    }

    #[test]
    fn test_products_for_elements_filters_and_keeps_order() {
        let lib = SpeciesLibrary::built_in().unwrap();
        let chno: BTreeSet<String> = ["C", "H", "N", "O"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let subset = lib.products_for_elements(&chno);
        let names: Vec<&str> = subset.iter().map(|s| s.name.as_str()).collect();
        assert!(names.contains(&"CO2"));
        assert!(names.contains(&"C(gr)"));
        assert!(!names.contains(&"Al2O3(s)"));
        // library order is preserved
        let full_order: Vec<&str> = lib.products.iter().map(|s| s.name.as_str()).collect();
        let mut last = 0;
        for name in &names {
            let pos = full_order.iter().position(|n| n == name).unwrap();
            assert!(pos >= last);
            last = pos;
        }
    }

    #[test]
    fn test_save_load_round_trip() {
        let lib = SpeciesLibrary::built_in().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("species.json");
        lib.save(&path).unwrap();
        let reloaded = SpeciesLibrary::load(&path).unwrap();
        assert_eq!(reloaded.products.len(), lib.products.len());
        assert_eq!(reloaded.reactants.len(), lib.reactants.len());
        let n2 = reloaded.get_product("N2").unwrap();
        assert_relative_eq!(n2.molar_mass, 28.014, epsilon = 1e-2);
        assert_relative_eq!(
            n2.thermo.Cp(1500.0).unwrap(),
            lib.get_product("N2").unwrap().thermo.Cp(1500.0).unwrap(),
            max_relative = 1e-14
        );
    }

    #[test]
    fn test_unknown_names_are_reported() {
        let lib = SpeciesLibrary::built_in().unwrap();
        assert!(matches!(
            lib.get_product("XeF6"),
            Err(KiDetError::SubstanceNotFound(_))
        ));
        assert!(matches!(
            lib.get_reactant("Octol"),
            Err(KiDetError::SubstanceNotFound(_))
        ));
    }
}
