use crate::errors::KiDetError;
use nalgebra::DMatrix;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};

// Define a struct to hold element data
pub struct Element {
    name: &'static str,
    atomic_mass: f64,
}

// Define a list of elements and their atomic masses
const ELEMENTS: &[Element] = &[
    Element {
        name: "H",
        atomic_mass: 1.008,
    },
    Element {
        name: "He",
        atomic_mass: 4.0026,
    },
    Element {
        name: "Li",
        atomic_mass: 6.94,
    },
    Element {
        name: "Be",
        atomic_mass: 9.0122,
    },
    Element {
        name: "B",
        atomic_mass: 10.81,
    },
    Element {
        name: "C",
        atomic_mass: 12.011,
    },
    Element {
        name: "N",
        atomic_mass: 14.007,
    },
    Element {
        name: "O",
        atomic_mass: 15.999,
    },
    Element {
        name: "F",
        atomic_mass: 18.998,
    },
    Element {
        name: "Na",
        atomic_mass: 22.99,
    },
    Element {
        name: "Mg",
        atomic_mass: 24.305,
    },
    Element {
        name: "Al",
        atomic_mass: 26.98,
    },
    Element {
        name: "Si",
        atomic_mass: 28.085,
    },
    Element {
        name: "P",
        atomic_mass: 30.974,
    },
    Element {
        name: "S",
        atomic_mass: 32.065,
    },
    Element {
        name: "Cl",
        atomic_mass: 35.45,
    },
    Element {
        name: "Ar",
        atomic_mass: 39.948,
    },
    Element {
        name: "K",
        atomic_mass: 39.102,
    },
    Element {
        name: "Ca",
        atomic_mass: 40.08,
    },
    Element {
        name: "Ti",
        atomic_mass: 47.867,
    },
    Element {
        name: "Fe",
        atomic_mass: 55.845,
    },
    Element {
        name: "Cu",
        atomic_mass: 63.546,
    },
    Element {
        name: "Zn",
        atomic_mass: 65.38,
    },
    Element {
        name: "Zr",
        atomic_mass: 91.224,
    },
];

pub fn atomic_mass(symbol: &str) -> Option<f64> {
    ELEMENTS
        .iter()
        .find(|e| e.name == symbol)
        .map(|e| e.atomic_mass)
}

/// phase marks like (g), (s), (L) attached to formulae in the libraries carry no
/// compositional information and are stripped before parsing
fn filter_phases_marks(formula: &str) -> String {
    let mut formula = formula.to_string();
    let phases = [
        "(C)", "(c)", "(L)", "(l)", "(G)", "(g)", "(S)", "(s)", "(cr)", "(gr)",
    ];
    for phase in phases {
        formula = formula.replace(phase, "");
    }
    formula
}

/// Parse a chemical formula into a map of elements and their (possibly fractional)
/// atom counts. Fractional stoichiometry is common for polymeric binders given per
/// average monomer unit, e.g. "C7.33H10.98O0.06". Brackets with a trailing multiplier
/// are supported: Al2(SO4)3, Ca(NO3)2.
pub fn parse_formula(formula: &str) -> Result<BTreeMap<String, f64>, KiDetError> {
    let formula = filter_phases_marks(&formula.replace(' ', ""));
    if formula.is_empty() {
        return Err(KiDetError::InvalidComposition(
            "empty formula string".to_string(),
        ));
    }
    let token_re = Regex::new(r"([A-Z][a-z]?)(\d+\.?\d*)?|(\()|(\))(\d+\.?\d*)?")
        .expect("formula tokenizer regex is valid");
    // stack of open bracket groups, innermost last
    let mut stack: Vec<BTreeMap<String, f64>> = vec![BTreeMap::new()];
    let mut consumed = 0usize;
    for cap in token_re.captures_iter(&formula) {
        let whole = cap.get(0).unwrap();
        if whole.start() != consumed {
            return Err(KiDetError::InvalidComposition(format!(
                "cannot parse formula '{}' near position {}",
                formula, consumed
            )));
        }
        consumed = whole.end();
        if let Some(symbol) = cap.get(1) {
            let symbol = symbol.as_str();
            if atomic_mass(symbol).is_none() {
                return Err(KiDetError::InvalidComposition(format!(
                    "unknown element '{}' in formula '{}'",
                    symbol, formula
                )));
            }
            let count: f64 = match cap.get(2) {
                Some(c) => c.as_str().parse().map_err(|_| {
                    KiDetError::InvalidComposition(format!(
                        "bad stoichiometric coefficient in '{}'",
                        formula
                    ))
                })?,
                None => 1.0,
            };
            *stack
                .last_mut()
                .unwrap()
                .entry(symbol.to_string())
                .or_insert(0.0) += count;
        } else if cap.get(3).is_some() {
            stack.push(BTreeMap::new());
        } else if cap.get(4).is_some() {
            let group = stack.pop().ok_or_else(|| {
                KiDetError::InvalidComposition(format!("unbalanced ')' in '{}'", formula))
            })?;
            if stack.is_empty() {
                return Err(KiDetError::InvalidComposition(format!(
                    "unbalanced ')' in '{}'",
                    formula
                )));
            }
            let mult: f64 = match cap.get(5) {
                Some(c) => c.as_str().parse().unwrap_or(1.0),
                None => 1.0,
            };
            for (el, count) in group {
                *stack.last_mut().unwrap().entry(el).or_insert(0.0) += count * mult;
            }
        }
    }
    if consumed != formula.len() {
        return Err(KiDetError::InvalidComposition(format!(
            "cannot parse formula '{}' near position {}",
            formula, consumed
        )));
    }
    if stack.len() != 1 {
        return Err(KiDetError::InvalidComposition(format!(
            "unbalanced '(' in '{}'",
            formula
        )));
    }
    let counts = stack.pop().unwrap();
    if counts.is_empty() {
        return Err(KiDetError::InvalidComposition(format!(
            "no elements found in '{}'",
            formula
        )));
    }
    Ok(counts)
}

/// molar mass in g/mol together with the parsed atomic composition
pub fn calculate_molar_mass(formula: &str) -> Result<(f64, BTreeMap<String, f64>), KiDetError> {
    let counts = parse_formula(formula)?;
    let mut molar_mass = 0.0;
    for (element, count) in &counts {
        // parse_formula already rejected unknown element symbols
        molar_mass += atomic_mass(element).unwrap() * count;
    }
    Ok((molar_mass, counts))
}

/// Element incidence matrix for a list of formulae: row i = element i, column j =
/// atoms of element i in one molecule of species j. The element ordering is the
/// sorted union of all element symbols so that repeated runs see identical
/// matrices (solver determinism depends on it).
pub fn create_elem_composition_matrix(
    vec_of_formulae: &[&str],
) -> Result<(DMatrix<f64>, Vec<String>), KiDetError> {
    let mut compositions: Vec<BTreeMap<String, f64>> = Vec::new();
    let mut unique: BTreeMap<String, ()> = BTreeMap::new();
    for formula in vec_of_formulae {
        let counts = parse_formula(formula)?;
        for el in counts.keys() {
            unique.insert(el.clone(), ());
        }
        compositions.push(counts);
    }
    let elements: Vec<String> = unique.into_keys().collect();
    let mut matrix = DMatrix::zeros(elements.len(), vec_of_formulae.len());
    for (j, counts) in compositions.iter().enumerate() {
        for (i, el) in elements.iter().enumerate() {
            if let Some(&count) = counts.get(el) {
                matrix[(i, j)] = count;
            }
        }
    }
    Ok((matrix, elements))
}

/// convenience wrapper returning a HashMap for callers that do not care about ordering
pub fn parse_formula_map(formula: &str) -> Result<HashMap<String, f64>, KiDetError> {
    Ok(parse_formula(formula)?.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_parse_formula() {
        let counts = parse_formula("C6H8O6").unwrap();
        assert_eq!(counts["C"], 6.0);
        assert_eq!(counts["H"], 8.0);
        assert_eq!(counts["O"], 6.0);

        let counts = parse_formula("Na(NO3)2").unwrap();
        assert_eq!(counts["Na"], 1.0);
        assert_eq!(counts["N"], 2.0);
        assert_eq!(counts["O"], 6.0);

        let counts = parse_formula("H2O").unwrap();
        assert_eq!(counts["H"], 2.0);
        assert_eq!(counts["O"], 1.0);
    }

    #[test]
    fn test_fractional_binder_formula() {
        // HTPB-type binder given per average monomer unit
        let counts = parse_formula("C7.33H10.98O0.06").unwrap();
        assert_relative_eq!(counts["C"], 7.33, epsilon = 1e-12);
        assert_relative_eq!(counts["H"], 10.98, epsilon = 1e-12);
        assert_relative_eq!(counts["O"], 0.06, epsilon = 1e-12);
    }

    #[test]
    fn test_phase_marks_are_stripped() {
        let counts = parse_formula("C(gr)").unwrap();
        assert_eq!(counts.len(), 1);
        assert_eq!(counts["C"], 1.0);
        let counts = parse_formula("H2O(g)").unwrap();
        assert_eq!(counts["H"], 2.0);
    }

    #[test]
    fn test_calculate_molar_mass() {
        let (molar_mass, _) = calculate_molar_mass("H2O").unwrap();
        assert_relative_eq!(molar_mass, 18.015, epsilon = 1e-2);

        let (molar_mass, _) = calculate_molar_mass("C7H5N3O6").unwrap();
        assert_relative_eq!(molar_mass, 227.13, epsilon = 1e-1);

        let (molar_mass, _) = calculate_molar_mass("Ca(NO3)2").unwrap();
        assert_relative_eq!(molar_mass, 164.093, epsilon = 1e-2);
    }

    #[test]
    fn test_invalid_formulae() {
        assert!(parse_formula("").is_err());
        assert!(parse_formula("Xx2O").is_err());
        assert!(parse_formula("H2(O").is_err());
        assert!(parse_formula("H2)O").is_err());
    }

    #[test]
    fn test_element_matrix() {
        let formulae = vec!["H2O", "CO2", "C3H8", "CH4"];
        let (matrix, elements) = create_elem_composition_matrix(&formulae).unwrap();
        assert_eq!(elements, vec!["C", "H", "O"]);
        assert_eq!(matrix.nrows(), 3);
        assert_eq!(matrix.ncols(), 4);
        // column of CO2: 1 C, 0 H, 2 O
        assert_eq!(matrix[(0, 1)], 1.0);
        assert_eq!(matrix[(1, 1)], 0.0);
        assert_eq!(matrix[(2, 1)], 2.0);
    }

    #[test]
    fn test_element_matrix_is_deterministic() {
        let formulae = vec!["C7H5N3O6", "Al2O3", "H2O"];
        let (m1, e1) = create_elem_composition_matrix(&formulae).unwrap();
        let (m2, e2) = create_elem_composition_matrix(&formulae).unwrap();
        assert_eq!(e1, e2);
        assert_eq!(m1, m2);
    }
}
