/// parsing of chemical formulae into atomic composition, molar masses and
/// element incidence matrices
pub mod molmass;
/// NASA7 two-range polynomial thermodynamics of a single species
pub mod species_thermo;
/// built-in library of product species and energetic reactants
pub mod species_lib;
/// reactant mixture normalized to 1 kg basis: elemental totals and initial energy
pub mod mixture;
