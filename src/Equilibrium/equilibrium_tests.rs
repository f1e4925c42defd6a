use crate::Eos::{Bkw, EosEnum, IdealGas};
use crate::Equilibrium::gibbs::GibbsSolver;
use crate::Equilibrium::phases::{PhaseManager, PhaseState};
use crate::Thermochemistry::mixture::Mixture;
use crate::Thermochemistry::species_lib::SpeciesLibrary;
use crate::Thermochemistry::species_thermo::R;
use crate::errors::KiDetError;
use approx::assert_relative_eq;

fn solver_for(components: &[(&str, f64)], rho: f64, eos: EosEnum) -> GibbsSolver {
    let lib = SpeciesLibrary::built_in().unwrap();
    let comps = components
        .iter()
        .map(|(name, w)| (lib.get_reactant(name).unwrap().clone(), *w))
        .collect();
    let mix = Mixture::new(comps, rho).unwrap();
    let candidates = lib.products_for_elements(&mix.elements());
    GibbsSolver::new(candidates, &mix.element_totals(), eos).unwrap()
}

#[test]
fn test_single_element_gas_reduces_to_stoichiometry() {
    // pure nitrogen at a mild temperature: all atoms pair up, n_N2 = b_N / 2
    let lib = SpeciesLibrary::built_in().unwrap();
    let candidates = vec![
        lib.get_product("N2").unwrap().clone(),
        lib.get_product("N").unwrap().clone(),
    ];
    let b0 = [("N".to_string(), 50.0)].into_iter().collect();
    let solver = GibbsSolver::new(candidates, &b0, IdealGas.into()).unwrap();
    let active = solver.gas_only_active();
    let state = solver.solve_tv(1500.0, 1.0e6, &active, None).unwrap();
    let j_n2 = solver.species.iter().position(|s| s.name == "N2").unwrap();
    assert_relative_eq!(state.n[j_n2], 25.0, max_relative = 1e-8);
}

#[test]
fn test_dissociation_satisfies_mass_action() {
    // N2 = 2 N at 4000 K, ideal gas: the converged moles must reproduce
    // Kp = exp(-(2 g_N - g_N2)/RT) exactly
    let lib = SpeciesLibrary::built_in().unwrap();
    let candidates = vec![
        lib.get_product("N2").unwrap().clone(),
        lib.get_product("N").unwrap().clone(),
    ];
    let b0 = [("N".to_string(), 50.0)].into_iter().collect();
    let solver = GibbsSolver::new(candidates, &b0, IdealGas.into()).unwrap();
    let active = solver.gas_only_active();
    let t = 4000.0;
    let state = solver.solve_tp(t, 101325.0, &active, None).unwrap();
    let j_n2 = solver.species.iter().position(|s| s.name == "N2").unwrap();
    let j_n = solver.species.iter().position(|s| s.name == "N").unwrap();
    let v_gas = solver.gas_volume(state.v, &state.n, &state.active);
    let p_n2 = state.n[j_n2] * R * t * 1e6 / v_gas / 101325.0;
    let p_n = state.n[j_n] * R * t * 1e6 / v_gas / 101325.0;
    let dg = 2.0 * solver.species[j_n].thermo.dg(t).unwrap()
        - solver.species[j_n2].thermo.dg(t).unwrap();
    let kp = (-dg / (R * t)).exp();
    assert_relative_eq!(p_n * p_n / p_n2, kp, max_relative = 1e-5);
}

#[test]
fn test_stoichiometric_hydrogen_oxygen_burns_to_water() {
    // cold stoichiometric H2/O2 at 1 atm: the equilibrium gas is water
    let solver = solver_for(
        &[("Hydrogen", 0.1119), ("Oxygen", 0.8881)],
        1.0,
        IdealGas.into(),
    );
    let mut pm = PhaseManager::new(&solver);
    let state = pm
        .equilibrate(&solver, |active, warm| {
            solver.solve_tp(298.15, 101325.0, active, warm)
        })
        .unwrap();
    let x_h2o = solver
        .gas_mole_fractions(&state)
        .into_iter()
        .find(|(name, _)| name == "H2O")
        .unwrap()
        .1;
    assert!(
        x_h2o > 0.95,
        "expected nearly pure water vapor, got x_H2O = {}",
        x_h2o
    );
}

#[test]
fn test_element_conservation_in_dense_tnt_products() {
    let solver = solver_for(&[("TNT", 1.0)], 1.63, Bkw::bkw_tnt().into());
    let mut pm = PhaseManager::new(&solver);
    let state = pm
        .equilibrate(&solver, |active, warm| {
            solver.solve_tv(3500.0, 450.0, active, warm)
        })
        .unwrap();
    for (i, el) in solver.elements.iter().enumerate() {
        let total: f64 = (0..solver.species.len())
            .map(|j| solver.a[(i, j)] * state.n[j])
            .sum();
        assert_relative_eq!(total, solver.b0[i], max_relative = 1e-6);
        assert!(total > 0.0, "element {} vanished", el);
    }
    assert!(state.p > 1e9, "dense TNT products sit at GPa pressures");
}

#[test]
fn test_oxygen_poor_tnt_precipitates_graphite() {
    // TNT has far too little oxygen to gasify all carbon
    let solver = solver_for(&[("TNT", 1.0)], 1.63, Bkw::bkw_tnt().into());
    let mut pm = PhaseManager::new(&solver);
    let state = pm
        .equilibrate(&solver, |active, warm| {
            solver.solve_tv(3500.0, 450.0, active, warm)
        })
        .unwrap();
    let j_gr = solver
        .species
        .iter()
        .position(|s| s.name == "C(gr)")
        .unwrap();
    assert_eq!(pm.states[j_gr], PhaseState::Admitted);
    assert!(
        state.n[j_gr] > 1.0,
        "TNT should free several mol/kg of solid carbon, got {}",
        state.n[j_gr]
    );
}

#[test]
fn test_warm_start_is_idempotent() {
    let solver = solver_for(&[("TNT", 1.0)], 1.63, Bkw::bkw_tnt().into());
    let mut pm = PhaseManager::new(&solver);
    let state = pm
        .equilibrate(&solver, |active, warm| {
            solver.solve_tv(3500.0, 450.0, active, warm)
        })
        .unwrap();
    let again = solver
        .solve_tv(3500.0, 450.0, &state.active, Some(&state))
        .unwrap();
    for j in 0..solver.species.len() {
        if state.n[j] > 1e-10 {
            assert_relative_eq!(again.n[j], state.n[j], max_relative = 1e-6);
        }
    }
    assert!(again.iterations <= 5, "warm restart should converge at once");
}

#[test]
fn test_aluminum_binds_oxygen_into_alumina() {
    // aluminized RDX: alumina condenses and strips oxygen from CO2
    let t = 3000.0;
    let p = 1.0e9;
    let plain = solver_for(&[("RDX", 1.0)], 1.80, Bkw::bkw_rdx().into());
    let mut pm_plain = PhaseManager::new(&plain);
    let state_plain = pm_plain
        .equilibrate(&plain, |active, warm| plain.solve_tp(t, p, active, warm))
        .unwrap();

    let alu = solver_for(
        &[("RDX", 0.80), ("Aluminum", 0.20)],
        1.85,
        Bkw::bkw_rdx().into(),
    );
    let mut pm_alu = PhaseManager::new(&alu);
    let state_alu = pm_alu
        .equilibrate(&alu, |active, warm| alu.solve_tp(t, p, active, warm))
        .unwrap();

    let j_al2o3 = alu
        .species
        .iter()
        .position(|s| s.name == "Al2O3(s)")
        .unwrap();
    assert_eq!(pm_alu.states[j_al2o3], PhaseState::Admitted);
    assert!(state_alu.n[j_al2o3] > 1.0);

    let x_co2 = |solver: &GibbsSolver, state: &_| {
        solver
            .gas_mole_fractions(state)
            .into_iter()
            .find(|(name, _)| name == "CO2")
            .unwrap()
            .1
    };
    assert!(
        x_co2(&alu, &state_alu) < x_co2(&plain, &state_plain),
        "alumina formation must deplete CO2"
    );
}

#[test]
fn test_internal_energy_grows_with_temperature() {
    let solver = solver_for(&[("TNT", 1.0)], 1.63, Bkw::bkw_tnt().into());
    let active = solver.gas_only_active();
    let s1 = solver.solve_tv(3000.0, 450.0, &active, None).unwrap();
    let s2 = solver.solve_tv(3500.0, 450.0, &active, Some(&s1)).unwrap();
    let u1 = solver.internal_energy(&s1).unwrap();
    let u2 = solver.internal_energy(&s2).unwrap();
    assert!(u2 > u1);
    let cv = solver.heat_capacity_cv(&s1).unwrap();
    assert!(cv > 0.0);
}

#[test]
fn test_fixed_pressure_mode_hits_the_target() {
    let solver = solver_for(&[("TNT", 1.0)], 1.63, Bkw::bkw_tnt().into());
    let active = solver.gas_only_active();
    let state = solver.solve_tp(3200.0, 5.0e9, &active, None).unwrap();
    assert_relative_eq!(state.p, 5.0e9, max_relative = 1e-6);
}

#[test]
fn test_fixed_energy_mode_recovers_the_temperature() {
    // solve (T, V), take its energy, and ask the (V, E) mode to find T back
    let solver = solver_for(&[("TNT", 1.0)], 1.63, Bkw::bkw_tnt().into());
    let active = solver.gas_only_active();
    let reference = solver.solve_tv(3400.0, 480.0, &active, None).unwrap();
    let e = solver.internal_energy(&reference).unwrap();
    let state = solver.solve_ve(480.0, e, 2800.0, &active, None).unwrap();
    assert_relative_eq!(state.t, 3400.0, epsilon = 1.0);
}

#[test]
fn test_non_convergence_carries_diagnostics() {
    let mut solver = solver_for(&[("TNT", 1.0)], 1.63, Bkw::bkw_tnt().into());
    solver.max_iter = 2;
    let active = solver.gas_only_active();
    let err = solver.solve_tv(3500.0, 450.0, &active, None).unwrap_err();
    match &err {
        KiDetError::NonConvergence {
            iterations,
            residual,
            ..
        } => {
            assert_eq!(*iterations, 2);
            assert!(residual.is_finite());
        }
        other => panic!("expected NonConvergence, got {:?}", other),
    }
    assert!(err.diagnostics().is_some());
}

#[test]
fn test_covolume_gap_is_rejected_for_bkw() {
    let lib = SpeciesLibrary::built_in().unwrap();
    let mut n2 = lib.get_product("N2").unwrap().clone();
    n2.covolume = 0.0;
    let b0 = [("N".to_string(), 50.0)].into_iter().collect();
    let err = GibbsSolver::new(vec![n2.clone()], &b0, Bkw::bkw_tnt().into()).unwrap_err();
    assert!(matches!(err, KiDetError::UnsupportedEosCombination(_)));
    // the same species under the ideal gas is fine
    assert!(GibbsSolver::new(vec![n2], &b0, IdealGas.into()).is_ok());
}
