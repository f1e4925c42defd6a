use crate::Eos::{Bkw, EosEnum, EosModel, IdealGas};
use crate::Thermochemistry::species_thermo::R;
use approx::assert_relative_eq;

// detonation-product-like gas: N2, H2O, CO2, CO on the mol/kg basis
const N: [f64; 4] = [8.5, 11.0, 4.0, 7.0];
const K: [f64; 4] = [380.0, 250.0, 600.0, 390.0];

#[test]
fn test_ideal_gas_law_molar_volume() {
    let eos = IdealGas;
    // 1 mol in 22414 cm3 at 273.15 K is 1 atm
    let p = eos.pressure(273.15, 22414.0, &[1.0], &[0.0]);
    assert_relative_eq!(p, 101325.0, max_relative = 1e-3);
    assert_eq!(eos.residual_energy(273.15, 22414.0, &[1.0], &[0.0]), 0.0);
}

#[test]
fn test_bkw_recovers_ideal_gas_at_large_volume() {
    let bkw = Bkw::bkw_tnt();
    let ideal = IdealGas;
    let t = 3000.0;
    let v = 1.0e7; // cm3/kg, essentially vacuum
    let p_bkw = bkw.pressure(t, v, &N, &K);
    let p_id = ideal.pressure(t, v, &N, &K);
    assert_relative_eq!(p_bkw, p_id, max_relative = 1e-3);
    // the residuals decay like 1/V; measure them against the thermal scales
    // n·R·T and n·R rather than an absolute cutoff
    let n_tot: f64 = N.iter().sum();
    assert!(bkw.residual_energy(t, v, &N, &K).abs() < 1e-3 * n_tot * R * t);
    assert!(bkw.residual_entropy(t, v, &N, &K).abs() < 1e-3 * n_tot * R);
    assert!(bkw.mu_correction(t, v, &N, &K).amax() < 1e-2);
}

#[test]
fn test_bkw_dense_state_is_strongly_non_ideal() {
    // CJ-like state of TNT: ~0.75 of the initial solid volume
    let bkw = Bkw::bkw_tnt();
    let t = 3500.0;
    let v = 450.0;
    let p_bkw = bkw.pressure(t, v, &N, &K);
    let p_id = IdealGas.pressure(t, v, &N, &K);
    assert!(p_bkw > 5.0 * p_id, "dense BKW pressure must dwarf ideal");
    assert!(p_bkw > 1.0e10, "CJ pressures are tens of GPa");
    assert!(bkw.residual_energy(t, v, &N, &K) > 0.0);
    assert!(bkw.residual_entropy(t, v, &N, &K) < 0.0);
}

#[test]
fn test_bkw_pressure_derivatives_match_finite_differences() {
    let bkw = Bkw::bkw_rdx();
    let (t, v) = (4000.0, 500.0);
    let dp_dt = bkw.dp_dt(t, v, &N, &K);
    let dp_dv = bkw.dp_dv(t, v, &N, &K);
    let h = 1e-3;
    let num_t = (bkw.pressure(t + h, v, &N, &K) - bkw.pressure(t - h, v, &N, &K)) / (2.0 * h);
    let num_v = (bkw.pressure(t, v + h, &N, &K) - bkw.pressure(t, v - h, &N, &K)) / (2.0 * h);
    assert_relative_eq!(dp_dt, num_t, max_relative = 1e-6);
    assert_relative_eq!(dp_dv, num_v, max_relative = 1e-6);
    assert!(dp_dv < 0.0);
    assert!(dp_dt > 0.0);
}

#[test]
fn test_bkw_mu_jacobian_is_symmetric_and_matches_finite_differences() {
    let bkw = Bkw::bkw_tnt();
    let (t, v) = (3500.0, 450.0);
    let jac = bkw.mu_correction_jacobian(t, v, &N, &K);
    for j in 0..N.len() {
        for k in 0..N.len() {
            assert_relative_eq!(jac[(j, k)], jac[(k, j)], max_relative = 1e-12);
        }
    }
    let h = 1e-6;
    for k in 0..N.len() {
        let mut np = N;
        np[k] += h;
        let mut nm = N;
        nm[k] -= h;
        let cp = bkw.mu_correction(t, v, &np, &K);
        let cm = bkw.mu_correction(t, v, &nm, &K);
        for j in 0..N.len() {
            let num = (cp[j] - cm[j]) / (2.0 * h);
            assert_relative_eq!(jac[(j, k)], num, max_relative = 1e-4);
        }
    }
}

#[test]
fn test_bkw_residual_cv_matches_energy_slope() {
    let bkw = Bkw::bkws();
    let (t, v) = (3800.0, 480.0);
    let cv = bkw.residual_cv(t, v, &N, &K);
    let h = 0.01;
    let num = (bkw.residual_energy(t + h, v, &N, &K) - bkw.residual_energy(t - h, v, &N, &K))
        / (2.0 * h);
    assert_relative_eq!(cv, num, max_relative = 1e-5);
}

#[test]
fn test_eos_enum_dispatch() {
    let models: Vec<EosEnum> = vec![IdealGas.into(), Bkw::bkw_tnt().into()];
    assert!(!models[0].needs_covolumes());
    assert!(models[1].needs_covolumes());
    assert_eq!(models[1].name(), "BKW-TNT");
    // at the same dense state the BKW pressure exceeds the ideal one
    let p: Vec<f64> = models
        .iter()
        .map(|m| m.pressure(3500.0, 450.0, &N, &K))
        .collect();
    assert!(p[1] > p[0]);
}
