use crate::Eos::{EosEnum, EosModel};
use crate::Thermochemistry::species_lib::Species;
use crate::Thermochemistry::species_thermo::{P_ATM, R};
use crate::errors::KiDetError;
use log::debug;
use nalgebra::{DMatrix, DVector};
use prettytable::{Table, row};
use std::collections::BTreeMap;

/// temperatures the outer iterations are allowed to visit; the polynomial
/// library covers 250 - 5000 K and boundary evaluations must stay legal
pub const T_FLOOR: f64 = 260.0;
pub const T_CEIL: f64 = 4990.0;

/// A converged equilibrium composition. Moles are indexed like the solver's
/// species list, with zeros for condensed species outside the active set;
/// `lambda` holds the element potentials (Lagrange multipliers, per RT) in the
/// solver's element order.
#[derive(Debug, Clone)]
pub struct EquilibriumState {
    pub t: f64,
    /// total specific volume, cm³/kg
    pub v: f64,
    /// pressure of the gas phase, Pa
    pub p: f64,
    pub n: DVector<f64>,
    pub lambda: DVector<f64>,
    pub active: Vec<bool>,
    pub iterations: usize,
    pub residual: f64,
}

/// Constrained Gibbs energy minimization over a fixed candidate species list.
///
/// The core problem is posed at fixed (T, V): stationarity of
/// G/RT - Σ λ_i·(Σ a_ij·n_j - b_i) in the species moles and the element
/// potentials, solved by a damped Newton iteration on the full
/// [n_active..., λ...] vector. Fixed-pressure and fixed-energy problems wrap
/// that core in an outer scalar iteration instead of enlarging the Newton
/// system, which keeps the Jacobian small and the failure diagnostics local.
///
/// Condensed species enter with an activity of one and a P·v_s Poynting term;
/// which of them are active is decided by the phase manager, not here.
#[derive(Debug, Clone)]
pub struct GibbsSolver {
    pub species: Vec<Species>,
    pub elements: Vec<String>,
    /// element incidence matrix, elements x species
    pub a: DMatrix<f64>,
    /// elemental abundances, mol of atoms per kg
    pub b0: DVector<f64>,
    pub eos: EosEnum,
    /// indices of gaseous species (always in the active set)
    pub gas_idx: Vec<usize>,
    /// indices of condensed species (activated by the phase manager)
    pub cond_idx: Vec<usize>,
    /// species index -> position in gas_idx, None for condensed
    gas_pos: Vec<Option<usize>>,
    pub step_tol: f64,
    pub elem_tol: f64,
    pub max_iter: usize,
}

impl GibbsSolver {
    /// Build a solver for the given candidate species, elemental abundances
    /// (mol of atoms per kg of mixture) and EOS model. Candidates whose
    /// composition uses elements absent from `b0` are dropped; a gas candidate
    /// without covolume data under a covolume EOS is a hard error rather than
    /// a silent ideal-gas fallback.
    pub fn new(
        candidates: Vec<Species>,
        b0: &BTreeMap<String, f64>,
        eos: EosEnum,
    ) -> Result<Self, KiDetError> {
        let elements: Vec<String> = b0.keys().cloned().collect();
        if elements.is_empty() {
            return Err(KiDetError::InvalidComposition(
                "no elements in the abundance vector".to_string(),
            ));
        }
        for (el, &b) in b0 {
            if !(b > 0.0) {
                return Err(KiDetError::InvalidComposition(format!(
                    "non-positive abundance of element {}: {}",
                    el, b
                )));
            }
        }
        let species: Vec<Species> = candidates
            .into_iter()
            .filter(|sp| {
                let fits = sp.composition.keys().all(|el| b0.contains_key(el));
                if !fits {
                    debug!("dropping candidate {}: foreign elements", sp.name);
                }
                fits
            })
            .collect();
        if species.is_empty() {
            return Err(KiDetError::InvalidComposition(
                "no candidate species match the mixture elements".to_string(),
            ));
        }
        for el in &elements {
            if !species.iter().any(|sp| sp.composition.contains_key(el)) {
                return Err(KiDetError::MissingData(format!(
                    "element {} has no carrier among the candidate species",
                    el
                )));
            }
        }
        if eos.needs_covolumes() {
            for sp in &species {
                if !sp.phase.is_condensed() && !(sp.covolume > 0.0) {
                    return Err(KiDetError::UnsupportedEosCombination(format!(
                        "{} requires a covolume for every gas species, none for {}",
                        eos.name(),
                        sp.name
                    )));
                }
            }
        }
        let mut a = DMatrix::zeros(elements.len(), species.len());
        for (j, sp) in species.iter().enumerate() {
            for (i, el) in elements.iter().enumerate() {
                if let Some(&count) = sp.composition.get(el) {
                    a[(i, j)] = count;
                }
            }
        }
        let b0_vec = DVector::from_iterator(elements.len(), b0.values().copied());
        let mut gas_idx = Vec::new();
        let mut cond_idx = Vec::new();
        let mut gas_pos = vec![None; species.len()];
        for (j, sp) in species.iter().enumerate() {
            if sp.phase.is_condensed() {
                cond_idx.push(j);
            } else {
                gas_pos[j] = Some(gas_idx.len());
                gas_idx.push(j);
            }
        }
        Ok(GibbsSolver {
            species,
            elements,
            a,
            b0: b0_vec,
            eos,
            gas_idx,
            cond_idx,
            gas_pos,
            step_tol: 1e-7,
            elem_tol: 1e-9,
            max_iter: 300,
        })
    }

    /// all condensed species inactive
    pub fn gas_only_active(&self) -> Vec<bool> {
        (0..self.species.len())
            .map(|j| !self.species[j].phase.is_condensed())
            .collect()
    }

    fn gas_arrays(&self, n: &DVector<f64>) -> (Vec<f64>, Vec<f64>) {
        let n_gas: Vec<f64> = self.gas_idx.iter().map(|&j| n[j]).collect();
        let k_gas: Vec<f64> = self.gas_idx.iter().map(|&j| self.species[j].covolume).collect();
        (n_gas, k_gas)
    }

    /// volume left to the gas phase after the condensed species took theirs
    pub fn gas_volume(&self, v: f64, n: &DVector<f64>, active: &[bool]) -> f64 {
        let v_cond: f64 = self
            .cond_idx
            .iter()
            .filter(|&&j| active[j])
            .map(|&j| n[j] * self.species[j].molar_volume)
            .sum();
        v - v_cond
    }

    /// species + element residual of the stationarity system; returns the gas
    /// pressure the residual was evaluated at
    #[allow(clippy::too_many_arguments)]
    fn eval_residual(
        &self,
        t: f64,
        v: f64,
        act: &[usize],
        active: &[bool],
        g_rt: &[f64],
        n: &DVector<f64>,
        lambda: &DVector<f64>,
        f: &mut DVector<f64>,
    ) -> Result<f64, KiDetError> {
        let n_act = act.len();
        let v_gas = self.gas_volume(v, n, active);
        if v_gas <= 1e-9 * v {
            return Err(KiDetError::NonConvergence {
                context: format!(
                    "equilibrium at T = {:.1} K, V = {:.2} cm3/kg: condensed phases fill the cell",
                    t, v
                ),
                iterations: 0,
                residual: v_gas,
            });
        }
        let (n_gas, k_gas) = self.gas_arrays(n);
        let c = self.eos.mu_correction(t, v_gas, &n_gas, &k_gas);
        let p = self.eos.pressure(t, v_gas, &n_gas, &k_gas);
        for (lj, &j) in act.iter().enumerate() {
            let sp = &self.species[j];
            let mut val = if let Some(gj) = self.gas_pos[j] {
                g_rt[lj] + (n[j] * R * t * 1e6 / (v_gas * P_ATM)).ln() + c[gj]
            } else {
                g_rt[lj] + p * sp.molar_volume * 1e-6 / (R * t)
            };
            for i in 0..self.elements.len() {
                val -= self.a[(i, j)] * lambda[i];
            }
            f[lj] = val;
        }
        for i in 0..self.elements.len() {
            let mut s = 0.0;
            for &j in act {
                s += self.a[(i, j)] * n[j];
            }
            f[n_act + i] = s - self.b0[i];
        }
        Ok(p)
    }

    /// Equilibrium at fixed temperature and total specific volume, the Newton
    /// core everything else wraps. `active` selects the condensed species that
    /// may carry moles; gas species are always part of the system.
    pub fn solve_tv(
        &self,
        t: f64,
        v: f64,
        active: &[bool],
        warm: Option<&EquilibriumState>,
    ) -> Result<EquilibriumState, KiDetError> {
        let act: Vec<usize> = (0..self.species.len())
            .filter(|&j| !self.species[j].phase.is_condensed() || active[j])
            .collect();
        let n_act = act.len();
        let n_el = self.elements.len();
        let dim = n_act + n_el;

        let mut g_rt = vec![0.0; n_act];
        for (lj, &j) in act.iter().enumerate() {
            g_rt[lj] = self.species[j].thermo.dg(t)? / (R * t);
        }

        let mut n = DVector::zeros(self.species.len());
        let mut lambda = DVector::zeros(n_el);
        if let Some(w) = warm {
            for &j in &act {
                n[j] = w.n[j].max(1e-10);
            }
            lambda.copy_from(&w.lambda);
        } else {
            let total_atoms: f64 = self.b0.iter().sum();
            let n0 = (total_atoms / (2.0 * n_act as f64)).max(1e-8);
            for &j in &act {
                n[j] = n0;
            }
        }

        let mut f = DVector::zeros(dim);
        let mut f_trial = DVector::zeros(dim);
        let mut jac: DMatrix<f64> = DMatrix::zeros(dim, dim);
        let mut p = self.eval_residual(t, v, &act, active, &g_rt, &n, &lambda, &mut f)?;

        for iter in 0..self.max_iter {
            // assemble the Jacobian at the current point; condensed rows keep
            // only the -a_ij columns (their P dependence is lagged)
            let v_gas = self.gas_volume(v, &n, active);
            let (n_gas, k_gas) = self.gas_arrays(&n);
            let jc = self.eos.mu_correction_jacobian(t, v_gas, &n_gas, &k_gas);
            jac.fill(0.0);
            for (lj, &j) in act.iter().enumerate() {
                if let Some(gj) = self.gas_pos[j] {
                    jac[(lj, lj)] += 1.0 / n[j];
                    for (lk, &k) in act.iter().enumerate() {
                        if let Some(gk) = self.gas_pos[k] {
                            jac[(lj, lk)] += jc[(gj, gk)];
                        }
                    }
                }
                for i in 0..n_el {
                    jac[(lj, n_act + i)] = -self.a[(i, j)];
                    jac[(n_act + i, lj)] = self.a[(i, j)];
                }
            }

            let delta = jac.clone().lu().solve(&(-&f)).ok_or_else(|| {
                KiDetError::SingularJacobian(format!(
                    "equilibrium at T = {:.1} K, V = {:.2} cm3/kg, iteration {}",
                    t, v, iter
                ))
            })?;

            // keep every active mole count positive
            let mut alpha: f64 = 1.0;
            for _ in 0..60 {
                let ok = act
                    .iter()
                    .enumerate()
                    .all(|(lj, &j)| n[j] + alpha * delta[lj] > 0.0);
                if ok {
                    break;
                }
                alpha *= 0.5;
            }

            // backtrack on the residual norm; a step that only grows the
            // residual is halved a few times, then taken anyway
            let f_norm = f.norm();
            let mut n_trial;
            let mut lambda_trial;
            let mut p_trial;
            loop {
                n_trial = n.clone();
                lambda_trial = lambda.clone();
                for (lj, &j) in act.iter().enumerate() {
                    n_trial[j] += alpha * delta[lj];
                }
                for i in 0..n_el {
                    lambda_trial[i] += alpha * delta[n_act + i];
                }
                match self.eval_residual(
                    t, v, &act, active, &g_rt, &n_trial, &lambda_trial, &mut f_trial,
                ) {
                    Ok(pt) if f_trial.norm() <= f_norm || alpha < 0.05 => {
                        p_trial = pt;
                        break;
                    }
                    Ok(_) => alpha *= 0.5,
                    Err(_) if alpha > 1e-6 => alpha *= 0.5,
                    Err(e) => return Err(e),
                }
            }

            let mut step_metric: f64 = 0.0;
            for (lj, &j) in act.iter().enumerate() {
                let scale = n_trial[j].abs().max(1e-12);
                step_metric = step_metric.max((alpha * delta[lj]).abs() / scale);
            }
            for i in 0..n_el {
                let scale = lambda_trial[i].abs().max(1.0);
                step_metric = step_metric.max((alpha * delta[n_act + i]).abs() / scale);
            }
            let mut elem_metric: f64 = 0.0;
            for i in 0..n_el {
                elem_metric = elem_metric.max(f_trial[n_act + i].abs() / self.b0[i].max(1e-3));
            }

            n = n_trial;
            lambda = lambda_trial;
            f.copy_from(&f_trial);
            p = p_trial;

            if step_metric < self.step_tol && elem_metric < self.elem_tol {
                let mut n_full = DVector::zeros(self.species.len());
                for &j in &act {
                    n_full[j] = n[j];
                }
                return Ok(EquilibriumState {
                    t,
                    v,
                    p,
                    n: n_full,
                    lambda,
                    active: active.to_vec(),
                    iterations: iter + 1,
                    residual: f.amax(),
                });
            }
        }
        Err(KiDetError::NonConvergence {
            context: format!("equilibrium at T = {:.1} K, V = {:.2} cm3/kg", t, v),
            iterations: self.max_iter,
            residual: f.amax(),
        })
    }

    /// Equilibrium at fixed temperature and pressure: a secant iteration on
    /// ln V around the fixed-(T, V) core until the EOS pressure matches.
    pub fn solve_tp(
        &self,
        t: f64,
        p_target: f64,
        active: &[bool],
        warm: Option<&EquilibriumState>,
    ) -> Result<EquilibriumState, KiDetError> {
        if !(p_target > 0.0) {
            return Err(KiDetError::InvalidComposition(format!(
                "target pressure must be positive, got {}",
                p_target
            )));
        }
        let n_guess = warm.map(|w| w.n.sum()).unwrap_or(40.0).max(1.0);
        let mut lnv = (n_guess * R * t / p_target * 1e6).ln();
        let mut state = self.solve_tv(t, lnv.exp(), active, warm)?;
        let mut phi = (state.p / p_target).ln();
        let mut lnv_prev = lnv;
        let mut phi_prev = phi;
        for _ in 0..50 {
            if phi.abs() < 1e-9 {
                return Ok(state);
            }
            let dlnv = if (phi - phi_prev).abs() > 1e-14 && (lnv - lnv_prev).abs() > 0.0 {
                -phi * (lnv - lnv_prev) / (phi - phi_prev)
            } else {
                // pressure falls with volume, so move with the sign of phi
                phi
            };
            lnv_prev = lnv;
            phi_prev = phi;
            lnv += dlnv.clamp(-0.5, 0.5);
            state = self.solve_tv(t, lnv.exp(), active, Some(&state))?;
            phi = (state.p / p_target).ln();
        }
        Err(KiDetError::NonConvergence {
            context: format!(
                "volume iteration at T = {:.1} K, P = {:.3e} Pa",
                t, p_target
            ),
            iterations: 50,
            residual: phi.abs(),
        })
    }

    /// Equilibrium at fixed volume and internal energy: Newton on temperature
    /// with the frozen heat capacity as the slope. The frozen Cv understates
    /// the effective one when the composition shifts, so the step is halved
    /// whenever the energy residual changes sign.
    pub fn solve_ve(
        &self,
        v: f64,
        e_target: f64,
        t_guess: f64,
        active: &[bool],
        warm: Option<&EquilibriumState>,
    ) -> Result<EquilibriumState, KiDetError> {
        let mut t = t_guess.clamp(T_FLOOR, T_CEIL);
        let mut state = self.solve_tv(t, v, active, warm)?;
        let tol = (1e-6 * e_target.abs()).max(10.0);
        let mut r_prev: Option<f64> = None;
        for _ in 0..100 {
            let u = self.internal_energy(&state)?;
            let r = u - e_target;
            if r.abs() < tol {
                return Ok(state);
            }
            let cv = self.heat_capacity_cv(&state)?.max(100.0);
            let mut dt = -r / cv;
            if let Some(rp) = r_prev
                && rp * r < 0.0
            {
                dt *= 0.5;
            }
            dt = dt.clamp(-0.3 * t, 0.3 * t);
            t = (t + dt).clamp(T_FLOOR, T_CEIL);
            state = self.solve_tv(t, v, active, Some(&state))?;
            r_prev = Some(r);
        }
        Err(KiDetError::NonConvergence {
            context: format!(
                "temperature iteration at V = {:.2} cm3/kg, E = {:.3e} J/kg",
                v, e_target
            ),
            iterations: 100,
            residual: r_prev.unwrap_or(f64::NAN).abs(),
        })
    }

    /// specific internal energy of a converged state, J/kg
    pub fn internal_energy(&self, s: &EquilibriumState) -> Result<f64, KiDetError> {
        let v_gas = self.gas_volume(s.v, &s.n, &s.active);
        let (n_gas, k_gas) = self.gas_arrays(&s.n);
        let mut u = self.eos.residual_energy(s.t, v_gas, &n_gas, &k_gas);
        for (j, sp) in self.species.iter().enumerate() {
            if s.n[j] <= 0.0 {
                continue;
            }
            let dh = sp.thermo.dh(s.t)?;
            u += s.n[j] * if sp.phase.is_condensed() { dh } else { dh - R * s.t };
        }
        Ok(u)
    }

    /// specific entropy of a converged state, J/(kg·K)
    pub fn entropy(&self, s: &EquilibriumState) -> Result<f64, KiDetError> {
        let v_gas = self.gas_volume(s.v, &s.n, &s.active);
        let (n_gas, k_gas) = self.gas_arrays(&s.n);
        let mut entropy = self.eos.residual_entropy(s.t, v_gas, &n_gas, &k_gas);
        for (j, sp) in self.species.iter().enumerate() {
            if s.n[j] <= 1e-30 {
                continue;
            }
            let ds = sp.thermo.ds(s.t)?;
            entropy += if sp.phase.is_condensed() {
                s.n[j] * ds
            } else {
                let p_j = s.n[j] * R * s.t * 1e6 / v_gas;
                s.n[j] * (ds - R * (p_j / P_ATM).ln())
            };
        }
        Ok(entropy)
    }

    /// frozen-composition constant-volume heat capacity, J/(kg·K)
    pub fn heat_capacity_cv(&self, s: &EquilibriumState) -> Result<f64, KiDetError> {
        let v_gas = self.gas_volume(s.v, &s.n, &s.active);
        let (n_gas, k_gas) = self.gas_arrays(&s.n);
        let mut cv = self.eos.residual_cv(s.t, v_gas, &n_gas, &k_gas);
        for (j, sp) in self.species.iter().enumerate() {
            if s.n[j] <= 0.0 {
                continue;
            }
            let cp = sp.thermo.Cp(s.t)?;
            cv += s.n[j] * if sp.phase.is_condensed() { cp } else { cp - R };
        }
        Ok(cv)
    }

    /// gas-phase mole fractions, library order
    pub fn gas_mole_fractions(&self, s: &EquilibriumState) -> Vec<(String, f64)> {
        let n_tot: f64 = self.gas_idx.iter().map(|&j| s.n[j]).sum();
        self.gas_idx
            .iter()
            .map(|&j| (self.species[j].name.clone(), s.n[j] / n_tot))
            .collect()
    }

    /// human-readable composition table of a converged state
    pub fn pretty_print_state(&self, s: &EquilibriumState) {
        let mut table = Table::new();
        table.add_row(row!["species", "phase", "n, mol/kg", "x (gas)"]);
        let n_tot: f64 = self.gas_idx.iter().map(|&j| s.n[j]).sum();
        for (j, sp) in self.species.iter().enumerate() {
            if s.n[j] <= 1e-12 {
                continue;
            }
            let x = if sp.phase.is_condensed() {
                "-".to_string()
            } else {
                format!("{:.5}", s.n[j] / n_tot)
            };
            table.add_row(row![
                sp.name,
                format!("{:?}", sp.phase),
                format!("{:.4}", s.n[j]),
                x
            ]);
        }
        table.add_row(row![
            "T, K / P, GPa",
            "",
            format!("{:.1}", s.t),
            format!("{:.4}", s.p / 1e9)
        ]);
        table.printstd();
    }
}
