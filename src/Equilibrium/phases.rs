use crate::Equilibrium::gibbs::{EquilibriumState, GibbsSolver};
use crate::Thermochemistry::species_thermo::R;
use crate::errors::KiDetError;
use log::{debug, warn};

/// standing of one condensed candidate in the active-set iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseState {
    /// not in the system; tested against the element potentials each pass
    Excluded,
    /// admitted this pass, survival depends on the re-solve
    Tentative,
    /// in the system with a mole number above the floor
    Admitted,
}

/// Active-set iteration over the condensed candidates.
///
/// The gas phase always participates; a condensed species enters only when the
/// converged element potentials price its formation below its chemical
/// potential, and leaves when its mole number collapses. One full sweep with
/// no net change is the stopping criterion, so the result does not depend on
/// how many phases happened to flip early on.
pub struct PhaseManager {
    /// per-species state, meaningful at the solver's condensed indices
    pub states: Vec<PhaseState>,
    /// below this mole number a condensed phase is considered absent, mol/kg
    pub mole_floor: f64,
    /// admission margin on the dimensionless potential test
    pub potential_tol: f64,
}

impl PhaseManager {
    pub fn new(solver: &GibbsSolver) -> Self {
        PhaseManager {
            states: vec![PhaseState::Excluded; solver.species.len()],
            mole_floor: 1e-8,
            potential_tol: 1e-7,
        }
    }

    fn active_flags(&self, solver: &GibbsSolver) -> Vec<bool> {
        (0..solver.species.len())
            .map(|j| {
                !solver.species[j].phase.is_condensed()
                    || matches!(self.states[j], PhaseState::Admitted | PhaseState::Tentative)
            })
            .collect()
    }

    /// Condensed carriers of elements no gas species can hold must be in the
    /// system from the start, otherwise the gas-only problem is infeasible.
    fn admit_required_carriers(&mut self, solver: &GibbsSolver) {
        for (i, el) in solver.elements.iter().enumerate() {
            let gas_carries = solver.gas_idx.iter().any(|&j| solver.a[(i, j)] > 0.0);
            if gas_carries {
                continue;
            }
            if let Some(&j) = solver
                .cond_idx
                .iter()
                .find(|&&j| solver.a[(i, j)] > 0.0)
            {
                debug!(
                    "element {} has no gas carrier, admitting {} up front",
                    el, solver.species[j].name
                );
                self.states[j] = PhaseState::Admitted;
            }
        }
    }

    /// dimensionless driving force of forming the condensed species j out of
    /// the element reservoir; positive means formation is favored
    fn admission_drive(
        &self,
        solver: &GibbsSolver,
        state: &EquilibriumState,
        j: usize,
    ) -> Result<f64, KiDetError> {
        let sp = &solver.species[j];
        let mu_rt =
            sp.thermo.dg(state.t)? / (R * state.t) + state.p * sp.molar_volume * 1e-6 / (R * state.t);
        let priced: f64 = (0..solver.elements.len())
            .map(|i| solver.a[(i, j)] * state.lambda[i])
            .sum();
        Ok(priced - mu_rt)
    }

    /// Run the inner equilibrium problem (whatever it fixes besides T, V) to
    /// convergence over the condensed active set. `solve` maps an active-flag
    /// vector and a warm start to a converged state.
    pub fn equilibrate<F>(
        &mut self,
        solver: &GibbsSolver,
        mut solve: F,
    ) -> Result<EquilibriumState, KiDetError>
    where
        F: FnMut(&[bool], Option<&EquilibriumState>) -> Result<EquilibriumState, KiDetError>,
    {
        self.admit_required_carriers(solver);
        let mut state = solve(&self.active_flags(solver), None)?;
        let max_passes = solver.cond_idx.len() + 2;
        for pass in 0..max_passes {
            let mut changed = false;
            for &j in &solver.cond_idx {
                match self.states[j] {
                    PhaseState::Excluded => {
                        let drive = self.admission_drive(solver, &state, j)?;
                        if drive <= self.potential_tol {
                            continue;
                        }
                        self.states[j] = PhaseState::Tentative;
                        match solve(&self.active_flags(solver), Some(&state)) {
                            Ok(trial) if trial.n[j] > self.mole_floor => {
                                debug!(
                                    "pass {}: admitted {} with {:.4} mol/kg",
                                    pass, solver.species[j].name, trial.n[j]
                                );
                                self.states[j] = PhaseState::Admitted;
                                state = trial;
                                changed = true;
                            }
                            Ok(_) => {
                                self.states[j] = PhaseState::Excluded;
                            }
                            Err(e) => {
                                warn!(
                                    "admission of {} rejected, solve failed: {}",
                                    solver.species[j].name, e
                                );
                                self.states[j] = PhaseState::Excluded;
                            }
                        }
                    }
                    PhaseState::Admitted => {
                        if state.n[j] < self.mole_floor {
                            debug!(
                                "pass {}: demoting {}, {:.2e} mol/kg below floor",
                                pass, solver.species[j].name, state.n[j]
                            );
                            self.states[j] = PhaseState::Excluded;
                            state = solve(&self.active_flags(solver), Some(&state))?;
                            changed = true;
                        }
                    }
                    PhaseState::Tentative => {
                        // only transiently set inside the admission arm
                        self.states[j] = PhaseState::Excluded;
                    }
                }
            }
            if !changed {
                return Ok(state);
            }
        }
        // report the strongest remaining admission drive as the residual
        let mut drive_max: f64 = 0.0;
        for &j in &solver.cond_idx {
            if self.states[j] == PhaseState::Excluded {
                drive_max = drive_max.max(self.admission_drive(solver, &state, j)?);
            }
        }
        Err(KiDetError::NonConvergence {
            context: "condensed phase active set did not settle".to_string(),
            iterations: max_passes,
            residual: drive_max,
        })
    }
}
