use crate::Detonation::cj::CjSolver;
use crate::Detonation::isentrope::{IsentropePoint, JwlParameters, fit_jwl, sample_isentrope};
use crate::Eos::{Bkw, EosEnum, IdealGas};
use crate::Equilibrium::gibbs::{EquilibriumState, GibbsSolver};
use crate::Equilibrium::phases::PhaseManager;
use crate::Thermochemistry::mixture::Mixture;
use crate::Thermochemistry::species_lib::SpeciesLibrary;
use crate::errors::KiDetError;
use log::info;
use prettytable::{Table, row};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// EOS choice as it appears in task files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EosSelection {
    Ideal,
    BkwTnt,
    BkwRdx,
    Bkws,
    Bkwc,
}

impl EosSelection {
    pub fn build(self) -> EosEnum {
        match self {
            EosSelection::Ideal => IdealGas.into(),
            EosSelection::BkwTnt => Bkw::bkw_tnt().into(),
            EosSelection::BkwRdx => Bkw::bkw_rdx().into(),
            EosSelection::Bkws => Bkw::bkws().into(),
            EosSelection::Bkwc => Bkw::bkwc().into(),
        }
    }
}

/// what to compute for a formulation
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum ComputationKind {
    /// Chapman-Jouguet point only
    CjPerformance,
    /// CJ point, release isentrope and its JWL fit
    CjWithIsentrope { points: usize },
    /// product equilibrium at fixed temperature (K) and pressure (Pa)
    EquilibriumTp { t: f64, p: f64 },
    /// product equilibrium at fixed temperature (K) and specific volume (cm³/kg)
    EquilibriumTv { t: f64, v: f64 },
}

/// One self-contained computation request: a formulation by reactant names and
/// parts by weight, a loading density and the model choices. Serializable so
/// that batch runs can be driven from task files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetonationTask {
    pub components: Vec<(String, f64)>,
    /// loading density, g/cm³
    pub density: f64,
    pub eos: EosSelection,
    pub kind: ComputationKind,
}

/// flat, serializable summary of one finished task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskReport {
    pub task: DetonationTask,
    /// m/s, CJ computations only
    pub detonation_velocity: Option<f64>,
    /// m/s, CJ computations only
    pub particle_velocity: Option<f64>,
    pub gamma_eff: Option<f64>,
    /// Pa
    pub pressure: f64,
    /// K
    pub temperature: f64,
    pub jwl: Option<JwlParameters>,
    pub isentrope: Option<Vec<IsentropePoint>>,
    /// species with nonzero moles, mol/kg
    pub composition: Vec<(String, f64)>,
}

impl TaskReport {
    pub fn save(&self, path: &Path) -> Result<(), KiDetError> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, KiDetError> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    pub fn pretty_print(&self) {
        let mut table = Table::new();
        table.add_row(row!["quantity", "value"]);
        if let Some(d) = self.detonation_velocity {
            table.add_row(row!["D, km/s", format!("{:.3}", d / 1000.0)]);
        }
        if let Some(u) = self.particle_velocity {
            table.add_row(row!["u_p, km/s", format!("{:.3}", u / 1000.0)]);
        }
        table.add_row(row!["P, GPa", format!("{:.3}", self.pressure / 1e9)]);
        table.add_row(row!["T, K", format!("{:.0}", self.temperature)]);
        if let Some(g) = self.gamma_eff {
            table.add_row(row!["gamma_eff", format!("{:.3}", g)]);
        }
        if let Some(jwl) = &self.jwl {
            table.add_row(row![
                "JWL A/B/C, GPa",
                format!("{:.1} / {:.2} / {:.3}", jwl.a / 1e9, jwl.b / 1e9, jwl.c / 1e9)
            ]);
            table.add_row(row![
                "JWL R1/R2/omega",
                format!("{:.2} / {:.2} / {:.2}", jwl.r1, jwl.r2, jwl.omega)
            ]);
        }
        for (name, n) in &self.composition {
            table.add_row(row![format!("n({}), mol/kg", name), format!("{:.3}", n)]);
        }
        table.printstd();
    }
}

fn build_problem(task: &DetonationTask) -> Result<(GibbsSolver, Mixture), KiDetError> {
    let lib = SpeciesLibrary::built_in()?;
    let components = task
        .components
        .iter()
        .map(|(name, w)| Ok((lib.get_reactant(name)?.clone(), *w)))
        .collect::<Result<Vec<_>, KiDetError>>()?;
    let mixture = Mixture::new(components, task.density)?;
    let candidates = lib.products_for_elements(&mixture.elements());
    let gibbs = GibbsSolver::new(candidates, &mixture.element_totals(), task.eos.build())?;
    Ok((gibbs, mixture))
}

fn composition_of(gibbs: &GibbsSolver, state: &EquilibriumState) -> Vec<(String, f64)> {
    gibbs
        .species
        .iter()
        .enumerate()
        .filter(|&(j, _)| state.n[j] > 1e-9)
        .map(|(j, sp)| (sp.name.clone(), state.n[j]))
        .collect()
}

/// Execute one task. The cancellation flag is polled between the outer
/// iterations of the CJ search and between isentrope samples, so a set flag
/// stops the work within one Hugoniot point or one sampled state.
pub fn run_task(
    task: &DetonationTask,
    cancel: Option<Arc<AtomicBool>>,
) -> Result<TaskReport, KiDetError> {
    if let Some(flag) = &cancel
        && flag.load(Ordering::Relaxed)
    {
        return Err(KiDetError::Cancelled("task startup".to_string()));
    }
    let (gibbs, mixture) = build_problem(task)?;
    info!(
        "running {:?} for {:?} at {} g/cm3",
        task.kind, task.components, task.density
    );
    match &task.kind {
        ComputationKind::CjPerformance | ComputationKind::CjWithIsentrope { .. } => {
            let v0 = mixture.initial_volume();
            let mut cj_solver = CjSolver::new(gibbs, mixture);
            if let Some(flag) = &cancel {
                cj_solver = cj_solver.with_cancel(flag.clone());
            }
            let cj = cj_solver.solve()?;
            let (jwl, isentrope) = match task.kind {
                ComputationKind::CjWithIsentrope { points } => {
                    let pts = sample_isentrope(&cj_solver.gibbs, &cj, v0, points, cancel)?;
                    let jwl = fit_jwl(&pts, v0)?;
                    (Some(jwl), Some(pts))
                }
                _ => (None, None),
            };
            Ok(TaskReport {
                task: task.clone(),
                detonation_velocity: Some(cj.detonation_velocity),
                particle_velocity: Some(cj.particle_velocity),
                gamma_eff: Some(cj.gamma_eff),
                pressure: cj.pressure,
                temperature: cj.temperature,
                jwl,
                isentrope,
                composition: composition_of(&cj_solver.gibbs, &cj.state),
            })
        }
        ComputationKind::EquilibriumTp { t, p } => {
            let mut pm = PhaseManager::new(&gibbs);
            let state = pm.equilibrate(&gibbs, |active, warm| {
                gibbs.solve_tp(*t, *p, active, warm)
            })?;
            Ok(TaskReport {
                task: task.clone(),
                detonation_velocity: None,
                particle_velocity: None,
                gamma_eff: None,
                pressure: state.p,
                temperature: state.t,
                jwl: None,
                isentrope: None,
                composition: composition_of(&gibbs, &state),
            })
        }
        ComputationKind::EquilibriumTv { t, v } => {
            let mut pm = PhaseManager::new(&gibbs);
            let state = pm.equilibrate(&gibbs, |active, warm| {
                gibbs.solve_tv(*t, *v, active, warm)
            })?;
            Ok(TaskReport {
                task: task.clone(),
                detonation_velocity: None,
                particle_velocity: None,
                gamma_eff: None,
                pressure: state.p,
                temperature: state.t,
                jwl: None,
                isentrope: None,
                composition: composition_of(&gibbs, &state),
            })
        }
    }
}

/// The same formulation across a set of loading densities, in parallel. Each
/// density gets its own result; one diverged density does not fail the sweep.
pub fn sweep_densities(
    base: &DetonationTask,
    densities: &[f64],
    cancel: Option<Arc<AtomicBool>>,
) -> Vec<(f64, Result<TaskReport, KiDetError>)> {
    densities
        .par_iter()
        .map(|&rho| {
            let task = DetonationTask {
                density: rho,
                ..base.clone()
            };
            (rho, run_task(&task, cancel.clone()))
        })
        .collect()
}

/// independent tasks in parallel, order of the results matching the input
pub fn screen_formulations(
    tasks: &[DetonationTask],
    cancel: Option<Arc<AtomicBool>>,
) -> Vec<Result<TaskReport, KiDetError>> {
    tasks
        .par_iter()
        .map(|task| run_task(task, cancel.clone()))
        .collect()
}
