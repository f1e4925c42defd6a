use crate::Equilibrium::gibbs::{EquilibriumState, GibbsSolver};
use crate::Equilibrium::phases::PhaseManager;
use crate::Thermochemistry::mixture::Mixture;
use crate::Thermochemistry::species_thermo::P_ATM;
use crate::errors::KiDetError;
use log::debug;
use prettytable::{Table, row};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// specific volume ratios v/v0 probed when bracketing the CJ tangency
const BRACKET_RATIOS: [f64; 8] = [0.90, 0.85, 0.80, 0.75, 0.70, 0.65, 0.60, 0.55];

/// fraction of v0 to which the tangency bracket must shrink
const V_TOL: f64 = 1e-4;

/// The Chapman-Jouguet point and the derived performance numbers. Velocities
/// in m/s, pressure in Pa, the product density in g/cm³.
#[derive(Debug, Clone)]
pub struct CjResult {
    pub detonation_velocity: f64,
    pub particle_velocity: f64,
    /// equilibrium sound speed of the products at the CJ plane, m/s
    pub sound_speed: f64,
    pub pressure: f64,
    pub temperature: f64,
    pub density: f64,
    /// v_CJ / v0
    pub volume_ratio: f64,
    /// effective polytropic exponent ρ·c²/P of the products
    pub gamma_eff: f64,
    /// Hugoniot points evaluated by the search
    pub iterations: usize,
    /// relative spread of the front velocity over the terminal bracket
    pub residual: f64,
    pub state: EquilibriumState,
}

/// Chapman-Jouguet state search over the equilibrium Hugoniot.
///
/// Every candidate volume v is first brought onto the detonation Hugoniot of
/// the unreacted charge (a relaxed fixed point coupling the Rankine-Hugoniot
/// energy balance to the fixed-(V, E) equilibrium). The CJ point is where the
/// Rayleigh line is tangent to that Hugoniot: there the front velocity D,
/// taken over Hugoniot states, is minimal, and the product flow behind the
/// front is exactly sonic with respect to the equilibrium sound speed. The
/// minimum is bracketed by a volume scan and closed by shrinking the bracket.
pub struct CjSolver {
    pub gibbs: GibbsSolver,
    pub mixture: Mixture,
    /// ambient pressure ahead of the front, Pa
    pub p0: f64,
    pub cancel: Option<Arc<AtomicBool>>,
}

impl CjSolver {
    pub fn new(gibbs: GibbsSolver, mixture: Mixture) -> Self {
        CjSolver {
            gibbs,
            mixture,
            p0: P_ATM,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn check_cancel(&self, stage: &str) -> Result<(), KiDetError> {
        if let Some(flag) = &self.cancel
            && flag.load(Ordering::Relaxed)
        {
            return Err(KiDetError::Cancelled(stage.to_string()));
        }
        Ok(())
    }

    /// Equilibrium state on the detonation Hugoniot at the given specific
    /// volume (cm³/kg). The pressure iterate feeds the Rankine-Hugoniot
    /// energy e = e0 + (P + P0)(v0 - v)/2, the fixed-(V, E) equilibrium
    /// answers with its own pressure, and under-relaxation closes the loop.
    pub fn hugoniot_state(
        &self,
        v: f64,
        warm: Option<&EquilibriumState>,
    ) -> Result<EquilibriumState, KiDetError> {
        let v0 = self.mixture.initial_volume();
        let e0 = self.mixture.specific_energy();
        let mut p = warm.map(|w| w.p).unwrap_or(2.0e10).max(1.0e8);
        let mut pm = PhaseManager::new(&self.gibbs);
        let mut prev = warm.cloned();
        let mut rel = f64::NAN;
        for _ in 0..40 {
            let e = e0 + 0.5 * (p + self.p0) * (v0 - v) * 1e-6;
            let t_guess = prev.as_ref().map(|s| s.t).unwrap_or(3500.0);
            let state = pm.equilibrate(&self.gibbs, |active, w| {
                self.gibbs
                    .solve_ve(v, e, t_guess, active, w.or(prev.as_ref()))
            })?;
            rel = ((state.p - p) / p).abs();
            p += 0.6 * (state.p - p);
            if rel < 1e-6 {
                return Ok(state);
            }
            prev = Some(state);
        }
        Err(KiDetError::NonConvergence {
            context: format!("Hugoniot point at v = {:.2} cm3/kg", v),
            iterations: 40,
            residual: rel,
        })
    }

    /// front velocity and particle velocity on the Rayleigh line through a
    /// Hugoniot state (mass and momentum balance across the front), m/s
    fn rayleigh(&self, s: &EquilibriumState) -> (f64, f64) {
        let v0_m = self.mixture.initial_volume() * 1e-6;
        let v_m = s.v * 1e-6;
        let d = v0_m * ((s.p - self.p0) / (v0_m - v_m)).sqrt();
        (d, d * (1.0 - v_m / v0_m))
    }

    pub fn solve(&self) -> Result<CjResult, KiDetError> {
        let v0 = self.mixture.initial_volume();

        // scan down in volume: D falls toward the tangency point, then rises
        // on the strong branch
        let mut warm: Option<EquilibriumState> = None;
        let mut iterations = 0usize;
        let mut trail: Vec<(f64, f64)> = Vec::new();
        let mut best: Option<(f64, EquilibriumState)> = None;
        let mut bracket = None;
        for ratio in BRACKET_RATIOS {
            self.check_cancel("CJ bracket scan")?;
            let v = ratio * v0;
            let state = self.hugoniot_state(v, warm.as_ref())?;
            let (d, _) = self.rayleigh(&state);
            iterations += 1;
            debug!("bracket scan v/v0 = {:.2}: D = {:.1} m/s", ratio, d);
            warm = Some(state.clone());
            if best.as_ref().is_none_or(|&(bd, _)| d < bd) {
                best = Some((d, state));
            }
            trail.push((v, d));
            let m = trail.len();
            if m >= 3 && trail[m - 2].1 < trail[m - 3].1 && trail[m - 2].1 <= trail[m - 1].1 {
                bracket = Some((trail[m - 3], trail[m - 2], trail[m - 1]));
                break;
            }
        }
        let ((mut va, mut da), (mut vb, mut db), (mut vc, mut dc)) =
            bracket.ok_or_else(|| KiDetError::NonConvergence {
                context: "CJ search: no front-velocity minimum for v/v0 in [0.55, 0.90]"
                    .to_string(),
                iterations,
                residual: trail
                    .windows(2)
                    .last()
                    .map(|w| (w[0].1 - w[1].1) / w[1].1)
                    .unwrap_or(f64::NAN),
            })?;

        // shrink the bracket va > vb > vc (with D(vb) the running minimum) by
        // probing the midpoint of its longer side
        while va - vc > V_TOL * v0 && iterations < 60 {
            self.check_cancel("CJ tangency refinement")?;
            let v = if va - vb > vb - vc {
                0.5 * (va + vb)
            } else {
                0.5 * (vb + vc)
            };
            let state = self.hugoniot_state(v, warm.as_ref())?;
            let (d, _) = self.rayleigh(&state);
            iterations += 1;
            warm = Some(state.clone());
            if d < db {
                if v > vb {
                    vc = vb;
                    dc = db;
                } else {
                    va = vb;
                    da = db;
                }
                vb = v;
                db = d;
                best = Some((d, state));
            } else if v > vb {
                va = v;
                da = d;
            } else {
                vc = v;
                dc = d;
            }
        }
        let residual = (da.max(dc) - db) / db;
        if va - vc > V_TOL * v0 {
            return Err(KiDetError::NonConvergence {
                context: "CJ search: tangency bracket did not close".to_string(),
                iterations,
                residual,
            });
        }
        let (_, s) = best.ok_or_else(|| KiDetError::NonConvergence {
            context: "CJ search produced no Hugoniot state".to_string(),
            iterations,
            residual,
        })?;
        let (d, u_p) = self.rayleigh(&s);
        // at the tangency the flow behind the front is sonic: c = D - u_p
        let c = d - u_p;
        Ok(CjResult {
            detonation_velocity: d,
            particle_velocity: u_p,
            sound_speed: c,
            pressure: s.p,
            temperature: s.t,
            density: 1000.0 / s.v,
            volume_ratio: s.v / v0,
            gamma_eff: c * c / (s.p * s.v * 1e-6),
            iterations,
            residual,
            state: s,
        })
    }

    /// human-readable summary of a CJ solution
    pub fn pretty_print(&self, cj: &CjResult) {
        let mut table = Table::new();
        table.add_row(row!["quantity", "value"]);
        table.add_row(row!["D, km/s", format!("{:.3}", cj.detonation_velocity / 1000.0)]);
        table.add_row(row!["P_CJ, GPa", format!("{:.2}", cj.pressure / 1e9)]);
        table.add_row(row!["T_CJ, K", format!("{:.0}", cj.temperature)]);
        table.add_row(row!["u_p, km/s", format!("{:.3}", cj.particle_velocity / 1000.0)]);
        table.add_row(row!["c, km/s", format!("{:.3}", cj.sound_speed / 1000.0)]);
        table.add_row(row!["rho_CJ, g/cm3", format!("{:.3}", cj.density)]);
        table.add_row(row!["v/v0", format!("{:.4}", cj.volume_ratio)]);
        table.add_row(row!["gamma_eff", format!("{:.3}", cj.gamma_eff)]);
        table.add_row(row!["Hugoniot points", format!("{}", cj.iterations)]);
        table.printstd();
        self.gibbs.pretty_print_state(&cj.state);
    }
}
