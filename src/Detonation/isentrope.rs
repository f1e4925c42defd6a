use crate::Detonation::cj::CjResult;
use crate::Equilibrium::gibbs::{EquilibriumState, GibbsSolver, T_CEIL, T_FLOOR};
use crate::Equilibrium::phases::PhaseManager;
use crate::errors::KiDetError;
use log::{debug, warn};
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// one sampled release state: specific volume in cm³/kg, pressure in Pa
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsentropePoint {
    pub v: f64,
    pub p: f64,
    pub t: f64,
}

/// Jones-Wilkins-Lee fit of the release isentrope,
///
///   P(v̄) = A·e^(-R1·v̄) + B·e^(-R2·v̄) + C·v̄^(-(ω+1)),   v̄ = v/v0,
///
/// with A, B, C in Pa. `rms_residual` is the root-mean-square relative
/// pressure error of the fit over the sampled points.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwlParameters {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub r1: f64,
    pub r2: f64,
    pub omega: f64,
    pub rms_residual: f64,
}

impl JwlParameters {
    pub fn pressure(&self, v_ratio: f64) -> f64 {
        self.a * (-self.r1 * v_ratio).exp()
            + self.b * (-self.r2 * v_ratio).exp()
            + self.c * v_ratio.powf(-(self.omega + 1.0))
    }
}

/// rms relative residual above which the fit is reported as poor
const FIT_WARN_THRESHOLD: f64 = 0.05;

/// Walk the release isentrope S = S_CJ from the CJ volume out to a large
/// expansion. At each volume the temperature holding the entropy is found by
/// a bracket-guarded Newton (slope dS/dT = Cv/T) around the phase-managed
/// (T, V) equilibrium; the bracket absorbs the entropy jumps where a
/// condensed phase enters or leaves the active set. The cancellation flag is
/// polled once per sampled point.
pub fn sample_isentrope(
    gibbs: &GibbsSolver,
    cj: &CjResult,
    v0: f64,
    n_points: usize,
    cancel: Option<Arc<AtomicBool>>,
) -> Result<Vec<IsentropePoint>, KiDetError> {
    let s_cj = gibbs.entropy(&cj.state)?;
    let tol = 1e-6 * s_cj.abs().max(1.0);
    let v_start = cj.state.v;
    let v_end = 7.0 * v0;
    let n_points = n_points.max(2);
    let ln_step = (v_end / v_start).ln() / (n_points - 1) as f64;

    let mut pm = PhaseManager::new(gibbs);
    let mut points = Vec::with_capacity(n_points);
    let mut t = cj.state.t;
    let mut prev: Option<EquilibriumState> = Some(cj.state.clone());
    for i in 0..n_points {
        if let Some(flag) = &cancel
            && flag.load(Ordering::Relaxed)
        {
            return Err(KiDetError::Cancelled("isentrope sampling".to_string()));
        }
        let v = v_start * (ln_step * i as f64).exp();
        // S(T) grows with T; t_lo / t_hi bracket the target entropy
        let mut t_lo: Option<f64> = None;
        let mut t_hi: Option<f64> = None;
        let mut state = None;
        let mut last_r = f64::NAN;
        for _ in 0..60 {
            let s = pm.equilibrate(gibbs, |active, w| {
                gibbs.solve_tv(t, v, active, w.or(prev.as_ref()))
            })?;
            let r = gibbs.entropy(&s)? - s_cj;
            last_r = r;
            let cv = gibbs.heat_capacity_cv(&s)?.max(100.0);
            prev = Some(s.clone());
            if r.abs() < tol {
                state = Some(s);
                break;
            }
            if r < 0.0 {
                t_lo = Some(t_lo.map_or(t, |lo| lo.max(t)));
            } else {
                t_hi = Some(t_hi.map_or(t, |hi| hi.min(t)));
            }
            if let (Some(lo), Some(hi)) = (t_lo, t_hi)
                && hi - lo < 0.05
            {
                // S(T) is discontinuous where the active set changes; the
                // nearest bracketed state is the sample
                state = Some(s);
                break;
            }
            let mut t_next = t + (-r * t / cv).clamp(-0.2 * t, 0.2 * t);
            if let (Some(lo), Some(hi)) = (t_lo, t_hi)
                && !(t_next > lo && t_next < hi)
            {
                t_next = 0.5 * (lo + hi);
            }
            t = t_next.clamp(T_FLOOR, T_CEIL);
        }
        let state = state.ok_or_else(|| KiDetError::NonConvergence {
            context: format!("isentrope point at v = {:.1} cm3/kg", v),
            iterations: 60,
            residual: last_r,
        })?;
        debug!(
            "isentrope v/v0 = {:.3}: T = {:.0} K, P = {:.4} GPa",
            v / v0,
            state.t,
            state.p / 1e9
        );
        points.push(IsentropePoint {
            v,
            p: state.p,
            t: state.t,
        });
    }
    Ok(points)
}

/// weighted linear least squares for (A, B, C) at fixed (R1, R2, ω); the
/// weights 1/P make the objective the relative pressure error
fn linear_fit(
    points: &[(f64, f64)],
    r1: f64,
    r2: f64,
    omega: f64,
) -> Option<(f64, f64, f64, f64)> {
    let mut ata = Matrix3::zeros();
    let mut atb = Vector3::zeros();
    for &(vr, p) in points {
        let phi = Vector3::new((-r1 * vr).exp(), (-r2 * vr).exp(), vr.powf(-(omega + 1.0)));
        let w = 1.0 / (p * p);
        ata += phi * phi.transpose() * w;
        atb += phi * (p * w);
    }
    let coeffs = ata.lu().solve(&atb)?;
    let mut ss = 0.0;
    for &(vr, p) in points {
        let model = coeffs[0] * (-r1 * vr).exp()
            + coeffs[1] * (-r2 * vr).exp()
            + coeffs[2] * vr.powf(-(omega + 1.0));
        let rel = (model - p) / p;
        ss += rel * rel;
    }
    let rms = (ss / points.len() as f64).sqrt();
    Some((coeffs[0], coeffs[1], coeffs[2], rms))
}

#[allow(clippy::type_complexity)]
fn scan_grid(
    pv: &[(f64, f64)],
    omega: f64,
    (r1_lo, r1_hi): (f64, f64),
    (r2_lo, r2_hi): (f64, f64),
    steps: usize,
    best: &mut Option<(f64, f64, f64, f64, f64, f64)>,
) {
    for i in 0..=steps {
        let r1 = r1_lo + (r1_hi - r1_lo) * i as f64 / steps as f64;
        for j in 0..=steps {
            let r2 = r2_lo + (r2_hi - r2_lo) * j as f64 / steps as f64;
            if r1 <= r2 + 0.5 {
                continue;
            }
            if let Some((a, b, c, rms)) = linear_fit(pv, r1, r2, omega)
                && best.is_none_or(|(.., best_rms)| rms < best_rms)
            {
                *best = Some((a, b, c, r1, r2, rms));
            }
        }
    }
}

/// Fit JWL parameters to sampled isentrope points. The decay constants are
/// found by a coarse grid with one refinement pass, the linear amplitudes by
/// weighted least squares at each grid node; ω comes from the terminal
/// logarithmic slope of the expansion, where the exponentials have died off.
pub fn fit_jwl(points: &[IsentropePoint], v0: f64) -> Result<JwlParameters, KiDetError> {
    if points.len() < 5 {
        return Err(KiDetError::MissingData(format!(
            "JWL fit needs at least 5 isentrope points, got {}",
            points.len()
        )));
    }
    let pv: Vec<(f64, f64)> = points.iter().map(|pt| (pt.v / v0, pt.p)).collect();

    let (va, pa) = pv[pv.len() - 2];
    let (vb, pb) = pv[pv.len() - 1];
    let terminal_slope = -(pb / pa).ln() / (vb / va).ln();
    let omega = (terminal_slope - 1.0).clamp(0.1, 0.6);

    let mut best: Option<(f64, f64, f64, f64, f64, f64)> = None;
    scan_grid(&pv, omega, (3.5, 6.5), (0.8, 2.0), 12, &mut best);
    let (_, _, _, r1_c, r2_c, _) = best.ok_or_else(|| KiDetError::NonConvergence {
        context: "JWL grid search found no usable decay constants".to_string(),
        iterations: 0,
        residual: f64::NAN,
    })?;
    scan_grid(
        &pv,
        omega,
        (r1_c - 0.25, r1_c + 0.25),
        ((r2_c - 0.1).max(0.3), r2_c + 0.1),
        10,
        &mut best,
    );

    let (a, b, c, r1, r2, rms) = best.unwrap();
    if rms > FIT_WARN_THRESHOLD {
        warn!(
            "JWL fit is poor: rms relative residual {:.3} (R1 = {:.2}, R2 = {:.2}, omega = {:.2})",
            rms, r1, r2, omega
        );
    }
    Ok(JwlParameters {
        a,
        b,
        c,
        r1,
        r2,
        omega,
        rms_residual: rms,
    })
}
