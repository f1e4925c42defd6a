/// damped Newton solver for the constrained Gibbs energy minimum
pub mod gibbs;
/// active-set handling of condensed product phases
pub mod phases;

#[cfg(test)]
mod equilibrium_tests;
