/// Chapman-Jouguet state search on the equilibrium Hugoniot
pub mod cj;
/// release isentrope sampling and JWL fitting
pub mod isentrope;
/// task-level dispatch, parallel sweeps and result reports
pub mod runner;
