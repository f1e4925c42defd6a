#[allow(non_snake_case)]
pub mod Detonation;
#[allow(non_snake_case)]
pub mod Eos;
#[allow(non_snake_case)]
pub mod Equilibrium;
#[allow(non_snake_case)]
pub mod Thermochemistry;
pub mod errors;
pub mod logging;
