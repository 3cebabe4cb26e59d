//! The runnable surface of the vnet simulator: the command line entry
//! point, a one-shot request helper, and prebuilt end-to-end simulations.

pub mod cli;
pub mod requests;
pub mod simulations;
