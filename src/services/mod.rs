pub mod form;
pub mod negotiator;
mod pending;
pub mod status;
