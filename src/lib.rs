// Library exports for the scriptwarden process supervisor

pub mod cli;
pub mod config;
pub mod error;
pub mod notify;
pub mod process;
pub mod state;
pub mod supervisor;
