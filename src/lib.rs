pub mod agent;
pub mod config;
pub mod errors;
pub mod orchestrator;
pub mod review;
pub mod state;
pub mod tracker;
pub mod workspace;
