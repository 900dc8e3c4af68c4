pub mod config;
pub mod constants;
pub mod elements;
pub mod errors;
pub mod locations;
pub mod logging;
pub mod model;
pub mod testdefinition;
pub mod workflow;
