pub mod commands;
pub mod run;

pub use commands::execute;
pub use run::run_app;
