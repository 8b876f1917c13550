#[macro_use]
extern crate tracing;

mod app;
pub mod args;
mod logging;
pub mod probes;

pub use app::run;
pub use args::Args;
pub use logging::init_logging;
