#[macro_use]
extern crate tracing;

mod app_dirs;
mod overrides;
mod store;

pub use app_dirs::{
    get_config_dir,
    get_data_dir,
};
pub use overrides::{
    apply_assignment,
    load_overrides_file,
    parse_assignment,
};
pub use store::{
    merge,
    ConfigStore,
    PerformanceHints,
};
