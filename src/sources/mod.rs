//! Configuration source implementations.

mod config_source;
mod env;
mod file;
mod remote;

pub use config_source::ConfigSource;
pub use env::{EnvSource, process_vars};
pub use file::FileSource;
pub(crate) use file::ci_flag_set;
pub use remote::{GLOBAL_KEY, RemoteSettings, RemoteSource};
