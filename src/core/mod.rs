//! Core configuration management types.

pub mod aliases;
mod context;
pub mod environment;
mod loader;
mod store;
mod validation;

pub use aliases::{ALIASES, Alias};
pub use context::{AppContext, AppContextBuilder};
pub use loader::ConfigLoader;
pub use store::{ConfigStore, normalize};
pub use validation::{
    ACI_REQUIRED, ACR_REQUIRED, Validate, ValidationEngine, ValidationRule, WEBAPP_REQUIRED,
    aci_rule, required_keys,
};
