pub mod loader;
pub mod patch;
pub mod schema;
pub mod settings;
pub mod shared;

pub use loader::{load_config, load_config_from_str};
pub use patch::QueueConfigPatch;
pub use schema::*;
pub use settings::ProcessingSettings;
pub use shared::SharedConfig;
