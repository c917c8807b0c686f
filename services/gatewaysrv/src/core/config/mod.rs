pub mod app;
pub mod loader;
pub mod types;

pub use app::AppConfig;
pub use loader::DataPointConfig;
