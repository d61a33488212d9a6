mod config_errors;
mod image_errors;
mod loader_errors;

pub use config_errors::ConfigError;
pub use image_errors::ImageError;
pub use loader_errors::LoaderError;
