pub mod app;
pub mod camera;
pub mod error;
pub mod info;
pub mod ren;
pub mod scene;
pub mod traits;

pub use error::{Error, Result};
