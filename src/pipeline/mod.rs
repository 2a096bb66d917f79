//! Pipeline module - the feature transform stage

pub mod encoder;
pub mod engineering;
pub mod features;
pub mod imputer;
pub mod loader;
pub mod schema;

pub use encoder::*;
pub use engineering::*;
pub use features::*;
pub use imputer::*;
pub use loader::*;
pub use schema::*;
