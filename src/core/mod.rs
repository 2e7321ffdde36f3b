// Core primitives shared by the API and model layers.
pub mod completion;
pub mod error;
pub mod ids;
