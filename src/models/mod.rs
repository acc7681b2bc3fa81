pub mod asset;
pub mod common;
pub mod video;

pub use asset::*;
pub use common::*;
pub use video::*;
