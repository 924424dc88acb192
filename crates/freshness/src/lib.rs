pub mod artifact;
pub mod augment;
pub mod backend;
pub mod blur;
pub mod data;
pub mod error;
pub mod infer;
pub mod model;
pub mod train;
pub mod vision;
