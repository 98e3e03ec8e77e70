#![warn(clippy::all, rust_2018_idioms)]

mod app;
pub mod corners;
pub mod error;
pub mod export;
pub mod geometry;
pub mod homography;
pub mod mapping;
pub mod rectify;
pub mod ruler;
pub mod session;
pub mod settings;

pub use app::FishMeshApp;
pub use error::{FishMeshError, Result};
