pub mod config;
pub mod decode;
pub mod error;
pub mod events;
pub mod geometry;
pub mod gpu;
pub mod material;
pub mod scene;
pub mod source;
pub mod tasks {
    pub mod loader;
    pub mod presenter;
    pub mod session;
    pub mod viewer;
}
