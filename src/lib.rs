mod font;
mod openapi;
mod ort_service;
mod routes;
mod server;
mod state;
mod telemetry;

pub mod app;
pub mod config;
pub mod detection;
pub mod image_processor;
pub mod model_service;
pub mod visualizer;

pub use app::start_app;
