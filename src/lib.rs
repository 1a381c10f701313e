pub mod api;
pub mod assets;
pub mod config;
pub mod data;
pub mod gate;
pub mod logging;
pub mod payload;
pub mod regime;
