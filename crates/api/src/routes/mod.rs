//! Route handlers

pub mod alerts;
pub mod camera;
pub mod detect;
pub mod models;
pub mod records;
