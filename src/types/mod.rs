// src/types/mod.rs

pub mod scale;

pub use scale::{quantize, Scale};
