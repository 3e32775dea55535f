pub mod core;
pub mod errors;
pub mod patterns;
pub mod web;
