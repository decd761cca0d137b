// src/services/mod.rs

pub mod allocation;
pub mod attempts;
pub mod authoring;
pub mod results;
pub mod scoring;
pub mod usage;

pub use attempts::AttemptService;
pub use authoring::AuthoringService;
pub use results::ResultService;
pub use usage::UsageService;
