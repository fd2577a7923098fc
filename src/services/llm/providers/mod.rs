pub mod local;
pub mod openrouter;
