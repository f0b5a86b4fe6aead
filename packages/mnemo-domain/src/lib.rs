pub mod directive;
pub mod ranking;
