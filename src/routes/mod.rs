pub mod api;
pub mod speech;
