pub mod batch;
pub mod input;
