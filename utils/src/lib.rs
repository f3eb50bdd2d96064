pub mod merkle;
pub mod observer;
