pub mod application;
pub mod cases;
