pub mod sparkapp;
pub use sparkapp::*;
