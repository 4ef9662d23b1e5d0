pub mod kafkatopic;
pub use kafkatopic::*;
