pub mod dtc;
pub mod outcome;
pub mod results;
pub mod vehicle;

pub use dtc::*;
pub use outcome::*;
pub use results::*;
pub use vehicle::*;
