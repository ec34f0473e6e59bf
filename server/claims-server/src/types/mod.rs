pub mod extract;
pub mod pagination;

pub use extract::*;
pub use pagination::*;
