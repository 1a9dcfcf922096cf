pub mod collection;
pub mod scope;

pub use collection::*;
pub use scope::*;
