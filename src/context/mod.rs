pub mod container_context;
pub mod entity_context;
pub mod forms;

pub use container_context::*;
pub use entity_context::{CommitTicket, ContextSource, ContextState, EntityContext};
pub use forms::{FormList, FormSet, ResourceForm};
