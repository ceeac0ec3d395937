pub mod constants;
pub mod entities;
pub mod events;
pub mod messaging;
pub mod repositories;

pub use entities::*;
pub use events::*;
pub use macct_errors::{DispatchError, DispatchResult};
pub use messaging::*;
pub use repositories::*;
