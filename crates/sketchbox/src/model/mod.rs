pub mod config;
pub mod event;
pub mod ids;
pub mod mode;
pub mod policy;
pub mod state;

pub use config::*;
pub use event::*;
pub use ids::RunId;
pub use mode::*;
pub use policy::*;
pub use state::*;
