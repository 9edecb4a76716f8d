pub mod portfolio;
pub mod scope;
pub mod summary;

pub use portfolio::{Portfolio, PublicAccessModel};
pub use scope::Scope;
pub use summary::{ReviewSummary, UpdateSummary};
