//! HTTP request handlers.

mod ask;
mod health;
mod index;
mod version;

pub use ask::ask;
pub use health::{livez, readyz};
pub use index::index;
pub use version::version;
