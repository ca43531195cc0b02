mod auth;
mod extractor;
mod rate_limit;

pub use auth::*;
pub use extractor::*;
pub use rate_limit::*;
