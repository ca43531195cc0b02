mod agent;
mod api_key;
mod chat;
mod chunk;
mod connector;
mod conversation;
mod datasource;
mod document;
mod embedding_cache;
mod envelope;
mod logs;
mod organization;
mod relation;
mod retrieval;
mod turn;

pub use agent::*;
pub use api_key::*;
pub use chat::*;
pub use chunk::*;
pub use connector::*;
pub use conversation::*;
pub use datasource::*;
pub use document::*;
pub use embedding_cache::*;
pub use envelope::*;
pub use logs::*;
pub use organization::*;
pub use relation::*;
pub use retrieval::*;
pub use turn::*;
