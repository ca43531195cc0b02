use serde::Serialize;
use uuid::Uuid;

/// Response metadata attached to every envelope (sec 6).
#[derive(Debug, Clone, Serialize, Default)]
pub struct Meta {
    pub query: Option<String>,
    pub model: Option<String>,
    pub processing_time_ms: u64,
    pub transaction_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answered: Option<bool>,
}

/// The uniform `{data, meta}` envelope every successful response wraps.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope<T: Serialize> {
    pub data: T,
    pub meta: Meta,
}

impl<T: Serialize> Envelope<T> {
    pub fn new(data: T, meta: Meta) -> Self {
        Self { data, meta }
    }
}
