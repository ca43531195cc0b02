pub mod agent_service;
pub mod auth_service;
pub mod chat_orchestrator;
pub mod connector_client;
pub mod connector_service;
pub mod conversation_service;
pub mod datasource_service;
pub mod document_service;
pub mod embedding_cache_service;
pub mod hybrid_search_service;
pub mod indexing;
pub mod json_stream;
pub mod llm_client;
pub mod log_service;
pub mod organization_service;
pub mod queue_service;
pub mod reasoning_tree;
pub mod relation_expander;
pub mod reranker_service;
pub mod retrieval_orchestrator;
pub mod tokenizer;
