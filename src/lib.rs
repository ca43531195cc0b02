pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use anyhow::Result;
use axum::http::{header, Method};
use axum::{middleware as axum_middleware, Router};
use secrecy::ExposeSecret;
use sqlx::postgres::PgPoolOptions;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::config::Config;
use crate::middleware::rate_limit_middleware;
use crate::services::agent_service::AgentService;
use crate::services::auth_service::AuthService;
use crate::services::chat_orchestrator::ChatOrchestrator;
use crate::services::connector_client::ConnectorClient;
use crate::services::connector_service::ConnectorService;
use crate::services::conversation_service::ConversationService;
use crate::services::datasource_service::DatasourceService;
use crate::services::document_service::DocumentService;
use crate::services::embedding_cache_service::{EmbeddingCacheService, EmbeddingProviderConfig};
use crate::services::hybrid_search_service::HybridSearchService;
use crate::services::indexing::pipeline::IndexingPipeline;
use crate::services::llm_client::{LlmClient, LlmConfig};
use crate::services::log_service::LogService;
use crate::services::queue_service::QueueService;
use crate::services::relation_expander::RelationExpander;
use crate::services::reranker_service::{RerankerConfig, RerankerService};
use crate::services::retrieval_orchestrator::RetrievalOrchestrator;

const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";
const ESCALATED_MODEL: &str = "claude-3-5-sonnet-20241022";
const ECONOMY_MODEL: &str = "claude-3-5-haiku-20241022";

/// Application state shared across all handlers. Every service is a thin,
/// cheaply `Clone`-able handle over a pooled connection, so this struct
/// itself is `Clone` rather than wrapped in an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub config: Config,
    pub redis: redis::aio::ConnectionManager,
    pub organizations: services::organization_service::OrganizationService,
    pub agents: AgentService,
    pub datasources: DatasourceService,
    pub documents: DocumentService,
    pub connectors: ConnectorService,
    pub conversations: ConversationService,
    pub retrieval: RetrievalOrchestrator,
    pub chat: ChatOrchestrator,
    pub indexing: IndexingPipeline,
    pub queue: QueueService,
    pub logs: LogService,
    pub llm: LlmClient,
}

fn build_llm_client(config: &Config) -> LlmClient {
    LlmClient::new(LlmConfig {
        anthropic_api_key: config.anthropic_api_key.clone(),
        openai_api_key: config.openai_api_key.clone(),
        default_model: DEFAULT_MODEL.to_string(),
        escalated_model: ESCALATED_MODEL.to_string(),
        economy_model: ECONOMY_MODEL.to_string(),
        pricing: config.llm_pricing.clone(),
    })
}

/// Create the application with all routes and middleware, discarding the
/// `AppState` handle. Most callers (including tests) only need the
/// router; `create_app_with_state` is for the binary, which also spawns
/// background workers off the same state.
pub async fn create_app(config: Config) -> Result<Router> {
    let (router, _state) = create_app_with_state(config).await?;
    Ok(router)
}

/// Same as `create_app`, but also returns the assembled `AppState` so the
/// caller can spawn `run_worker` tasks against it.
pub async fn create_app_with_state(config: Config) -> Result<(Router, AppState)> {
    let db = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&db).await?;

    let redis_client = redis::Client::open(config.redis_url.clone())?;
    let redis = redis::aio::ConnectionManager::new(redis_client).await?;

    let llm = build_llm_client(&config);

    let embedding = EmbeddingCacheService::new(
        db.clone(),
        redis.clone(),
        EmbeddingProviderConfig {
            provider_url: config.embedding_provider_url.clone().unwrap_or_default(),
            api_key: config
                .openai_api_key
                .as_ref()
                .map(|k| k.expose_secret().to_string())
                .unwrap_or_default(),
            model: config.embedding_model.clone(),
            price_usd_per_token: config
                .pricing_for(&config.embedding_model)
                .map(|p| p.input_usd_per_token)
                .unwrap_or(0.0),
        },
    );
    let hybrid = HybridSearchService::new(db.clone());
    let relations = RelationExpander::new(db.clone());
    let reranker = RerankerService::new(RerankerConfig {
        provider_url: config.rerank_provider_url.clone().unwrap_or_default(),
        api_key: config.rerank_api_key.as_ref().map(|k| k.expose_secret().to_string()),
        price_usd_per_doc: config.rerank_price_usd_per_doc,
    });

    let retrieval = RetrievalOrchestrator::new(
        db.clone(),
        embedding.clone(),
        hybrid,
        relations,
        reranker,
        llm.clone(),
        config.clone(),
    );

    let agents = AgentService::new(db.clone());
    let datasources = DatasourceService::new(db.clone());
    let documents = DocumentService::new(db.clone());
    let connectors = ConnectorService::new(db.clone());
    let conversations = ConversationService::new(db.clone(), config.chat_budgets.clone());
    let connector_client = ConnectorClient::new();
    let organizations = services::organization_service::OrganizationService::new(db.clone());

    let chat = ChatOrchestrator::new(
        agents.clone(),
        datasources.clone(),
        conversations.clone(),
        connectors.clone(),
        connector_client,
        retrieval.clone(),
        llm.clone(),
        config.chat_budgets.clone(),
    );

    let indexing = IndexingPipeline::new(db.clone(), embedding, llm.clone());
    let queue = QueueService::new(redis.clone());
    let logs = LogService::new(db.clone());

    let state = AppState {
        db,
        config: config.clone(),
        redis,
        organizations,
        agents,
        datasources,
        documents,
        connectors,
        conversations,
        retrieval,
        chat,
        indexing,
        queue,
        logs,
        llm,
    };

    let cors_origins: Vec<_> = config
        .cors_allowed_origins
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    let cors_layer = CorsLayer::new()
        .allow_origin(cors_origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true);

    let app = Router::new()
        .merge(routes::health_routes())
        .nest("/v1", routes::api_routes())
        .with_state(state.clone())
        .layer(axum_middleware::from_fn(rate_limit_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors_layer);

    Ok((app, state))
}

const RETENTION_TICK: std::time::Duration = std::time::Duration::from_secs(24 * 60 * 60);

/// Enqueues the daily retention jobs once per tick (sec 5 "a single
/// cron-like schedule processes retention jobs... once per day"). The
/// queue's own dedup window makes a missed or repeated tick harmless: at
/// most one `CleanRaglog`/`CleanEmbeddings` job runs per day regardless
/// of how many replicas run this loop.
pub async fn run_retention_cron(state: AppState) {
    loop {
        if let Err(err) = state.queue.enqueue(services::queue_service::JobPayload::CleanRaglog).await {
            tracing::error!(error = %err, "failed to enqueue raglog retention job");
        }
        if let Err(err) = state.queue.enqueue(services::queue_service::JobPayload::CleanEmbeddings).await {
            tracing::error!(error = %err, "failed to enqueue embedding retention job");
        }
        tokio::time::sleep(RETENTION_TICK).await;
    }
}

/// Drains the job queue forever, dispatching indexing and retention jobs
/// to their respective services (sec 5 "dedicated worker pool"). Run as
/// one of `queue_workers` concurrent tasks.
pub async fn run_worker(state: AppState) {
    loop {
        match state.queue.dequeue().await {
            Ok(Some(job)) => {
                if let Err(err) = dispatch_job(&state, job).await {
                    tracing::error!(error = %err, "job failed");
                }
            }
            Ok(None) => continue,
            Err(err) => {
                tracing::error!(error = %err, "queue dequeue failed, backing off");
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            }
        }
    }
}

async fn dispatch_job(state: &AppState, job: services::queue_service::JobPayload) -> Result<()> {
    use services::queue_service::JobPayload;
    match job {
        JobPayload::Index { document_id } => {
            state.indexing.index_document(document_id).await?;
        }
        JobPayload::CleanRaglog => {
            state.logs.clean_raglog(state.config.raglog_retention_days).await?;
        }
        JobPayload::CleanEmbeddings => {
            // embedding retention lives on the same cache store the
            // retrieval orchestrator reads from.
            let embedding = EmbeddingCacheService::new(
                state.db.clone(),
                state.redis.clone(),
                EmbeddingProviderConfig {
                    provider_url: state.config.embedding_provider_url.clone().unwrap_or_default(),
                    api_key: String::new(),
                    model: state.config.embedding_model.clone(),
                    price_usd_per_token: state
                        .config
                        .pricing_for(&state.config.embedding_model)
                        .map(|p| p.input_usd_per_token)
                        .unwrap_or(0.0),
                },
            );
            embedding.clean_expired(state.config.embeddings_retention_days).await?;
        }
    }
    Ok(())
}
