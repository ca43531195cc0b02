//! Chat Orchestrator (sec 4.7): drives the LLM with tool functions over
//! hybrid retrieval, connector calls, and caller-supplied page context,
//! parses the model's strict JSON contract, streams the visible answer,
//! and manages conversation turns, titling, and grounding.
//!
//! `LLM_RUN` runs in two phases. Phase one is a bounded, non-streaming
//! tool-resolution loop (`LlmClient::run_with_tools`): the model decides
//! which tools to call and the orchestrator dispatches them concurrently,
//! accumulating their textual results and the set of document ids they
//! touched. Phase two is a single dedicated generation call — `complete`
//! or `stream_complete`, with no tools attached — fed the assembled
//! context, so the final JSON answer streams at genuine token
//! granularity through `ResponseFieldScanner` rather than needing
//! incremental tool-use delta parsing.

use std::collections::{HashMap, HashSet};

use rand::distributions::Alphanumeric;
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::config::ChatBudgets;
use crate::error::AppResult;
use crate::models::{
    parameters_to_json_schema, connector_function_name, Budgets, ChatRequest, ChatResponse,
    ChatStreamChunk, Connector, ConnectorParameter, Conversation, ToolKind, Turn,
    TurnContextItem, TurnPayload,
};
use crate::services::connector_client::ConnectorClient;
use crate::services::llm_client::{
    BlockMessage, ChatMessage, CompletionRequest, ContentBlock, LlmClient, ToolRunOutcome, ToolSpec,
    MAX_TOOL_RESOLUTION_ROUNDS,
};
use crate::services::reasoning_tree::{Measure, ReasoningTree};
use crate::services::tokenizer::{count_tokens, truncate_to_tokens};
use crate::services::{agent_service::AgentService, connector_service::ConnectorService};
use crate::services::{conversation_service::ConversationService, datasource_service::DatasourceService};
use crate::services::retrieval_orchestrator::RetrievalOrchestrator;

const TOOL_ROUND_MAX_TOKENS: u32 = 1024;
const FINAL_MAX_TOKENS: u32 = 2048;

const FALLBACK_EN: &[&str] = &[
    "I don't have grounded information to answer that confidently.",
    "I couldn't find this in the scoped knowledge base, so I can't answer it reliably.",
    "I don't know — nothing in the available sources supports an answer here.",
];

const FALLBACK_FR: &[&str] = &[
    "Je ne dispose pas d'informations suffisamment fiables pour répondre à cela.",
    "Je n'ai rien trouvé dans la base de connaissances pour répondre avec certitude.",
    "Je ne sais pas, aucune source disponible ne permet de répondre à cette question.",
];

/// One item yielded by the streaming chat path: either an intermediate
/// SSE delta, or the terminal event carrying the full envelope.
#[derive(Debug, Clone)]
pub enum ChatStreamEvent {
    Delta(ChatStreamChunk),
    Final {
        response: ChatResponse,
        tree: ReasoningTree,
        cost_usd: f64,
    },
}

#[derive(Clone)]
pub struct ChatOrchestrator {
    agents: AgentService,
    datasources: DatasourceService,
    conversations: ConversationService,
    connectors: ConnectorService,
    connector_client: ConnectorClient,
    retrieval: RetrievalOrchestrator,
    llm: LlmClient,
    budgets: ChatBudgets,
}

/// Everything assembled before the final generation call — the output of
/// RESOLVE_SCOPE, CLASSIFY, conversation load, BUILD_TOOLS, and the
/// tool-resolution loop.
struct PreparedChat {
    conversation: Conversation,
    query: String,
    grounded_response: bool,
    model: String,
    system: String,
    user_content: String,
    seen_document_ids: HashSet<String>,
    tool_cost_usd: f64,
    tool_nodes: Vec<ReasoningTree>,
}

impl ChatOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        agents: AgentService,
        datasources: DatasourceService,
        conversations: ConversationService,
        connectors: ConnectorService,
        connector_client: ConnectorClient,
        retrieval: RetrievalOrchestrator,
        llm: LlmClient,
        budgets: ChatBudgets,
    ) -> Self {
        Self {
            agents,
            datasources,
            conversations,
            connectors,
            connector_client,
            retrieval,
            llm,
            budgets,
        }
    }

    /// Non-streaming chat turn.
    pub async fn chat(
        &self,
        org: Uuid,
        api_key_id: Uuid,
        payload: ChatRequest,
        connector_auth: Option<String>,
    ) -> AppResult<(ChatResponse, ReasoningTree, f64)> {
        let prepared = self.prepare(org, api_key_id, &payload, connector_auth.as_deref()).await?;

        let request = CompletionRequest {
            system: prepared.system.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prepared.user_content.clone(),
            }],
            model: prepared.model.clone(),
            max_tokens: FINAL_MAX_TOKENS,
        };
        let measure = Measure::start(json!({"stage": "generate", "model": prepared.model}));
        let outcome = self.llm.complete(&request).await?;
        let generate_node = measure.finish(vec![]);

        let (response, total_cost) = self.settle(&prepared, &outcome.text, outcome.cost_usd);
        self.persist(&prepared, &response).await;

        let mut children = prepared.tool_nodes.clone();
        children.push(generate_node);
        let tree = ReasoningTree::with_children(json!({"stage": "chat"}), children);
        Ok((response, tree, total_cost))
    }

    /// Streaming chat turn. The returned stream yields text deltas as
    /// they are extracted from the model's `response` JSON field, then a
    /// single `Final` event carrying the full envelope. Turn persistence
    /// and titling are kicked off once the final event is ready and run
    /// in the background rather than blocking the flush (sec 4.7
    /// ordering guarantee iii).
    pub async fn chat_stream(
        &self,
        org: Uuid,
        api_key_id: Uuid,
        payload: ChatRequest,
        connector_auth: Option<String>,
    ) -> AppResult<impl futures_util::Stream<Item = AppResult<ChatStreamEvent>>> {
        let prepared = self.prepare(org, api_key_id, &payload, connector_auth.as_deref()).await?;
        let orchestrator = self.clone();

        let request = CompletionRequest {
            system: prepared.system.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prepared.user_content.clone(),
            }],
            model: prepared.model.clone(),
            max_tokens: FINAL_MAX_TOKENS,
        };

        let stream = async_stream::try_stream! {
            let measure = Measure::start(json!({"stage": "generate", "model": prepared.model.clone()}));
            let mut upstream = orchestrator.llm.stream_complete(&request).await?;
            let mut scanner = crate::services::json_stream::ResponseFieldScanner::new();

            futures_util::pin_mut!(upstream);
            while let Some(delta) = futures_util::StreamExt::next(&mut upstream).await {
                let delta = delta?;
                if let Some(part) = scanner.feed(&delta) {
                    yield ChatStreamEvent::Delta(ChatStreamChunk { chunk: part, finished: false });
                }
            }
            let generate_node = measure.finish(vec![]);

            let raw = scanner.raw().to_string();
            let (response, total_cost) = orchestrator.settle(&prepared, &raw, 0.0);

            orchestrator.spawn_persist(prepared.conversation.clone(), response.clone(), prepared.query.clone());

            let mut children = prepared.tool_nodes.clone();
            children.push(generate_node);
            let tree = ReasoningTree::with_children(json!({"stage": "chat"}), children);
            yield ChatStreamEvent::Final { response, tree, cost_usd: total_cost };
        };

        Ok(stream)
    }

    async fn prepare(
        &self,
        org: Uuid,
        api_key_id: Uuid,
        payload: &ChatRequest,
        connector_auth: Option<&str>,
    ) -> AppResult<PreparedChat> {
        let agent_uuid = match &payload.agent_id {
            Some(external) => Some(self.agents.get(org, external).await?.id),
            None => None,
        };

        let agent_ids_fut = async {
            match agent_uuid {
                Some(id) => self.agents.datasource_ids(id).await,
                None => Ok(Vec::new()),
            }
        };
        let payload_ids_fut = async {
            if payload.datasource_ids.is_empty() {
                Ok(Vec::new())
            } else {
                self.datasources.resolve_ids(org, &payload.datasource_ids).await
            }
        };
        let conversation_fut =
            self.conversations
                .get_or_create(org, api_key_id, payload.conversation_id.as_deref(), agent_uuid);
        let classify_fut = self.llm.classify(&payload.query);

        let (agent_ids, payload_ids, conversation, class) =
            tokio::try_join!(agent_ids_fut, payload_ids_fut, conversation_fut, classify_fut)?;

        let mut datasource_ids = agent_ids;
        datasource_ids.extend(payload_ids);
        if datasource_ids.is_empty() {
            if let Some(bound_agent_id) = conversation.agent_id {
                datasource_ids = self.agents.datasource_ids(bound_agent_id).await?;
            }
        }
        let datasource_ids = dedup_preserve_order(datasource_ids);

        let (turns, connectors) = tokio::try_join!(
            self.conversations.recent_turns(conversation.id),
            self.list_connectors(org, &datasource_ids),
        )?;

        let history = format_history(&turns);
        let instructions = truncate_instructions(payload.instructions.as_deref(), self.budgets.instructions_max_tokens);
        let turn_context = truncate_turn_context(&payload.turn_context, self.budgets.turn_context_max_tokens);
        let turn_context_text = render_turn_context(&turn_context);

        let (tools, tool_kinds, connectors_by_id) = build_tools(&connectors);
        let model = self.llm.model_for(class).to_string();

        let tool_system = build_tool_system(instructions.as_deref());
        let tool_user = build_user_preamble(&payload.query, &history, &turn_context_text);

        let tool_loop = self
            .run_tool_loop(
                org,
                &tool_system,
                tool_user,
                &tools,
                &tool_kinds,
                &connectors_by_id,
                &datasource_ids,
                &turn_context,
                connector_auth,
                &model,
            )
            .await?;

        let system = build_final_system(instructions.as_deref());
        let user_content = build_user_content(&payload.query, &history, &turn_context_text, &tool_loop.gathered_context);

        Ok(PreparedChat {
            conversation,
            query: payload.query.clone(),
            grounded_response: payload.grounded_response,
            model,
            system,
            user_content,
            seen_document_ids: tool_loop.seen_document_ids,
            tool_cost_usd: tool_loop.cost_usd,
            tool_nodes: tool_loop.nodes,
        })
    }

    async fn list_connectors(&self, org: Uuid, datasource_ids: &[Uuid]) -> AppResult<Vec<Connector>> {
        if datasource_ids.is_empty() {
            return Ok(Vec::new());
        }
        self.connectors.list_for_datasources(org, datasource_ids).await
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_tool_loop(
        &self,
        org: Uuid,
        system: &str,
        first_user: String,
        tools: &[ToolSpec],
        tool_kinds: &HashMap<String, ToolKind>,
        connectors_by_id: &HashMap<Uuid, Connector>,
        datasource_ids: &[Uuid],
        turn_context: &[TurnContextItem],
        connector_auth: Option<&str>,
        model: &str,
    ) -> AppResult<ToolLoopOutcome> {
        let mut messages = vec![BlockMessage {
            role: "user".to_string(),
            content: vec![ContentBlock::Text { text: first_user }],
        }];
        let mut cost_usd = 0.0;
        let mut seen_document_ids = HashSet::new();
        let mut gathered_context = String::new();
        let mut nodes = Vec::new();

        for round in 0..MAX_TOOL_RESOLUTION_ROUNDS {
            let measure = Measure::start(json!({"stage": "tool_round", "round": round}));
            let ToolRunOutcome { blocks, stop_reason, cost_usd: round_cost } =
                self.llm.run_with_tools(system, &messages, tools, model, TOOL_ROUND_MAX_TOKENS).await?;
            cost_usd += round_cost;

            let tool_uses: Vec<(String, String, Value)> = blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::ToolUse { id, name, input } => Some((id.clone(), name.clone(), input.clone())),
                    _ => None,
                })
                .collect();

            nodes.push(measure.finish(vec![]));

            if tool_uses.is_empty() || stop_reason != "tool_use" {
                break;
            }

            messages.push(BlockMessage { role: "assistant".to_string(), content: blocks });

            let dispatches = tool_uses.iter().map(|(_, name, input)| {
                let kind = tool_kinds.get(name).cloned();
                self.invoke_tool(org, kind, input.clone(), datasource_ids, turn_context, connector_auth, connectors_by_id)
            });
            let results = futures_util::future::join_all(dispatches).await;

            let mut result_blocks = Vec::with_capacity(tool_uses.len());
            for ((id, name, _), (text, call_cost, docs)) in tool_uses.into_iter().zip(results) {
                cost_usd += call_cost;
                seen_document_ids.extend(docs);
                gathered_context.push_str(&format!("### {name}\n{text}\n\n"));
                result_blocks.push(ContentBlock::ToolResult { tool_use_id: id, content: text });
            }
            messages.push(BlockMessage { role: "user".to_string(), content: result_blocks });
        }

        Ok(ToolLoopOutcome { gathered_context, cost_usd, seen_document_ids, nodes })
    }

    #[allow(clippy::too_many_arguments)]
    async fn invoke_tool(
        &self,
        org: Uuid,
        kind: Option<ToolKind>,
        input: Value,
        datasource_ids: &[Uuid],
        turn_context: &[TurnContextItem],
        connector_auth: Option<&str>,
        connectors_by_id: &HashMap<Uuid, Connector>,
    ) -> (String, f64, Vec<String>) {
        match kind {
            Some(ToolKind::BuiltinRetrieve) => {
                if datasource_ids.is_empty() {
                    return ("No knowledge datasources are scoped to this conversation.".to_string(), 0.0, Vec::new());
                }
                let query = input.get("query").and_then(Value::as_str).unwrap_or_default();
                match self.retrieval.retrieve_chunks(org, datasource_ids, query, Budgets::default()).await {
                    Ok(outcome) => {
                        let docs = outcome.chunks.iter().map(|c| c.document_id.clone()).collect();
                        (render_chunks(&outcome.chunks), outcome.cost_usd, docs)
                    }
                    Err(err) => (format!("retrieval failed: {err}"), 0.0, Vec::new()),
                }
            }
            Some(ToolKind::BuiltinCurrentPage) => {
                if !turn_context.is_empty() {
                    (render_turn_context(turn_context), 0.0, Vec::new())
                } else if datasource_ids.is_empty() {
                    ("No current page context was supplied.".to_string(), 0.0, Vec::new())
                } else {
                    match self
                        .retrieval
                        .retrieve_chunks(org, datasource_ids, "what is the current page about", Budgets::default())
                        .await
                    {
                        Ok(outcome) => {
                            let docs = outcome.chunks.iter().map(|c| c.document_id.clone()).collect();
                            (render_chunks(&outcome.chunks), outcome.cost_usd, docs)
                        }
                        Err(err) => (format!("retrieval failed: {err}"), 0.0, Vec::new()),
                    }
                }
            }
            Some(ToolKind::Connector(id)) => match connectors_by_id.get(&id) {
                Some(connector) => {
                    let result = self.connector_client.invoke(connector, input, connector_auth).await;
                    (result.to_string(), 0.0, Vec::new())
                }
                None => ("connector not found".to_string(), 0.0, Vec::new()),
            },
            None => ("unknown tool".to_string(), 0.0, Vec::new()),
        }
    }

    /// PARSE_JSON, GROUNDING, and the confidence formula — pure given
    /// the accumulated generation text and the prepared context.
    fn settle(&self, prepared: &PreparedChat, raw_text: &str, generation_cost: f64) -> (ChatResponse, f64) {
        let parsed = parse_llm_answer(raw_text);
        let used_documents: Vec<String> = parsed
            .documents
            .into_iter()
            .filter(|d| prepared.seen_document_ids.contains(d))
            .collect();
        let used_documents = dedup_strings(used_documents);
        let confidence = compute_confidence(used_documents.len(), prepared.seen_document_ids.len());

        let needs_fallback = prepared.grounded_response && (!parsed.answered || used_documents.is_empty());
        let message = if needs_fallback {
            canned_fallback(detect_language(&prepared.query))
        } else {
            parsed.response
        };
        let answered = if needs_fallback { false } else { parsed.answered };

        let response = ChatResponse {
            message,
            documents: used_documents,
            answered,
            confidence,
            conversation_id: conversation_ref(&prepared.conversation),
        };
        (response, prepared.tool_cost_usd + generation_cost)
    }

    async fn persist(&self, prepared: &PreparedChat, response: &ChatResponse) {
        let payload = TurnPayload {
            query: prepared.query.clone(),
            response: response.message.clone(),
            documents: response.documents.clone(),
            answered: response.answered,
            confidence: response.confidence,
        };
        if let Err(err) = self.conversations.persist_turn(prepared.conversation.id, &payload).await {
            tracing::warn!(error = %err, "failed to persist turn");
        }
        if prepared.conversation.title.is_none() {
            if let Ok(title) = self.llm.generate_title(&prepared.query).await {
                let _ = self.conversations.set_title(prepared.conversation.id, &title).await;
            }
        }
    }

    fn spawn_persist(&self, conversation: Conversation, response: ChatResponse, query: String) {
        let conversations = self.conversations.clone();
        let llm = self.llm.clone();
        tokio::spawn(async move {
            let payload = TurnPayload {
                query: query.clone(),
                response: response.message.clone(),
                documents: response.documents.clone(),
                answered: response.answered,
                confidence: response.confidence,
            };
            if let Err(err) = conversations.persist_turn(conversation.id, &payload).await {
                tracing::warn!(error = %err, "failed to persist turn");
            }
            if conversation.title.is_none() {
                if let Ok(title) = llm.generate_title(&query).await {
                    let _ = conversations.set_title(conversation.id, &title).await;
                }
            }
        });
    }
}

struct ToolLoopOutcome {
    gathered_context: String,
    cost_usd: f64,
    seen_document_ids: HashSet<String>,
    nodes: Vec<ReasoningTree>,
}

fn conversation_ref(conversation: &Conversation) -> String {
    conversation
        .external_id
        .clone()
        .unwrap_or_else(|| conversation.id.to_string())
}

fn dedup_preserve_order(ids: Vec<Uuid>) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

fn dedup_strings(values: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    values.into_iter().filter(|v| seen.insert(v.clone())).collect()
}

fn build_tools(connectors: &[Connector]) -> (Vec<ToolSpec>, HashMap<String, ToolKind>, HashMap<Uuid, Connector>) {
    let mut tools = vec![
        ToolSpec {
            name: "searchKnowledgeBase".to_string(),
            description: "Searches the scoped knowledge base for passages relevant to a query.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {"query": {"type": "string", "description": "the search query"}},
                "required": ["query"],
            }),
        },
        ToolSpec {
            name: "getCurrentPage".to_string(),
            description: "Returns the caller-supplied snapshot of what the user is currently looking at.".to_string(),
            input_schema: json!({"type": "object", "properties": {}}),
        },
    ];
    let mut tool_kinds = HashMap::new();
    tool_kinds.insert("searchKnowledgeBase".to_string(), ToolKind::BuiltinRetrieve);
    tool_kinds.insert("getCurrentPage".to_string(), ToolKind::BuiltinCurrentPage);
    let mut used: HashSet<String> = tool_kinds.keys().cloned().collect();
    let mut connectors_by_id = HashMap::new();

    for connector in connectors {
        let parameters: Vec<ConnectorParameter> =
            serde_json::from_value(connector.parameter_schema.clone()).unwrap_or_default();
        let mut name = connector_function_name(&connector.name);
        if used.contains(&name) {
            name = format!("{name}_{}", random_suffix());
        }
        used.insert(name.clone());

        tools.push(ToolSpec {
            name: name.clone(),
            description: connector
                .purpose
                .clone()
                .unwrap_or_else(|| format!("Calls the {} connector.", connector.name)),
            input_schema: parameters_to_json_schema(&parameters),
        });
        tool_kinds.insert(name, ToolKind::Connector(connector.id));
        connectors_by_id.insert(connector.id, connector.clone());
    }

    (tools, tool_kinds, connectors_by_id)
}

fn random_suffix() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(4)
        .map(char::from)
        .collect::<String>()
        .to_lowercase()
}

fn render_chunks(chunks: &[crate::models::RetrievedChunk]) -> String {
    if chunks.is_empty() {
        return "No relevant passages were found.".to_string();
    }
    chunks
        .iter()
        .map(|c| format!("[doc {}] {}", c.document_id, c.text))
        .collect::<Vec<_>>()
        .join("\n---\n")
}

fn render_turn_context(items: &[TurnContextItem]) -> String {
    items
        .iter()
        .map(|item| format!("{}: {}", item.label, item.content))
        .collect::<Vec<_>>()
        .join("\n")
}

fn truncate_instructions(instructions: Option<&str>, max_tokens: u32) -> Option<String> {
    instructions.map(|text| truncate_to_tokens(text, max_tokens))
}

fn format_history(turns: &[Turn]) -> String {
    turns
        .iter()
        .filter_map(|t| serde_json::from_value::<TurnPayload>(t.payload.clone()).ok())
        .map(|p| format!("User: {}\nAssistant: {}", p.query, p.response))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Accumulates label+content tokens until `max_tokens` is exhausted,
/// always keeping a (possibly truncated) first item.
fn truncate_turn_context(items: &[TurnContextItem], max_tokens: u32) -> Vec<TurnContextItem> {
    let mut out = Vec::new();
    let mut used = 0u32;
    for item in items {
        let cost = count_tokens(&item.label) + count_tokens(&item.content);
        if used.saturating_add(cost) > max_tokens {
            if out.is_empty() {
                let remaining = max_tokens.saturating_sub(used);
                out.push(TurnContextItem {
                    label: item.label.clone(),
                    content: truncate_to_tokens(&item.content, remaining),
                });
            }
            break;
        }
        used += cost;
        out.push(item.clone());
    }
    out
}

fn detect_language(text: &str) -> &'static str {
    let lower = text.to_lowercase();
    const MARKERS: &[&str] = &[
        "pourquoi", "qu'est-ce", "est-ce que", "é", "è", "ê", "à ", "ç", "merci", "bonjour", "le ciel",
    ];
    if MARKERS.iter().any(|m| lower.contains(m)) {
        "fr"
    } else {
        "en"
    }
}

fn canned_fallback(language: &str) -> String {
    let pool = if language == "fr" { FALLBACK_FR } else { FALLBACK_EN };
    pool.choose(&mut rand::thread_rng()).copied().unwrap_or(pool[0]).to_string()
}

fn compute_confidence(used: usize, seen: usize) -> u8 {
    if seen == 0 {
        return 0;
    }
    (5.0 * used as f64 / seen as f64).ceil().clamp(0.0, 5.0) as u8
}

fn parse_llm_answer(raw_text: &str) -> crate::models::LlmAnswer {
    serde_json::from_str(raw_text.trim()).unwrap_or_else(|_| crate::models::LlmAnswer {
        response: raw_text.trim().to_string(),
        documents: Vec::new(),
        answered: false,
        confidence: 0,
    })
}

fn build_tool_system(instructions: Option<&str>) -> String {
    let mut sys = String::from(
        "You are a retrieval-grounded assistant with tools to search a knowledge base, \
         read the current page, and call integrations. Call whatever tools you need before \
         answering; do not answer from tools alone without considering the user's question.",
    );
    if let Some(extra) = instructions {
        sys.push_str("\n\nAdditional instructions:\n");
        sys.push_str(extra);
    }
    sys
}

fn build_final_system(instructions: Option<&str>) -> String {
    let mut sys = String::from(
        "You are a retrieval-grounded assistant. Use only the supplied knowledge and tool \
         results to answer; if the answer is not supported by them, say so plainly and set \
         \"answered\" to false. Respond with strict JSON only, no markdown fencing and no \
         surrounding prose: {\"response\": \"...\", \"documents\": [\"id\", ...], \
         \"answered\": true|false, \"confidence\": 0-5}.",
    );
    if let Some(extra) = instructions {
        sys.push_str("\n\nAdditional instructions:\n");
        sys.push_str(extra);
    }
    sys
}

fn build_user_preamble(query: &str, history: &str, turn_context: &str) -> String {
    let mut parts = Vec::new();
    if !history.is_empty() {
        parts.push(format!("Conversation history:\n{history}"));
    }
    if !turn_context.is_empty() {
        parts.push(format!("Current page context:\n{turn_context}"));
    }
    parts.push(format!("User query:\n{query}"));
    parts.join("\n\n")
}

fn build_user_content(query: &str, history: &str, turn_context: &str, tool_context: &str) -> String {
    let mut parts = Vec::new();
    if !history.is_empty() {
        parts.push(format!("Conversation history:\n{history}"));
    }
    if !turn_context.is_empty() {
        parts.push(format!("Current page context:\n{turn_context}"));
    }
    if !tool_context.is_empty() {
        parts.push(format!("Retrieved knowledge:\n{tool_context}"));
    }
    parts.push(format!("User query:\n{query}"));
    parts.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn compute_confidence_ceils_the_ratio() {
        assert_eq!(compute_confidence(1, 4), 2);
        assert_eq!(compute_confidence(0, 4), 0);
        assert_eq!(compute_confidence(4, 4), 5);
        assert_eq!(compute_confidence(0, 0), 0);
    }

    #[test]
    fn detect_language_recognizes_french_markers() {
        assert_eq!(detect_language("Pourquoi le ciel est bleu?"), "fr");
        assert_eq!(detect_language("Why is the sky blue?"), "en");
    }

    #[test]
    fn canned_fallback_picks_from_the_matching_language_pool() {
        let message = canned_fallback("fr");
        assert!(FALLBACK_FR.contains(&message.as_str()));
        let message = canned_fallback("en");
        assert!(FALLBACK_EN.contains(&message.as_str()));
    }

    #[test]
    fn truncate_turn_context_always_keeps_a_first_item() {
        let items = vec![TurnContextItem {
            label: "page".to_string(),
            content: "a ".repeat(500),
        }];
        let truncated = truncate_turn_context(&items, 5);
        assert_eq!(truncated.len(), 1);
        assert!(count_tokens(&truncated[0].content) <= 5);
    }

    #[test]
    fn truncate_turn_context_drops_items_once_budget_is_exhausted() {
        let items = vec![
            TurnContextItem { label: "a".to_string(), content: "short".to_string() },
            TurnContextItem { label: "b".to_string(), content: "x ".repeat(2000) },
        ];
        let truncated = truncate_turn_context(&items, 50);
        assert_eq!(truncated.len(), 1);
        assert_eq!(truncated[0].label, "a");
    }

    #[test]
    fn format_history_renders_query_and_response_pairs() {
        let turn = Turn {
            id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
            payload: serde_json::to_value(TurnPayload {
                query: "hi".to_string(),
                response: "hello".to_string(),
                documents: Vec::new(),
                answered: true,
                confidence: 3,
            })
            .unwrap(),
            metadata: None,
            token_count: 2,
            created_at: Utc::now(),
        };
        let rendered = format_history(&[turn]);
        assert_eq!(rendered, "User: hi\nAssistant: hello");
    }

    #[test]
    fn parse_llm_answer_falls_back_to_raw_text_on_malformed_json() {
        let parsed = parse_llm_answer("not json at all");
        assert_eq!(parsed.response, "not json at all");
        assert!(!parsed.answered);
    }

    #[test]
    fn build_tools_resolves_name_collisions_with_a_suffix() {
        let connector = Connector {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            datasource_id: Uuid::new_v4(),
            name: "search knowledge base".to_string(),
            purpose: None,
            endpoint: "https://example.com".to_string(),
            method: crate::models::ConnectorMethod::Get,
            parameter_schema: serde_json::json!([]),
            created_at: Utc::now(),
        };
        let (tools, kinds, _) = build_tools(&[connector]);
        assert_eq!(tools.len(), 3);
        assert!(kinds.contains_key("searchKnowledgeBase"));
        let connector_tool_name = tools[2].name.clone();
        assert_ne!(connector_tool_name, "searchKnowledgeBase");
        assert!(connector_tool_name.starts_with("search_knowledge_base"));
    }
}
