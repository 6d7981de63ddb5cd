//! The agent coordinator: one user turn, planned and dispatched.
//!
//! A turn either comes back immediately as prose (question answering) or
//! becomes a goal on the goal queue with a receipt, after which the
//! scheduler drains the pipeline asynchronously and feedback arrives on
//! the chat channel under the turn's correlation id.

use crate::scheduler::{Scheduler, SchedulerConfig};
use crate::tools::ToolRegistry;
use crate::types::{Goal, QueueSet, TaskSpec};
use bridge_llm::{
    retry_with_backoff, ChatClient, ChatRequest, LlmError, Message, RetryConfig, ToolCall,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

const PLANNER_SYSTEM_PROMPT: &str = "You are the planning layer of a graph-editing assistant. \
The user works in a canvas of named graphs whose nodes are instances of reusable concepts. \
When the user asks for changes, call the provided tools; put independent changes in separate \
calls and order dependent ones. When the user asks a question about the workspace, answer \
directly in prose without calling tools.";

/// One user turn.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub message: String,

    /// Workspace context forwarded to the planner (active graph, thread).
    pub context: Option<Value>,

    pub api_key: Option<String>,

    /// Correlation id; minted when absent.
    pub cid: Option<String>,
}

/// Receipt for one turn.
#[derive(Debug, Clone)]
pub struct TurnResponse {
    pub success: bool,
    pub response: String,
    pub tool_calls: Vec<ToolCall>,
    pub goal_id: Option<String>,
    pub cid: String,
}

pub struct AgentCoordinator {
    client: Arc<dyn ChatClient>,
    registry: Arc<ToolRegistry>,
    queues: QueueSet,
    scheduler: Arc<Scheduler>,
    scheduler_config: SchedulerConfig,
    retry: RetryConfig,
}

impl AgentCoordinator {
    pub fn new(
        client: Arc<dyn ChatClient>,
        registry: Arc<ToolRegistry>,
        queues: QueueSet,
        scheduler: Arc<Scheduler>,
    ) -> Self {
        Self {
            client,
            registry,
            queues,
            scheduler,
            scheduler_config: SchedulerConfig::default(),
            retry: RetryConfig::default(),
        }
    }

    pub fn with_scheduler_config(mut self, config: SchedulerConfig) -> Self {
        self.scheduler_config = config;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Handle one turn: guard, plan, then either answer or enqueue.
    pub async fn handle_turn(&self, request: TurnRequest) -> TurnResponse {
        let cid = request
            .cid
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        if request
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .is_none()
        {
            return TurnResponse {
                success: false,
                response: "An API key is required. Store a provider profile before sending turns."
                    .to_string(),
                tool_calls: Vec::new(),
                goal_id: None,
                cid,
            };
        }

        let thread_id = request
            .context
            .as_ref()
            .and_then(|c| c.get("thread_id"))
            .and_then(Value::as_str)
            .unwrap_or(&cid)
            .to_string();

        let mut messages = vec![Message::system(PLANNER_SYSTEM_PROMPT)];
        if let Some(context) = &request.context {
            messages.push(Message::system(format!("Workspace context: {}", context)));
        }
        messages.push(Message::user(&request.message));

        let chat_request = ChatRequest::new(messages)
            .with_tools(self.registry.tool_specs())
            .with_tool_choice("auto")
            .with_temperature(0.2)
            .with_max_tokens(2048);

        let planned = retry_with_backoff(&self.retry, "plan", || {
            self.client.chat(chat_request.clone())
        })
        .await;

        let response = match planned {
            Err(error) => {
                warn!(cid = %cid, error = %error, "Planning call failed");
                return TurnResponse {
                    success: false,
                    response: Self::user_facing_error(&error),
                    tool_calls: Vec::new(),
                    goal_id: None,
                    cid,
                };
            }
            Ok(response) => response,
        };

        // QA intent: the model answered in prose.
        if !response.wants_tools() {
            return TurnResponse {
                success: true,
                response: response.content,
                tool_calls: Vec::new(),
                goal_id: None,
                cid,
            };
        }

        let tasks: Vec<TaskSpec> = response
            .tool_calls
            .iter()
            .map(|call| TaskSpec {
                tool: call.name.clone(),
                args: call.arguments.clone(),
            })
            .collect();
        let task_count = tasks.len();
        let goal = Goal::new(&thread_id, &cid, tasks);
        let goal_id = goal.goal_id.clone();
        self.queues.goals.enqueue(goal, Some(thread_id.clone()));
        self.scheduler.start(self.scheduler_config.clone());

        info!(cid = %cid, goal_id = %goal_id, tasks = task_count, "Turn planned and enqueued");
        TurnResponse {
            success: true,
            response: format!(
                "Planned {} action{}; execution started.",
                task_count,
                if task_count == 1 { "" } else { "s" }
            ),
            tool_calls: response.tool_calls,
            goal_id: Some(goal_id),
            cid,
        }
    }

    fn user_facing_error(error: &LlmError) -> String {
        match error {
            LlmError::Authentication(_) | LlmError::ApiKeyNotFound(_) => {
                "Authentication with the provider failed. Check the active profile's API key."
                    .to_string()
            }
            LlmError::ModelNotFound(detail) => {
                format!("The configured model was not recognized. {}", detail)
            }
            LlmError::RateLimitExceeded(_) => {
                "The provider is rate-limiting requests. Wait a moment and try again.".to_string()
            }
            other => format!("Planning failed: {}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auditor::Auditor;
    use crate::chat::ChatChannel;
    use crate::committer::Committer;
    use crate::executor::Executor;
    use crate::pending::PendingActions;
    use crate::planner::Planner;
    use crate::tools::HttpExternalReader;
    use crate::tracer::ExecutionTracer;
    use async_trait::async_trait;
    use bridge_core::StateMirror;
    use bridge_llm::{ChatResponse, Result as LlmResult};
    use parking_lot::Mutex;
    use serde_json::json;

    /// Scripted model: pops the next canned response per call.
    struct ScriptedClient {
        responses: Mutex<Vec<LlmResult<ChatResponse>>>,
    }

    impl ScriptedClient {
        fn new(responses: Vec<LlmResult<ChatResponse>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses),
            })
        }
    }

    #[async_trait]
    impl ChatClient for ScriptedClient {
        async fn chat(&self, _request: ChatRequest) -> LlmResult<ChatResponse> {
            self.responses
                .lock()
                .pop()
                .unwrap_or_else(|| Err(LlmError::Provider("script exhausted".to_string())))
        }
    }

    fn prose(text: &str) -> LlmResult<ChatResponse> {
        Ok(ChatResponse {
            content: text.to_string(),
            tool_calls: Vec::new(),
            usage: None,
            model: "scripted".to_string(),
        })
    }

    fn tool_plan(calls: Vec<(&str, Value)>) -> LlmResult<ChatResponse> {
        Ok(ChatResponse {
            content: String::new(),
            tool_calls: calls
                .into_iter()
                .enumerate()
                .map(|(i, (name, arguments))| ToolCall {
                    id: format!("call_{}", i),
                    name: name.to_string(),
                    arguments,
                })
                .collect(),
            usage: None,
            model: "scripted".to_string(),
        })
    }

    fn coordinator(
        client: Arc<dyn ChatClient>,
    ) -> (AgentCoordinator, QueueSet, Arc<Scheduler>) {
        let queues = QueueSet::new();
        let mirror = StateMirror::new();
        let tracer = Arc::new(ExecutionTracer::new());
        let chat = Arc::new(ChatChannel::new());
        let registry = Arc::new(ToolRegistry::with_builtin_tools());

        let planner = Arc::new(Planner::new(queues.clone(), tracer.clone()));
        let executor = Arc::new(Executor::new(
            queues.clone(),
            mirror.clone(),
            registry.clone(),
            Arc::new(HttpExternalReader::new("")),
            chat.clone(),
            tracer.clone(),
        ));
        let auditor = Arc::new(Auditor::new(queues.clone(), mirror.clone(), tracer.clone()));
        let committer = Arc::new(Committer::new(
            queues.clone(),
            mirror,
            Arc::new(PendingActions::new()),
            chat,
            tracer,
        ));
        let scheduler = Arc::new(Scheduler::new(
            queues.clone(),
            planner,
            executor,
            auditor,
            committer,
        ));
        let coordinator =
            AgentCoordinator::new(client, registry, queues.clone(), scheduler.clone())
                .with_retry(RetryConfig::new(0));
        (coordinator, queues, scheduler)
    }

    fn turn(message: &str) -> TurnRequest {
        TurnRequest {
            message: message.to_string(),
            context: Some(json!({"thread_id": "thread-A"})),
            api_key: Some("sk-test".to_string()),
            cid: Some("cid-1".to_string()),
        }
    }

    #[tokio::test]
    async fn test_turn_without_api_key_is_rejected() {
        let (coordinator, queues, _) = coordinator(ScriptedClient::new(vec![]));
        let response = coordinator
            .handle_turn(TurnRequest {
                api_key: None,
                ..turn("make a graph")
            })
            .await;

        assert!(!response.success);
        assert!(response.response.contains("API key"));
        assert!(queues.goals.is_empty());
    }

    #[tokio::test]
    async fn test_qa_intent_returns_prose_directly() {
        let (coordinator, queues, scheduler) = coordinator(ScriptedClient::new(vec![prose(
            "You have three graphs; 'Cities' is active.",
        )]));
        let response = coordinator.handle_turn(turn("what's in my workspace?")).await;

        assert!(response.success);
        assert!(response.response.contains("Cities"));
        assert!(response.goal_id.is_none());
        assert!(queues.goals.is_empty());
        assert_eq!(scheduler.state(), crate::scheduler::SchedulerState::Stopped);
    }

    #[tokio::test]
    async fn test_tool_plan_enqueues_goal_and_starts_scheduler() {
        let (coordinator, queues, scheduler) =
            coordinator(ScriptedClient::new(vec![tool_plan(vec![(
                "create_graph",
                json!({"name": "Cities"}),
            )])]));

        let response = coordinator.handle_turn(turn("create a Cities graph")).await;

        assert!(response.success);
        assert_eq!(response.tool_calls.len(), 1);
        assert!(response.goal_id.is_some());
        assert_eq!(response.cid, "cid-1");
        assert_eq!(queues.goals.len(), 1);
        assert_eq!(scheduler.state(), crate::scheduler::SchedulerState::Running);
        scheduler.stop();
    }

    #[tokio::test]
    async fn test_auth_failure_maps_to_user_visible_message() {
        let (coordinator, ..) = coordinator(ScriptedClient::new(vec![Err(
            LlmError::Authentication("bad key".to_string()),
        )]));
        let response = coordinator.handle_turn(turn("do anything")).await;

        assert!(!response.success);
        assert!(response.response.contains("API key"));
    }

    #[tokio::test]
    async fn test_fresh_cid_is_minted_when_absent() {
        let (coordinator, ..) = coordinator(ScriptedClient::new(vec![prose("hi")]));
        let response = coordinator
            .handle_turn(TurnRequest {
                cid: None,
                ..turn("hello")
            })
            .await;
        assert!(!response.cid.is_empty());
    }
}
