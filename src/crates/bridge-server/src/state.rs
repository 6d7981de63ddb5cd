//! Shared application state wired into every handler.

use bridge_core::StateMirror;
use bridge_llm::{ChatClient, HttpChatClient, Provider, ProviderConfig, ProfileStore};
use bridge_pipeline::auditor::Auditor;
use bridge_pipeline::committer::Committer;
use bridge_pipeline::executor::Executor;
use bridge_pipeline::planner::Planner;
use bridge_pipeline::tools::{HttpExternalReader, ToolRegistry};
use bridge_pipeline::{
    AgentCoordinator, ChatChannel, ExecutionTracer, PendingActions, QueueSet, Scheduler,
};
use std::sync::Arc;
use tracing::warn;

/// Everything the handlers need, cheap to clone per request.
#[derive(Clone)]
pub struct AppState {
    pub mirror: StateMirror,
    pub queues: QueueSet,
    pub chat: Arc<ChatChannel>,
    pub tracer: Arc<ExecutionTracer>,
    pub pending: Arc<PendingActions>,
    pub scheduler: Arc<Scheduler>,
    pub coordinator: Arc<AgentCoordinator>,
    pub profiles: Arc<ProfileStore>,
}

impl AppState {
    /// Assemble the full pipeline behind one state value.
    ///
    /// The planner client comes from the active profile; with no profile
    /// stored the client is created keyless and every turn is rejected at
    /// the coordinator's guard.
    pub fn assemble(profiles: Arc<ProfileStore>, search_endpoint: &str) -> Self {
        let mirror = StateMirror::new();
        let queues = QueueSet::new();
        let chat = Arc::new(ChatChannel::new());
        let tracer = Arc::new(ExecutionTracer::new());
        let pending = Arc::new(PendingActions::new());
        let registry = Arc::new(ToolRegistry::with_builtin_tools());

        let planner = Arc::new(Planner::new(queues.clone(), tracer.clone()));
        let executor = Arc::new(Executor::new(
            queues.clone(),
            mirror.clone(),
            registry.clone(),
            Arc::new(HttpExternalReader::new(search_endpoint)),
            chat.clone(),
            tracer.clone(),
        ));
        let auditor = Arc::new(Auditor::new(queues.clone(), mirror.clone(), tracer.clone()));
        let committer = Arc::new(Committer::new(
            queues.clone(),
            mirror.clone(),
            pending.clone(),
            chat.clone(),
            tracer.clone(),
        ));
        let scheduler = Arc::new(Scheduler::new(
            queues.clone(),
            planner,
            executor,
            auditor,
            committer,
        ));

        let client = Self::client_from_profiles(&profiles);
        let coordinator = Arc::new(AgentCoordinator::new(
            client,
            registry,
            queues.clone(),
            scheduler.clone(),
        ));

        Self {
            mirror,
            queues,
            chat,
            tracer,
            pending,
            scheduler,
            coordinator,
            profiles,
        }
    }

    fn client_from_profiles(profiles: &ProfileStore) -> Arc<dyn ChatClient> {
        let config = match profiles.get_active() {
            Some(profile) => match profile.api_key() {
                Ok(api_key) => ProviderConfig::new(profile.provider, api_key)
                    .with_endpoint(profile.endpoint.clone())
                    .with_model(profile.model.clone()),
                Err(e) => {
                    warn!(error = %e, "Active profile key unreadable, starting keyless");
                    ProviderConfig::new(Provider::Custom, "")
                }
            },
            None => ProviderConfig::new(Provider::Custom, ""),
        };
        match HttpChatClient::new(config) {
            Ok(client) => Arc::new(client),
            Err(e) => {
                warn!(error = %e, "HTTP client construction failed, starting keyless");
                Arc::new(
                    HttpChatClient::new(ProviderConfig::new(Provider::Custom, ""))
                        .expect("default client must construct"),
                )
            }
        }
    }
}
