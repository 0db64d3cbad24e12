//! Service wiring: builds the registry, agents, gateway, executor, and patch
//! engine from settings and an LLM client. The serve and cli crates stay
//! thin by constructing everything through here.

use std::sync::Arc;

use crate::backend::{BackendAdapters, BackendClient, BackendError};
use crate::chat::ChatAgent;
use crate::executor::Executor;
use crate::gateway::Gateway;
use crate::llm::LlmClient;
use crate::patch::PatchEngine;
use crate::planner::{PatchAgent, Planner};
use crate::prompts::PromptSet;
use crate::resolver::EntityResolver;
use crate::router::Router;
use crate::session::SessionStore;
use crate::settings::Settings;
use crate::tools::{
    ComparePopulationsTool, GetAssignmentSubmissionsTool, GetClassAssignmentsTool,
    GetClassDetailTool, GetStudentSubmissionsTool, GetTeacherClassesTool, SummaryStatsTool,
    ToolRegistry,
};

/// Everything one process needs to serve requests.
pub struct Service {
    pub settings: Arc<Settings>,
    pub registry: Arc<ToolRegistry>,
    pub sessions: Arc<SessionStore>,
    pub gateway: Arc<Gateway>,
    pub executor: Arc<Executor>,
    pub patcher: Arc<PatchEngine>,
    pub planner: Arc<Planner>,
}

impl Service {
    /// Builds the full service graph. The registry is complete (and
    /// effectively read-only) when this returns.
    pub fn build(settings: Arc<Settings>, llm: Arc<dyn LlmClient>) -> Result<Self, BackendError> {
        let prompts = PromptSet::load_or_default(None);
        let client = Arc::new(BackendClient::new(&settings)?);
        let adapters = Arc::new(BackendAdapters::new(client));

        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(GetTeacherClassesTool::new(
            adapters.clone(),
            settings.clone(),
        )));
        registry.register(Arc::new(GetClassDetailTool::new(
            adapters.clone(),
            settings.clone(),
        )));
        registry.register(Arc::new(GetClassAssignmentsTool::new(
            adapters.clone(),
            settings.clone(),
        )));
        registry.register(Arc::new(GetAssignmentSubmissionsTool::new(
            adapters.clone(),
            settings.clone(),
        )));
        registry.register(Arc::new(GetStudentSubmissionsTool::new(
            adapters,
            settings.clone(),
        )));
        registry.register(Arc::new(SummaryStatsTool));
        registry.register(Arc::new(ComparePopulationsTool));
        let registry = Arc::new(registry);

        let sessions = Arc::new(SessionStore::new(settings.session_ttl));
        let router = Router::new(
            llm.clone(),
            prompts.router.clone(),
            settings.enable_content_intents,
        );
        let resolver = EntityResolver::new(registry.clone());
        let planner = Arc::new(Planner::new(
            llm.clone(),
            registry.clone(),
            prompts.planner.clone(),
        ));
        let patch_agent = PatchAgent::new(llm.clone(), prompts.patch.clone());
        let chat = ChatAgent::new(llm.clone(), prompts.chat.clone());

        let gateway = Arc::new(Gateway::new(
            router,
            resolver,
            planner.clone(),
            patch_agent,
            chat,
            sessions.clone(),
            registry.clone(),
            settings.clone(),
        ));
        let executor = Arc::new(Executor::new(registry.clone(), llm.clone()));
        let patcher = Arc::new(PatchEngine::new(llm));

        Ok(Self {
            settings,
            registry,
            sessions,
            gateway,
            executor,
            patcher,
            planner,
        })
    }
}
