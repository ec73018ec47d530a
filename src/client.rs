use std::sync::Arc;

use tracing::debug;

use crate::config::ClientConfig;
use crate::error::ApiResult;
use crate::gateway::Gateway;
use crate::identity::{
    FileTokenStore, LoginError, LoginFlow, LoginRequest, LoginResponse, Navigator, Principal, SessionContext, SessionResolver, TokenStore,
};
use crate::query::QueryCoordinator;
use crate::resources::HelpdeskApi;

/// One authenticated session against a helpdesk backend: credential store, gateway,
/// principal cache, login flow and query cache, wired together.
pub struct HelpdeskClient {
    config: ClientConfig,
    context: Arc<SessionContext>,
    gateway: Arc<Gateway>,
    resolver: Arc<SessionResolver>,
    login: LoginFlow,
    queries: QueryCoordinator,
    api: HelpdeskApi,
}

impl HelpdeskClient {
    pub fn new(config: ClientConfig, tokens: Arc<dyn TokenStore>, navigator: Arc<dyn Navigator>) -> ApiResult<Self> {
        let context = Arc::new(SessionContext::new(tokens, navigator, config.login_route.clone()));
        let gateway = Arc::new(Gateway::new(&config, Arc::clone(&context))?);
        Ok(Self::assemble(config, context, gateway))
    }

    /// Credential persisted at `config.token_file`.
    pub fn from_config(config: ClientConfig, navigator: Arc<dyn Navigator>) -> ApiResult<Self> {
        let tokens: Arc<dyn TokenStore> = Arc::new(FileTokenStore::new(config.token_file.clone()));
        Self::new(config, tokens, navigator)
    }

    fn assemble(config: ClientConfig, context: Arc<SessionContext>, gateway: Arc<Gateway>) -> Self {
        let resolver = Arc::new(SessionResolver::new(Arc::clone(&context), Arc::clone(&gateway), config.principal_freshness()));
        let login = LoginFlow::new(Arc::clone(&gateway), Arc::clone(&context), config.landing_route.clone());
        let queries = QueryCoordinator::new(config.query_staleness());

        // nothing cached under one identity may be served to the next
        let on_end = queries.clone();
        context.on_session_end(move || {
            debug!(target: "session", "session ended, dropping cached queries");
            on_end.clear();
        });

        let api = HelpdeskApi::new(Arc::clone(&gateway), queries.clone(), Arc::clone(&resolver), Arc::clone(&context));
        Self { config, context, gateway, resolver, login, queries, api }
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, LoginError> {
        let resp = self.login.login(&LoginRequest::new(username, password)).await?;
        self.queries.clear();
        Ok(resp)
    }

    pub fn logout(&self) -> ApiResult<()> { self.context.logout() }

    pub async fn current_principal(&self) -> Option<Principal> { self.resolver.current_principal().await }

    pub fn is_authenticated(&self) -> bool { self.context.is_authenticated() }

    pub fn config(&self) -> &ClientConfig { &self.config }
    pub fn context(&self) -> &Arc<SessionContext> { &self.context }
    pub fn gateway(&self) -> &Arc<Gateway> { &self.gateway }
    pub fn resolver(&self) -> &Arc<SessionResolver> { &self.resolver }
    pub fn queries(&self) -> &QueryCoordinator { &self.queries }
    pub fn api(&self) -> &HelpdeskApi { &self.api }
}
