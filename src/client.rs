use std::sync::Arc;

use crate::config::ClientConfig;
use crate::error::{CephError, CephResult};
use crate::logging::Logger;
use crate::rbd::RbdClient;
use crate::session::{self, Auth};
use crate::task::{CompletionWaiter, TaskReader};
use crate::transport::HttpTransport;

/// Logged-in client for one manager.
#[derive(Clone)]
pub struct CephClient {
    transport: Arc<HttpTransport>,
    tasks: TaskReader,
    rbd: RbdClient,
    auth: Auth,
    log: Logger,
}

impl CephClient {
    /// Connect using the process-wide logger.
    pub async fn connect(config: &ClientConfig) -> CephResult<Self> {
        Self::connect_with_logger(config, Logger::global()).await
    }

    /// Try each configured server in order; the first successful login wins.
    pub async fn connect_with_logger(config: &ClientConfig, log: Logger) -> CephResult<Self> {
        config.validate()?;

        let mut failures = Vec::new();
        for server in config.server_configs() {
            let address = server.address.clone();
            match Self::connect_server(config, server, log.clone()).await {
                Ok(client) => return Ok(client),
                Err(err @ CephError::Validation { .. }) => return Err(err),
                Err(err) => {
                    log.warn(format_args!(
                        "could not login to rest api server '{}' with user '{}': {}",
                        address, config.username, err
                    ));
                    failures.push(format!("{}: {}", address, err));
                }
            }
        }

        Err(CephError::Authentication(format!(
            "no server accepted the login: {}",
            failures.join("; ")
        )))
    }

    async fn connect_server(
        config: &ClientConfig,
        server: crate::config::ServerConfig,
        log: Logger,
    ) -> CephResult<Self> {
        let transport = Arc::new(HttpTransport::new(
            server,
            config.retry.clone(),
            config.timeout(),
            log.clone(),
        )?);

        session::discover_manager(&transport).await?;
        let auth = session::login(&transport, &config.username, &config.password).await?;

        let tasks = TaskReader::new(transport.clone(), log.clone());
        let waiter = CompletionWaiter::new(
            Arc::new(tasks.clone()),
            config.poll.clone(),
            log.clone(),
        );
        let rbd = RbdClient::new(transport.clone(), waiter, config.max_iterations, log.clone());

        log.info(format_args!(
            "logged in to {} as '{}'",
            transport.server().await.base_url(),
            auth.username
        ));

        Ok(Self {
            transport,
            tasks,
            rbd,
            auth,
            log,
        })
    }

    pub fn rbd(&self) -> &RbdClient {
        &self.rbd
    }

    pub fn tasks(&self) -> &TaskReader {
        &self.tasks
    }

    pub fn auth(&self) -> &Auth {
        &self.auth
    }

    pub fn transport(&self) -> &Arc<HttpTransport> {
        &self.transport
    }

    pub async fn logout(&self) -> CephResult<()> {
        session::logout(&self.transport).await?;
        self.log.info(format_args!("logged out"));
        Ok(())
    }
}
