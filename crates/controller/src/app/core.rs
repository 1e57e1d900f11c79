use anyhow::Result;

use crate::app::services::ApplicationServices;
use crate::app::tasks::Tasks;
use crate::config::Cli;

/// Application core structure with explicit dependencies
pub struct Application {
    services: ApplicationServices,
    cli: Cli,
}

impl Application {
    /// Create new application with explicit service dependencies
    pub fn new(services: ApplicationServices, cli: Cli) -> Self {
        Self { services, cli }
    }

    /// Run application, start all tasks and wait until they finish or a
    /// shutdown signal arrives
    pub async fn run(&mut self) -> Result<()> {
        tracing::info!(
            namespace = self.cli.namespace.as_deref().unwrap_or("<all>"),
            workers = self.cli.workers,
            "Starting all application tasks..."
        );

        let mut tasks = Tasks::new();

        if let Err(e) = tasks.spawn_all_tasks(&mut self.services) {
            tracing::error!("Failed to spawn application tasks: {}", e);
            return Err(e);
        }

        if let Err(e) = tasks.wait_for_completion().await {
            tracing::error!("Error during task execution: {}", e);
            return Err(e);
        }

        tracing::info!("Application run completed");
        Ok(())
    }
}
