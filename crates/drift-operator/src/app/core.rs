use anyhow::Result;

use crate::app::services::ApplicationServices;
use crate::app::tasks::Tasks;
use crate::config::OperatorArgs;

/// Application core structure with explicit dependencies
pub struct Application {
    services: ApplicationServices,
    operator_args: OperatorArgs,
}

impl Application {
    pub fn new(services: ApplicationServices, operator_args: OperatorArgs) -> Self {
        Self {
            services,
            operator_args,
        }
    }

    pub fn services(&self) -> &ApplicationServices {
        &self.services
    }

    pub fn operator_args(&self) -> &OperatorArgs {
        &self.operator_args
    }

    /// Run application, start all tasks and wait for completion
    pub async fn run(&self) -> Result<()> {
        tracing::info!("Starting all application tasks...");

        let mut tasks = Tasks::new();

        if let Err(e) = tasks.spawn_all_tasks(self) {
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
