//! `serve` command handler.

use crate::config::Settings;
use crate::error::{AppError, AppResult};
use crate::server::Server;
use crate::state::Stores;

pub struct ServeCommandHandler {
    config: Settings,
}

impl ServeCommandHandler {
    pub fn new(config: Settings) -> Self {
        Self { config }
    }

    pub async fn execute(&self) -> AppResult<()> {
        self.config.server.validate()?;
        let stores = Stores::connect(&self.config).await?;

        Server::new(self.config.clone())
            .run(&stores)
            .await
            .map_err(|source| AppError::Internal { source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_server_config_is_rejected_before_binding() {
        let mut config = Settings::default();
        config.database.url = "memory:".to_string();
        config.server.port = 0;

        let result = ServeCommandHandler::new(config).execute().await;
        assert!(matches!(
            result,
            Err(AppError::Configuration { ref key, .. }) if key == "server.port"
        ));
    }
}
