use crate::connection::ConnectionParams;
use crate::core::Result;
use crate::interface::DatabaseClient;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Verification logic that is not a plain SQL script.
#[async_trait]
pub trait CustomAction: Send + Sync {
    async fn run(&self, params: &ConnectionParams, client: &dyn DatabaseClient) -> Result<()>;
}

#[async_trait]
impl<F> CustomAction for F
where
    F: Fn(&ConnectionParams) -> Result<()> + Send + Sync,
{
    async fn run(&self, params: &ConnectionParams, _client: &dyn DatabaseClient) -> Result<()> {
        self(params)
    }
}

/// A check or mutation executed against the live instance
#[derive(Clone)]
pub enum VerificationAction {
    /// Run `sql` (one or more statements) and commit.
    Sql { description: String, sql: String },
    Custom {
        description: String,
        action: Arc<dyn CustomAction>,
    },
}

impl VerificationAction {
    pub fn sql(description: impl Into<String>, sql: impl Into<String>) -> Self {
        Self::Sql {
            description: description.into(),
            sql: sql.into(),
        }
    }

    pub fn custom(description: impl Into<String>, action: impl CustomAction + 'static) -> Self {
        Self::Custom {
            description: description.into(),
            action: Arc::new(action),
        }
    }

    pub fn description(&self) -> &str {
        match self {
            Self::Sql { description, .. } | Self::Custom { description, .. } => description,
        }
    }

    pub async fn run(&self, params: &ConnectionParams, client: &dyn DatabaseClient) -> Result<()> {
        info!("Callback Description: {}", self.description());

        match self {
            Self::Sql { sql, .. } => {
                debug!("Callback SQL: {}", sql);
                client.execute_script(params, sql).await
            }
            Self::Custom { action, .. } => action.run(params, client).await,
        }
    }
}

impl fmt::Debug for VerificationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sql { description, sql } => f
                .debug_struct("Sql")
                .field("description", description)
                .field("sql", sql)
                .finish(),
            Self::Custom { description, .. } => f
                .debug_struct("Custom")
                .field("description", description)
                .finish_non_exhaustive(),
        }
    }
}
