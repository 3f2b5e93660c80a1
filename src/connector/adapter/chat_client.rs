use async_trait::async_trait;

use crate::domain::DomainError;

/// Transport-level chat completion. Providers implement this so the
/// collaborator stays decoupled from serialization and endpoint details.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(
        &self,
        model: &str,
        system: &str,
        user: &str,
    ) -> Result<String, DomainError>;

    fn provider_name(&self) -> &'static str;
}
