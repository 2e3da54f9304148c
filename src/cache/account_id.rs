//! Account ID lookup
//!
//! The account ID is the fifth colon-delimited field of the caller identity
//! ARN (`arn:aws:sts::123456789012:assumed-role/...`). It ends up in IAM and
//! S3 names, so anything other than exactly twelve ASCII digits is rejected.

use std::time::Duration;

use tracing::debug;

use moka::future::Cache;

use super::lookup_cache;
use crate::aws::AwsClients;
use crate::error::{Error, Result};

const ACCOUNT_ID_LENGTH: usize = 12;

/// Check that `id` is exactly twelve ASCII digits.
pub fn validate_account_id(id: &str) -> Result<()> {
    if id.len() == ACCOUNT_ID_LENGTH && id.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(Error::InvalidAccountId(id.to_string()))
    }
}

/// Extract and validate the account ID from an identity ARN.
pub fn parse_account_id(arn: &str) -> Result<String> {
    let id = arn.split(':').nth(4).unwrap_or_default();
    validate_account_id(id)?;
    Ok(id.to_string())
}

/// Account IDs keyed by credential scope.
pub struct AccountIdCache {
    cache: Cache<String, String>,
}

impl AccountIdCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: lookup_cache(ttl),
        }
    }

    /// Account ID of the identity behind `clients`.
    pub async fn account_id(&self, clients: &AwsClients) -> Result<String> {
        self.cache
            .try_get_with(clients.scope.clone(), async {
                let arn = clients.sts.get_caller_identity().await?;
                debug!(scope = %clients.scope, %arn, "Resolved caller identity");
                parse_account_id(&arn)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::MockSts;
    use crate::test_support::clients_with;

    #[test]
    fn test_validate_account_id() {
        assert!(validate_account_id("123456789012").is_ok());
        assert!(matches!(
            validate_account_id(""),
            Err(Error::InvalidAccountId(_))
        ));
        assert!(matches!(
            validate_account_id("12345"),
            Err(Error::InvalidAccountId(_))
        ));
        assert!(matches!(
            validate_account_id("12a456789012"),
            Err(Error::InvalidAccountId(_))
        ));
        assert!(validate_account_id("1234567890123").is_err());
    }

    #[test]
    fn test_parse_account_id_from_arn() {
        assert_eq!(
            parse_account_id("arn:aws:sts::123456789012:assumed-role/operator/session").unwrap(),
            "123456789012"
        );
        assert_eq!(
            parse_account_id("arn:aws:iam::210987654321:user/operator").unwrap(),
            "210987654321"
        );
        assert!(parse_account_id("arn:aws:iam:::user/operator").is_err());
        assert!(parse_account_id("not-an-arn").is_err());
    }

    #[tokio::test]
    async fn test_account_id_is_looked_up_once_per_scope() {
        let mut sts = MockSts::new();
        sts.expect_get_caller_identity()
            .times(1)
            .returning(|| Ok("arn:aws:sts::123456789012:assumed-role/op/s".to_string()));
        let clients = clients_with("tenant-role").sts(sts).build();

        let cache = AccountIdCache::new(Duration::from_secs(60));
        assert_eq!(cache.account_id(&clients).await.unwrap(), "123456789012");
        assert_eq!(cache.account_id(&clients).await.unwrap(), "123456789012");
    }

    #[tokio::test]
    async fn test_malformed_identity_is_rejected_and_not_cached() {
        let mut sts = MockSts::new();
        sts.expect_get_caller_identity()
            .times(2)
            .returning(|| Ok("arn:aws:sts::12345:assumed-role/op/s".to_string()));
        let clients = clients_with("tenant-role").sts(sts).build();

        let cache = AccountIdCache::new(Duration::from_secs(60));
        assert!(matches!(
            cache.account_id(&clients).await,
            Err(Error::InvalidAccountId(id)) if id == "12345"
        ));
        assert!(cache.account_id(&clients).await.is_err());
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_lookup() {
        let mut sts = MockSts::new();
        sts.expect_get_caller_identity()
            .times(1)
            .returning(|| Ok("arn:aws:sts::123456789012:assumed-role/op/s".to_string()));
        let clients = clients_with("tenant-role").sts(sts).build();

        let cache = AccountIdCache::new(Duration::from_secs(60));
        let (a, b) = tokio::join!(cache.account_id(&clients), cache.account_id(&clients));
        assert_eq!(a.unwrap(), "123456789012");
        assert_eq!(b.unwrap(), "123456789012");
    }

    #[tokio::test]
    async fn test_scopes_are_cached_separately() {
        let mut tenant = MockSts::new();
        tenant
            .expect_get_caller_identity()
            .times(1)
            .returning(|| Ok("arn:aws:sts::123456789012:assumed-role/op/s".to_string()));
        let mut host = MockSts::new();
        host.expect_get_caller_identity()
            .times(1)
            .returning(|| Ok("arn:aws:iam::210987654321:user/operator".to_string()));

        let cache = AccountIdCache::new(Duration::from_secs(60));
        let tenant = clients_with("tenant-role").sts(tenant).build();
        let host = clients_with("host").sts(host).build();
        assert_eq!(cache.account_id(&tenant).await.unwrap(), "123456789012");
        assert_eq!(cache.account_id(&host).await.unwrap(), "210987654321");
        assert_eq!(cache.account_id(&tenant).await.unwrap(), "123456789012");
    }
}
