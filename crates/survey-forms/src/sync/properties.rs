use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;

use super::crm::{CrmAccounts, CrmError, CrmProperty};
use super::CrmObjectType;

struct CachedProperties {
    fetched_at: Instant,
    properties: Vec<CrmProperty>,
}

/// CRM property metadata per account with a fixed time-to-live.
///
/// Upstream failures serve the last cached list, even when expired, or an empty
/// list when nothing was ever fetched. Callers never see the error.
pub struct PropertyCatalog {
    accounts: Arc<CrmAccounts>,
    ttl: Duration,
    entries: Mutex<HashMap<String, CachedProperties>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub success: bool,
    pub message: String,
}

impl PropertyCatalog {
    pub fn new(accounts: Arc<CrmAccounts>, ttl: Duration) -> Self {
        Self {
            accounts,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, CachedProperties>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub async fn properties(&self, account: &str) -> Vec<CrmProperty> {
        if let Some(cached) = self.fresh(account) {
            return cached;
        }

        match self.fetch(account).await {
            Ok(properties) => {
                self.entries().insert(
                    account.to_string(),
                    CachedProperties {
                        fetched_at: Instant::now(),
                        properties: properties.clone(),
                    },
                );
                properties
            }
            Err(err) => {
                let stale = self
                    .entries()
                    .get(account)
                    .map(|cached| cached.properties.clone());
                tracing::warn!(
                    account,
                    error = %err,
                    serving_stale = stale.is_some(),
                    "crm property fetch failed"
                );
                stale.unwrap_or_default()
            }
        }
    }

    /// Drops cached metadata for one account, or every account.
    pub fn clear(&self, account: Option<&str>) {
        let mut entries = self.entries();
        match account {
            Some(account) => {
                entries.remove(account);
            }
            None => entries.clear(),
        }
    }

    /// A non-empty property list counts as a working connection.
    pub async fn test_connection(&self, account: &str) -> ConnectionStatus {
        if self.properties(account).await.is_empty() {
            ConnectionStatus {
                success: false,
                message: format!(
                    "HubSpot is not configured for {account} account. Please configure the tokens."
                ),
            }
        } else {
            ConnectionStatus {
                success: true,
                message: format!("HubSpot connection successful for {account} account"),
            }
        }
    }

    fn fresh(&self, account: &str) -> Option<Vec<CrmProperty>> {
        self.entries()
            .get(account)
            .filter(|cached| cached.fetched_at.elapsed() < self.ttl)
            .map(|cached| cached.properties.clone())
    }

    async fn fetch(&self, account: &str) -> Result<Vec<CrmProperty>, CrmError> {
        let gateway = self.accounts.require(account)?;
        let mut properties = gateway.list_properties(CrmObjectType::Contact).await?;
        properties.extend(gateway.list_properties(CrmObjectType::Deal).await?);
        properties.sort_by(|a, b| a.label.cmp(&b.label).then(a.name.cmp(&b.name)));
        Ok(properties)
    }
}
