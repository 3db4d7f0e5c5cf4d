//! Instance management service for federation.

use chrono::{Duration, Utc};
use sparrow_common::AppResult;
use sparrow_common::config::FederationConfig;
use sparrow_db::entities::instance;
use sparrow_db::repositories::InstanceRepository;

/// Days without a successful exchange after which an instance counts as
/// unreachable for fan-out purposes.
const UNREACHABLE_AFTER_DAYS: i64 = 7;

/// Instance service for federation management.
#[derive(Clone)]
pub struct InstanceService {
    instance_repo: InstanceRepository,
    allowed_hosts: Vec<String>,
    blocked_hosts: Vec<String>,
}

impl InstanceService {
    /// Create a new instance service.
    #[must_use]
    pub fn new(instance_repo: InstanceRepository, federation: &FederationConfig) -> Self {
        Self {
            instance_repo,
            allowed_hosts: federation
                .allowed_hosts
                .iter()
                .map(|h| h.to_lowercase())
                .collect(),
            blocked_hosts: federation
                .blocked_hosts
                .iter()
                .map(|h| h.to_lowercase())
                .collect(),
        }
    }

    /// Find an instance by hostname.
    pub async fn find_by_host(&self, host: &str) -> AppResult<Option<instance::Model>> {
        self.instance_repo.find_by_host(host).await
    }

    /// Find or create an instance by hostname.
    pub async fn find_or_create(&self, host: &str) -> AppResult<instance::Model> {
        self.instance_repo.find_or_create(host).await
    }

    /// Whether federation with this host is blocked.
    ///
    /// A host is blocked when it (or a parent domain) appears in the
    /// block list, or when an allow list is configured and the host does
    /// not match any entry. An empty allow list admits every host; the
    /// block list always wins. Suspension recorded on the instance row
    /// also blocks.
    pub async fn is_blocked(&self, host: &str) -> AppResult<bool> {
        let host = host.to_lowercase();

        if self.blocked_hosts.iter().any(|b| host_matches(&host, b)) {
            return Ok(true);
        }
        if !self.allowed_hosts.is_empty()
            && !self.allowed_hosts.iter().any(|a| host_matches(&host, a))
        {
            return Ok(true);
        }

        self.instance_repo.is_suspended(&host).await
    }

    /// Whether an instance has been unresponsive for longer than the
    /// unreachability window.
    pub async fn is_unreachable(&self, host: &str) -> AppResult<bool> {
        let cutoff = Utc::now() - Duration::days(UNREACHABLE_AFTER_DAYS);
        self.instance_repo.is_unreachable_since(host, cutoff).await
    }

    /// Record the outcome of an exchange with a remote instance.
    ///
    /// Fire-and-forget: spawned so that delivery and inbox paths never
    /// block on bookkeeping, and a bookkeeping failure never fails the
    /// exchange itself.
    pub fn report_exchange(&self, host: &str, http_status: Option<u16>, is_failure: bool) {
        let repo = self.instance_repo.clone();
        let host = host.to_lowercase();
        tokio::spawn(async move {
            if let Err(e) = repo.record_exchange(&host, http_status, is_failure).await {
                tracing::warn!(host = %host, error = %e, "failed to record instance exchange");
            }
        });
    }
}

/// Host pattern match: exact, or `host` is a subdomain of `pattern`.
fn host_matches(host: &str, pattern: &str) -> bool {
    host == pattern || host.ends_with(&format!(".{pattern}"))
}
