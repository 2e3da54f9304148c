//! Lease-based leader election
//!
//! Only one operator replica may reconcile, since subnet allocation and
//! stack creation are not safe to run from two processes. Replicas compete
//! for a `coordination.k8s.io/v1` Lease; the holder renews it periodically
//! and the others take it over once it has not been renewed for its
//! duration.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::MicroTime;
use kube::api::{Api, ObjectMeta, Patch, PatchParams, PostParams};
use kube::Client;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

pub const LEASE_NAME: &str = "aws-operator-leader";

#[derive(Clone, Debug)]
pub struct LeaseConfig {
    pub name: String,
    pub duration: Duration,
    pub renew_interval: Duration,
    pub retry_interval: Duration,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            name: LEASE_NAME.to_string(),
            duration: Duration::from_secs(15),
            renew_interval: Duration::from_secs(10),
            retry_interval: Duration::from_secs(5),
        }
    }
}

/// What a replica does with the lease as currently observed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LeaseDecision {
    /// No lease exists yet.
    Create,
    /// We hold it.
    Renew,
    /// Someone else held it but let it expire.
    TakeOver,
    /// Someone else holds it.
    Follow,
}

/// Decide from the observed lease spec. `None` means the lease is absent.
pub fn decide(
    lease: Option<&LeaseSpec>,
    identity: &str,
    default_duration: Duration,
    now: DateTime<Utc>,
) -> LeaseDecision {
    let Some(spec) = lease else {
        return LeaseDecision::Create;
    };
    if spec.holder_identity.as_deref() == Some(identity) {
        return LeaseDecision::Renew;
    }
    let Some(renewed) = spec.renew_time.as_ref() else {
        return LeaseDecision::TakeOver;
    };
    let duration = spec
        .lease_duration_seconds
        .map(|s| chrono::Duration::seconds(s as i64))
        .unwrap_or_else(|| chrono::Duration::seconds(default_duration.as_secs() as i64));
    if now > renewed.0 + duration {
        LeaseDecision::TakeOver
    } else {
        LeaseDecision::Follow
    }
}

pub struct LeaderElector {
    leases: Api<Lease>,
    namespace: String,
    identity: String,
    config: LeaseConfig,
}

impl LeaderElector {
    pub fn new(client: Client, namespace: &str, identity: &str, config: LeaseConfig) -> Self {
        Self {
            leases: Api::namespaced(client, namespace),
            namespace: namespace.to_string(),
            identity: identity.to_string(),
            config,
        }
    }

    /// Compete for the lease forever, mirroring the result into `is_leader`.
    pub async fn run(self, is_leader: Arc<AtomicBool>) {
        info!(lease = %self.config.name, identity = %self.identity, "Starting leader election");
        loop {
            let leading = match self.try_acquire_or_renew().await {
                Ok(leading) => leading,
                Err(e) => {
                    warn!("Leader election error: {:?}", e);
                    false
                }
            };

            let was_leading = is_leader.swap(leading, Ordering::Relaxed);
            match (was_leading, leading) {
                (false, true) => info!(lease = %self.config.name, "Acquired leadership"),
                (true, false) => warn!(lease = %self.config.name, "Lost leadership"),
                _ => {}
            }

            let wait = if leading {
                self.config.renew_interval
            } else {
                self.config.retry_interval
            };
            tokio::time::sleep(wait).await;
        }
    }

    async fn try_acquire_or_renew(&self) -> Result<bool> {
        let existing = self
            .leases
            .get_opt(&self.config.name)
            .await
            .map_err(Error::KubeError)?;
        let now = Utc::now();
        let spec = existing.as_ref().and_then(|l| l.spec.as_ref());

        match decide(spec, &self.identity, self.config.duration, now) {
            LeaseDecision::Follow => {
                debug!(holder = ?spec.and_then(|s| s.holder_identity.as_deref()), "Lease is held");
                Ok(false)
            }
            LeaseDecision::Renew => {
                self.patch_spec(serde_json::json!({
                    "renewTime": MicroTime(now),
                    "leaseDurationSeconds": self.duration_secs(),
                }))
                .await?;
                Ok(true)
            }
            LeaseDecision::TakeOver => {
                info!(
                    holder = ?spec.and_then(|s| s.holder_identity.as_deref()),
                    "Lease expired, taking over"
                );
                self.patch_spec(serde_json::json!({
                    "holderIdentity": self.identity,
                    "acquireTime": MicroTime(now),
                    "renewTime": MicroTime(now),
                    "leaseDurationSeconds": self.duration_secs(),
                }))
                .await?;
                Ok(true)
            }
            LeaseDecision::Create => {
                let lease = Lease {
                    metadata: ObjectMeta {
                        name: Some(self.config.name.clone()),
                        namespace: Some(self.namespace.clone()),
                        ..Default::default()
                    },
                    spec: Some(LeaseSpec {
                        holder_identity: Some(self.identity.clone()),
                        acquire_time: Some(MicroTime(now)),
                        renew_time: Some(MicroTime(now)),
                        lease_duration_seconds: Some(self.duration_secs()),
                        ..Default::default()
                    }),
                };
                self.leases
                    .create(&PostParams::default(), &lease)
                    .await
                    .map_err(Error::KubeError)?;
                info!(lease = %self.config.name, "Created lease");
                Ok(true)
            }
        }
    }

    async fn patch_spec(&self, spec: serde_json::Value) -> Result<()> {
        let patch = serde_json::json!({ "spec": spec });
        self.leases
            .patch(&self.config.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(Error::KubeError)?;
        Ok(())
    }

    fn duration_secs(&self) -> i32 {
        self.config.duration.as_secs().min(i32::MAX as u64) as i32
    }
}
