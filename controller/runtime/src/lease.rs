use crate::k8s::{self, Deployment, Lease, ObjectMeta, Patch, PatchParams, Resource};
use anyhow::{anyhow, Result};
use std::sync::Arc;
use tokio::{sync::watch, time};

const LEASE_DURATION: time::Duration = time::Duration::from_secs(30);
const LEASE_NAME: &str = "sg-controller-write";
const RENEW_GRACE_PERIOD: time::Duration = time::Duration::from_secs(1);

/// Ensures the write lease exists and starts competing for it.
pub async fn init<T>(
    runtime: &kubert::Runtime<T>,
    ns: &str,
    deployment_name: &str,
    hostname: &str,
) -> Result<watch::Receiver<Arc<kubert::lease::Claim>>> {
    // Fetch the controller's deployment so that we can use it as an owner
    // reference of the Lease.
    let api = k8s::Api::<Deployment>::namespaced(runtime.client(), ns);
    let deployment = api.get(deployment_name).await?;
    let owner = deployment
        .controller_owner_ref(&())
        .ok_or_else(|| anyhow!("deployment {deployment_name} has no name or UID"))?;

    let lease = Lease {
        metadata: ObjectMeta {
            name: Some(LEASE_NAME.to_string()),
            namespace: Some(ns.to_string()),
            // Specifying a resource version of "0" means that we will
            // only create the Lease if it does not already exist.
            resource_version: Some("0".to_string()),
            owner_references: Some(vec![owner]),
            labels: Some(
                [(
                    "app.kubernetes.io/name".to_string(),
                    "sg-controller".to_string(),
                )]
                .into_iter()
                .collect(),
            ),
            ..Default::default()
        },
        spec: None,
    };
    let api = k8s::Api::<Lease>::namespaced(runtime.client(), ns);
    match api
        .patch(
            LEASE_NAME,
            &PatchParams {
                field_manager: Some("sg-controller".to_string()),
                ..Default::default()
            },
            &Patch::Apply(lease),
        )
        .await
    {
        Ok(lease) => tracing::info!(?lease, "Created Lease resource"),
        Err(k8s::Error::Api(_)) => tracing::debug!("Lease already exists, no need to create it"),
        Err(error) => {
            return Err(error.into());
        }
    };

    let params = kubert::lease::ClaimParams {
        lease_duration: LEASE_DURATION,
        renew_grace_period: RENEW_GRACE_PERIOD,
    };
    let (claims, _task) = kubert::lease::LeaseManager::init(api, LEASE_NAME)
        .await?
        .spawn(hostname, params)
        .await?;
    Ok(claims)
}
