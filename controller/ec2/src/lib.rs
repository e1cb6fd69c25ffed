#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

//! Implements [`SecurityGroupApi`] over the EC2 API.

mod convert;

use aws_sdk_ec2::{
    error::{ProvideErrorMetadata, SdkError},
    types::{Filter, ResourceType, TagSpecification},
    Client,
};
use sg_controller_core::{
    api::{CloudSecurityGroup, DescribeFilter, IpPermission},
    tags, ApiError, SecurityGroupApi, Tags,
};
use tracing::{debug, trace};

#[derive(Clone, Debug)]
pub struct Ec2Api {
    client: Client,
}

// === impl Ec2Api ===

impl Ec2Api {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a client from the default credential and region providers.
    pub async fn from_env() -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(Client::new(&config))
    }
}

#[async_trait::async_trait]
impl SecurityGroupApi for Ec2Api {
    async fn describe_security_groups(
        &self,
        filter: DescribeFilter,
    ) -> Result<Vec<CloudSecurityGroup>, ApiError> {
        trace!(?filter, "Describing security groups");
        let mut request = self.client.describe_security_groups();
        match filter {
            DescribeFilter::Names { vpc_id, names } => {
                request = request
                    .filters(ec2_filter("vpc-id", [vpc_id]))
                    .filters(ec2_filter("group-name", names));
            }
            DescribeFilter::ClusterOwned {
                vpc_id,
                cluster_name,
            } => {
                if let Some(vpc_id) = vpc_id {
                    request = request.filters(ec2_filter("vpc-id", [vpc_id]));
                }
                let key = format!("tag:{}", tags::cluster_tag_key(&cluster_name));
                request = request.filters(ec2_filter(&key, [tags::LIFECYCLE_OWNED.to_string()]));
            }
            DescribeFilter::Ids(ids) => {
                request = request.set_group_ids(Some(ids));
            }
        }

        let groups = request
            .into_paginator()
            .items()
            .send()
            .collect::<Result<Vec<_>, _>>()
            .await
            .map_err(api_error)?;
        debug!(groups = groups.len(), "Described security groups");
        Ok(groups.iter().map(convert::security_group).collect())
    }

    async fn create_security_group(
        &self,
        vpc_id: &str,
        name: &str,
        description: &str,
        tags: &Tags,
    ) -> Result<String, ApiError> {
        let spec = TagSpecification::builder()
            .resource_type(ResourceType::SecurityGroup)
            .set_tags(Some(convert::tags(tags)))
            .build();
        let output = self
            .client
            .create_security_group()
            .vpc_id(vpc_id)
            .group_name(name)
            .description(description)
            .tag_specifications(spec)
            .send()
            .await
            .map_err(api_error)?;
        output
            .group_id()
            .map(ToString::to_string)
            .ok_or_else(|| ApiError::new("InvalidResponse", "created security group has no ID"))
    }

    async fn delete_security_group(&self, group_id: &str) -> Result<(), ApiError> {
        self.client
            .delete_security_group()
            .group_id(group_id)
            .send()
            .await
            .map_err(api_error)?;
        Ok(())
    }

    async fn authorize_ingress(
        &self,
        group_id: &str,
        permissions: Vec<IpPermission>,
    ) -> Result<(), ApiError> {
        self.client
            .authorize_security_group_ingress()
            .group_id(group_id)
            .set_ip_permissions(Some(permissions.iter().map(convert::permission).collect()))
            .send()
            .await
            .map_err(api_error)?;
        Ok(())
    }

    async fn revoke_ingress(
        &self,
        group_id: &str,
        permissions: Vec<IpPermission>,
    ) -> Result<(), ApiError> {
        self.client
            .revoke_security_group_ingress()
            .group_id(group_id)
            .set_ip_permissions(Some(permissions.iter().map(convert::permission).collect()))
            .send()
            .await
            .map_err(api_error)?;
        Ok(())
    }

    async fn revoke_egress(
        &self,
        group_id: &str,
        permissions: Vec<IpPermission>,
    ) -> Result<(), ApiError> {
        self.client
            .revoke_security_group_egress()
            .group_id(group_id)
            .set_ip_permissions(Some(permissions.iter().map(convert::permission).collect()))
            .send()
            .await
            .map_err(api_error)?;
        Ok(())
    }

    async fn create_tags(&self, resource_id: &str, tags: &Tags) -> Result<(), ApiError> {
        self.client
            .create_tags()
            .resources(resource_id)
            .set_tags(Some(convert::tags(tags)))
            .send()
            .await
            .map_err(api_error)?;
        Ok(())
    }
}

fn ec2_filter(name: &str, values: impl IntoIterator<Item = String>) -> Filter {
    Filter::builder()
        .name(name)
        .set_values(Some(values.into_iter().collect()))
        .build()
}

/// Keeps the service's error code so callers can tell transient and
/// ignorable errors apart.
fn api_error<E>(error: SdkError<E>) -> ApiError
where
    SdkError<E>: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    match error.code() {
        Some(code) => ApiError::new(code, error.message().unwrap_or_default()),
        None => ApiError::other(error),
    }
}
