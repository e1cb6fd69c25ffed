use crate::{default_group, observed, retry, Error, Event, Recorder, RetryConfig};
use sg_controller_core::{
    self as core,
    api::{ApiError, IpPermission},
    rule_set, tags, ClusterInput, ClusterState, ConditionReason, Desired, LoadBalancerScheme,
    Role, RuleSet, SecurityGroup, SecurityGroupApi,
};
use tracing::{debug, info, info_span, warn, Instrument};

/// Drives a cluster's security groups toward the state its input describes.
#[derive(Clone, Debug)]
pub struct Reconciler<A> {
    api: A,
    retry: RetryConfig,
}

// === impl Reconciler ===

impl<A: SecurityGroupApi> Reconciler<A> {
    pub fn new(api: A, retry: RetryConfig) -> Self {
        Self { api, retry }
    }

    pub(crate) fn api(&self) -> &A {
        &self.api
    }

    /// Ensures every role's group exists and carries exactly its desired
    /// rules.
    ///
    /// The outcome is recorded as the state's condition; the error is also
    /// returned so the caller can schedule a retry.
    pub async fn reconcile(
        &self,
        input: &ClusterInput,
        state: &mut ClusterState,
        recorder: &dyn Recorder,
    ) -> Result<(), Error> {
        let span = info_span!("reconcile", cluster = %input.cluster_name);
        match self.reconcile_groups(input, state, recorder).instrument(span).await {
            Ok(()) => {
                state.mark_ready();
                Ok(())
            }
            Err(error) => {
                state.mark_not_ready(ConditionReason::ReconciliationFailed, Some(error.to_string()));
                Err(error)
            }
        }
    }

    async fn reconcile_groups(
        &self,
        input: &ClusterInput,
        state: &mut ClusterState,
        recorder: &dyn Recorder,
    ) -> Result<(), Error> {
        let vpc_id = input.vpc.id.as_deref().ok_or(core::Error::MissingVpcId)?;

        if input.vpc.empty_routes_default_security_group {
            default_group::harden(&self.api, vpc_id, recorder).await?;
        }

        let observed = observed::describe_managed(&self.api, vpc_id, &input.cluster_name).await?;
        let overrides = observed::describe_overrides(&self.api, input)
            .await?
            .unwrap_or_default();

        for role in &input.roles {
            let role = *role;
            let name = tags::group_name(&input.cluster_name, role);
            let existing = overrides
                .get(&role)
                .or_else(|| observed.get(&name))
                .cloned();
            let sg = match existing {
                Some(sg) => self.adopt(input, role, sg, recorder).await?,
                None => self.create(input, vpc_id, role, name, recorder).await?,
            };
            state.security_groups.insert(role, sg);
        }

        for role in &input.roles {
            self.reconcile_rules(input, state, *role, recorder).await?;
        }
        Ok(())
    }

    async fn create(
        &self,
        input: &ClusterInput,
        vpc_id: &str,
        role: Role,
        name: String,
        recorder: &dyn Recorder,
    ) -> Result<SecurityGroup, Error> {
        let tags = tags::build(input, &name, role);
        let description = tags::group_description(&input.cluster_name, role);
        let id = match self
            .api
            .create_security_group(vpc_id, &name, &description, &tags)
            .await
        {
            Ok(id) => id,
            Err(error) => {
                recorder.event(Event::warning(
                    "FailedCreateSecurityGroup",
                    format!("Failed to create managed SecurityGroup for Role {role:?}: {error}"),
                ));
                return Err(Error::api("create", &name)(error));
            }
        };

        info!(%role, group = %id, %name, "Created security group");
        recorder.event(Event::normal(
            "SuccessfulCreateSecurityGroup",
            format!("Created managed SecurityGroup {id:?} for Role {role:?}"),
        ));
        Ok(SecurityGroup {
            id,
            name,
            tags,
            ingress_rules: RuleSet::new(),
        })
    }

    /// Takes an existing group under management, ensuring it is tagged for
    /// its role unless something else manages it.
    async fn adopt(
        &self,
        input: &ClusterInput,
        role: Role,
        mut sg: SecurityGroup,
        recorder: &dyn Recorder,
    ) -> Result<SecurityGroup, Error> {
        if tags::is_eks_owned(&sg.tags) {
            debug!(%role, group = %sg.id, "Security group is managed by EKS");
            return Ok(sg);
        }
        if input.is_override(&sg.id) {
            debug!(%role, group = %sg.id, "Security group is an override");
            return Ok(sg);
        }

        let desired = tags::build(input, &sg.name, role);
        let missing = tags::missing(&sg.tags, &desired);
        if missing.is_empty() {
            return Ok(sg);
        }

        let id = sg.id.clone();
        retry::retry_if(
            &self.retry,
            "create tags",
            ApiError::is_group_not_found,
            || self.api.create_tags(&id, &missing),
        )
        .await
        .map_err(|error| {
            recorder.event(Event::warning(
                "FailedTagSecurityGroup",
                format!("Failed to tag managed SecurityGroup {id:?}: {error}"),
            ));
            Error::api("tag", &id)(error)
        })?;

        debug!(%role, group = %sg.id, tags = missing.len(), "Updated security group tags");
        sg.tags.extend(missing);
        Ok(sg)
    }

    async fn reconcile_rules(
        &self,
        input: &ClusterInput,
        state: &mut ClusterState,
        role: Role,
        recorder: &dyn Recorder,
    ) -> Result<(), Error> {
        let Some(sg) = state.security_groups.get(&role) else {
            return Ok(());
        };
        if input.is_override(&sg.id) || tags::is_eks_owned(&sg.tags) {
            debug!(%role, group = %sg.id, "Skipping rules of externally managed security group");
            return Ok(());
        }
        let cloud_provider_owned =
            tags::has_cloud_provider_owned(&sg.tags, input.kubernetes_cluster_name());

        if role == Role::ApiServerLb && input.nat_gateway_ips.is_empty() {
            let internal = input
                .primary_load_balancer()
                .is_some_and(|lb| lb.scheme == LoadBalancerScheme::Internal);
            if !internal {
                warn!(group = %sg.id, "NAT gateway IPs are not known; the API server load balancer admits any address");
            }
        }

        let desired = Desired::new(input, &state.security_groups).ingress_rules(role)?;
        let desired = rule_set::expand(&desired);

        let Some(sg) = state.security_groups.get_mut(&role) else {
            return Ok(());
        };
        // The in-cluster cloud provider adds its own rules to this group, so
        // only what is missing is added. It is not skipped outright because
        // the NLB listener rules for the load balancer group live here.
        if cloud_provider_owned && desired.is_empty() {
            return Ok(());
        }
        let to_revoke = if cloud_provider_owned {
            RuleSet::new()
        } else {
            sg.ingress_rules.difference(&desired)
        };
        let to_authorize = desired.difference(&sg.ingress_rules);

        if !to_revoke.is_empty() {
            self.revoke_ingress(sg, &to_revoke, recorder).await?;
        }
        if !to_authorize.is_empty() {
            self.authorize_ingress(sg, &to_authorize, recorder).await?;
        }

        sg.ingress_rules = if cloud_provider_owned {
            sg.ingress_rules.union(&desired)
        } else {
            desired
        };
        Ok(())
    }

    async fn revoke_ingress(
        &self,
        sg: &SecurityGroup,
        rules: &RuleSet,
        recorder: &dyn Recorder,
    ) -> Result<(), Error> {
        let permissions = rules.iter().map(IpPermission::from).collect::<Vec<_>>();
        let descriptions = describe(rules);
        retry::retry_if(
            &self.retry,
            "revoke ingress",
            ApiError::is_group_not_found,
            || self.api.revoke_ingress(&sg.id, permissions.clone()),
        )
        .await
        .map_err(|error| {
            recorder.event(Event::warning(
                "FailedRevokeSecurityGroupIngressRules",
                format!("Failed to revoke security group ingress rules {descriptions} for SecurityGroup {:?}: {error}", sg.id),
            ));
            Error::api("revoke ingress from", &sg.id)(error)
        })?;

        info!(group = %sg.id, rules = rules.len(), "Revoked ingress rules");
        recorder.event(Event::normal(
            "SuccessfulRevokeSecurityGroupIngressRules",
            format!("Revoked security group ingress rules {descriptions} for SecurityGroup {:?}", sg.id),
        ));
        Ok(())
    }

    async fn authorize_ingress(
        &self,
        sg: &SecurityGroup,
        rules: &RuleSet,
        recorder: &dyn Recorder,
    ) -> Result<(), Error> {
        let permissions = rules.iter().map(IpPermission::from).collect::<Vec<_>>();
        let descriptions = describe(rules);
        retry::retry_if(
            &self.retry,
            "authorize ingress",
            ApiError::is_group_not_found,
            || self.api.authorize_ingress(&sg.id, permissions.clone()),
        )
        .await
        .map_err(|error| {
            recorder.event(Event::warning(
                "FailedAuthorizeSecurityGroupIngressRules",
                format!("Failed to authorize security group ingress rules {descriptions} for SecurityGroup {:?}: {error}", sg.id),
            ));
            Error::api("authorize ingress on", &sg.id)(error)
        })?;

        info!(group = %sg.id, rules = rules.len(), "Authorized ingress rules");
        recorder.event(Event::normal(
            "SuccessfulAuthorizeSecurityGroupIngressRules",
            format!("Authorized security group ingress rules {descriptions} for SecurityGroup {:?}", sg.id),
        ));
        Ok(())
    }
}

fn describe(rules: &RuleSet) -> String {
    let rules = rules.iter().map(ToString::to_string).collect::<Vec<_>>();
    format!("[{}]", rules.join(", "))
}
