use crate::{Error, Event, Recorder, Reconciler};
use sg_controller_core::{
    api::{CloudSecurityGroup, DescribeFilter},
    ApiError, ClusterInput, ClusterState, ConditionReason, SecurityGroupApi,
};
use tracing::{debug, info, info_span, Instrument};

impl<A: SecurityGroupApi> Reconciler<A> {
    /// Deletes every group the cluster owns.
    ///
    /// All groups are stripped of their ingress rules before any is deleted
    /// so that rules referencing other groups do not block deletion. A
    /// failure on one group does not stop the others from being cleaned up;
    /// all failures are returned together.
    pub async fn delete(
        &self,
        input: &ClusterInput,
        state: &mut ClusterState,
        recorder: &dyn Recorder,
    ) -> Result<(), Error> {
        let span = info_span!("delete", cluster = %input.cluster_name);
        self.delete_groups(input, state, recorder)
            .instrument(span)
            .await
    }

    async fn delete_groups(
        &self,
        input: &ClusterInput,
        state: &mut ClusterState,
        recorder: &dyn Recorder,
    ) -> Result<(), Error> {
        let Some(vpc_id) = input.vpc.id.as_deref() else {
            debug!("No VPC; nothing to delete");
            state.mark_not_ready(ConditionReason::Deleted, None);
            return Ok(());
        };

        let groups = self
            .api()
            .describe_security_groups(DescribeFilter::ClusterOwned {
                vpc_id: Some(vpc_id.to_string()),
                cluster_name: input.cluster_name.clone(),
            })
            .await
            .map_err(Error::api(
                "describe",
                format!("owned by {}", input.cluster_name),
            ))?;
        if groups.is_empty() {
            debug!("No security groups left to delete");
            return Ok(());
        }

        state.mark_not_ready(ConditionReason::Deleting, None);
        recorder.persist(state).await.map_err(Error::Persist)?;

        let mut errors = Vec::new();
        let mut revoked = Vec::with_capacity(groups.len());
        for sg in groups {
            match self.revoke_all_ingress(&sg).await {
                Ok(()) => revoked.push(sg),
                Err(error) => errors.push(error),
            }
        }
        for sg in revoked {
            if let Err(error) = self.delete_group(&sg, recorder).await {
                errors.push(error);
            }
        }

        if !errors.is_empty() {
            let error = Error::Aggregate(errors);
            state.mark_not_ready(ConditionReason::DeletionFailed, Some(error.to_string()));
            return Err(error);
        }

        state.security_groups.clear();
        state.mark_not_ready(ConditionReason::Deleted, None);
        Ok(())
    }

    async fn revoke_all_ingress(&self, sg: &CloudSecurityGroup) -> Result<(), Error> {
        let current = match self
            .api()
            .describe_security_groups(DescribeFilter::Ids(vec![sg.id.clone()]))
            .await
        {
            Ok(current) => current,
            Err(error) if error.is_ignorable_security_group_error() => return Ok(()),
            Err(error) => return Err(Error::api("describe", &sg.id)(error)),
        };
        let permissions = current
            .into_iter()
            .find(|current| current.id == sg.id)
            .map(|current| current.ingress)
            .unwrap_or_default();
        if permissions.is_empty() {
            return Ok(());
        }

        match self.api().revoke_ingress(&sg.id, permissions).await {
            Ok(()) => {
                debug!(group = %sg.id, "Revoked all ingress rules");
                Ok(())
            }
            Err(error) if is_ignorable_revoke_error(&error) => {
                debug!(group = %sg.id, %error, "Ignoring error revoking ingress rules");
                Ok(())
            }
            Err(error) => Err(Error::api("revoke ingress from", &sg.id)(error)),
        }
    }

    async fn delete_group(
        &self,
        sg: &CloudSecurityGroup,
        recorder: &dyn Recorder,
    ) -> Result<(), Error> {
        match self.api().delete_security_group(&sg.id).await {
            Ok(()) => {
                info!(group = %sg.id, name = %sg.name, "Deleted security group");
                recorder.event(Event::normal(
                    "SuccessfulDeleteSecurityGroup",
                    format!("Deleted managed SecurityGroup {:?}", sg.id),
                ));
                Ok(())
            }
            Err(error) if error.is_ignorable_security_group_error() => {
                debug!(group = %sg.id, %error, "Security group already deleted");
                Ok(())
            }
            Err(error) => {
                recorder.event(Event::warning(
                    "FailedDeleteSecurityGroup",
                    format!("Failed to delete managed SecurityGroup {:?}: {error}", sg.id),
                ));
                Err(Error::api("delete", &sg.id)(error))
            }
        }
    }
}

fn is_ignorable_revoke_error(error: &ApiError) -> bool {
    error.is_ignorable_security_group_error() || error.is_dependency_violation()
}
