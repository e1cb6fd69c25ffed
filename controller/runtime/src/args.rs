use crate::{ec2::Ec2Api, k8s, lease, reconcile, status};
use anyhow::{anyhow, bail, Result};
use clap::Parser;
use prometheus_client::registry::Registry;
use tokio::{sync::mpsc, time::Duration};
use tracing::{info, info_span, Instrument};

// The maximum number of queued reconciliations. Resyncs queue every resource
// at once, so this bounds the number of resources that can be reconciled
// each period.
const UPDATE_QUEUE_SIZE: usize = 10_000;

#[derive(Debug, Parser)]
#[clap(name = "sg-controller", about = "Reconciles a cluster's AWS security groups")]
pub struct Args {
    #[clap(
        long,
        default_value = "sg_controller=info,warn",
        env = "SG_CONTROLLER_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// The namespace in which the controller runs. Holds the write lease.
    #[clap(long, default_value = "sg-controller", env = "SG_CONTROLLER_NAMESPACE")]
    controller_namespace: String,

    /// The controller's deployment, which owns the write lease.
    #[clap(long, default_value = "sg-controller", env = "SG_CONTROLLER_DEPLOYMENT_NAME")]
    deployment_name: String,

    /// How often every resource is reconciled, whether or not it changed.
    #[clap(long, default_value = "60s", env = "SG_CONTROLLER_RECONCILE_PERIOD")]
    reconcile_period: Period,

    #[clap(long, default_value = "120000", env = "SG_CONTROLLER_RECONCILE_TIMEOUT_MS")]
    reconcile_timeout_ms: u64,

    #[clap(long, default_value = "500", env = "SG_CONTROLLER_RETRY_INITIAL_DELAY_MS")]
    retry_initial_delay_ms: u64,

    #[clap(long, default_value = "20000", env = "SG_CONTROLLER_RETRY_MAX_DELAY_MS")]
    retry_max_delay_ms: u64,

    #[clap(long, default_value = "8", env = "SG_CONTROLLER_RETRY_MAX_ATTEMPTS")]
    retry_max_attempts: u32,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            log_format,
            client,
            admin,
            controller_namespace,
            deployment_name,
            reconcile_period: Period(reconcile_period),
            reconcile_timeout_ms,
            retry_initial_delay_ms,
            retry_max_delay_ms,
            retry_max_attempts,
        } = self;

        let retry = reconcile::RetryConfig {
            max_attempts: retry_max_attempts,
            initial_delay: Duration::from_millis(retry_initial_delay_ms),
            max_delay: Duration::from_millis(retry_max_delay_ms),
            ..Default::default()
        };

        let mut prom = <Registry>::default();
        let reg = prom.sub_registry_with_prefix("sg_controller");
        let controller_metrics = status::ControllerMetrics::register(reg);
        let index_metrics = status::IndexMetrics::register(reg);

        let mut runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;

        let hostname =
            std::env::var("HOSTNAME").expect("Failed to fetch `HOSTNAME` environment variable");

        let claims = lease::init(
            &runtime,
            &controller_namespace,
            &deployment_name,
            &hostname,
        )
        .await?;

        let api = Ec2Api::from_env().await;
        let reconciler = reconcile::Reconciler::new(api, retry);

        let (updates_tx, updates_rx) = mpsc::channel(UPDATE_QUEUE_SIZE);
        let index = status::Index::shared(hostname.clone(), claims.clone(), updates_tx, index_metrics);

        let resources = runtime
            .watch_all::<k8s::ClusterSecurityGroups>(k8s::watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(index.clone(), resources)
                .instrument(info_span!("clustersecuritygroups")),
        );

        tokio::spawn(
            status::Index::run(index.clone(), reconcile_period).instrument(info_span!("resync")),
        );

        let controller = status::Controller::new(
            hostname,
            claims,
            runtime.client(),
            index,
            reconciler,
            updates_rx,
            Duration::from_millis(reconcile_timeout_ms),
            controller_metrics,
        );
        tokio::spawn(controller.run().instrument(info_span!("controller")));

        info!(period = ?reconcile_period, "Reconciling ClusterSecurityGroups");

        // Block the main thread on the shutdown signal. Once it fires, wait for the background tasks to
        // complete before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}

/// A duration written with a unit suffix, e.g. `90s` or `5m`.
#[derive(Copy, Clone, Debug)]
struct Period(Duration);

impl std::str::FromStr for Period {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (digits, unit) = s.split_at(s.trim_end_matches(char::is_alphabetic).len());
        let n = digits.parse::<u64>()?;
        let secs = |scale: u64| {
            n.checked_mul(scale)
                .map(Duration::from_secs)
                .ok_or_else(|| anyhow!("duration out of range: {s:?}"))
        };
        let duration = match unit {
            "ms" => Duration::from_millis(n),
            "" | "s" => Duration::from_secs(n),
            "m" => secs(60)?,
            "h" => secs(60 * 60)?,
            _ => bail!("invalid duration unit: {unit:?}"),
        };
        Ok(Self(duration))
    }
}
