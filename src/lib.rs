use std::sync::Arc;

use kube::{Client, config::KubeConfigOptions};
use tracing::info;

pub mod authz;
pub mod backing;
pub mod config;
pub mod context;
pub mod crds;
pub mod error;
pub mod manifests;
pub mod registry;
pub mod server;
pub mod storage;
pub mod table;
pub mod translate;

use authz::SubjectAccessReviewAuthorizer;
use backing::KubeBackingStore;
use config::ServeArgs;
use registry::Registry;
use server::AppState;
use storage::SecretStorage;

pub async fn run(args: ServeArgs) -> anyhow::Result<()> {
    let options = KubeConfigOptions::default();

    // Load kubeconfig if it's present otherwise fall back to cluster config
    let config = kube::Config::from_kubeconfig(&options)
        .await
        .or_else(|_| kube::Config::incluster())?;
    let client = Client::try_from(config)?;

    let registry = Arc::new(Registry::with_defaults()?);
    let storage = SecretStorage::new(
        Arc::new(KubeBackingStore::new(client.clone())),
        Arc::new(SubjectAccessReviewAuthorizer::new(client)),
        &registry,
    )?
    .with_authz_concurrency(args.authz_concurrency);
    info!(
        resources = registry.served().count(),
        authz_concurrency = args.authz_concurrency,
        "setup done"
    );

    let state =
        AppState::new(Arc::new(storage), registry).with_request_timeout(args.request_timeout());
    server::serve(args.server_config(), state).await
}
