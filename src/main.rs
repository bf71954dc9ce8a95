use anyhow::Context;
use clap::Parser;
use kube::CustomResourceExt;
use secrets_store_reader::{config::Args, crds::SecretProviderClass, manifests};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args {
        Args::Crds => {
            println!("{}", serde_yaml::to_string(&SecretProviderClass::crd())?);
        }
        Args::ApiService(args) => {
            let ca_bundle = match &args.ca_bundle {
                Some(path) => Some(
                    std::fs::read(path)
                        .with_context(|| format!("reading CA bundle {}", path.display()))?,
                ),
                None => None,
            };
            let api_service = manifests::api_service(&args, ca_bundle);
            println!("{}", serde_yaml::to_string(&api_service)?);
        }
        Args::Run(args) => {
            tracing_subscriber::fmt()
                .with_env_filter(
                    EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| "secrets_store_reader=info".into()),
                )
                .init();

            rustls::crypto::ring::default_provider()
                .install_default()
                .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

            secrets_store_reader::run(args).await?;
        }
    };

    Ok(())
}
