use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::server::{DEFAULT_REQUEST_TIMEOUT, ServerConfig, TlsFiles};
use crate::storage::DEFAULT_AUTHZ_CONCURRENCY;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub enum Args {
    /// Serve the read-only Secret API
    Run(ServeArgs),
    /// Print the SecretProviderClass CRD
    Crds,
    /// Print the APIService that registers the reader with kube-apiserver
    ApiService(ApiServiceArgs),
}

#[derive(clap::Args, Clone, Debug)]
pub struct ServeArgs {
    #[arg(long, default_value = "0.0.0.0:8443")]
    pub bind_address: SocketAddr,

    /// PEM serving certificate
    #[arg(long, requires = "tls_key_file", required_unless_present = "insecure_http")]
    pub tls_cert_file: Option<PathBuf>,

    #[arg(long, requires = "tls_cert_file")]
    pub tls_key_file: Option<PathBuf>,

    /// Serve plain HTTP. The caller identity in the X-Remote-User, X-Remote-Group
    /// and X-Remote-Extra-* headers is taken as-is, so anything that can reach
    /// the port can act as any user. Only for local development.
    #[arg(long, conflicts_with_all = ["tls_cert_file", "tls_key_file"])]
    pub insecure_http: bool,

    /// Seconds a request may spend on backing-store and authorization calls
    #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT.as_secs())]
    pub request_timeout_seconds: u64,

    /// Authorization checks a single list request may run concurrently
    #[arg(long, default_value_t = DEFAULT_AUTHZ_CONCURRENCY)]
    pub authz_concurrency: usize,
}

impl ServeArgs {
    pub fn server_config(&self) -> ServerConfig {
        let tls = match (&self.tls_cert_file, &self.tls_key_file) {
            (Some(cert), Some(key)) => Some(TlsFiles {
                cert: cert.clone(),
                key: key.clone(),
            }),
            _ => None,
        };
        ServerConfig {
            addr: self.bind_address,
            tls,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds.max(1))
    }
}

#[derive(clap::Args, Clone, Debug)]
pub struct ApiServiceArgs {
    /// Namespace of the Service fronting the reader
    #[arg(long, default_value = "kube-system")]
    pub namespace: String,

    #[arg(long, default_value = "secrets-store-reader")]
    pub service: String,

    #[arg(long, default_value_t = 443)]
    pub port: i32,

    /// PEM CA bundle kube-apiserver uses to verify the reader's serving
    /// certificate. Without it the APIService skips TLS verification.
    #[arg(long)]
    pub ca_bundle: Option<PathBuf>,
}
