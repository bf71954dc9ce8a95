use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum_server::tls_rustls::RustlsConfig;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{
    APIGroup, APIGroupList, APIResource, APIResourceList, GroupVersionForDiscovery,
};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

use crate::authz::UserInfo;
use crate::context::RequestContext;
use crate::error::{Error, Result};
use crate::registry::{Registry, ResourceDescriptor};
use crate::storage::{ListOptions, ReadOnlyStorage};
use crate::table::{TableObject, TableOptions};

pub const REMOTE_USER_HEADER: &str = "x-remote-user";
pub const REMOTE_UID_HEADER: &str = "x-remote-uid";
pub const REMOTE_GROUP_HEADER: &str = "x-remote-group";
pub const REMOTE_EXTRA_HEADER_PREFIX: &str = "x-remote-extra-";

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub tls: Option<TlsFiles>,
}

#[derive(Clone, Debug)]
pub struct TlsFiles {
    pub cert: PathBuf,
    pub key: PathBuf,
}

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn ReadOnlyStorage>,
    pub registry: Arc<Registry>,
    /// Deadline after which in-flight backing and authorization calls are abandoned.
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(storage: Arc<dyn ReadOnlyStorage>, registry: Arc<Registry>) -> Self {
        Self {
            storage,
            registry,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(|| async { "ok" }))
        .route("/apis", get(api_groups))
        .route("/apis/{group}", get(api_group))
        .route("/apis/{group}/{version}", get(api_resources))
        .route("/apis/{group}/{version}/{resource}", get(list_all_handler))
        .route(
            "/apis/{group}/{version}/namespaces/{namespace}/{resource}",
            get(list_handler),
        )
        .route(
            "/apis/{group}/{version}/namespaces/{namespace}/{resource}/{name}",
            get(get_handler),
        )
        .fallback(unknown_path)
        .with_state(state)
}

pub async fn serve(config: ServerConfig, state: AppState) -> anyhow::Result<()> {
    let app = router(state);
    let handle = axum_server::Handle::new();

    let shutdown = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            shutdown.graceful_shutdown(Some(Duration::from_secs(10)));
        }
    });

    match config.tls {
        Some(tls) => {
            let tls_config = RustlsConfig::from_pem_file(&tls.cert, &tls.key)
                .await
                .with_context(|| format!("loading TLS keypair from {}", tls.cert.display()))?;
            info!(addr = %config.addr, "Serving over HTTPS");
            axum_server::bind_rustls(config.addr, tls_config)
                .handle(handle)
                .serve(app.into_make_service())
                .await?;
        }
        None => {
            warn!(
                addr = %config.addr,
                "Serving over plain HTTP; X-Remote-* identity headers are trusted from any client"
            );
            axum_server::bind(config.addr)
                .handle(handle)
                .serve(app.into_make_service())
                .await?;
        }
    }

    Ok(())
}

/// Identity forwarded by the aggregation layer, if any.
pub fn user_from_headers(headers: &HeaderMap) -> Option<UserInfo> {
    let username = headers
        .get(REMOTE_USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())?;

    let groups = headers
        .get_all(REMOTE_GROUP_HEADER)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::to_owned)
        .collect();

    let mut extra: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in headers {
        let Some(key) = name.as_str().strip_prefix(REMOTE_EXTRA_HEADER_PREFIX) else {
            continue;
        };
        if let Ok(value) = value.to_str() {
            extra.entry(key.to_owned()).or_default().push(value.to_owned());
        }
    }

    Some(UserInfo {
        username: username.to_owned(),
        uid: headers
            .get(REMOTE_UID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned),
        groups,
        extra,
    })
}

fn wants_table(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.contains("as=Table"))
}

/// The token fires once `timeout` elapses. Dropping the guard stops the timer.
fn request_context(
    namespace: String,
    headers: &HeaderMap,
    timeout: Duration,
) -> (RequestContext, DropGuard) {
    let cancel = CancellationToken::new();
    let timer = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = timer.cancelled() => {}
            _ = tokio::time::sleep(timeout) => timer.cancel(),
        }
    });

    let mut ctx = RequestContext::new()
        .with_namespace(namespace)
        .with_cancellation(cancel.clone());
    if let Some(user) = user_from_headers(headers) {
        ctx = ctx.with_user(user);
    }
    (ctx, cancel.drop_guard())
}

fn query<T>(query: std::result::Result<Query<T>, QueryRejection>) -> Result<T> {
    query
        .map(|Query(value)| value)
        .map_err(|rejection| Error::BadRequest(rejection.body_text()))
}

fn resolve<'a>(
    state: &'a AppState,
    group: &str,
    version: &str,
    resource: &str,
) -> Result<&'a ResourceDescriptor> {
    let gvk = state.storage.group_version_kind();
    state
        .registry
        .resolve(group, version, resource)
        .filter(|d| d.gvk == gvk)
        .ok_or_else(|| Error::not_found("resources", resource))
}

async fn unknown_path(uri: Uri) -> Error {
    Error::not_found("resources", uri.path())
}

async fn api_groups(State(state): State<AppState>) -> impl IntoResponse {
    let groups = state
        .registry
        .served_groups()
        .into_iter()
        .map(|(name, versions)| api_group_for(name, &versions))
        .collect();

    axum::Json(APIGroupList { groups })
}

async fn api_group(State(state): State<AppState>, Path(group): Path<String>) -> Result<Response> {
    let versions = state
        .registry
        .served_groups()
        .remove(&group)
        .ok_or_else(|| Error::not_found("groups", &group))?;

    Ok(axum::Json(api_group_for(group, &versions)).into_response())
}

fn api_group_for(name: String, versions: &[String]) -> APIGroup {
    let versions: Vec<GroupVersionForDiscovery> = versions
        .iter()
        .map(|version| GroupVersionForDiscovery {
            group_version: format!("{name}/{version}"),
            version: version.clone(),
        })
        .collect();

    APIGroup {
        preferred_version: versions.first().cloned(),
        name,
        versions,
        ..APIGroup::default()
    }
}

async fn api_resources(
    State(state): State<AppState>,
    Path((group, version)): Path<(String, String)>,
) -> Result<Response> {
    let resources: Vec<APIResource> = state
        .registry
        .served_resources(&group, &version)
        .into_iter()
        .map(|d| APIResource {
            name: d.plural.clone(),
            singular_name: d.gvk.kind.to_lowercase(),
            namespaced: d.namespaced,
            kind: d.gvk.kind.clone(),
            verbs: d.verbs.clone(),
            ..APIResource::default()
        })
        .collect();
    if resources.is_empty() {
        return Err(Error::not_found("groupversions", &format!("{group}/{version}")));
    }

    Ok(axum::Json(APIResourceList {
        group_version: format!("{group}/{version}"),
        resources,
    })
    .into_response())
}

async fn get_handler(
    State(state): State<AppState>,
    Path((group, version, namespace, resource, name)): Path<(String, String, String, String, String)>,
    table_options: std::result::Result<Query<TableOptions>, QueryRejection>,
    headers: HeaderMap,
) -> Result<Response> {
    resolve(&state, &group, &version, &resource)?;
    let table_options = query(table_options)?;
    let (ctx, _guard) = request_context(namespace, &headers, state.request_timeout);
    debug!(namespace = ?ctx.namespace(), name = %name, "get");

    let secret = state.storage.get(&ctx, &name).await?;
    if wants_table(&headers) {
        let table =
            state
                .storage
                .convert_to_table(&ctx, TableObject::Secret(&secret), &table_options);
        return Ok(axum::Json(table).into_response());
    }
    Ok(axum::Json(secret).into_response())
}

async fn list_handler(
    State(state): State<AppState>,
    Path((group, version, namespace, resource)): Path<(String, String, String, String)>,
    options: std::result::Result<Query<ListOptions>, QueryRejection>,
    table_options: std::result::Result<Query<TableOptions>, QueryRejection>,
    headers: HeaderMap,
) -> Result<Response> {
    list(state, &group, &version, namespace, &resource, options, table_options, &headers).await
}

/// `kubectl get --all-namespaces`: listed with an empty namespace.
async fn list_all_handler(
    State(state): State<AppState>,
    Path((group, version, resource)): Path<(String, String, String)>,
    options: std::result::Result<Query<ListOptions>, QueryRejection>,
    table_options: std::result::Result<Query<TableOptions>, QueryRejection>,
    headers: HeaderMap,
) -> Result<Response> {
    list(state, &group, &version, String::new(), &resource, options, table_options, &headers).await
}

#[allow(clippy::too_many_arguments)]
async fn list(
    state: AppState,
    group: &str,
    version: &str,
    namespace: String,
    resource: &str,
    options: std::result::Result<Query<ListOptions>, QueryRejection>,
    table_options: std::result::Result<Query<TableOptions>, QueryRejection>,
    headers: &HeaderMap,
) -> Result<Response> {
    resolve(&state, group, version, resource)?;
    let options = query(options)?;
    let table_options = query(table_options)?;
    let (ctx, _guard) = request_context(namespace, headers, state.request_timeout);
    debug!(namespace = ?ctx.namespace(), ?options, "list");

    let list = state.storage.list(&ctx, &options).await?;
    if wants_table(headers) {
        let table = state
            .storage
            .convert_to_table(&ctx, TableObject::List(&list), &table_options);
        return Ok(axum::Json(table).into_response());
    }
    Ok(axum::Json(list).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_from_front_proxy_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(REMOTE_USER_HEADER, "alice".parse().unwrap());
        headers.insert(REMOTE_UID_HEADER, "uid-1".parse().unwrap());
        headers.append(REMOTE_GROUP_HEADER, "dev".parse().unwrap());
        headers.append(REMOTE_GROUP_HEADER, "system:authenticated".parse().unwrap());
        headers.append("x-remote-extra-scopes", "read".parse().unwrap());
        headers.append("x-remote-extra-scopes", "write".parse().unwrap());

        let user = user_from_headers(&headers).unwrap();

        assert_eq!(user.username, "alice");
        assert_eq!(user.uid.as_deref(), Some("uid-1"));
        assert_eq!(user.groups, vec!["dev", "system:authenticated"]);
        assert_eq!(user.extra["scopes"], vec!["read", "write"]);
    }

    #[test]
    fn no_remote_user_means_no_identity() {
        let mut headers = HeaderMap::new();
        headers.append(REMOTE_GROUP_HEADER, "dev".parse().unwrap());
        assert_eq!(user_from_headers(&headers), None);
    }

    #[test]
    fn table_requested_through_accept() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            "application/json;as=Table;v=v1;g=meta.k8s.io,application/json"
                .parse()
                .unwrap(),
        );
        assert!(wants_table(&headers));
        assert!(!wants_table(&HeaderMap::new()));
    }
}
