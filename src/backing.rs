use async_trait::async_trait;
use kube::{
    Api, Client,
    api::ListParams,
    core::ListMeta,
};
use tracing::debug;

use crate::crds::SecretProviderClass;
use crate::error::{Error, Result};

/// Query forwarded verbatim to the backing store.
///
/// Selectors are never parsed or validated here; the API server does that.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub label_selector: Option<String>,
    pub field_selector: Option<String>,
    pub limit: Option<u32>,
    pub continue_token: Option<String>,
}

impl From<&ListQuery> for ListParams {
    fn from(query: &ListQuery) -> Self {
        ListParams {
            label_selector: query.label_selector.clone(),
            field_selector: query.field_selector.clone(),
            limit: query.limit,
            continue_token: query.continue_token.clone(),
            ..ListParams::default()
        }
    }
}

/// One page of `SecretProviderClass` objects and the page's list metadata.
#[derive(Clone, Debug, Default)]
pub struct BackingList {
    pub metadata: ListMeta,
    pub items: Vec<SecretProviderClass>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BackingStore: Send + Sync {
    /// Fails with `Error::NotFound` when the object does not exist.
    async fn get(&self, namespace: &str, name: &str) -> Result<SecretProviderClass>;

    async fn list(&self, namespace: &str, query: &ListQuery) -> Result<BackingList>;
}

pub struct KubeBackingStore {
    client: Client,
}

impl KubeBackingStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// An empty namespace addresses every namespace.
    fn api(&self, namespace: &str) -> Api<SecretProviderClass> {
        if namespace.is_empty() {
            Api::all(self.client.clone())
        } else {
            Api::namespaced(self.client.clone(), namespace)
        }
    }
}

#[async_trait]
impl BackingStore for KubeBackingStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<SecretProviderClass> {
        match self.api(namespace).get(name).await {
            Ok(spc) => Ok(spc),
            Err(kube::Error::Api(e)) if e.code == 404 => {
                Err(Error::not_found("secretproviderclasses", name))
            }
            Err(e) => Err(Error::Upstream(e)),
        }
    }

    async fn list(&self, namespace: &str, query: &ListQuery) -> Result<BackingList> {
        let list = self
            .api(namespace)
            .list(&ListParams::from(query))
            .await
            .map_err(Error::Upstream)?;
        debug!(namespace, count = list.items.len(), "listed SecretProviderClasses");

        Ok(BackingList {
            metadata: list.metadata,
            items: list.items,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::sync::{Arc, Mutex};

    use axum::http::{Request, Response, StatusCode};

    use super::*;

    /// Client answering every request with `status` and `body`, recording paths.
    fn client(status: StatusCode, body: &'static str) -> (Client, Arc<Mutex<Vec<String>>>) {
        let paths = Arc::new(Mutex::new(Vec::new()));
        let seen = paths.clone();
        let service = tower::service_fn(move |req: Request<kube::client::Body>| {
            seen.lock().unwrap().push(req.uri().path().to_owned());
            async move {
                let mut response = Response::new(axum::body::Body::from(body));
                *response.status_mut() = status;
                Ok::<_, Infallible>(response)
            }
        });
        (Client::new(service, "default"), paths)
    }

    const EMPTY_LIST: &str = r#"{"apiVersion":"secrets-store.csi.x-k8s.io/v1","kind":"SecretProviderClassList","metadata":{"resourceVersion":"7"},"items":[]}"#;

    #[tokio::test]
    async fn empty_namespace_lists_across_namespaces() {
        let (client, paths) = client(StatusCode::OK, EMPTY_LIST);
        let store = KubeBackingStore::new(client);

        let all = store.list("", &ListQuery::default()).await.unwrap();
        store.list("ns1", &ListQuery::default()).await.unwrap();

        assert_eq!(all.metadata.resource_version.as_deref(), Some("7"));
        assert_eq!(
            *paths.lock().unwrap(),
            vec![
                "/apis/secrets-store.csi.x-k8s.io/v1/secretproviderclasses",
                "/apis/secrets-store.csi.x-k8s.io/v1/namespaces/ns1/secretproviderclasses",
            ]
        );
    }

    #[tokio::test]
    async fn missing_object_maps_to_not_found() {
        let (client, _) = client(
            StatusCode::NOT_FOUND,
            r#"{"kind":"Status","apiVersion":"v1","status":"Failure","message":"not found","reason":"NotFound","code":404}"#,
        );
        let store = KubeBackingStore::new(client);

        let err = store.get("ns1", "p9").await.unwrap_err();
        assert!(matches!(err, Error::NotFound { name, .. } if name == "p9"));
    }

    #[test]
    fn query_maps_onto_list_params() {
        let query = ListQuery {
            label_selector: Some("app=db".to_owned()),
            field_selector: Some("metadata.name!=p2".to_owned()),
            limit: Some(2),
            continue_token: Some("eyJ2IjoibWV0YS5rOHMuaW8vdjEifQ".to_owned()),
        };
        let params = ListParams::from(&query);

        assert_eq!(params.label_selector.as_deref(), Some("app=db"));
        assert_eq!(params.field_selector.as_deref(), Some("metadata.name!=p2"));
        assert_eq!(params.limit, Some(2));
        assert_eq!(
            params.continue_token.as_deref(),
            Some("eyJ2IjoibWV0YS5rOHMuaW8vdjEifQ")
        );
    }

    #[test]
    fn empty_query_sets_nothing() {
        let params = ListParams::from(&ListQuery::default());

        assert_eq!(params.label_selector, None);
        assert_eq!(params.field_selector, None);
        assert_eq!(params.limit, None);
        assert_eq!(params.continue_token, None);
    }
}
