use std::sync::Arc;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt, future, stream};
use kube::{ResourceExt, core::GroupVersionKind};
use serde::Deserialize;
use tracing::debug;

use crate::authz::{Attributes, Authorization, Authorizer, UserInfo};
use crate::backing::{BackingStore, ListQuery};
use crate::context::RequestContext;
use crate::crds::{RESOURCE_SECRETS, Secret, SecretList, SecretProviderClass};
use crate::error::{Error, Result};
use crate::registry::{Registry, RegistryError};
use crate::table::{DefaultTableConvertor, Table, TableConvertor, TableObject, TableOptions};
use crate::translate::to_secret;

pub const DEFAULT_AUTHZ_CONCURRENCY: usize = 8;

/// List options as supplied by the caller.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ListOptions {
    pub label_selector: Option<String>,
    pub field_selector: Option<String>,
    pub limit: Option<u32>,
    #[serde(rename = "continue")]
    pub continue_token: Option<String>,
}

impl From<&ListOptions> for ListQuery {
    fn from(options: &ListOptions) -> Self {
        ListQuery {
            label_selector: options.label_selector.clone().filter(|s| !s.is_empty()),
            field_selector: options.field_selector.clone().filter(|s| !s.is_empty()),
            limit: options.limit.filter(|l| *l > 0),
            continue_token: options.continue_token.clone().filter(|s| !s.is_empty()),
        }
    }
}

/// A get/list-only resource served by the reader.
#[async_trait]
pub trait ReadOnlyStorage: Send + Sync {
    fn group_version_kind(&self) -> GroupVersionKind;

    fn namespace_scoped(&self) -> bool;

    fn new_object(&self) -> Secret;

    fn new_list(&self) -> SecretList;

    async fn get(&self, ctx: &RequestContext, name: &str) -> Result<Secret>;

    async fn list(&self, ctx: &RequestContext, options: &ListOptions) -> Result<SecretList>;

    fn convert_to_table(
        &self,
        ctx: &RequestContext,
        object: TableObject<'_>,
        options: &TableOptions,
    ) -> Table;
}

/// Group and resource the authorizer is asked about.
#[derive(Clone, Debug)]
struct GroupResource {
    group: String,
    resource: String,
}

pub struct SecretStorage {
    store: Arc<dyn BackingStore>,
    authorizer: Arc<dyn Authorizer>,
    gvk: GroupVersionKind,
    namespaced: bool,
    qualified_resource: String,
    authz_target: GroupResource,
    convertor: DefaultTableConvertor,
    authz_concurrency: usize,
}

impl SecretStorage {
    /// Fails if `Secret` is not registered as served in `registry`.
    pub fn new(
        store: Arc<dyn BackingStore>,
        authorizer: Arc<dyn Authorizer>,
        registry: &Registry,
    ) -> std::result::Result<Self, RegistryError> {
        let descriptor = registry.ensure_served(&Secret::gvk())?;
        let qualified_resource = format!("{}.{}", descriptor.plural, descriptor.gvk.group);

        Ok(Self {
            store,
            authorizer,
            gvk: descriptor.gvk.clone(),
            namespaced: descriptor.namespaced,
            convertor: DefaultTableConvertor::new(qualified_resource.clone()),
            qualified_resource,
            authz_target: GroupResource {
                group: String::new(),
                resource: RESOURCE_SECRETS.to_owned(),
            },
            authz_concurrency: DEFAULT_AUTHZ_CONCURRENCY,
        })
    }

    /// Number of authorization checks a single list may have in flight.
    pub fn with_authz_concurrency(mut self, concurrency: usize) -> Self {
        self.authz_concurrency = concurrency.max(1);
        self
    }

    fn attributes(&self, user: &UserInfo, namespace: &str, name: &str) -> Attributes {
        Attributes {
            user: user.clone(),
            verb: "get".to_owned(),
            namespace: namespace.to_owned(),
            api_group: self.authz_target.group.clone(),
            resource: self.authz_target.resource.clone(),
            name: name.to_owned(),
        }
    }

    async fn authorize(&self, ctx: &RequestContext, attrs: &Attributes) -> Result<Authorization> {
        ctx.until_cancelled(self.authorizer.authorize(attrs))
            .await?
            .map_err(|e| {
                Error::Internal(format!(
                    "authorizing {} on {}/{}: {e:#}",
                    attrs.verb, attrs.namespace, attrs.name
                ))
            })
    }

    /// `None` when the caller may not read this item. The item's position in
    /// the backing page travels with it.
    async fn authorized_secret(
        &self,
        ctx: &RequestContext,
        index: usize,
        attrs: Attributes,
        spc: SecretProviderClass,
    ) -> Result<Option<(usize, Secret)>> {
        let auth = self.authorize(ctx, &attrs).await?;
        if !auth.is_allowed() {
            debug!(namespace = %attrs.namespace, name = %attrs.name, "dropping unauthorized item from list");
            return Ok(None);
        }
        Ok(Some((index, to_secret(&spc))))
    }
}

#[async_trait]
impl ReadOnlyStorage for SecretStorage {
    fn group_version_kind(&self) -> GroupVersionKind {
        self.gvk.clone()
    }

    fn namespace_scoped(&self) -> bool {
        self.namespaced
    }

    fn new_object(&self) -> Secret {
        Secret::new(Default::default())
    }

    fn new_list(&self) -> SecretList {
        SecretList::new(Default::default(), Vec::new())
    }

    async fn get(&self, ctx: &RequestContext, name: &str) -> Result<Secret> {
        let (namespace, user) = ctx.require()?;

        let attrs = self.attributes(user, namespace, name);
        let auth = self.authorize(ctx, &attrs).await?;
        if !auth.is_allowed() {
            debug!(user = %user.username, namespace, name, reason = %auth.reason, "get denied");
            return Err(Error::forbidden(&self.authz_target.resource, name, auth.reason));
        }

        let spc = match ctx.until_cancelled(self.store.get(namespace, name)).await? {
            Err(Error::NotFound { .. }) => {
                return Err(Error::not_found(&self.qualified_resource, name));
            }
            other => other?,
        };

        Ok(to_secret(&spc))
    }

    // Filtering happens after the page is fetched, so a page may hold fewer
    // than `limit` items (even none) while its continue token points at more.
    async fn list(&self, ctx: &RequestContext, options: &ListOptions) -> Result<SecretList> {
        let (namespace, user) = ctx.require()?;

        let base = self.attributes(user, namespace, "");
        let query = ListQuery::from(options);
        let page = ctx
            .until_cancelled(self.store.list(namespace, &query))
            .await??;
        let fetched = page.items.len();

        // Checks complete in any order; the first failure drops the rest.
        let mut allowed: Vec<(usize, Secret)> = stream::iter(page.items.into_iter().enumerate())
            .map(|(index, spc)| {
                let attrs = Attributes {
                    name: spc.name_any(),
                    ..base.clone()
                };
                self.authorized_secret(ctx, index, attrs, spc)
            })
            .buffer_unordered(self.authz_concurrency)
            .try_filter_map(|secret| future::ready(Ok(secret)))
            .try_collect()
            .await?;
        allowed.sort_unstable_by_key(|(index, _)| *index);
        let items: Vec<Secret> = allowed.into_iter().map(|(_, secret)| secret).collect();

        debug!(
            user = %user.username,
            namespace,
            fetched,
            returned = items.len(),
            "listed secrets"
        );
        Ok(SecretList::new(page.metadata, items))
    }

    fn convert_to_table(
        &self,
        _ctx: &RequestContext,
        object: TableObject<'_>,
        options: &TableOptions,
    ) -> Table {
        self.convertor.convert_to_table(object, options)
    }
}
