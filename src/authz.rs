use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::authorization::v1::{
    ResourceAttributes, SubjectAccessReview, SubjectAccessReviewSpec, SubjectAccessReviewStatus,
};
use kube::{Api, Client, api::PostParams};
use tracing::debug;

/// Authenticated caller as forwarded by the aggregation layer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserInfo {
    pub username: String,
    pub uid: Option<String>,
    pub groups: Vec<String>,
    pub extra: BTreeMap<String, Vec<String>>,
}

impl UserInfo {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Self::default()
        }
    }

    pub fn with_groups(mut self, groups: Vec<String>) -> Self {
        self.groups = groups;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
    NoOpinion,
}

/// A decision plus the human readable reason given for it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Authorization {
    pub decision: Decision,
    pub reason: String,
}

impl Authorization {
    pub fn allow(reason: impl Into<String>) -> Self {
        Self {
            decision: Decision::Allow,
            reason: reason.into(),
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            decision: Decision::Deny,
            reason: reason.into(),
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.decision == Decision::Allow
    }
}

/// What is being asked of the authorizer. Built per request, never stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attributes {
    pub user: UserInfo,
    pub verb: String,
    pub namespace: String,
    pub api_group: String,
    pub resource: String,
    pub name: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// An `Err` means no decision could be made, which is not the same as a denial.
    async fn authorize(&self, attrs: &Attributes) -> anyhow::Result<Authorization>;
}

/// Delegates decisions to the cluster API server.
pub struct SubjectAccessReviewAuthorizer {
    client: Client,
}

impl SubjectAccessReviewAuthorizer {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Authorizer for SubjectAccessReviewAuthorizer {
    async fn authorize(&self, attrs: &Attributes) -> anyhow::Result<Authorization> {
        let api: Api<SubjectAccessReview> = Api::all(self.client.clone());
        let review = api
            .create(&PostParams::default(), &review_for(attrs))
            .await?;

        let status = review.status.unwrap_or_default();
        if let Some(error) = status.evaluation_error.as_deref() {
            debug!(user = %attrs.user.username, error, "SubjectAccessReview evaluation error");
        }
        Ok(authorization_from_status(&status))
    }
}

fn review_for(attrs: &Attributes) -> SubjectAccessReview {
    SubjectAccessReview {
        metadata: Default::default(),
        spec: SubjectAccessReviewSpec {
            user: Some(attrs.user.username.clone()),
            uid: attrs.user.uid.clone(),
            groups: Some(attrs.user.groups.clone()),
            extra: (!attrs.user.extra.is_empty()).then(|| attrs.user.extra.clone()),
            resource_attributes: Some(ResourceAttributes {
                namespace: Some(attrs.namespace.clone()),
                verb: Some(attrs.verb.clone()),
                group: Some(attrs.api_group.clone()),
                resource: Some(attrs.resource.clone()),
                name: (!attrs.name.is_empty()).then(|| attrs.name.clone()),
                ..ResourceAttributes::default()
            }),
            ..SubjectAccessReviewSpec::default()
        },
        status: None,
    }
}

fn authorization_from_status(status: &SubjectAccessReviewStatus) -> Authorization {
    let decision = if status.allowed {
        Decision::Allow
    } else if status.denied.unwrap_or(false) {
        Decision::Deny
    } else {
        Decision::NoOpinion
    };
    Authorization {
        decision,
        reason: status.reason.clone().unwrap_or_default(),
    }
}
