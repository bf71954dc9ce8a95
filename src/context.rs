use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::authz::UserInfo;
use crate::error::{Error, Result};

/// Per-request values resolved by the HTTP layer before storage is invoked.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    namespace: Option<String>,
    user: Option<UserInfo>,
    cancel: CancellationToken,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_user(mut self, user: UserInfo) -> Self {
        self.user = Some(user);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn user(&self) -> Option<&UserInfo> {
        self.user.as_ref()
    }

    /// Namespace and caller identity, or `BadRequest` when either is absent.
    pub fn require(&self) -> Result<(&str, &UserInfo)> {
        let namespace = self
            .namespace()
            .ok_or_else(|| Error::BadRequest("missing namespace".into()))?;
        let user = self
            .user()
            .ok_or_else(|| Error::BadRequest("missing user info".into()))?;
        Ok((namespace, user))
    }

    /// Drive `fut` unless the request is cancelled first, in which case the
    /// future is dropped and `Error::Cancelled` is returned.
    pub async fn until_cancelled<F: Future>(&self, fut: F) -> Result<F::Output> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            out = fut => Ok(out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_namespace_is_bad_request() {
        let ctx = RequestContext::new().with_user(UserInfo::new("alice"));
        let err = ctx.require().unwrap_err();
        assert!(matches!(err, Error::BadRequest(msg) if msg == "missing namespace"));
    }

    #[test]
    fn missing_user_is_bad_request() {
        let ctx = RequestContext::new().with_namespace("ns1");
        let err = ctx.require().unwrap_err();
        assert!(matches!(err, Error::BadRequest(msg) if msg == "missing user info"));
    }

    #[tokio::test]
    async fn cancelled_context_abandons_pending_future() {
        let cancel = CancellationToken::new();
        let ctx = RequestContext::new().with_cancellation(cancel.clone());
        cancel.cancel();

        let result = ctx.until_cancelled(std::future::pending::<()>()).await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
