use kube::ResourceExt;

use crate::crds::{Secret, SecretProviderClass};

/// Prefix keeping projected UIDs distinct from the backing object's UID.
pub const UID_PREFIX: &str = "sec-";

pub const LAST_APPLIED_CONFIG_ANNOTATION: &str = "kubectl.kubernetes.io/last-applied-configuration";

/// Project a `SecretProviderClass` into the read-only `Secret` view.
pub fn to_secret(spc: &SecretProviderClass) -> Secret {
    let mut metadata = spc.metadata.clone();

    metadata.uid = spc.uid().map(|uid| format!("{UID_PREFIX}{uid}"));
    metadata.managed_fields = None;
    metadata.owner_references = None;
    metadata.finalizers = None;
    if let Some(annotations) = metadata.annotations.as_mut() {
        annotations.remove(LAST_APPLIED_CONFIG_ANNOTATION);
    }

    Secret::new(metadata)
}
