use std::{borrow::Cow, collections::BTreeMap};

use k8s_openapi::NamespaceResourceScope;
use kube::{
    Resource,
    core::{GroupVersionKind, ListMeta, ObjectMeta, TypeMeta},
};
use kube_derive::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// API group served by the reader.
pub const GROUP: &str = "reader.homerow.ca";
pub const VERSION: &str = "v1alpha1";
pub const KIND_SECRET: &str = "Secret";
pub const KIND_SECRET_LIST: &str = "SecretList";
pub const RESOURCE_SECRETS: &str = "secrets";

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecretObjectData {
    pub object_name: Option<String>,
    pub key: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecretObject {
    pub secret_name: Option<String>,
    #[serde(rename = "type")]
    pub type_: Option<String>,
    pub labels: Option<BTreeMap<String, String>>,
    pub annotations: Option<BTreeMap<String, String>>,
    pub data: Option<Vec<SecretObjectData>>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ByPodStatus {
    pub id: Option<String>,
    pub namespace: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecretProviderClassStatus {
    pub by_pod: Option<Vec<ByPodStatus>>,
}

/// The Secrets Store CSI driver resource the reader projects from.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
#[kube(
    group = "secrets-store.csi.x-k8s.io",
    version = "v1",
    kind = "SecretProviderClass",
    namespaced,
    status = "SecretProviderClassStatus"
)]
pub struct SecretProviderClassSpec {
    pub provider: Option<String>,
    pub parameters: Option<BTreeMap<String, String>>,
    pub secret_objects: Option<Vec<SecretObject>>,
}

/// Read-only projection of a `SecretProviderClass`.
///
/// Only metadata is carried; provider parameters never leave the backing object.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Secret {
    #[serde(flatten, default)]
    pub types: Option<TypeMeta>,
    pub metadata: ObjectMeta,
}

impl Secret {
    pub fn gvk() -> GroupVersionKind {
        GroupVersionKind::gvk(GROUP, VERSION, KIND_SECRET)
    }

    pub fn new(metadata: ObjectMeta) -> Self {
        Self {
            types: Some(TypeMeta {
                api_version: Secret::api_version(&()).into_owned(),
                kind: KIND_SECRET.to_owned(),
            }),
            metadata,
        }
    }
}

impl Resource for Secret {
    type DynamicType = ();
    type Scope = NamespaceResourceScope;

    fn kind(_: &()) -> Cow<'_, str> {
        KIND_SECRET.into()
    }

    fn group(_: &()) -> Cow<'_, str> {
        GROUP.into()
    }

    fn version(_: &()) -> Cow<'_, str> {
        VERSION.into()
    }

    fn plural(_: &()) -> Cow<'_, str> {
        RESOURCE_SECRETS.into()
    }

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct SecretList {
    #[serde(flatten, default)]
    pub types: Option<TypeMeta>,
    pub metadata: ListMeta,
    #[serde(default)]
    pub items: Vec<Secret>,
}

impl SecretList {
    pub fn new(metadata: ListMeta, items: Vec<Secret>) -> Self {
        Self {
            types: Some(TypeMeta {
                api_version: Secret::api_version(&()).into_owned(),
                kind: KIND_SECRET_LIST.to_owned(),
            }),
            metadata,
            items,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_list_serializes_items_as_array() {
        let list = SecretList::new(ListMeta::default(), vec![]);
        let json = serde_json::to_value(&list).unwrap();

        assert_eq!(json["items"], serde_json::json!([]));
        assert_eq!(json["kind"], "SecretList");
        assert_eq!(json["apiVersion"], "reader.homerow.ca/v1alpha1");
    }

    #[test]
    fn secret_carries_type_meta() {
        let secret = Secret::new(ObjectMeta {
            name: Some("p1".to_owned()),
            ..ObjectMeta::default()
        });
        let json = serde_json::to_value(&secret).unwrap();

        assert_eq!(json["kind"], "Secret");
        assert_eq!(json["metadata"]["name"], "p1");
    }
}
