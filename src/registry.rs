use std::collections::BTreeMap;

use kube::{Resource, core::GroupVersionKind};

use crate::crds::{Secret, SecretProviderClass};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("kind {kind} in {group}/{version} registered twice with different descriptors")]
    Conflict {
        group: String,
        version: String,
        kind: String,
    },

    #[error("kind {kind} in {group}/{version} is not registered")]
    Unknown {
        group: String,
        version: String,
        kind: String,
    },
}

impl RegistryError {
    fn conflict(gvk: &GroupVersionKind) -> Self {
        RegistryError::Conflict {
            group: gvk.group.clone(),
            version: gvk.version.clone(),
            kind: gvk.kind.clone(),
        }
    }

    fn unknown(gvk: &GroupVersionKind) -> Self {
        RegistryError::Unknown {
            group: gvk.group.clone(),
            version: gvk.version.clone(),
            kind: gvk.kind.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceDescriptor {
    pub gvk: GroupVersionKind,
    pub plural: String,
    pub namespaced: bool,
    /// Verbs served by this process; empty for kinds that are only consumed.
    pub verbs: Vec<String>,
}

impl ResourceDescriptor {
    pub fn of<K: Resource<DynamicType = ()>>(namespaced: bool, verbs: &[&str]) -> Self {
        Self {
            gvk: GroupVersionKind::gvk(&K::group(&()), &K::version(&()), &K::kind(&())),
            plural: K::plural(&()).into_owned(),
            namespaced,
            verbs: verbs.iter().map(|v| (*v).to_owned()).collect(),
        }
    }

    pub fn is_served(&self) -> bool {
        !self.verbs.is_empty()
    }
}

type Key = (String, String, String);

fn key(gvk: &GroupVersionKind) -> Key {
    (gvk.group.clone(), gvk.version.clone(), gvk.kind.clone())
}

#[derive(Debug, Default)]
pub struct RegistryBuilder {
    resources: BTreeMap<Key, ResourceDescriptor>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registering an identical descriptor again is a no-op.
    pub fn register(mut self, descriptor: ResourceDescriptor) -> Result<Self, RegistryError> {
        match self.resources.get(&key(&descriptor.gvk)) {
            Some(existing) if *existing == descriptor => {}
            Some(_) => return Err(RegistryError::conflict(&descriptor.gvk)),
            None => {
                self.resources.insert(key(&descriptor.gvk), descriptor);
            }
        }
        Ok(self)
    }

    pub fn build(self) -> Registry {
        Registry {
            resources: self.resources,
        }
    }
}

/// Immutable lookup table of registered kinds, ordered by group, version and kind.
#[derive(Debug)]
pub struct Registry {
    resources: BTreeMap<Key, ResourceDescriptor>,
}

impl Registry {
    /// The served `Secret` view and the `SecretProviderClass` it reads from.
    pub fn with_defaults() -> Result<Self, RegistryError> {
        Ok(RegistryBuilder::new()
            .register(ResourceDescriptor::of::<Secret>(true, &["get", "list"]))?
            .register(ResourceDescriptor::of::<SecretProviderClass>(true, &[]))?
            .build())
    }

    pub fn lookup(&self, gvk: &GroupVersionKind) -> Option<&ResourceDescriptor> {
        self.resources.get(&key(gvk))
    }

    /// Fails unless `gvk` is registered with at least one served verb.
    pub fn ensure_served(&self, gvk: &GroupVersionKind) -> Result<&ResourceDescriptor, RegistryError> {
        self.lookup(gvk)
            .filter(|d| d.is_served())
            .ok_or_else(|| RegistryError::unknown(gvk))
    }

    pub fn served(&self) -> impl Iterator<Item = &ResourceDescriptor> {
        self.resources.values().filter(|d| d.is_served())
    }

    /// Served groups with their versions.
    pub fn served_groups(&self) -> BTreeMap<String, Vec<String>> {
        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for d in self.served() {
            let versions = groups.entry(d.gvk.group.clone()).or_default();
            if !versions.contains(&d.gvk.version) {
                versions.push(d.gvk.version.clone());
            }
        }
        groups
    }

    pub fn served_resources(&self, group: &str, version: &str) -> Vec<&ResourceDescriptor> {
        self.served()
            .filter(|d| d.gvk.group == group && d.gvk.version == version)
            .collect()
    }

    /// Served descriptor for a URL path segment triple.
    pub fn resolve(&self, group: &str, version: &str, plural: &str) -> Option<&ResourceDescriptor> {
        self.served()
            .find(|d| d.gvk.group == group && d.gvk.version == version && d.plural == plural)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crds::{GROUP, VERSION};

    #[test]
    fn re_registration_is_idempotent() {
        let registry = RegistryBuilder::new()
            .register(ResourceDescriptor::of::<Secret>(true, &["get", "list"]))
            .unwrap()
            .register(ResourceDescriptor::of::<Secret>(true, &["get", "list"]))
            .unwrap()
            .build();

        assert_eq!(registry.served().count(), 1);
    }

    #[test]
    fn conflicting_registration_is_rejected() {
        let mut other = ResourceDescriptor::of::<Secret>(true, &["get", "list"]);
        other.plural = "secretviews".to_owned();

        let err = RegistryBuilder::new()
            .register(ResourceDescriptor::of::<Secret>(true, &["get", "list"]))
            .unwrap()
            .register(other)
            .unwrap_err();
        assert!(matches!(err, RegistryError::Conflict { kind, .. } if kind == "Secret"));
    }

    #[test]
    fn defaults_serve_only_the_reader_group() {
        let registry = Registry::with_defaults().unwrap();

        let groups = registry.served_groups();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[GROUP], vec![VERSION.to_owned()]);

        let secrets = registry.resolve(GROUP, VERSION, "secrets").unwrap();
        assert!(secrets.namespaced);
        assert_eq!(secrets.verbs, vec!["get", "list"]);
    }

    #[test]
    fn consumed_kinds_are_known_but_not_served() {
        let registry = Registry::with_defaults().unwrap();
        let gvk = GroupVersionKind::gvk("secrets-store.csi.x-k8s.io", "v1", "SecretProviderClass");

        assert!(registry.lookup(&gvk).is_some());
        assert!(registry.ensure_served(&gvk).is_err());
    }
}
