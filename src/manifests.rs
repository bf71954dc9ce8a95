use k8s_openapi::kube_aggregator::pkg::apis::apiregistration::v1::{
    APIService, APIServiceSpec, ServiceReference,
};
use k8s_openapi::ByteString;
use kube::core::ObjectMeta;

use crate::config::ApiServiceArgs;
use crate::crds::{GROUP, VERSION};

/// Registration routing `/apis/<group>/<version>` to the reader's Service.
///
/// TLS verification is skipped unless `ca_bundle` is given.
pub fn api_service(args: &ApiServiceArgs, ca_bundle: Option<Vec<u8>>) -> APIService {
    let insecure = ca_bundle.is_none();
    APIService {
        metadata: ObjectMeta {
            name: Some(format!("{VERSION}.{GROUP}")),
            ..ObjectMeta::default()
        },
        spec: Some(APIServiceSpec {
            group: Some(GROUP.to_owned()),
            version: Some(VERSION.to_owned()),
            group_priority_minimum: 10000,
            version_priority: 15,
            ca_bundle: ca_bundle.map(ByteString),
            insecure_skip_tls_verify: insecure.then_some(true),
            service: Some(ServiceReference {
                name: Some(args.service.clone()),
                namespace: Some(args.namespace.clone()),
                port: Some(args.port),
            }),
            ..APIServiceSpec::default()
        }),
        status: None,
    }
}
