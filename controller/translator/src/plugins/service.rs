use super::decode;
use crate::Error;
use meridian_controller_core::{
    plugin::{Plugin, Result, UpstreamParams, UpstreamPlugin},
    resources::{Cluster, DiscoveryType, SocketAddress},
    Upstream,
};
use serde::Deserialize;
use std::net::IpAddr;

pub const UPSTREAM_TYPE: &str = "service";

/// Static or DNS-addressed backends of type `service`.
///
/// Upstreams with discovered endpoints keep their EDS type and ignore any
/// configured hosts.
#[derive(Clone, Debug, Default)]
pub struct Service;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Spec {
    #[serde(default)]
    hosts: Vec<Host>,
}

#[derive(Debug, Deserialize)]
struct Host {
    addr: String,
    port: u16,
}

impl Plugin for Service {
    fn name(&self) -> &str {
        "service"
    }

    fn as_upstream(&self) -> Option<&dyn UpstreamPlugin> {
        Some(self)
    }
}

impl UpstreamPlugin for Service {
    fn process_upstream(
        &self,
        _: &UpstreamParams<'_>,
        upstream: &Upstream,
        out: &mut Cluster,
    ) -> Result<()> {
        if upstream.upstream_type != UPSTREAM_TYPE {
            return Ok(());
        }

        let spec = if upstream.spec.is_null() {
            Spec::default()
        } else {
            decode::<Spec>("service", &upstream.spec)?
        };
        if out.discovery_type == DiscoveryType::Eds {
            return Ok(());
        }

        let all_ips = spec.hosts.iter().all(|h| h.addr.parse::<IpAddr>().is_ok());
        out.discovery_type = if all_ips {
            DiscoveryType::Static
        } else {
            DiscoveryType::StrictDns
        };
        out.hosts = spec
            .hosts
            .into_iter()
            .map(|Host { addr, port }| SocketAddress::new(addr, port))
            .collect();
        Ok(())
    }
}

/// Rejects clusters whose discovery type needs hosts but that have none.
pub(crate) fn validate_cluster(cluster: &Cluster) -> Result<(), Error> {
    match cluster.discovery_type {
        DiscoveryType::Static | DiscoveryType::StrictDns | DiscoveryType::LogicalDns
            if cluster.hosts.is_empty() =>
        {
            Err(Error::EmptyHosts(cluster.discovery_type))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_controller_core::{EndpointGroups, FileMap, SecretMap};
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    fn process(spec: serde_json::Value, mut out: Cluster) -> Result<Cluster> {
        let (secrets, files, endpoints) =
            (SecretMap::new(), FileMap::new(), EndpointGroups::new());
        let params = UpstreamParams {
            secrets: &secrets,
            files: &files,
            endpoints: &endpoints,
        };
        let mut upstream = Upstream::new("svc", UPSTREAM_TYPE);
        upstream.spec = spec;
        Service.process_upstream(&params, &upstream, &mut out)?;
        Ok(out)
    }

    #[rstest]
    #[case(json!({ "hosts": [{ "addr": "10.0.0.1", "port": 80 }] }), DiscoveryType::Static)]
    #[case(json!({ "hosts": [{ "addr": "::1", "port": 80 }] }), DiscoveryType::Static)]
    #[case(
        json!({ "hosts": [{ "addr": "10.0.0.1", "port": 80 }, { "addr": "svc.local", "port": 80 }] }),
        DiscoveryType::StrictDns
    )]
    fn discovery_type_follows_host_kind(
        #[case] spec: serde_json::Value,
        #[case] expected: DiscoveryType,
    ) {
        let out = process(spec, Cluster::default()).unwrap();
        assert_eq!(out.discovery_type, expected);
        assert!(!out.hosts.is_empty());
    }

    #[test]
    fn eds_clusters_ignore_hosts() {
        let cluster = Cluster {
            discovery_type: DiscoveryType::Eds,
            ..Default::default()
        };
        let out = process(
            json!({ "hosts": [{ "addr": "10.0.0.1", "port": 80 }] }),
            cluster,
        )
        .unwrap();
        assert_eq!(out.discovery_type, DiscoveryType::Eds);
        assert!(out.hosts.is_empty());
    }

    #[test]
    fn empty_static_cluster_fails_validation() {
        let out = process(serde_json::Value::Null, Cluster::default()).unwrap();
        assert!(matches!(
            validate_cluster(&out),
            Err(Error::EmptyHosts(DiscoveryType::Static))
        ));

        let eds = Cluster {
            discovery_type: DiscoveryType::Eds,
            ..Default::default()
        };
        assert!(validate_cluster(&eds).is_ok());
    }
}
