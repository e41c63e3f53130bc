use super::decode;
use crate::Error;
use meridian_controller_core::{
    plugin::{Dependencies, FunctionPlugin, Plugin, Result, UpstreamParams, UpstreamPlugin},
    resources::{Cluster, DiscoveryType, SocketAddress, UpstreamTlsContext},
    Config, Upstream,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const UPSTREAM_TYPE: &str = "lambda";
pub const FILTER: &str = "meridian.lambda";
pub const ACCESS_KEY: &str = "access_key";
pub const SECRET_KEY: &str = "secret_key";

/// Cloud functions reached through the provider's regional HTTPS endpoint.
///
/// Each upstream names the secret holding its credentials; only that secret
/// is visible to the plugin when the upstream is translated.
#[derive(Clone, Debug, Default)]
pub struct Lambda;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpstreamSpec {
    region: String,
    secret_ref: String,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct FunctionSpec {
    function_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    qualifier: Option<String>,
}

impl Plugin for Lambda {
    fn name(&self) -> &str {
        "lambda"
    }

    fn dependencies(&self, config: &Config) -> Option<Dependencies> {
        let refs = config
            .upstreams
            .iter()
            .filter(|u| u.upstream_type == UPSTREAM_TYPE)
            .filter_map(|u| match decode::<UpstreamSpec>("lambda", &u.spec) {
                Ok(spec) => Some(spec.secret_ref),
                Err(error) => {
                    debug!(upstream = %u.name, %error, "Skipping undecodable spec");
                    None
                }
            })
            .collect::<Vec<_>>();
        if refs.is_empty() {
            return None;
        }
        Some(Dependencies::secrets(refs))
    }

    fn as_upstream(&self) -> Option<&dyn UpstreamPlugin> {
        Some(self)
    }

    fn as_function(&self) -> Option<&dyn FunctionPlugin> {
        Some(self)
    }
}

impl UpstreamPlugin for Lambda {
    fn process_upstream(
        &self,
        params: &UpstreamParams<'_>,
        upstream: &Upstream,
        out: &mut Cluster,
    ) -> Result<()> {
        if upstream.upstream_type != UPSTREAM_TYPE {
            return Ok(());
        }

        let spec = decode::<UpstreamSpec>("lambda", &upstream.spec)?;
        let host = format!("lambda.{}.amazonaws.com", spec.region);
        // Discovered endpoints take precedence over the regional endpoint.
        if out.discovery_type != DiscoveryType::Eds {
            out.discovery_type = DiscoveryType::LogicalDns;
            out.hosts = vec![SocketAddress::new(&host, 443)];
        }
        out.tls
            .get_or_insert_with(UpstreamTlsContext::default)
            .sni
            .get_or_insert_with(|| host.clone());

        let secret = params
            .secrets
            .get(&spec.secret_ref)
            .ok_or_else(|| Error::MissingSecret {
                reference: spec.secret_ref.clone(),
            })?;
        let key = |name: &str| {
            secret
                .get(name)
                .map(str::to_string)
                .ok_or_else(|| Error::MissingSecretKey {
                    reference: spec.secret_ref.clone(),
                    key: name.to_string(),
                })
        };
        let access_key = key(ACCESS_KEY)?;
        let secret_key = key(SECRET_KEY)?;

        let section = out.metadata.section(FILTER);
        section.insert("host".to_string(), host.into());
        section.insert("region".to_string(), spec.region.into());
        section.insert("accessKey".to_string(), access_key.into());
        section.insert("secretKey".to_string(), secret_key.into());
        Ok(())
    }
}

impl FunctionPlugin for Lambda {
    fn parse_function_spec(
        &self,
        upstream_type: &str,
        spec: &serde_json::Value,
    ) -> Result<Option<serde_json::Value>> {
        if upstream_type != UPSTREAM_TYPE {
            return Ok(None);
        }
        let spec = decode::<FunctionSpec>("lambda function", spec)?;
        Ok(Some(serde_json::to_value(spec)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreemap;
    use meridian_controller_core::{EndpointGroups, FileMap, Secret, SecretMap};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn upstream(spec: serde_json::Value) -> Upstream {
        let mut upstream = Upstream::new("fns", UPSTREAM_TYPE);
        upstream.spec = spec;
        upstream
    }

    fn process(secrets: &SecretMap, upstream: &Upstream) -> (Cluster, Result<()>) {
        let (files, endpoints) = (FileMap::new(), EndpointGroups::new());
        let params = UpstreamParams {
            secrets,
            files: &files,
            endpoints: &endpoints,
        };
        let mut out = Cluster::default();
        let res = Lambda.process_upstream(&params, upstream, &mut out);
        (out, res)
    }

    #[test]
    fn undecodable_specs_declare_nothing() {
        let config = Config::new(
            vec![
                upstream(json!({ "region": "us-east-1", "secretRef": "aws" })),
                {
                    let mut u = upstream(json!({ "region": 7 }));
                    u.name = "broken".to_string();
                    u
                },
            ],
            vec![],
            vec![],
        );
        assert_eq!(
            Lambda.dependencies(&config),
            Some(Dependencies::secrets(["aws"]))
        );
    }

    #[test]
    fn uses_scoped_credentials() {
        let secrets = btreemap! {
            "aws".to_string() => Secret::new("aws", btreemap! {
                "access_key".to_string() => "AK".to_string(),
                "secret_key".to_string() => "SK".to_string(),
            }),
        };
        let (out, res) = process(
            &secrets,
            &upstream(json!({ "region": "us-east-1", "secretRef": "aws" })),
        );
        res.unwrap();
        assert_eq!(out.discovery_type, DiscoveryType::LogicalDns);
        assert_eq!(
            out.hosts,
            vec![SocketAddress::new("lambda.us-east-1.amazonaws.com", 443)]
        );
        assert_eq!(
            out.metadata.get(FILTER, &["accessKey"]),
            Some(&json!("AK"))
        );
    }

    #[test]
    fn keeps_discovered_endpoints_and_existing_tls() {
        let secrets = btreemap! {
            "aws".to_string() => Secret::new("aws", btreemap! {
                "access_key".to_string() => "AK".to_string(),
                "secret_key".to_string() => "SK".to_string(),
            }),
        };
        let (files, endpoints) = (FileMap::new(), EndpointGroups::new());
        let params = UpstreamParams {
            secrets: &secrets,
            files: &files,
            endpoints: &endpoints,
        };
        let mut out = Cluster {
            discovery_type: DiscoveryType::Eds,
            tls: Some(UpstreamTlsContext {
                ca_chain: Some("CA".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        Lambda
            .process_upstream(
                &params,
                &upstream(json!({ "region": "us-east-1", "secretRef": "aws" })),
                &mut out,
            )
            .unwrap();

        assert_eq!(out.discovery_type, DiscoveryType::Eds);
        assert!(out.hosts.is_empty());
        assert_eq!(
            out.tls,
            Some(UpstreamTlsContext {
                sni: Some("lambda.us-east-1.amazonaws.com".to_string()),
                ca_chain: Some("CA".to_string()),
                ..Default::default()
            })
        );
    }

    #[test]
    fn missing_credentials_still_shape_the_cluster() {
        let (out, res) = process(
            &SecretMap::new(),
            &upstream(json!({ "region": "eu-west-1", "secretRef": "aws" })),
        );
        assert_eq!(res.unwrap_err().to_string(), "secret aws not found");
        assert_eq!(out.hosts.len(), 1);
    }

    #[test]
    fn parses_function_specs() {
        let parsed = Lambda
            .parse_function_spec("lambda", &json!({ "functionName": "doThing" }))
            .unwrap();
        assert_eq!(parsed, Some(json!({ "functionName": "doThing" })));
        assert_eq!(
            Lambda.parse_function_spec("service", &json!({})).unwrap(),
            None
        );
    }
}
