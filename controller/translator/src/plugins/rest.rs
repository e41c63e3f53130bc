use super::{decode, service};
use meridian_controller_core::{
    plugin::{
        FunctionPlugin, Plugin, Result, RouteParams, RoutePlugin, UpstreamParams, UpstreamPlugin,
    },
    resources::{Cluster, RouteConfig},
    Route, Upstream,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const FILTER: &str = "meridian.rest";

/// REST functions exposed by `service` upstreams.
///
/// A function describes the request the proxy should send: a path template,
/// a method, and extra headers. Routes may pass request parameters to the
/// templates through the `parameters` extension.
#[derive(Clone, Debug, Default)]
pub struct Rest;

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct FunctionSpec {
    path: String,
    #[serde(default = "default_method")]
    method: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    headers: BTreeMap<String, String>,
}

fn default_method() -> String {
    "GET".to_string()
}

impl Plugin for Rest {
    fn name(&self) -> &str {
        "rest"
    }

    fn as_upstream(&self) -> Option<&dyn UpstreamPlugin> {
        Some(self)
    }

    fn as_route(&self) -> Option<&dyn RoutePlugin> {
        Some(self)
    }

    fn as_function(&self) -> Option<&dyn FunctionPlugin> {
        Some(self)
    }
}

impl UpstreamPlugin for Rest {
    fn process_upstream(
        &self,
        _: &UpstreamParams<'_>,
        upstream: &Upstream,
        out: &mut Cluster,
    ) -> Result<()> {
        // Function metadata is attached by the router; this only marks the
        // cluster so the proxy enables request transformation for it.
        if upstream.upstream_type == service::UPSTREAM_TYPE && !upstream.functions.is_empty() {
            out.metadata
                .section(FILTER)
                .insert("transform".to_string(), true.into());
        }
        Ok(())
    }
}

impl RoutePlugin for Rest {
    fn process_route(
        &self,
        _: &RouteParams<'_>,
        route: &Route,
        out: &mut RouteConfig,
    ) -> Result<()> {
        let Some(parameters) = route.extensions.get("parameters") else {
            return Ok(());
        };
        let parameters = decode::<BTreeMap<String, String>>("parameters", parameters)?;
        out.metadata.section(FILTER).insert(
            "parameters".to_string(),
            serde_json::to_value(parameters)?,
        );
        Ok(())
    }
}

impl FunctionPlugin for Rest {
    fn parse_function_spec(
        &self,
        upstream_type: &str,
        spec: &serde_json::Value,
    ) -> Result<Option<serde_json::Value>> {
        if upstream_type != service::UPSTREAM_TYPE {
            return Ok(None);
        }
        let mut spec = decode::<FunctionSpec>("rest function", spec)?;
        spec.method = spec.method.to_uppercase();
        Ok(Some(serde_json::to_value(spec)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn parses_service_functions_only() {
        let parsed = Rest
            .parse_function_spec("service", &json!({ "path": "/do", "method": "post" }))
            .unwrap();
        assert_eq!(parsed, Some(json!({ "path": "/do", "method": "POST" })));

        let foreign = Rest
            .parse_function_spec("lambda", &json!({ "functionName": "f" }))
            .unwrap();
        assert_eq!(foreign, None);

        assert!(Rest
            .parse_function_spec("service", &json!({ "method": "GET" }))
            .is_err());
    }
}
