use crate::Error;
use anyhow::bail;
use meridian_controller_core::{
    plugin::{Plugin, Result, RouteParams, RoutePlugin, UpstreamParams, UpstreamPlugin},
    resources::{Cluster, RouteAction, RouteConfig, WeightedCluster},
    Destination, Metadata, Route, Upstream, FUNCTION_ROUTER_FILTER,
};
use std::sync::Arc;

/// Connects the two halves of function dispatch.
///
/// On clusters it lists every function the upstream exposes, as parsed by the
/// first function-capable plugin that claims the upstream's type. On routes it
/// picks the target cluster and, for function destinations, names the
/// function to invoke there.
#[derive(Clone)]
pub struct FunctionRouter {
    plugins: Vec<Arc<dyn Plugin>>,
}

/// How a route's destination maps onto clusters.
enum Target<'r> {
    Upstream(&'r str),
    Function { upstream: &'r str, function: &'r str },
    Weighted,
    Invalid,
}

// === impl FunctionRouter ===

impl FunctionRouter {
    /// Collects the function-capable plugins from `plugins`, preserving their
    /// order.
    pub fn new<'p>(plugins: impl IntoIterator<Item = &'p Arc<dyn Plugin>>) -> Self {
        let plugins = plugins
            .into_iter()
            .filter(|p| p.as_function().is_some())
            .cloned()
            .collect();
        Self { plugins }
    }

    fn parse(
        &self,
        upstream: &Upstream,
        function: &str,
        spec: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        for plugin in &self.plugins {
            let Some(parser) = plugin.as_function() else {
                continue;
            };
            if let Some(parsed) = parser.parse_function_spec(&upstream.upstream_type, spec)? {
                return Ok(parsed);
            }
        }
        Err(Error::UnparsedFunction {
            function: function.to_string(),
            upstream_type: upstream.upstream_type.clone(),
        }
        .into())
    }
}

impl Plugin for FunctionRouter {
    fn name(&self) -> &str {
        "function-router"
    }

    fn as_upstream(&self) -> Option<&dyn UpstreamPlugin> {
        Some(self)
    }

    fn as_route(&self) -> Option<&dyn RoutePlugin> {
        Some(self)
    }
}

impl UpstreamPlugin for FunctionRouter {
    fn process_upstream(
        &self,
        _: &UpstreamParams<'_>,
        upstream: &Upstream,
        out: &mut Cluster,
    ) -> Result<()> {
        let mut errors = Vec::new();
        for function in &upstream.functions {
            match self.parse(upstream, &function.name, &function.spec) {
                Ok(parsed) => {
                    out.metadata
                        .section_path(FUNCTION_ROUTER_FILTER, &["functions"])
                        .insert(function.name.clone(), parsed);
                }
                Err(error) => errors.push(format!("function {}: {error}", function.name)),
            }
        }
        if !errors.is_empty() {
            bail!(errors.join("; "));
        }
        Ok(())
    }
}

impl RoutePlugin for FunctionRouter {
    fn process_route(
        &self,
        _: &RouteParams<'_>,
        route: &Route,
        out: &mut RouteConfig,
    ) -> Result<()> {
        match Target::of(route) {
            Target::Upstream(name) => {
                out.action = Some(RouteAction::Cluster(name.to_string()));
            }
            Target::Function { upstream, function } => {
                out.action = Some(RouteAction::Cluster(upstream.to_string()));
                stamp_function(&mut out.metadata, upstream, function);
            }
            Target::Weighted => {
                let clusters = route
                    .multiple_destinations
                    .iter()
                    .map(|wd| {
                        let mut metadata = Metadata::default();
                        if let Destination::Function {
                            upstream_name,
                            function_name,
                        } = &wd.destination
                        {
                            stamp_function(&mut metadata, upstream_name, function_name);
                        }
                        WeightedCluster {
                            name: wd.destination.upstream_name().to_string(),
                            weight: wd.weight,
                            metadata,
                        }
                    })
                    .collect();
                out.action = Some(RouteAction::WeightedClusters(clusters));
            }
            Target::Invalid => {
                bail!("must specify either 'single_destination' or 'multiple_destinations' for route")
            }
        }
        Ok(())
    }
}

fn stamp_function(metadata: &mut Metadata, cluster: &str, function: &str) {
    metadata
        .section_path(FUNCTION_ROUTER_FILTER, &[cluster])
        .insert("function".to_string(), function.into());
}

// === impl Target ===

impl<'r> Target<'r> {
    fn of(route: &'r Route) -> Self {
        match (&route.single_destination, route.multiple_destinations.is_empty()) {
            (Some(Destination::Upstream { name }), true) => Self::Upstream(name),
            (
                Some(Destination::Function {
                    upstream_name,
                    function_name,
                }),
                true,
            ) => Self::Function {
                upstream: upstream_name,
                function: function_name,
            },
            (None, false) => Self::Weighted,
            _ => Self::Invalid,
        }
    }
}
