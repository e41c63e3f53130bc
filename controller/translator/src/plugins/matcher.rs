use meridian_controller_core::{
    plugin::{Plugin, Result, RouteParams, RoutePlugin},
    resources::{HeaderMatch, RouteConfig, RouteMatch},
    Route,
};

/// Converts a route's path, header, and method matchers.
#[derive(Clone, Debug, Default)]
pub struct Matcher;

impl Plugin for Matcher {
    fn name(&self) -> &str {
        "matcher"
    }

    fn as_route(&self) -> Option<&dyn RoutePlugin> {
        Some(self)
    }
}

impl RoutePlugin for Matcher {
    fn process_route(
        &self,
        _: &RouteParams<'_>,
        route: &Route,
        out: &mut RouteConfig,
    ) -> Result<()> {
        let mut headers = route
            .matcher
            .headers
            .iter()
            .map(|(name, value)| HeaderMatch {
                name: name.clone(),
                value: value.clone(),
                regex: false,
            })
            .collect::<Vec<_>>();

        match route.matcher.methods.as_slice() {
            [] => {}
            [method] => headers.push(HeaderMatch {
                name: ":method".to_string(),
                value: method.to_uppercase(),
                regex: false,
            }),
            methods => headers.push(HeaderMatch {
                name: ":method".to_string(),
                value: methods
                    .iter()
                    .map(|m| m.to_uppercase())
                    .collect::<Vec<_>>()
                    .join("|"),
                regex: true,
            }),
        }

        out.route_match = RouteMatch {
            path: route.matcher.path.clone(),
            headers,
        };
        Ok(())
    }
}
