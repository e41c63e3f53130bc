use super::decode;
use meridian_controller_core::{
    plugin::{Plugin, Result, RouteParams, RoutePlugin},
    resources::{RetryPolicy, RouteConfig},
    Route,
};
use serde::Deserialize;

/// Applies per-route options: prefix rewrite, request timeout, and retries.
///
/// Timeouts and retries are read from the route's `extensions` map under the
/// `timeoutMs` and `retries` keys.
#[derive(Clone, Debug, Default)]
pub struct Extensions;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Retries {
    #[serde(default = "default_retry_on")]
    retry_on: String,
    num_retries: u32,
}

fn default_retry_on() -> String {
    "5xx".to_string()
}

impl Plugin for Extensions {
    fn name(&self) -> &str {
        "extensions"
    }

    fn as_route(&self) -> Option<&dyn RoutePlugin> {
        Some(self)
    }
}

impl RoutePlugin for Extensions {
    fn process_route(
        &self,
        _: &RouteParams<'_>,
        route: &Route,
        out: &mut RouteConfig,
    ) -> Result<()> {
        out.prefix_rewrite = route.prefix_rewrite.clone();

        if let Some(timeout) = route.extensions.get("timeoutMs") {
            out.timeout_ms = Some(decode::<u64>("timeout", timeout)?);
        }

        if let Some(retries) = route.extensions.get("retries") {
            let Retries {
                retry_on,
                num_retries,
            } = decode("retries", retries)?;
            out.retry_policy = Some(RetryPolicy {
                retry_on,
                num_retries,
            });
        }

        Ok(())
    }
}
