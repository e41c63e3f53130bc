use crate::Error;
use meridian_controller_core::{
    plugin::{Dependencies, Plugin, Result, UpstreamParams, UpstreamPlugin},
    resources::{Cluster, UpstreamTlsContext},
    Config, Upstream,
};

pub const CA_CHAIN_KEY: &str = "ca_chain";
pub const CERT_CHAIN_KEY: &str = "cert_chain";
pub const PRIVATE_KEY_KEY: &str = "private_key";

/// Originates TLS to upstreams that carry an `sslConfig`.
///
/// The referenced secret may hold a CA chain for verifying the upstream and a
/// client certificate/key pair; a certificate without a key is rejected.
///
/// Also declares the secrets of virtual hosts with an `sslConfig`, which the
/// translator reads when terminating TLS on secure listeners.
#[derive(Clone, Debug, Default)]
pub struct UpstreamSsl;

impl Plugin for UpstreamSsl {
    fn name(&self) -> &str {
        "upstream-ssl"
    }

    fn dependencies(&self, config: &Config) -> Option<Dependencies> {
        let upstreams = config
            .upstreams
            .iter()
            .filter_map(|u| u.ssl_config.as_ref()?.secret_ref.as_ref());
        let virtual_hosts = config
            .virtual_hosts
            .iter()
            .filter_map(|vh| Some(&vh.ssl_config.as_ref()?.secret_ref));
        let refs = upstreams.chain(virtual_hosts).collect::<Vec<_>>();
        if refs.is_empty() {
            return None;
        }
        Some(Dependencies::secrets(refs))
    }

    fn as_upstream(&self) -> Option<&dyn UpstreamPlugin> {
        Some(self)
    }
}

impl UpstreamPlugin for UpstreamSsl {
    fn process_upstream(
        &self,
        params: &UpstreamParams<'_>,
        upstream: &Upstream,
        out: &mut Cluster,
    ) -> Result<()> {
        let Some(ssl) = upstream.ssl_config.as_ref() else {
            return Ok(());
        };

        let tls = out.tls.get_or_insert_with(UpstreamTlsContext::default);
        if ssl.sni.is_some() {
            tls.sni = ssl.sni.clone();
        }

        let Some(reference) = ssl.secret_ref.as_deref() else {
            return Ok(());
        };
        let secret = params
            .secrets
            .get(reference)
            .ok_or_else(|| Error::MissingSecret {
                reference: reference.to_string(),
            })?;

        tls.ca_chain = secret.get(CA_CHAIN_KEY).map(str::to_string);
        tls.cert_chain = secret.get(CERT_CHAIN_KEY).map(str::to_string);
        tls.private_key = secret.get(PRIVATE_KEY_KEY).map(str::to_string);
        if tls.cert_chain.is_some() && tls.private_key.is_none() {
            return Err(Error::MissingSecretKey {
                reference: reference.to_string(),
                key: PRIVATE_KEY_KEY.to_string(),
            }
            .into());
        }
        Ok(())
    }
}
