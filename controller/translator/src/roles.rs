use meridian_controller_core::{Config, Role, RoleListener, DEFAULT_ROLE_NAME};
use tracing::debug;

pub const HTTP_LISTENER: &str = "http";
pub const HTTPS_LISTENER: &str = "https";

/// Where the default role's listeners bind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoleDefaults {
    pub bind_address: String,
    pub http_port: u16,
    pub https_port: u16,
}

impl Default for RoleDefaults {
    fn default() -> Self {
        Self {
            bind_address: "::".to_string(),
            http_port: 8080,
            https_port: 8443,
        }
    }
}

/// Returns the roles to translate for `config`.
///
/// The default role is always present and always has exactly one plain and one
/// secure listener; a stored copy with any other shape is rebuilt from
/// `defaults`. Every virtual host is assigned to the default role: plain hosts
/// on its plain listener and hosts with TLS on its secure one.
pub fn resolve_roles(config: &Config, defaults: &RoleDefaults) -> Vec<Role> {
    let mut roles = config
        .roles
        .iter()
        .filter(|r| r.name != DEFAULT_ROLE_NAME)
        .cloned()
        .collect::<Vec<_>>();

    let mut gateway = match config.role(DEFAULT_ROLE_NAME) {
        Some(role) if is_well_formed(role) => role.clone(),
        Some(role) => {
            debug!(listeners = role.listeners.len(), "Rebuilding malformed default role");
            default_role(defaults)
        }
        None => default_role(defaults),
    };

    for listener in &mut gateway.listeners {
        listener.virtual_hosts = config
            .virtual_hosts
            .iter()
            .filter(|vh| vh.is_ssl() == listener.ssl)
            .map(|vh| vh.name.clone())
            .collect();
    }

    roles.push(gateway);
    roles.sort_by(|a, b| a.name.cmp(&b.name));
    roles
}

fn is_well_formed(role: &Role) -> bool {
    matches!(
        role.listeners.as_slice(),
        [a, b] if a.ssl != b.ssl
    )
}

fn default_role(defaults: &RoleDefaults) -> Role {
    Role {
        name: DEFAULT_ROLE_NAME.to_string(),
        listeners: vec![
            RoleListener {
                name: HTTP_LISTENER.to_string(),
                bind_address: defaults.bind_address.clone(),
                bind_port: defaults.http_port,
                ssl: false,
                virtual_hosts: vec![],
            },
            RoleListener {
                name: HTTPS_LISTENER.to_string(),
                bind_address: defaults.bind_address.clone(),
                bind_port: defaults.https_port,
                ssl: true,
                virtual_hosts: vec![],
            },
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_controller_core::{SslConfig, VirtualHost};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn vhost(name: &str, ssl: bool) -> VirtualHost {
        VirtualHost {
            name: name.to_string(),
            ssl_config: ssl.then(|| SslConfig {
                secret_ref: format!("{name}-tls"),
            }),
            ..Default::default()
        }
    }

    fn listener(name: &str, ssl: bool) -> RoleListener {
        RoleListener {
            name: name.to_string(),
            bind_address: "0.0.0.0".to_string(),
            bind_port: 9000,
            ssl,
            virtual_hosts: vec![],
        }
    }

    #[test]
    fn empty_config_gets_default_role() {
        let roles = resolve_roles(&Config::default(), &RoleDefaults::default());
        assert_eq!(roles.len(), 1);
        assert_eq!(roles[0].name, DEFAULT_ROLE_NAME);
        assert_eq!(roles[0].listeners.len(), 2);
        assert_eq!(roles[0], default_role(&RoleDefaults::default()));
    }

    #[rstest]
    #[case(vec![listener("only", false)])]
    #[case(vec![listener("a", false), listener("b", false)])]
    #[case(vec![listener("a", false), listener("b", true), listener("c", true)])]
    fn malformed_default_role_is_rebuilt(#[case] listeners: Vec<RoleListener>) {
        let stored = Role {
            name: DEFAULT_ROLE_NAME.to_string(),
            listeners,
        };
        let config = Config::new(vec![], vec![], vec![stored]);
        let roles = resolve_roles(&config, &RoleDefaults::default());
        assert_eq!(roles, vec![default_role(&RoleDefaults::default())]);
    }

    #[test]
    fn well_formed_default_role_is_kept_and_hosts_reassigned() {
        let stored = Role {
            name: DEFAULT_ROLE_NAME.to_string(),
            listeners: vec![
                RoleListener {
                    virtual_hosts: vec!["stale".to_string()],
                    ..listener("plain", false)
                },
                listener("secure", true),
            ],
        };
        let tenant = Role {
            name: "tenant".to_string(),
            listeners: vec![listener("t", false)],
        };
        let config = Config::new(
            vec![],
            vec![vhost("web", false), vhost("shop", true), vhost("api", false)],
            vec![tenant.clone(), stored],
        );

        let roles = resolve_roles(&config, &RoleDefaults::default());
        assert_eq!(roles.len(), 2);
        assert_eq!(roles[1], tenant);

        let gateway = &roles[0];
        assert_eq!(gateway.listeners[0].name, "plain");
        assert_eq!(gateway.listeners[0].virtual_hosts, vec!["api", "web"]);
        assert_eq!(gateway.listeners[1].name, "secure");
        assert_eq!(gateway.listeners[1].virtual_hosts, vec!["shop"]);
    }
}
