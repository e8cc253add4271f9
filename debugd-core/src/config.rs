use crate::error::DebugdError;
use figment::{
    Figment,
    providers::{Env, Serialized},
};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Port used when neither the command line nor `PORT` names one.
pub const DEFAULT_PORT: u16 = 9876;

/// Number of access records retained for `/logs`.
pub const DEFAULT_LOG_CAPACITY: usize = 100;

/// Server settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Interface to bind. All interfaces by default.
    #[serde(default = "default_bind")]
    pub bind: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Number of worker threads. 0 = number of CPU cores.
    #[serde(default)]
    pub workers: usize,
    /// Capacity of the in-memory access log ring.
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,
}

/// Values given on the command line. They win over the environment.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Overrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
}

// ── Defaults ──────────────────────────────────────────────────

fn default_bind() -> IpAddr { IpAddr::V4(Ipv4Addr::UNSPECIFIED) }
fn default_port() -> u16 { DEFAULT_PORT }
fn default_log_capacity() -> usize { DEFAULT_LOG_CAPACITY }

// ── Impls ─────────────────────────────────────────────────────

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            workers: 0,
            log_capacity: default_log_capacity(),
        }
    }
}

impl ServerConfig {
    /// Resolve configuration: defaults, then `PORT`, then `DEBUGD_*`
    /// overrides, then the command line.
    pub fn load(overrides: &Overrides) -> Result<Self, DebugdError> {
        let config: ServerConfig = Figment::from(Serialized::defaults(ServerConfig::default()))
            .merge(Env::raw().only(&["PORT"]))
            .merge(Env::prefixed("DEBUGD_"))
            .merge(Serialized::defaults(overrides))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), DebugdError> {
        if self.log_capacity == 0 {
            return Err(DebugdError::ConfigError(
                "log_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Address the listener binds to.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    /// Effective worker count (0 → available CPUs).
    pub fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            self.workers
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn load(overrides: Overrides) -> figment::error::Result<ServerConfig> {
        ServerConfig::load(&overrides).map_err(|e| e.to_string().into())
    }

    // ── Default values ────────────────────────────────────────────

    #[test]
    fn default_server_config_has_expected_values() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.bind, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert_eq!(cfg.port, 9876);
        assert_eq!(cfg.workers, 0);
        assert_eq!(cfg.log_capacity, 100);
        assert_eq!(cfg.listen_addr().to_string(), "0.0.0.0:9876");
    }

    // ── Port precedence ───────────────────────────────────────────

    #[test]
    fn load_without_env_uses_default_port() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            let cfg = load(Overrides::default())?;
            assert_eq!(cfg.port, DEFAULT_PORT);
            Ok(())
        });
    }

    #[test]
    fn port_env_var_overrides_default() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            jail.set_env("PORT", "29876");
            let cfg = load(Overrides::default())?;
            assert_eq!(cfg.port, 29876);
            Ok(())
        });
    }

    #[test]
    fn cli_port_overrides_env_var() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            jail.set_env("PORT", "29876");
            let cfg = load(Overrides {
                port: Some(19876),
                workers: None,
            })?;
            assert_eq!(cfg.port, 19876);
            Ok(())
        });
    }

    #[test]
    fn unparsable_port_env_var_is_an_error() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            jail.set_env("PORT", "not-a-port");
            assert!(ServerConfig::load(&Overrides::default()).is_err());
            Ok(())
        });
    }

    // ── Prefixed overrides ────────────────────────────────────────

    #[test]
    fn prefixed_env_vars_override_defaults() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            jail.set_env("DEBUGD_WORKERS", "3");
            jail.set_env("DEBUGD_LOG_CAPACITY", "10");
            jail.set_env("DEBUGD_BIND", "127.0.0.1");
            let cfg = load(Overrides::default())?;
            assert_eq!(cfg.workers, 3);
            assert_eq!(cfg.log_capacity, 10);
            assert_eq!(cfg.bind, IpAddr::V4(Ipv4Addr::LOCALHOST));
            Ok(())
        });
    }

    #[test]
    fn cli_workers_override_env_workers() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            jail.set_env("DEBUGD_WORKERS", "3");
            let cfg = load(Overrides {
                port: None,
                workers: Some(1),
            })?;
            assert_eq!(cfg.workers, 1);
            Ok(())
        });
    }

    #[test]
    fn zero_log_capacity_is_rejected() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            jail.set_env("DEBUGD_LOG_CAPACITY", "0");
            let err = ServerConfig::load(&Overrides::default()).unwrap_err();
            assert!(err.to_string().contains("log_capacity"));
            Ok(())
        });
    }

    // ── effective_workers() ───────────────────────────────────────

    #[test]
    fn effective_workers_returns_explicit_value_when_nonzero() {
        let cfg = ServerConfig {
            workers: 4,
            ..ServerConfig::default()
        };
        assert_eq!(cfg.effective_workers(), 4);
    }

    #[test]
    fn effective_workers_with_zero_returns_at_least_one() {
        let cfg = ServerConfig::default();
        let workers = cfg.effective_workers();
        assert!(workers >= 1, "effective_workers must be at least 1, got {workers}");
    }
}
