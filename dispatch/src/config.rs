use std::time::Duration;

use anyhow::Result;

use crate::env_utils::{parse_bool_env, parse_u64_env};

const REQUEST_TIMEOUT_MS_DEFAULT: u64 = 30_000;
const INIT_TIMEOUT_MS_DEFAULT: u64 = 5_000;
const WORKER_ENABLED_DEFAULT: bool = true;

/// Environment-driven settings for the dispatch client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    pub request_timeout_ms: u64,
    pub init_timeout_ms: u64,
    pub worker_enabled: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: REQUEST_TIMEOUT_MS_DEFAULT,
            init_timeout_ms: INIT_TIMEOUT_MS_DEFAULT,
            worker_enabled: WORKER_ENABLED_DEFAULT,
        }
    }
}

impl DispatchConfig {
    pub fn from_env() -> Result<Self> {
        let request_timeout_ms =
            parse_u64_env("SIMKERNEL_REQUEST_TIMEOUT_MS", REQUEST_TIMEOUT_MS_DEFAULT)?;
        let init_timeout_ms = parse_u64_env("SIMKERNEL_INIT_TIMEOUT_MS", INIT_TIMEOUT_MS_DEFAULT)?;
        let worker_enabled = parse_bool_env("SIMKERNEL_WORKER_ENABLED", WORKER_ENABLED_DEFAULT)?;

        if request_timeout_ms == 0 {
            anyhow::bail!("SIMKERNEL_REQUEST_TIMEOUT_MS must be > 0");
        }
        if init_timeout_ms == 0 {
            anyhow::bail!("SIMKERNEL_INIT_TIMEOUT_MS must be > 0");
        }

        Ok(Self {
            request_timeout_ms,
            init_timeout_ms,
            worker_enabled,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.init_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    const CONFIG_KEYS: &[&str] = &[
        "SIMKERNEL_REQUEST_TIMEOUT_MS",
        "SIMKERNEL_INIT_TIMEOUT_MS",
        "SIMKERNEL_WORKER_ENABLED",
    ];

    fn env_lock() -> &'static Mutex<()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
    }

    struct EnvGuard {
        saved: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn capture(keys: &[&str]) -> Self {
            let saved = keys
                .iter()
                .map(|key| ((*key).to_string(), env::var(key).ok()))
                .collect();
            Self { saved }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in &self.saved {
                if let Some(value) = value {
                    env::set_var(key, value);
                } else {
                    env::remove_var(key);
                }
            }
        }
    }

    fn with_env<R>(pairs: &[(&str, &str)], f: impl FnOnce() -> R) -> R {
        let _lock = env_lock().lock().expect("env test mutex must be lockable");
        let _guard = EnvGuard::capture(CONFIG_KEYS);

        for key in CONFIG_KEYS {
            env::remove_var(key);
        }
        for (key, value) in pairs {
            env::set_var(key, value);
        }

        f()
    }

    #[test]
    fn from_env_uses_expected_defaults() {
        let config = with_env(&[], || {
            DispatchConfig::from_env().expect("default config must parse")
        });
        assert_eq!(config, DispatchConfig::default());
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.init_timeout(), Duration::from_secs(5));
        assert!(config.worker_enabled);
    }

    #[test]
    fn from_env_applies_overrides() {
        let config = with_env(
            &[
                ("SIMKERNEL_REQUEST_TIMEOUT_MS", "250"),
                ("SIMKERNEL_INIT_TIMEOUT_MS", "40"),
                ("SIMKERNEL_WORKER_ENABLED", "off"),
            ],
            || DispatchConfig::from_env().expect("config must parse"),
        );
        assert_eq!(config.request_timeout_ms, 250);
        assert_eq!(config.init_timeout_ms, 40);
        assert!(!config.worker_enabled);
    }

    #[test]
    fn from_env_rejects_invalid_values() {
        let error = with_env(&[("SIMKERNEL_REQUEST_TIMEOUT_MS", "0")], || {
            DispatchConfig::from_env().expect_err("zero timeout must fail")
        });
        assert!(error.to_string().contains("SIMKERNEL_REQUEST_TIMEOUT_MS"));

        let error = with_env(&[("SIMKERNEL_WORKER_ENABLED", "maybe")], || {
            DispatchConfig::from_env().expect_err("bad bool must fail")
        });
        assert!(error.to_string().contains("must be a boolean"));

        let error = with_env(&[("SIMKERNEL_INIT_TIMEOUT_MS", "soon")], || {
            DispatchConfig::from_env().expect_err("bad integer must fail")
        });
        assert!(error.to_string().contains("SIMKERNEL_INIT_TIMEOUT_MS"));
    }
}
