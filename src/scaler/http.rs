//! # Scaler HTTP Clients
//!
//! Per-scaler reqwest client construction. Every client is bounded by the
//! global HTTP timeout (a trigger may tighten it, never widen it) and
//! carries the TLS posture declared in trigger metadata and auth params:
//! `unsafeSsl`, a custom `ca` bundle, and an optional `cert`/`key` client
//! identity.

use std::time::Duration;

use reqwest::{Certificate, Client, Identity, StatusCode};

use crate::scaler::config::ScalerConfig;
use crate::scaler::error::ScalerError;

/// TLS and timeout settings bound from trigger configuration
#[derive(Clone)]
pub struct HttpClientConfig {
    /// Per-request ceiling; `min(trigger timeout, global timeout)`
    pub timeout: Duration,
    /// Skip server certificate verification
    pub unsafe_ssl: bool,
    /// PEM bundle appended to the trust store
    pub ca: Option<String>,
    /// PEM client certificate, paired with `key`
    pub cert: Option<String>,
    /// PEM client key, paired with `cert`
    pub key: Option<String>,
}

impl std::fmt::Debug for HttpClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material stays out of logs.
        f.debug_struct("HttpClientConfig")
            .field("timeout", &self.timeout)
            .field("unsafe_ssl", &self.unsafe_ssl)
            .field("ca", &self.ca.as_deref().map(|_| "<pem>"))
            .finish_non_exhaustive()
    }
}

impl HttpClientConfig {
    /// Bind client settings from a scaler config. The optional `timeout`
    /// metadata field (duration string, bare number = seconds) can only
    /// tighten the global ceiling.
    ///
    /// # Errors
    ///
    /// Returns [`ScalerError::BadValue`] for malformed fields and
    /// [`ScalerError::ConflictingConfig`] when only one of `cert`/`key` is
    /// provided.
    pub fn from_scaler_config(config: &ScalerConfig) -> Result<Self, ScalerError> {
        let unsafe_ssl: bool = config.param("unsafeSsl").default("false").get()?;

        let timeout = match config.param("timeout").get_opt::<String>()? {
            Some(raw) => {
                let requested = crate::scaler::binder::parse_duration("timeout", &raw, true)?;
                if requested.is_zero() {
                    return Err(ScalerError::bad_value("timeout", "must be positive"));
                }
                requested.min(config.global_http_timeout)
            }
            None => config.global_http_timeout,
        };

        let cert = config.auth_params.get("cert").filter(|v| !v.is_empty()).cloned();
        let key = config.auth_params.get("key").filter(|v| !v.is_empty()).cloned();
        if cert.is_some() != key.is_some() {
            return Err(ScalerError::conflicting(
                "cert and key must be provided together",
            ));
        }

        Ok(Self {
            timeout,
            unsafe_ssl,
            ca: config.auth_params.get("ca").filter(|v| !v.is_empty()).cloned(),
            cert,
            key,
        })
    }

    /// Build the reqwest client for these settings
    ///
    /// # Errors
    ///
    /// Returns [`ScalerError::BadValue`] for unparseable PEM material and
    /// [`ScalerError::Internal`] when client construction fails.
    pub fn build(&self) -> Result<Client, ScalerError> {
        let mut builder = Client::builder().timeout(self.timeout);

        if self.unsafe_ssl {
            builder = builder.danger_accept_invalid_certs(true);
        }

        if let Some(ca) = &self.ca {
            let certificate = Certificate::from_pem(ca.as_bytes())
                .map_err(|e| ScalerError::bad_value("ca", format!("invalid PEM bundle: {e}")))?;
            builder = builder.add_root_certificate(certificate);
        }

        if let (Some(cert), Some(key)) = (&self.cert, &self.key) {
            let mut pem = cert.clone().into_bytes();
            pem.extend_from_slice(b"\n");
            pem.extend_from_slice(key.as_bytes());
            let identity = Identity::from_pem(&pem)
                .map_err(|e| ScalerError::bad_value("cert", format!("invalid client identity: {e}")))?;
            builder = builder.identity(identity);
        }

        builder
            .build()
            .map_err(|e| ScalerError::Internal(format!("failed to build HTTP client: {e}")))
    }
}

/// Build the per-scaler client in one step; the factory calls this before
/// handing control to the type-specific constructor
///
/// # Errors
///
/// Propagates binding and construction errors from [`HttpClientConfig`].
pub fn build_http_client(config: &ScalerConfig) -> Result<Client, ScalerError> {
    HttpClientConfig::from_scaler_config(config)?.build()
}

/// Map a reqwest error onto the scaler error taxonomy
#[must_use]
pub fn map_request_error(backend: &str, err: reqwest::Error) -> ScalerError {
    if err.is_timeout() {
        return ScalerError::Cancelled;
    }
    ScalerError::transport(backend, err)
}

/// Map a non-success HTTP status onto the scaler error taxonomy:
/// 401/403 are auth failures, everything else is transport
#[must_use]
pub fn map_status_error(backend: &str, status: StatusCode) -> ScalerError {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return ScalerError::Auth {
            backend: backend.to_string(),
            reason: format!("HTTP {status}"),
        };
    }
    ScalerError::Transport {
        backend: backend.to_string(),
        source: format!("HTTP {status}").into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use crate::scaler::config::PodIdentity;

    fn config() -> ScalerConfig {
        ScalerConfig {
            trigger_type: "test".to_string(),
            trigger_index: 0,
            scalable_object_name: "orders-api".to_string(),
            scalable_object_namespace: "default".to_string(),
            scalable_object_type: "ScaledObject".to_string(),
            trigger_metadata: BTreeMap::new(),
            auth_params: BTreeMap::new(),
            resolved_env: BTreeMap::new(),
            pod_identity: PodIdentity::default(),
            global_http_timeout: Duration::from_secs(3),
            metric_type: None,
            as_metric_source: false,
            use_cached_metrics: false,
            trigger_unique_key: "test-key".to_string(),
        }
    }

    #[test]
    fn test_defaults_inherit_global_timeout() {
        let settings = HttpClientConfig::from_scaler_config(&config()).unwrap();
        assert_eq!(settings.timeout, Duration::from_secs(3));
        assert!(!settings.unsafe_ssl);
        assert!(settings.ca.is_none());
    }

    #[test]
    fn test_trigger_timeout_tightens_but_never_widens() {
        let mut cfg = config();
        cfg.trigger_metadata
            .insert("timeout".to_string(), "500ms".to_string());
        let settings = HttpClientConfig::from_scaler_config(&cfg).unwrap();
        assert_eq!(settings.timeout, Duration::from_millis(500));

        cfg.trigger_metadata
            .insert("timeout".to_string(), "30s".to_string());
        let settings = HttpClientConfig::from_scaler_config(&cfg).unwrap();
        assert_eq!(settings.timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut cfg = config();
        cfg.trigger_metadata
            .insert("timeout".to_string(), "0".to_string());
        assert!(HttpClientConfig::from_scaler_config(&cfg).is_err());
    }

    #[test]
    fn test_cert_without_key_conflicts() {
        let mut cfg = config();
        cfg.auth_params
            .insert("cert".to_string(), "---cert---".to_string());
        let err = HttpClientConfig::from_scaler_config(&cfg).unwrap_err();
        assert_eq!(err.kind(), "conflicting-config");
    }

    #[test]
    fn test_unsafe_ssl_binds() {
        let mut cfg = config();
        cfg.trigger_metadata
            .insert("unsafeSsl".to_string(), "true".to_string());
        let settings = HttpClientConfig::from_scaler_config(&cfg).unwrap();
        assert!(settings.unsafe_ssl);
        assert!(settings.build().is_ok());
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(
            map_status_error("backend", StatusCode::UNAUTHORIZED).kind(),
            "auth"
        );
        assert_eq!(
            map_status_error("backend", StatusCode::INTERNAL_SERVER_ERROR).kind(),
            "transport"
        );
    }
}
