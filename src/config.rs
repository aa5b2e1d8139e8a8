//! Process configuration.
//!
//! Everything is read once at startup from flags or their environment
//! fallbacks and never changes afterwards.

use std::path::PathBuf;

use clap::Parser;

/// Default path to webhook TLS certificate
pub const WEBHOOK_CERT_PATH: &str = "/etc/webhook/certs/tls.crt";
/// Default path to webhook TLS private key
pub const WEBHOOK_KEY_PATH: &str = "/etc/webhook/certs/tls.key";
/// Default webhook server port
pub const WEBHOOK_PORT: u16 = 443;
/// Default health/metrics server port
pub const HEALTH_PORT: u16 = 8080;

/// Command-line configuration for the admission webhook
#[derive(Parser, Debug, Clone)]
#[command(name = "admission-registry", version, about, long_about = None)]
pub struct Config {
    /// Port the TLS webhook server listens on
    #[arg(long, env = "WEBHOOK_PORT", default_value_t = WEBHOOK_PORT)]
    pub port: u16,

    /// x509 certificate file (PEM)
    #[arg(long, alias = "tlsCertFile", env = "TLS_CERT_FILE", default_value = WEBHOOK_CERT_PATH)]
    pub tls_cert_file: PathBuf,

    /// x509 private key file (PEM)
    #[arg(long, alias = "tlsKeyFile", env = "TLS_KEY_FILE", default_value = WEBHOOK_KEY_PATH)]
    pub tls_key_file: PathBuf,

    /// Comma separated registry prefixes that pod images may come from
    #[arg(long, env = "WHITELIST_REGISTRIES", value_delimiter = ',')]
    pub whitelist_registries: Vec<String>,

    /// Port of the plain HTTP health and metrics server
    #[arg(long, env = "HEALTH_PORT", default_value_t = HEALTH_PORT)]
    pub health_port: u16,
}

impl Config {
    /// Build the immutable registry whitelist from the parsed flags
    pub fn whitelist(&self) -> WhitelistConfig {
        WhitelistConfig::new(self.whitelist_registries.iter().map(String::as_str))
    }
}

/// Ordered registry prefixes trusted by the validating webhook.
///
/// Entries are trimmed and empty entries are dropped, so an unset
/// `WHITELIST_REGISTRIES` trusts nothing rather than everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WhitelistConfig {
    registries: Vec<String>,
}

impl WhitelistConfig {
    pub fn new<I, S>(registries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let registries = registries
            .into_iter()
            .map(|r| r.as_ref().trim().to_string())
            .filter(|r| !r.is_empty())
            .collect();
        Self { registries }
    }

    /// Registry prefixes in configuration order
    pub fn registries(&self) -> &[String] {
        &self.registries
    }

    pub fn is_empty(&self) -> bool {
        self.registries.is_empty()
    }

    /// Whether some whitelisted registry is a prefix of `image` (case-sensitive)
    pub fn permits(&self, image: &str) -> bool {
        self.registries
            .iter()
            .any(|registry| image.starts_with(registry.as_str()))
    }
}
