use serde::Deserialize;
use serde::Serialize;

use super::scan::invalid;
use crate::Result;

/// Prometheus `/metrics` + `/health` exporter settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ExporterConfig {
    #[serde(default = "default_exporter_enabled")]
    pub enabled: bool,

    #[serde(default = "default_exporter_port")]
    pub port: u16,
}
impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            enabled: default_exporter_enabled(),
            port: default_exporter_port(),
        }
    }
}
impl ExporterConfig {
    /// Validates exporter configuration
    /// # Errors
    /// Returns `Error::Config` when:
    /// - The exporter is enabled with port 0
    /// - The port is a privileged port
    pub fn validate(&self) -> Result<()> {
        if self.enabled {
            if self.port == 0 {
                return Err(invalid("exporter.port cannot be 0 when enabled".into()));
            }

            if self.port < 1024 {
                return Err(invalid(format!(
                    "exporter.port {} is a privileged port (requires root)",
                    self.port
                )));
            }
        } else if self.port != default_exporter_port() {
            tracing::warn!(
                "exporter.port configured to {} but the exporter is disabled",
                self.port
            );
        }

        Ok(())
    }
}
fn default_exporter_enabled() -> bool {
    false
}

fn default_exporter_port() -> u16 {
    9187
}
