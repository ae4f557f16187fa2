//! Configuration management for pave-ingest

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::pave::header::PAVE_DEFAULT_HEADER_LEN;
use crate::pave::AssemblerConfig;
use crate::publish::OutputConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Stream decoding configuration
    #[serde(default)]
    pub stream: StreamConfig,

    /// Vehicles to ingest from
    #[serde(default = "default_drones")]
    pub drones: Vec<DroneConfig>,

    /// Recording configuration
    #[serde(default)]
    pub output: RecordingConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Working buffer capacity in bytes; must hold the largest frame
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Connect and receive timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Consecutive failed reads before reconnecting with a pause
    #[serde(default = "default_error_threshold")]
    pub error_threshold: u32,

    /// Frames buffered between the decoders and the publisher
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DroneConfig {
    /// Name used in logs and recording file names
    pub name: String,

    /// Vehicle IP address
    #[serde(default = "default_drone_ip")]
    pub ip: String,

    /// Video port
    #[serde(default = "default_drone_port")]
    pub port: u16,

    /// Whether to stream from this vehicle
    #[serde(default = "default_active")]
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RecordingConfig {
    /// Directory for raw stream recordings
    pub directory: Option<PathBuf>,

    /// Write a JSON-lines frame index next to each recording
    #[serde(default)]
    pub metadata: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            timeout_ms: default_timeout_ms(),
            error_threshold: default_error_threshold(),
            queue_depth: default_queue_depth(),
        }
    }
}

impl Default for DroneConfig {
    fn default() -> Self {
        Self {
            name: default_drone_name(),
            ip: default_drone_ip(),
            port: default_drone_port(),
            active: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stream: StreamConfig::default(),
            drones: default_drones(),
            output: RecordingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl StreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn assembler(&self) -> AssemblerConfig {
        AssemblerConfig {
            buffer_size: self.buffer_size,
            error_threshold: self.error_threshold,
        }
    }
}

impl DroneConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, Box<dyn std::error::Error>> {
        let ip: IpAddr = self
            .ip
            .trim()
            .parse()
            .map_err(|_| format!("Drone '{}' has an invalid IP address: {}", self.name, self.ip))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

impl RecordingConfig {
    pub fn output(&self) -> OutputConfig {
        OutputConfig {
            directory: self.directory.clone(),
            metadata: self.metadata,
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn load(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Drones that should be streamed
    pub fn active_drones(&self) -> impl Iterator<Item = &DroneConfig> {
        self.drones.iter().filter(|d| d.active)
    }

    /// Create or update the named drone and mark it active
    pub fn drone_mut(&mut self, name: &str) -> &mut DroneConfig {
        let index = match self.drones.iter().position(|d| d.name == name) {
            Some(index) => index,
            None => {
                self.drones.push(DroneConfig {
                    name: name.to_string(),
                    ..DroneConfig::default()
                });
                self.drones.len() - 1
            }
        };
        let drone = &mut self.drones[index];
        drone.active = true;
        drone
    }

    /// Apply a command line drone address.
    ///
    /// Only an IP creates or activates the drone; a port alone updates an
    /// existing entry. Returns false when the override had no drone to apply to.
    pub fn override_drone(&mut self, name: &str, ip: Option<String>, port: Option<u16>) -> bool {
        match ip {
            Some(ip) => {
                let drone = self.drone_mut(name);
                drone.ip = ip;
                if let Some(port) = port {
                    drone.port = port;
                }
                true
            }
            None => match (port, self.drones.iter_mut().find(|d| d.name == name)) {
                (Some(port), Some(drone)) => {
                    drone.port = port;
                    true
                }
                (Some(_), None) => false,
                (None, _) => true,
            },
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.stream.buffer_size < PAVE_DEFAULT_HEADER_LEN as usize {
            return Err(format!(
                "Stream buffer_size must hold at least one {}-byte header",
                PAVE_DEFAULT_HEADER_LEN
            )
            .into());
        }

        if self.stream.timeout_ms == 0 {
            return Err("Stream timeout must be non-zero".into());
        }

        if self.stream.queue_depth == 0 {
            return Err("Stream queue depth must be non-zero".into());
        }

        let mut names = HashSet::new();
        for drone in &self.drones {
            if drone.name.trim().is_empty() {
                return Err("Drone name must not be empty".into());
            }
            if drone.name.contains(|c: char| c == '/' || c == '\\') {
                return Err(format!("Drone name must not contain path separators: {}", drone.name).into());
            }
            if !names.insert(drone.name.as_str()) {
                return Err(format!("Duplicate drone name: {}", drone.name).into());
            }
            if drone.port == 0 {
                return Err(format!("Drone '{}' port must be non-zero", drone.name).into());
            }
            drone.socket_addr()?;
        }

        if self.active_drones().next().is_none() {
            return Err("No active drones configured".into());
        }

        Ok(())
    }
}


fn default_buffer_size() -> usize {
    65536
}

fn default_timeout_ms() -> u64 {
    1000
}

fn default_error_threshold() -> u32 {
    5
}

fn default_queue_depth() -> usize {
    64
}

fn default_drone_name() -> String {
    "drone".to_string()
}

fn default_drone_ip() -> String {
    "192.168.1.1".to_string()
}

fn default_drone_port() -> u16 {
    5555
}

fn default_active() -> bool {
    true
}

fn default_drones() -> Vec<DroneConfig> {
    vec![DroneConfig::default()]
}
