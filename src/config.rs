//! Server configuration.
//!
//! Everything tunable is read from environment variables (with `.env` support
//! via `dotenv`) and falls back to the defaults the game was designed around.

use std::time::Duration;

/// Runtime configuration for the server process.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address the HTTP/WebSocket listener binds to.
    pub bind_addr: String,
    /// Path to the UCI engine binary.
    pub stockfish_path: String,
    /// Fixed search depth passed to `go depth`.
    pub engine_depth: u32,
    /// Watchdog for a single engine query; on expiry the first candidate wins.
    pub engine_timeout: Duration,
    /// Starting clock per side, in seconds.
    pub initial_clock_secs: u64,
    /// At or below this many seconds, a committed move earns the bonus.
    pub low_time_threshold_secs: u64,
    /// Seconds credited to a low-time side on commit.
    pub low_time_bonus_secs: u64,
    /// How long a disconnected session survives before removal.
    pub disconnect_grace: Duration,
    /// Lifetime of every vote.
    pub vote_duration: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:4000".to_string(),
            stockfish_path: "stockfish".to_string(),
            engine_depth: 15,
            engine_timeout: Duration::from_secs(30),
            initial_clock_secs: 600,
            low_time_threshold_secs: 60,
            low_time_bonus_secs: 10,
            disconnect_grace: Duration::from_secs(20),
            vote_duration: Duration::from_secs(20),
        }
    }
}

impl ServerConfig {
    /// Build a configuration from the process environment.
    ///
    /// Unset or unparseable variables fall back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: env_or("TEAMCHESS_BIND", defaults.bind_addr),
            stockfish_path: env_or("STOCKFISH_PATH", defaults.stockfish_path),
            engine_depth: env_parse("TEAMCHESS_ENGINE_DEPTH", defaults.engine_depth),
            engine_timeout: Duration::from_secs(env_parse(
                "TEAMCHESS_ENGINE_TIMEOUT_SECS",
                defaults.engine_timeout.as_secs(),
            )),
            initial_clock_secs: env_parse("TEAMCHESS_CLOCK_SECS", defaults.initial_clock_secs),
            low_time_threshold_secs: defaults.low_time_threshold_secs,
            low_time_bonus_secs: defaults.low_time_bonus_secs,
            disconnect_grace: Duration::from_secs(env_parse(
                "TEAMCHESS_GRACE_SECS",
                defaults.disconnect_grace.as_secs(),
            )),
            vote_duration: Duration::from_secs(env_parse(
                "TEAMCHESS_VOTE_SECS",
                defaults.vote_duration.as_secs(),
            )),
        }
    }
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
