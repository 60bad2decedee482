//! Load-test configuration
//!
//! Configuration is loaded from environment variables. Unparseable numeric
//! values fall back to defaults; the stage and threshold expressions are kept
//! raw and validated when the load profile is built.

use clap::ValueEnum;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::fixture::{DEFAULT_RANK_IDS, LiteralDialect};
use crate::orchestrator::OrchestratorConfig;
use crate::profile::{LoadProfile, LoadStage, ProfileError, Threshold, parse_duration};

/// Main configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Service under test
    pub target: TargetConfig,

    /// Load shape and thresholds
    pub load: LoadConfig,

    /// Fixture generation
    pub fixture: FixtureConfig,

    /// Prometheus exposition dump written at run end (optional)
    pub metrics_export_path: Option<PathBuf>,
}

/// Service-under-test configuration
#[derive(Debug, Clone)]
pub struct TargetConfig {
    /// Base URL requests are resolved against
    pub base_url: String,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Scheme prefixed to the token in the Authorization header
    pub auth_scheme: String,
    /// JSON credential pool; the fixture batch is used when unset
    pub user_pool_path: Option<PathBuf>,
}

/// Which load shape to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ProfileMode {
    Fixed,
    #[default]
    Staged,
}

impl std::str::FromStr for ProfileMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fixed" => Ok(ProfileMode::Fixed),
            "staged" => Ok(ProfileMode::Staged),
            other => Err(format!("unknown load profile '{}'", other)),
        }
    }
}

/// Load shape configuration
#[derive(Debug, Clone)]
pub struct LoadConfig {
    pub mode: ProfileMode,
    /// Fixed shape: total iterations
    pub iterations: u64,
    /// Fixed shape: concurrent virtual users
    pub virtual_users: usize,
    /// Staged shape, e.g. `30s:10,30s:3`
    pub stages: String,
    /// Threshold table, e.g. `p95<600ms,checks>0.99`
    pub thresholds: String,
    pub grace_period: Duration,
    pub pacing: Duration,
    /// Hard stop for the whole run; unbounded when unset
    pub max_duration: Option<Duration>,
    pub count_diagnostics: bool,
}

/// Fixture generator configuration
#[derive(Debug, Clone)]
pub struct FixtureConfig {
    pub users: usize,
    pub post_floor: usize,
    pub seed: u64,
    pub rank_ids: Vec<String>,
    pub template_path: PathBuf,
    pub output_path: PathBuf,
    pub dialect: LiteralDialect,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            request_timeout: Duration::from_secs(30),
            auth_scheme: "Token".to_string(),
            user_pool_path: None,
        }
    }
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            mode: ProfileMode::Staged,
            iterations: 10,
            virtual_users: 1,
            stages: "30s:10".to_string(),
            thresholds: "p95<600ms,checks>0.99".to_string(),
            grace_period: Duration::from_secs(30),
            pacing: Duration::ZERO,
            max_duration: None,
            count_diagnostics: false,
        }
    }
}

impl Default for FixtureConfig {
    fn default() -> Self {
        Self {
            users: 100,
            post_floor: 5,
            seed: 2018,
            rank_ids: DEFAULT_RANK_IDS.iter().map(|s| s.to_string()).collect(),
            template_path: PathBuf::from(concat!(
                env!("CARGO_MANIFEST_DIR"),
                "/templates/seed_migration.py.template"
            )),
            output_path: PathBuf::from("seed_migration.py"),
            dialect: LiteralDialect::python(),
        }
    }
}

fn parse_flag(val: &str) -> bool {
    val.to_lowercase() == "true" || val == "1"
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // Target config
        if let Ok(url) = env::var("TARGET_BASE_URL")
            && !url.is_empty()
        {
            config.target.base_url = url;
        }
        if let Ok(val) = env::var("REQUEST_TIMEOUT_SECS")
            && let Ok(secs) = val.parse::<u64>()
        {
            config.target.request_timeout = Duration::from_secs(secs);
        }
        if let Ok(scheme) = env::var("AUTH_SCHEME")
            && !scheme.is_empty()
        {
            config.target.auth_scheme = scheme;
        }
        if let Ok(path) = env::var("USER_POOL_PATH")
            && !path.is_empty()
        {
            config.target.user_pool_path = Some(PathBuf::from(path));
        }

        // Load config
        if let Ok(val) = env::var("LOAD_PROFILE")
            && let Ok(mode) = val.parse()
        {
            config.load.mode = mode;
        }
        if let Ok(val) = env::var("ITERATIONS")
            && let Ok(v) = val.parse()
        {
            config.load.iterations = v;
        }
        if let Ok(val) = env::var("VUS")
            && let Ok(v) = val.parse()
        {
            config.load.virtual_users = v;
        }
        if let Ok(val) = env::var("STAGES")
            && !val.is_empty()
        {
            config.load.stages = val;
        }
        if let Ok(val) = env::var("THRESHOLDS") {
            config.load.thresholds = val;
        }
        if let Ok(val) = env::var("GRACE_PERIOD_SECS")
            && let Ok(secs) = val.parse::<u64>()
        {
            config.load.grace_period = Duration::from_secs(secs);
        }
        if let Ok(val) = env::var("PACING_MS")
            && let Ok(ms) = val.parse::<u64>()
        {
            config.load.pacing = Duration::from_millis(ms);
        }
        if let Ok(val) = env::var("MAX_DURATION")
            && let Ok(limit) = parse_duration(&val)
        {
            config.load.max_duration = Some(limit);
        }
        if let Ok(val) = env::var("COUNT_DIAGNOSTICS") {
            config.load.count_diagnostics = parse_flag(&val);
        }

        // Fixture config
        if let Ok(val) = env::var("FIXTURE_USERS")
            && let Ok(v) = val.parse()
        {
            config.fixture.users = v;
        }
        if let Ok(val) = env::var("FIXTURE_POST_FLOOR")
            && let Ok(v) = val.parse()
        {
            config.fixture.post_floor = v;
        }
        if let Ok(val) = env::var("FIXTURE_SEED")
            && let Ok(v) = val.parse()
        {
            config.fixture.seed = v;
        }
        if let Ok(val) = env::var("FIXTURE_RANK_IDS") {
            let ids: Vec<String> = val
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            if !ids.is_empty() {
                config.fixture.rank_ids = ids;
            }
        }
        if let Ok(path) = env::var("FIXTURE_TEMPLATE")
            && !path.is_empty()
        {
            config.fixture.template_path = PathBuf::from(path);
        }
        if let Ok(path) = env::var("FIXTURE_OUTPUT")
            && !path.is_empty()
        {
            config.fixture.output_path = PathBuf::from(path);
        }
        if let Ok(token) = env::var("FIXTURE_TRUE") {
            config.fixture.dialect.true_token = token;
        }
        if let Ok(token) = env::var("FIXTURE_FALSE") {
            config.fixture.dialect.false_token = token;
        }
        if let Ok(token) = env::var("FIXTURE_NULL") {
            config.fixture.dialect.null_token = token;
        }

        if let Ok(path) = env::var("METRICS_EXPORT_PATH")
            && !path.is_empty()
        {
            config.metrics_export_path = Some(PathBuf::from(path));
        }

        config
    }

    /// Build the load profile for `mode`, validating stages and thresholds
    pub fn load_profile(&self, mode: ProfileMode) -> Result<LoadProfile, ProfileError> {
        let builder = match mode {
            ProfileMode::Fixed => {
                LoadProfile::builder().fixed(self.load.iterations, self.load.virtual_users)
            }
            ProfileMode::Staged => {
                LoadProfile::builder().staged(LoadStage::parse_list(&self.load.stages)?)
            }
        };
        builder
            .thresholds(Threshold::parse_list(&self.load.thresholds)?)
            .build()
    }

    pub fn orchestrator(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            grace_period: self.load.grace_period,
            pacing: self.load.pacing,
            max_duration: self.load.max_duration,
            count_diagnostics: self.load.count_diagnostics,
            ..Default::default()
        }
    }
}
