use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// External program names
    #[serde(default)]
    pub toolchain: ToolchainConfig,

    /// Third-party jars placed on test and tool classpaths
    #[serde(default)]
    pub libs: LibsConfig,

    /// Where SUT projects live
    #[serde(default)]
    pub projects: ProjectsConfig,

    /// Per-tool time bounds
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Compile-and-repair loop settings
    #[serde(default)]
    pub repair: RepairConfig,

    /// Ollama endpoints used as repair adapters
    #[serde(default)]
    pub endpoints: Vec<OllamaEndpoint>,

    /// Ledger and storage locations
    #[serde(default)]
    pub paths: PathsConfig,

    /// Measurement phase switches
    #[serde(default)]
    pub evaluation: EvaluationConfig,

    /// Worklist filtering
    #[serde(default)]
    pub filter: FilterConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Directory every relative path in this file is resolved against
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolchainConfig {
    #[serde(default = "default_java")]
    pub java: String,
    #[serde(default = "default_javac")]
    pub javac: String,
    #[serde(default = "default_jar")]
    pub jar: String,
    #[serde(default = "default_javap")]
    pub javap: String,
    /// How test runner output is turned into pass/fail
    #[serde(default)]
    pub outcome_parser: OutcomeParserKind,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeParserKind {
    /// `OK (N tests)` banner or `Tests run: N,  Failures: M` summary
    #[default]
    Junit4,
    /// Zero exit code means pass
    ExitCode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibsConfig {
    #[serde(default = "default_junit")]
    pub junit: PathBuf,
    #[serde(default = "default_hamcrest")]
    pub hamcrest: PathBuf,
    /// EvoSuite runtime, needed by generated scaffolding
    #[serde(default = "default_evosuite")]
    pub evosuite: PathBuf,
    #[serde(default = "default_jacoco_agent")]
    pub jacoco_agent: PathBuf,
    #[serde(default = "default_jacoco_cli")]
    pub jacoco_cli: PathBuf,
    #[serde(default = "default_pitest")]
    pub pitest: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectsConfig {
    /// Directories containing one sub-directory per project
    #[serde(default = "default_project_roots")]
    pub roots: Vec<PathBuf>,

    /// Depth bound for the by-simple-name source search
    #[serde(default = "default_fallback_search_depth")]
    pub fallback_search_depth: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_compile_seconds")]
    pub compile_seconds: u64,
    #[serde(default = "default_test_seconds")]
    pub test_seconds: u64,
    #[serde(default = "default_instrument_seconds")]
    pub instrument_seconds: u64,
    #[serde(default = "default_report_seconds")]
    pub report_seconds: u64,
    #[serde(default = "default_mutation_seconds")]
    pub mutation_seconds: u64,
    #[serde(default = "default_javap_seconds")]
    pub javap_seconds: u64,
    /// PIT per-mutant constant timeout in milliseconds
    #[serde(default = "default_mutant_timeout_const_ms")]
    pub mutant_timeout_const_ms: u64,
}

impl TimeoutConfig {
    pub fn compile(&self) -> Duration {
        Duration::from_secs(self.compile_seconds)
    }

    pub fn test(&self) -> Duration {
        Duration::from_secs(self.test_seconds)
    }

    pub fn instrument(&self) -> Duration {
        Duration::from_secs(self.instrument_seconds)
    }

    pub fn report(&self) -> Duration {
        Duration::from_secs(self.report_seconds)
    }

    pub fn mutation(&self) -> Duration {
        Duration::from_secs(self.mutation_seconds)
    }

    pub fn javap(&self) -> Duration {
        Duration::from_secs(self.javap_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairConfig {
    /// Repair attempts before a test is declared non-compiling
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Compiler output is cut to this many characters inside prompts
    #[serde(default = "default_max_error_chars")]
    pub max_error_chars: usize,
}

/// An Ollama endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaEndpoint {
    /// Display name for this endpoint
    pub name: String,

    /// Ollama API URL
    pub url: String,

    /// Model to use for repairs
    pub model: String,

    /// Whether this endpoint is enabled
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Token budget for one repaired file
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_baseline_ledger")]
    pub baseline_ledger: PathBuf,
    #[serde(default = "default_refined_ledger")]
    pub refined_ledger: PathBuf,
    #[serde(default = "default_refined_dir")]
    pub refined_dir: PathBuf,
    #[serde(default = "default_verification_ledger")]
    pub verification_ledger: PathBuf,
    #[serde(default = "default_validated_dir")]
    pub validated_dir: PathBuf,
    #[serde(default = "default_metrics_ledger")]
    pub metrics_ledger: PathBuf,
    #[serde(default = "default_comparison_report")]
    pub comparison_report: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Also measure the original test so baseline/refined vectors pair up
    #[serde(default = "default_enabled")]
    pub measure_baseline: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Class-name globs (e.g. `"com.example.*"`); empty means every class
    #[serde(default)]
    pub include: Vec<String>,

    /// Stop after this many TestCases
    #[serde(default)]
    pub limit: Option<usize>,
}

impl FilterConfig {
    pub fn accepts(&self, class_name: &str) -> bool {
        self.include.is_empty()
            || self
                .include
                .iter()
                .any(|pattern| glob_match::glob_match(pattern, class_name))
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_base_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_java() -> String {
    "java".to_string()
}

fn default_javac() -> String {
    "javac".to_string()
}

fn default_jar() -> String {
    "jar".to_string()
}

fn default_javap() -> String {
    "javap".to_string()
}

fn default_junit() -> PathBuf {
    PathBuf::from("lib/junit-4.11.jar")
}

fn default_hamcrest() -> PathBuf {
    PathBuf::from("lib/hamcrest-core-1.3.jar")
}

fn default_evosuite() -> PathBuf {
    PathBuf::from("lib/evosuite-1.2.0.jar")
}

fn default_jacoco_agent() -> PathBuf {
    PathBuf::from("lib/jacocoagent.jar")
}

fn default_jacoco_cli() -> PathBuf {
    PathBuf::from("lib/jacococli.jar")
}

fn default_pitest() -> PathBuf {
    PathBuf::from("lib/pitest-command-line.jar")
}

fn default_project_roots() -> Vec<PathBuf> {
    vec![
        PathBuf::from("data/SF110-binary"),
        PathBuf::from("data/extended-dynamosa-repos-binary"),
    ]
}

fn default_fallback_search_depth() -> usize {
    8
}

fn default_compile_seconds() -> u64 {
    30
}

fn default_test_seconds() -> u64 {
    60
}

fn default_instrument_seconds() -> u64 {
    120
}

fn default_report_seconds() -> u64 {
    60
}

fn default_mutation_seconds() -> u64 {
    300 // 5 minutes
}

fn default_javap_seconds() -> u64 {
    30
}

fn default_mutant_timeout_const_ms() -> u64 {
    4000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_max_error_chars() -> usize {
    2000
}

fn default_enabled() -> bool {
    true
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_request_timeout_seconds() -> u64 {
    120
}

fn default_baseline_ledger() -> PathBuf {
    PathBuf::from("generated_tests/baseline/T_base_results.json")
}

fn default_refined_ledger() -> PathBuf {
    PathBuf::from("generated_tests/refined/T_refined_results.json")
}

fn default_refined_dir() -> PathBuf {
    PathBuf::from("generated_tests/refined")
}

fn default_verification_ledger() -> PathBuf {
    PathBuf::from("generated_tests/validated/T_valid_results.json")
}

fn default_validated_dir() -> PathBuf {
    PathBuf::from("generated_tests/validated")
}

fn default_metrics_ledger() -> PathBuf {
    PathBuf::from("evaluation_results/final_evaluation.json")
}

fn default_comparison_report() -> PathBuf {
    PathBuf::from("evaluation_results/statistical_comparison.json")
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            base_dir: default_base_dir(),
        }
    }
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            java: default_java(),
            javac: default_javac(),
            jar: default_jar(),
            javap: default_javap(),
            outcome_parser: OutcomeParserKind::default(),
        }
    }
}

impl Default for LibsConfig {
    fn default() -> Self {
        Self {
            junit: default_junit(),
            hamcrest: default_hamcrest(),
            evosuite: default_evosuite(),
            jacoco_agent: default_jacoco_agent(),
            jacoco_cli: default_jacoco_cli(),
            pitest: default_pitest(),
        }
    }
}

impl Default for ProjectsConfig {
    fn default() -> Self {
        Self {
            roots: default_project_roots(),
            fallback_search_depth: default_fallback_search_depth(),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            compile_seconds: default_compile_seconds(),
            test_seconds: default_test_seconds(),
            instrument_seconds: default_instrument_seconds(),
            report_seconds: default_report_seconds(),
            mutation_seconds: default_mutation_seconds(),
            javap_seconds: default_javap_seconds(),
            mutant_timeout_const_ms: default_mutant_timeout_const_ms(),
        }
    }
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            max_error_chars: default_max_error_chars(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            baseline_ledger: default_baseline_ledger(),
            refined_ledger: default_refined_ledger(),
            refined_dir: default_refined_dir(),
            verification_ledger: default_verification_ledger(),
            validated_dir: default_validated_dir(),
            metrics_ledger: default_metrics_ledger(),
            comparison_report: default_comparison_report(),
        }
    }
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            measure_baseline: default_enabled(),
        }
    }
}

impl Config {
    /// Load configuration from file, or create default if not found
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path.map(PathBuf::from).or_else(Self::default_config_path);

        let config = if let Some(ref path) = config_path {
            if path.exists() {
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config from {:?}", path))?;
                toml::from_str(&contents)
                    .with_context(|| format!("Failed to parse config from {:?}", path))?
            } else {
                Config::default()
            }
        } else {
            Config::default()
        };

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let config_path = path
            .map(PathBuf::from)
            .or_else(Self::default_config_path)
            .context("No config path available")?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, contents)
            .with_context(|| format!("Failed to write config to {:?}", config_path))?;

        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "verifine", "verifine")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Resolve a configured path against `general.base_dir`.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.general.base_dir.join(path)
        }
    }
}
