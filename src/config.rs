use std::path::PathBuf;

use clap::Parser;
use serde::Deserialize;

#[derive(Parser)]
#[command(name = "campus", version = "1.0", about, long_about = None)]
pub struct CliArgs {
    /// Path to the configuration file
    #[arg(long = "config", short = 'c')]
    pub config_path: String,

    /// Whether to flush the existing database
    #[arg(long = "flush-data", short = 'f', default_value_t = false)]
    pub flush_data: bool,

    /// Number of grading workers
    #[arg(long = "threads", short = 't', default_value_t = 2)]
    pub threads: u8,
}

impl CliArgs {
    /// Load the configuration from the specified file
    pub fn to_config(&self) -> std::io::Result<Config> {
        let file = std::fs::File::open(&self.config_path)?;
        let reader = std::io::BufReader::new(file);
        serde_json::from_reader(reader).map_err(|e| e.into())
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub grader: GraderConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub commissions: Vec<CommissionConfig>,
    #[serde(default)]
    pub teachers: Vec<TeacherConfig>,
}

#[derive(Deserialize, Debug, Default)]
pub struct ServerConfig {
    pub bind_address: Option<String>,
    pub bind_port: Option<u16>,
    /// Whether a submission request waits for its grading result
    pub blocking: Option<bool>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct SessionConfig {
    pub cookie_name: Option<String>,
    pub ttl_hours: Option<i64>,
    pub secure: Option<bool>,
}

impl SessionConfig {
    pub fn cookie_name(&self) -> &str {
        self.cookie_name.as_deref().unwrap_or("session")
    }

    pub fn ttl_hours(&self) -> i64 {
        self.ttl_hours.unwrap_or(24 * 7)
    }

    pub fn secure(&self) -> bool {
        self.secure.unwrap_or(false)
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum GraderMode {
    /// Run the teacher's test file with pytest in a subprocess
    #[default]
    Pytest,
    /// Match against the solution hints embedded in the test file
    Hints,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct GraderConfig {
    #[serde(default)]
    pub mode: GraderMode,
    pub python: Option<String>,
    pub solution_file: Option<String>,
    pub timeout_ms: Option<u64>,
    pub work_dir: Option<PathBuf>,
}

impl GraderConfig {
    pub fn python(&self) -> &str {
        self.python.as_deref().unwrap_or("python3")
    }

    pub fn solution_file(&self) -> &str {
        self.solution_file.as_deref().unwrap_or("main_solution.py")
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms.unwrap_or(10_000)
    }

    pub fn work_dir(&self) -> PathBuf {
        self.work_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("campus-grader"))
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct StorageConfig {
    pub test_files_dir: Option<PathBuf>,
}

impl StorageConfig {
    pub fn test_files_dir(&self) -> PathBuf {
        use directories::ProjectDirs;

        self.test_files_dir.clone().unwrap_or_else(|| {
            ProjectDirs::from("", "", "campus")
                .map(|dirs| dirs.data_local_dir().join("test-files"))
                .unwrap_or_else(|| PathBuf::from("test-files"))
        })
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct CommissionConfig {
    pub name: String,
    pub registration_code: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct TeacherConfig {
    pub email: String,
    pub name: String,
    pub last_name: String,
    pub password: String,
}
