use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::agents::AgentIdentity;
use crate::bus::{payload, DEFAULT_CHANNEL_CAPACITY};
use crate::orchestrator::{PhaseDescriptor, PhaseTask};

/// Default configuration file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "agent-lab.toml";

/// Longest poll or heartbeat period accepted (one year)
pub const MAX_INTERVAL_SECS: u64 = 365 * 24 * 60 * 60;

/// Main configuration structure for the agent lab
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LabConfig {
    /// Project the agents work on
    pub project: ProjectConfig,
    /// Message bus settings
    pub bus: BusConfig,
    /// Durable coordination file settings
    pub state: StateConfig,
    /// Liveness detection settings
    pub health: HealthConfig,
    /// Logging settings
    pub observability: ObservabilityConfig,
    /// Which agent hosts the phase orchestrator
    pub orchestrator: OrchestratorConfig,
    /// Static agent roster
    pub agents: Vec<AgentConfig>,
    /// Ordered phase list
    pub phases: Vec<PhaseConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub name: String,
    pub path: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BusConfig {
    /// Per-channel buffer before slow subscribers lag
    pub channel_capacity: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StateConfig {
    /// Coordination file location
    pub file_path: PathBuf,
    /// Recent tasks kept per agent
    pub max_recent_tasks: usize,
    /// Errors kept per agent
    pub max_errors: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Silence after which an agent is unhealthy
    pub threshold_secs: u64,
    /// Health monitor poll interval
    pub poll_interval_secs: u64,
    /// Idle heartbeat interval; no periodic heartbeats when unset
    pub heartbeat_interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level used when RUST_LOG is not set
    pub log_level: String,
    /// Emit JSON log lines instead of plain text
    pub json: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub agent: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AgentConfig {
    pub name: String,
    pub role: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Task message type -> phase tag reported on completion
    #[serde(default)]
    pub tasks: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PhaseConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub estimated_time: String,
    #[serde(default)]
    pub required_agents: Vec<String>,
    /// `{agent}_{phase}` completion keys that gate leaving this phase
    #[serde(default)]
    pub required_response_keys: Vec<String>,
    /// Task messages published when the phase is entered
    #[serde(default)]
    pub tasks: Vec<PhaseTask>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("duplicate agent name: {0}")]
    DuplicateAgent(String),

    #[error("orchestrator agent '{0}' is not configured")]
    UnknownOrchestrator(String),

    #[error("agent '{agent}' depends on unknown agent '{dependency}'")]
    UnknownDependency { agent: String, dependency: String },

    #[error("agent dependencies form a cycle through '{0}'")]
    DependencyCycle(String),

    #[error("duplicate phase name: {0}")]
    DuplicatePhase(String),

    #[error("phase '{phase}' sends a task to unknown agent '{to}'")]
    UnknownTaskTarget { phase: String, to: String },

    #[error("phase '{phase}' sends '{message_type}' which agent '{to}' does not declare")]
    UndeclaredTask {
        phase: String,
        to: String,
        message_type: String,
    },

    #[error("phase '{phase}' requires key '{key}' which names no configured agent")]
    InvalidResponseKey { phase: String, key: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("{field} = {value} is out of range")]
    OutOfRange { field: &'static str, value: u64 },
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: "Southwest Test App".to_string(),
            path: "./test-app".to_string(),
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            file_path: PathBuf::from(".agent-lab/warp-agent-memory.json"),
            max_recent_tasks: 10,
            max_errors: 10,
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            threshold_secs: 120, // 2 minutes
            poll_interval_secs: 30,
            heartbeat_interval_secs: None,
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: true,
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            agent: "main".to_string(),
        }
    }
}

fn agent(name: &str, role: &str, capabilities: &[&str], dependencies: &[&str], tasks: &[(&str, &str)]) -> AgentConfig {
    AgentConfig {
        name: name.to_string(),
        role: role.to_string(),
        capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
        dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
        tasks: tasks
            .iter()
            .map(|(task, phase)| (task.to_string(), phase.to_string()))
            .collect(),
    }
}

fn phase(
    name: &str,
    description: &str,
    estimated_time: &str,
    required_agents: &[&str],
    required_response_keys: &[&str],
    tasks: Vec<PhaseTask>,
) -> PhaseConfig {
    PhaseConfig {
        name: name.to_string(),
        description: description.to_string(),
        estimated_time: estimated_time.to_string(),
        required_agents: required_agents.iter().map(|a| a.to_string()).collect(),
        required_response_keys: required_response_keys.iter().map(|k| k.to_string()).collect(),
        tasks,
    }
}

fn default_agents() -> Vec<AgentConfig> {
    vec![
        agent(
            "main",
            "Master Orchestrator",
            &["project_coordination", "phase_management", "agent_monitoring", "task_distribution"],
            &[],
            &[],
        ),
        agent(
            "ui",
            "SvelteKit + Southwest Theme Specialist",
            &["sveltekit_setup", "southwest_theme", "tailwind_css", "component_integration", "responsive_design"],
            &["main"],
            &[
                ("initialize", "init"),
                ("setup_sveltekit", "sveltekit_setup"),
                ("integrate_components", "final_integration"),
            ],
        ),
        agent(
            "leaflet",
            "Map Integration Specialist",
            &["leaflet_integration", "southwest_markers", "click_to_add", "responsive_maps", "ssr_safe_loading"],
            &["main", "ui"],
            &[("initialize", "init"), ("create_map_component", "map_component")],
        ),
        agent(
            "github",
            "GitHub MCP Integration Specialist",
            &["repository_setup", "github_actions", "issue_management", "mcp_integration", "ci_cd_pipeline"],
            &["main"],
            &[("initialize", "init"), ("setup_repository", "repository_setup")],
        ),
    ]
}

fn default_phases() -> Vec<PhaseConfig> {
    vec![
        phase(
            "init",
            "Initialize all agents",
            "2-3 minutes",
            &["main", "ui", "leaflet", "github"],
            &["ui_init", "leaflet_init", "github_init"],
            vec![
                PhaseTask::new("ui", "initialize", payload(json!({"phase": "init", "role": "SvelteKit + Southwest Theme"}))),
                PhaseTask::new("leaflet", "initialize", payload(json!({"phase": "init", "role": "Map Integration"}))),
                PhaseTask::new("github", "initialize", payload(json!({"phase": "init", "role": "GitHub MCP Integration"}))),
            ],
        ),
        phase(
            "sveltekit_setup",
            "SvelteKit + Southwest theme setup",
            "5-8 minutes",
            &["ui"],
            &["ui_sveltekit_setup"],
            vec![PhaseTask::new(
                "ui",
                "setup_sveltekit",
                payload(json!({
                    "project_path": "./test-app",
                    "theme": "southwest",
                    "features": ["tailwind", "typescript", "responsive"],
                })),
            )],
        ),
        phase(
            "leaflet_integration",
            "Map component integration",
            "8-12 minutes",
            &["leaflet"],
            &["leaflet_map_component"],
            vec![PhaseTask::new(
                "leaflet",
                "create_map_component",
                payload(json!({
                    "target_path": "./test-app/src/lib/components",
                    "default_center": [-115.1398, 36.1699],
                    "zoom": 8,
                    "features": ["click_to_add_markers", "southwest_theme"],
                })),
            )],
        ),
        phase(
            "github_setup",
            "Repository and CI/CD setup",
            "10-15 minutes",
            &["github"],
            &["github_repository_setup"],
            vec![PhaseTask::new(
                "github",
                "setup_repository",
                payload(json!({
                    "repo_name": "agent-lab-test-app",
                    "description": "Test app built with the agent lab multi-agent system",
                    "features": ["issues", "actions", "project_board"],
                })),
            )],
        ),
        phase(
            "final_integration",
            "Final integration and testing",
            "5-10 minutes",
            &["ui", "leaflet", "github"],
            &["ui_final_integration"],
            vec![PhaseTask::new(
                "ui",
                "integrate_components",
                payload(json!({"components": ["map", "github"]})),
            )],
        ),
    ]
}

impl Default for LabConfig {
    fn default() -> Self {
        Self {
            project: ProjectConfig::default(),
            bus: BusConfig::default(),
            state: StateConfig::default(),
            health: HealthConfig::default(),
            observability: ObservabilityConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            agents: default_agents(),
            phases: default_phases(),
        }
    }
}

impl LabConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration file (`path`, or agent-lab.toml when present)
    /// 3. Environment variables (prefixed with AGENT_LAB__)
    ///
    /// A list given in the file (agents, phases) replaces the default list
    /// as a whole.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        match path {
            Some(path) => {
                builder = builder.add_source(File::from(path).required(true));
            }
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                builder = builder.add_source(File::from(Path::new(DEFAULT_CONFIG_FILE)));
            }
            None => {}
        }

        builder = builder.add_source(
            Environment::with_prefix("AGENT_LAB")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let lab_config: LabConfig = builder.build()?.try_deserialize()?;
        lab_config.validate()?;

        Ok(lab_config)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = self.to_toml()?;
        if let Some(parent) = path.as_ref().parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }

    /// Reject rosters and phase lists the lab cannot run
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bus.channel_capacity == 0 {
            return Err(ConfigError::Zero("bus.channel_capacity"));
        }
        if self.health.poll_interval_secs == 0 {
            return Err(ConfigError::Zero("health.poll_interval_secs"));
        }
        if self.health.heartbeat_interval_secs == Some(0) {
            return Err(ConfigError::Zero("health.heartbeat_interval_secs"));
        }
        self.health.threshold()?;
        if self.health.poll_interval_secs > MAX_INTERVAL_SECS {
            return Err(ConfigError::OutOfRange {
                field: "health.poll_interval_secs",
                value: self.health.poll_interval_secs,
            });
        }
        if let Some(secs) = self.health.heartbeat_interval_secs.filter(|secs| *secs > MAX_INTERVAL_SECS) {
            return Err(ConfigError::OutOfRange {
                field: "health.heartbeat_interval_secs",
                value: secs,
            });
        }

        let mut names = BTreeSet::new();
        for agent in &self.agents {
            if !names.insert(agent.name.as_str()) {
                return Err(ConfigError::DuplicateAgent(agent.name.clone()));
            }
        }

        if !names.contains(self.orchestrator.agent.as_str()) {
            return Err(ConfigError::UnknownOrchestrator(self.orchestrator.agent.clone()));
        }

        for agent in &self.agents {
            if let Some(dependency) = agent.dependencies.iter().find(|d| !names.contains(d.as_str())) {
                return Err(ConfigError::UnknownDependency {
                    agent: agent.name.clone(),
                    dependency: dependency.clone(),
                });
            }
        }

        self.start_order()?;

        let mut phase_names = BTreeSet::new();
        for phase in &self.phases {
            if !phase_names.insert(phase.name.as_str()) {
                return Err(ConfigError::DuplicatePhase(phase.name.clone()));
            }

            for task in &phase.tasks {
                let target = self
                    .agent(&task.to)
                    .ok_or_else(|| ConfigError::UnknownTaskTarget {
                        phase: phase.name.clone(),
                        to: task.to.clone(),
                    })?;
                if !target.tasks.contains_key(&task.message_type) {
                    return Err(ConfigError::UndeclaredTask {
                        phase: phase.name.clone(),
                        to: task.to.clone(),
                        message_type: task.message_type.clone(),
                    });
                }
            }

            for key in &phase.required_response_keys {
                let known = names
                    .iter()
                    .any(|name| key.strip_prefix(name).is_some_and(|rest| rest.starts_with('_') && rest.len() > 1));
                if !known {
                    return Err(ConfigError::InvalidResponseKey {
                        phase: phase.name.clone(),
                        key: key.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    pub fn agent(&self, name: &str) -> Option<&AgentConfig> {
        self.agents.iter().find(|agent| agent.name == name)
    }

    /// Agents ordered so every agent follows its dependencies
    pub fn start_order(&self) -> Result<Vec<&AgentConfig>, ConfigError> {
        let by_name: HashMap<&str, &AgentConfig> =
            self.agents.iter().map(|agent| (agent.name.as_str(), agent)).collect();

        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        fn visit<'a>(
            agent: &'a AgentConfig,
            by_name: &HashMap<&str, &'a AgentConfig>,
            marks: &mut HashMap<&'a str, Mark>,
            order: &mut Vec<&'a AgentConfig>,
        ) -> Result<(), ConfigError> {
            match marks.get(agent.name.as_str()) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::Visiting) => return Err(ConfigError::DependencyCycle(agent.name.clone())),
                None => {}
            }
            marks.insert(agent.name.as_str(), Mark::Visiting);
            for dependency in &agent.dependencies {
                let Some(&dep) = by_name.get(dependency.as_str()) else {
                    return Err(ConfigError::UnknownDependency {
                        agent: agent.name.clone(),
                        dependency: dependency.clone(),
                    });
                };
                visit(dep, by_name, marks, order)?;
            }
            marks.insert(agent.name.as_str(), Mark::Done);
            order.push(agent);
            Ok(())
        }

        let mut marks = HashMap::new();
        let mut order = Vec::with_capacity(self.agents.len());
        for agent in &self.agents {
            visit(agent, &by_name, &mut marks, &mut order)?;
        }
        Ok(order)
    }

    /// Static agent identities in configuration order
    pub fn identities(&self) -> Vec<AgentIdentity> {
        self.agents.iter().map(AgentConfig::identity).collect()
    }

    /// Ordered phase descriptors for the orchestrator
    pub fn phase_descriptors(&self) -> Vec<PhaseDescriptor> {
        self.phases
            .iter()
            .enumerate()
            .map(|(ordinal, phase)| PhaseDescriptor {
                name: phase.name.clone(),
                ordinal,
                description: phase.description.clone(),
                estimated_time: phase.estimated_time.clone(),
                required_agents: phase.required_agents.iter().cloned().collect(),
                required_response_keys: phase.required_response_keys.iter().cloned().collect(),
                tasks: phase.tasks.clone(),
            })
            .collect()
    }

    /// Lock file guarding the single orchestrator per state file
    pub fn lock_path(&self) -> PathBuf {
        let mut path = self.state.file_path.clone().into_os_string();
        path.push(".lock");
        PathBuf::from(path)
    }
}

impl HealthConfig {
    /// `threshold_secs` as a signed duration; rejects values chrono cannot hold
    pub fn threshold(&self) -> Result<chrono::Duration, ConfigError> {
        i64::try_from(self.threshold_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .ok_or(ConfigError::OutOfRange {
                field: "health.threshold_secs",
                value: self.threshold_secs,
            })
    }
}

impl AgentConfig {
    pub fn identity(&self) -> AgentIdentity {
        AgentIdentity::new(&self.name, &self.role)
            .with_capabilities(self.capabilities.iter().cloned())
            .with_dependencies(self.dependencies.iter().cloned())
    }
}
