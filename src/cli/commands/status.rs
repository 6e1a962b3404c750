use anyhow::Result;
use chrono::Utc;

use super::Command;
use crate::agents::AgentIdentity;
use crate::config::LabConfig;
use crate::coordination::{CoordinationState, FileStateStore, StateStore};
use crate::health::HealthMonitor;

pub struct StatusCommand {
    config: LabConfig,
}

impl StatusCommand {
    pub fn new(config: LabConfig) -> Self {
        Self { config }
    }
}

/// Agents whose declared dependencies are not currently active
pub fn unmet_dependencies(state: &CoordinationState) -> Vec<(String, Vec<String>)> {
    let active = state.active_agents();
    state
        .agents
        .iter()
        .filter_map(|(name, record)| {
            let identity = AgentIdentity::new(name, &record.role).with_dependencies(record.dependencies.iter().cloned());
            let missing = identity.missing_dependencies(&active);
            (!missing.is_empty()).then(|| (name.clone(), missing))
        })
        .collect()
}

impl Command for StatusCommand {
    async fn execute(&self) -> Result<()> {
        let store = FileStateStore::from_config(&self.config);
        let state = store.read().await?;

        println!("🤖 AGENT LAB STATUS");
        println!("===================");
        println!("📁 {}", store.path().display());
        println!("📋 Project: {} ({})", state.project.name, state.project.path);
        println!();

        println!("📊 AGENTS:");
        println!("──────────");
        for (name, record) in &state.agents {
            let marker = if record.status.is_active() { "🟢" } else { "⚪" };
            let last_seen = record
                .last_seen
                .map(|seen| seen.to_rfc3339())
                .unwrap_or_else(|| "never".to_string());
            println!("{marker} {name} - {} (last seen: {last_seen})", record.status);
            if let Some(task) = record.tasks.last() {
                println!("     ↳ {}", task.task);
            }
            if let Some(error) = record.errors.last() {
                println!("     ❌ {}", error.message);
            }
        }
        println!();

        println!("🗺️  PHASES:");
        println!("──────────");
        for (name, record) in state.ordered_phases() {
            let marker = match record.status {
                crate::coordination::PhaseStatus::Completed => "✅",
                crate::coordination::PhaseStatus::Active => "📍",
                crate::coordination::PhaseStatus::Pending => "⏳",
            };
            println!("{marker} {}. {name} ({})", record.index + 1, record.estimated_time);
        }
        println!();

        println!("💼 COORDINATION:");
        println!("   🎯 Active phase: {}", state.coordination.active_phase);
        println!(
            "   ✅ Active agents: {}/{}",
            state.coordination.active_agents, state.coordination.total_agents
        );

        let threshold = self.config.health.threshold()?;
        let unhealthy = HealthMonitor::from_state(&state).unhealthy_agents(Utc::now(), threshold);
        if unhealthy.is_empty() {
            println!("   💚 No unhealthy agents");
        } else {
            for agent in &unhealthy {
                println!("   ⚠️  {agent} appears unhealthy");
            }
        }

        for (agent, missing) in unmet_dependencies(&state) {
            println!("   🔗 {agent} waiting on: {}", missing.join(", "));
        }

        Ok(())
    }
}
