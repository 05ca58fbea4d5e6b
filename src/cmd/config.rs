//! Configuration view and validation commands: `auditor config`.

use anyhow::Result;
use std::path::Path;

use super::super::ConfigCommands;
use auditor::config::{AuditorToml, CONFIG_FILE, EngineConfig};

fn print_engine(engine: &EngineConfig) {
    println!("[engine]");
    println!("  concurrency_cap = {}", engine.concurrency_cap);
    println!(
        "  phase_effort_budget_hours = {}",
        engine.phase_effort_budget_hours
    );
    println!("  wall_clock_budget_ms = {}", engine.wall_clock_budget_ms);
    println!("  correlation_threshold = {}", engine.correlation_threshold);
    println!("  grace_period_ms = {}", engine.grace_period_ms);
    println!("  on_phase_failure = \"{}\"", engine.on_phase_failure);
    if !engine.exclude.is_empty() {
        println!("  exclude = {:?}", engine.exclude);
    }
    println!("  max_roadmap_items = {}", engine.max_roadmap_items);
    println!("  team_hours_per_week = {}", engine.team_hours_per_week);
    println!();
}

pub fn cmd_config(project_dir: &Path, command: Option<ConfigCommands>) -> Result<()> {
    let config_path = project_dir.join(CONFIG_FILE);

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Auditor Configuration");
            println!("=====================");
            println!();

            let toml = if config_path.exists() {
                println!("Config file: {}", config_path.display());
                println!();
                AuditorToml::load(&config_path)?
            } else {
                println!("No {} found at {}", CONFIG_FILE, config_path.display());
                println!();
                println!("Using default configuration:");
                AuditorToml::default()
            };

            print_engine(&toml.engine);

            let business = &toml.business;
            println!("[business]");
            println!("  industry = {:?}", business.industry);
            println!("  scale = {:?}", business.scale);
            println!("  annual_revenue = {}", business.annual_revenue);
            println!("  hourly_rate = {}", business.hourly_rate);
            if !business.compliance_frameworks.is_empty() {
                println!(
                    "  compliance_frameworks = {:?}",
                    business.compliance_frameworks
                );
            }
            if !business.critical_processes.is_empty() {
                println!("  critical_processes = {:?}", business.critical_processes);
            }
            println!();

            // Environment overrides only touch the engine section
            println!("Effective engine values (with env overrides):");
            let effective = toml.effective_engine()?;
            println!("  concurrency_cap = {}", effective.concurrency_cap);
            println!("  wall_clock_budget_ms = {}", effective.wall_clock_budget_ms);
            println!(
                "  correlation_threshold = {}",
                effective.correlation_threshold
            );
            println!();

            if !config_path.exists() {
                println!("Run 'auditor config init' to create {}.", CONFIG_FILE);
                println!();
            }
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No {} found. Using defaults (valid).", CONFIG_FILE);
                return Ok(());
            }

            let toml = AuditorToml::load(&config_path)?;
            let warnings = toml.validate()?;

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("{} already exists at {}", CONFIG_FILE, config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            if !project_dir.exists() {
                std::fs::create_dir_all(project_dir)?;
            }

            AuditorToml::default().save(&config_path)?;

            println!("Created {} at {}", CONFIG_FILE, config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [engine] concurrency_cap, wall_clock_budget_ms, exclude");
            println!("  - [business] industry, scale, compliance_frameworks, critical_processes");
            println!();
        }
    }

    Ok(())
}
