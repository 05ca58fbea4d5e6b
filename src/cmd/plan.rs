//! Phase planning for a manifest: `auditor plan`.

use anyhow::Result;
use std::path::Path;

use auditor::config::AuditorToml;
use auditor::registry::AuditManifest;

pub fn cmd_plan(project_dir: &Path, manifest: &Path, json: bool, exclude: &[String]) -> Result<()> {
    let config = AuditorToml::load_or_default(project_dir)?;
    let manifest = AuditManifest::load(manifest)?;

    let mut excluded = config.engine.exclude.clone();
    for id in exclude {
        if !excluded.contains(id) {
            excluded.push(id.clone());
        }
    }

    let graph = manifest.graph(&excluded)?;
    let plan = graph.phases();
    tracing::debug!(phases = plan.len(), audits = plan.total_audits(), "planned manifest");

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    println!();
    println!(
        "{}",
        console::style(format!(
            "Audit plan: {} audit(s) in {} phase(s)",
            plan.total_audits(),
            plan.len()
        ))
        .bold()
    );
    if !excluded.is_empty() {
        println!("Excluded: {}", console::style(excluded.join(", ")).dim());
    }
    println!();

    for (index, ids) in plan.iter().enumerate() {
        println!("  Phase {}: {}", index, ids.join(", "));
        for id in ids {
            let Some(audit) = graph.get_by_id(id) else {
                continue;
            };
            if !audit.depends_on.is_empty() {
                println!(
                    "    {} {}",
                    id,
                    console::style(format!("<- {}", audit.depends_on.join(", "))).dim()
                );
            }
        }
    }
    println!();

    Ok(())
}
