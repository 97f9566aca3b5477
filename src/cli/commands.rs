use console::style;
use tracing::warn;

use crate::config::AppConfig;
use crate::error::{KegError, Result};
use crate::progress::BarProgress;
use crate::registry::{Registry, ResolutionCache, ResolveRequest};

pub async fn list(config: &AppConfig) -> Result<()> {
    let registry = Registry::from_config(config)?;

    let mut printed_any = false;
    for source in registry.sources() {
        let tools = match source.list_tools().await {
            Ok(tools) => tools,
            Err(e) => {
                warn!(source = source.name(), error = %e, "listing failed");
                continue;
            }
        };
        if tools.is_empty() {
            continue;
        }

        printed_any = true;
        println!(
            "{} {}",
            style(source.name()).bold().cyan(),
            style(source.description()).dim()
        );
        for candidate in tools {
            if candidate.description.is_empty() {
                println!("  {}", style(&candidate.id).white());
            } else {
                println!(
                    "  {} {}",
                    style(&candidate.id).white(),
                    style(&candidate.description).dim()
                );
            }
        }
        println!();
    }

    if !printed_any {
        println!("{}", style("No sources answered.").dim());
    }
    Ok(())
}

pub async fn versions(config: &AppConfig, tool: &str, provider: Option<&str>) -> Result<()> {
    let registry = Registry::from_config(config)?;

    let mut printed_any = false;
    for source in registry.admitted(provider) {
        let installed: Vec<String> = source
            .list_local()?
            .into_iter()
            .filter(|(candidate, _)| candidate.id == tool)
            .flat_map(|(_, versions)| versions)
            .map(|v| v.identifier)
            .collect();

        let remote = match source.list_versions(tool).await {
            Ok(remote) => remote,
            Err(e) => {
                warn!(source = source.name(), error = %e, "listing failed");
                Vec::new()
            }
        };
        if installed.is_empty() && remote.is_empty() {
            continue;
        }

        printed_any = true;
        println!("{}", style(source.name()).bold().cyan());
        for version in &remote {
            let mut line = format!("  {}", style(&version.version).white());
            if version.identifier != version.version {
                line.push_str(&format!(" {}", style(&version.identifier).dim()));
            }
            if installed.iter().any(|id| *id == version.identifier) {
                line.push_str(&format!(" {}", style("(installed)").green()));
            }
            println!("{line}");
        }
        // Installed builds the remote listing no longer advertises.
        for identifier in installed
            .iter()
            .filter(|id| !remote.iter().any(|v| v.identifier == **id))
        {
            println!(
                "  {} {}",
                style(identifier).white(),
                style("(installed, local only)").green()
            );
        }
        println!();
    }

    if !printed_any {
        println!("{}", style(format!("No versions found for {tool}.")).dim());
    }
    Ok(())
}

pub async fn install(
    config: &AppConfig,
    tool: &str,
    version: &str,
    provider: Option<&str>,
    relaxed: bool,
    offline: bool,
) -> Result<()> {
    let registry = Registry::from_config(config)?;
    let cache = ResolutionCache::new();
    let matched = registry
        .resolve_strict(
            &cache,
            ResolveRequest {
                tool,
                version,
                source_hint: provider,
                relaxed,
                allow_remote: !offline,
            },
        )
        .await?;

    println!(
        "{} Installing {} {} from {}...",
        style("→").cyan().bold(),
        style(&matched.candidate.id).cyan(),
        style(&matched.version.version).cyan(),
        style(matched.source.name()).dim()
    );

    let progress = BarProgress::new(&matched.version.identifier);
    let path = matched
        .source
        .install(&matched.candidate.id, &matched.version, &progress)
        .await?;

    println!(
        "{} Installed at {}",
        style("✓").green().bold(),
        style(path.display()).cyan()
    );
    Ok(())
}

pub async fn uninstall(
    config: &AppConfig,
    tool: &str,
    version: &str,
    provider: Option<&str>,
) -> Result<()> {
    let registry = Registry::from_config(config)?;
    let cache = ResolutionCache::new();
    let matched = registry
        .resolve(
            &cache,
            ResolveRequest {
                tool,
                version,
                source_hint: provider,
                relaxed: false,
                allow_remote: false,
            },
        )
        .await
        .ok_or_else(|| KegError::NotInstalled {
            tool: tool.to_string(),
            version: version.to_string(),
        })?;

    matched
        .source
        .delete(&matched.candidate.id, &matched.version)?;
    println!(
        "{} Removed {} {}",
        style("✓").green().bold(),
        style(&matched.candidate.id).cyan(),
        style(&matched.version.identifier).cyan()
    );
    Ok(())
}

pub async fn home(
    config: &AppConfig,
    tool: &str,
    version: &str,
    provider: Option<&str>,
    relaxed: bool,
) -> Result<()> {
    let registry = Registry::from_config(config)?;
    let cache = ResolutionCache::new();
    let matched = registry
        .resolve(
            &cache,
            ResolveRequest {
                tool,
                version,
                source_hint: provider,
                relaxed,
                allow_remote: false,
            },
        )
        .await
        .ok_or_else(|| KegError::NotInstalled {
            tool: tool.to_string(),
            version: version.to_string(),
        })?;

    let path = matched
        .source
        .resolve(&matched.candidate.id, &matched.version)
        .ok_or_else(|| KegError::NotInstalled {
            tool: tool.to_string(),
            version: version.to_string(),
        })?;

    // Bare path on stdout so the output is usable in shell substitution.
    println!("{}", path.display());
    Ok(())
}
