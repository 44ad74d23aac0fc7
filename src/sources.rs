use anyhow::Result;
use serde::Serialize;

use crate::config::Config;
use crate::traits::SourceRegistry;

/// A registered source as shown by `pop sources`.
#[derive(Debug, Clone, Serialize)]
pub struct SourceInfo {
    pub name: String,
    pub fancy_name: String,
    pub directive: String,
    pub fields: Vec<String>,
}

pub fn describe_sources(registry: &SourceRegistry) -> Vec<SourceInfo> {
    registry
        .sources()
        .iter()
        .map(|source| SourceInfo {
            name: source.name().to_string(),
            fancy_name: source.fancy_name().to_string(),
            directive: source.directive(),
            fields: source
                .supported_fields()
                .iter()
                .map(|field| field.as_str().to_string())
                .collect(),
        })
        .collect()
}

pub fn list_sources(config: &Config) -> Result<()> {
    let registry = SourceRegistry::from_config(config)?;

    println!("{:<10} {:<12} FIELDS", "SOURCE", "DIRECTIVE");
    for info in describe_sources(&registry) {
        println!(
            "{:<10} {:<12} {}",
            info.name,
            info.directive,
            info.fields.join(", ")
        );
    }

    let token = if config.sources.github.token().is_some() {
        "set"
    } else {
        "not set"
    };
    println!();
    println!("github endpoint: {}", config.sources.github.api_url);
    println!("github token ({}): {}", config.sources.github.token_env, token);
    println!("npm registry:    {}", config.sources.npm.registry_url);

    Ok(())
}
