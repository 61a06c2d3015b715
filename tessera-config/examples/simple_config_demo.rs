//! Simple configuration demo
//!
//! A minimal example describing a configuration once and reading it from a
//! YAML file layered under command-line arguments

use std::fs;
use std::time::Duration;
use tempfile::TempDir;
use tessera_config::descriptor::{duration, int, nested, port, string, url};
use tessera_config::{ConfigError, ConfigLoader, ConfigResult, ConfigSource};

#[derive(Debug, Clone)]
struct Settings {
    bind_address: String,
    port: u16,
    database_url: url::Url,
    max_connections: i32,
    timeout: Duration,
}

#[tokio::main]
async fn main() -> ConfigResult<()> {
    env_logger::init();
    println!("🚀 Simple Tessera Configuration Demo");

    // Create temporary directory for demo files
    let temp_dir = TempDir::new().map_err(|e| {
        ConfigError::ValidationError(format!("Failed to create temp directory: {}", e))
    })?;

    // Create a simple config file
    let config_path = temp_dir.path().join("config.yaml");
    let config_content = r#"
server:
  bind_address: "127.0.0.1"
  port: 8080
database:
  url: "sqlite:///tmp/tessera.db"
  max_connections: 10
"#;

    fs::write(&config_path, config_content).map_err(|e| {
        ConfigError::ValidationError(format!("Failed to write config file: {}", e))
    })?;

    let descriptor = nested("server", string("bind_address").zip(port("port")))
        .zip(nested(
            "database",
            url("url").zip(int("max_connections").with_default(5)),
        ))
        .zip(duration("timeout").with_default(Duration::from_secs(30)))
        .transform(
            |(((bind_address, port), (database_url, max_connections)), timeout)| Settings {
                bind_address,
                port,
                database_url,
                max_connections,
                timeout,
            },
            |s: &Settings| {
                (
                    (
                        (s.bind_address.clone(), s.port),
                        (s.database_url.clone(), s.max_connections),
                    ),
                    s.timeout,
                )
            },
        );

    // Load the configuration, letting the command line override the file
    let loader = ConfigLoader::with_prefix("TESSERA")
        .with_file(&config_path)
        .with_source(ConfigSource::from_command_line_args(
            ["--server.port", "9090", "--timeout", "45s"],
            Some('.'),
            None,
        ));
    let settings = loader.load(&descriptor).await?;

    println!("✅ Configuration loaded successfully!");
    println!("   Server: {}:{}", settings.bind_address, settings.port);
    println!(
        "   Database: {} ({} connections)",
        settings.database_url, settings.max_connections
    );
    println!("   Timeout: {}s", settings.timeout.as_secs());

    // Show what a broken configuration reports
    let broken = ConfigSource::from_yaml_str("server:\n  port: http\n");
    if let Err(error) = broken.read(&descriptor).await {
        println!("❌ {} problem(s) found:\n{}", error.len(), error);
    }

    Ok(())
}
