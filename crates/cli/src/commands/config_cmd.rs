//! `tandem config` - Configuration management commands.

use tandem_config::AppConfig;

pub async fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   ✅ Config parsed successfully");

            let mut warnings = Vec::new();

            if !config.has_api_key() {
                warnings.push("No API key set (set TANDEM_API_KEY or OPENAI_API_KEY env var)");
            }

            if !config.control.persist_history && config.trace.enabled {
                warnings.push("Tracing is enabled but history is not persisted");
            }

            if warnings.is_empty() {
                println!("   ✅ All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   ⚠️  {w}");
                }
            }

            println!();
            println!("   Endpoint:        {}", config.api_url);
            println!("   Model:           {}", config.model);
            println!("   Max iterations:  {}", config.control.max_iterations);
            println!("   Carry answers:   {}", config.control.carry_answers);
            println!("   Tracing:         {}", config.trace.enabled);
        }
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    println!("{}", config.redacted_toml());
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = AppConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
    Ok(())
}
