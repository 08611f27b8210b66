use crate::config::{BackendMode, Config};

pub fn render_status(config: &Config) -> String {
    let mut lines = vec![
        "◆ rulesmith status".to_string(),
        String::new(),
        format!("Version     {}", env!("CARGO_PKG_VERSION")),
        format!("Workspace   {}", config.workspace_dir.display()),
        format!("Config      {}", config.config_path.display()),
        format!("Database    {}", config.database_path().display()),
        String::new(),
        format!("Backend     {}", config.backend),
    ];

    match config.backend {
        BackendMode::Live => {
            lines.push(format!("  Endpoint    {}", config.llm.normalized_base_url()));
            lines.push(format!("  Model       {}", config.llm.model));
            lines.push(format!(
                "  API key     {}",
                if config.llm.resolved_api_key().is_some() {
                    "set"
                } else {
                    "missing (live runs will fail)"
                }
            ));
            lines.push(format!(
                "  Sampling    generate={:.2} evaluate={:.2} patch={:.2}",
                config.llm.generate_temperature,
                config.llm.evaluate_temperature,
                config.llm.patch_temperature
            ));
        }
        BackendMode::Simulation => {
            lines.push(format!(
                "  Delays      generate={}ms evaluate={}ms patch={}ms",
                config.simulation.generate_delay_ms,
                config.simulation.evaluate_delay_ms,
                config.simulation.patch_delay_ms
            ));
        }
    }

    lines.extend([
        String::new(),
        format!(
            "Run defaults max_attempts={}, target_score={}",
            config.runs.default_max_attempts, config.runs.default_target_score
        ),
        format!(
            "Gateway     {}:{}",
            config.gateway.host, config.gateway.port
        ),
    ]);

    lines.join("\n")
}
