use crate::backends::Backends;
use crate::backends::simulation::{DEMO_TASK, DEMO_TITLE};
use crate::cli::{Cli, Commands};
use crate::config::{BackendMode, Config};
use crate::gateway::{AppState, run_gateway};
use crate::runner::RunLoop;
use crate::store::{NewRun, RunStore, SqliteRunStore};
use anyhow::{Context, Result, bail};
use std::sync::Arc;
use tracing::info;

use super::render::{render_run_detail, render_run_list};
use super::status::render_status;

async fn open_store(config: &Config) -> Result<Arc<dyn RunStore>> {
    let path = config.database_path();
    let store = SqliteRunStore::open(&path)
        .await
        .with_context(|| format!("open run store at {}", path.display()))?;
    Ok(Arc::new(store))
}

fn build_runner(config: &Config, store: Arc<dyn RunStore>) -> Result<RunLoop> {
    let backends = Backends::from_config(config)?;
    Ok(RunLoop::new(store, backends))
}

async fn execute_and_print(runner: &RunLoop, run_id: &str) -> Result<()> {
    info!(run_id, backend = %runner.backends().mode(), "executing run");
    let detail = runner.execute_run(run_id).await?;
    println!("{}", render_run_detail(&detail));
    Ok(())
}

pub async fn dispatch(cli: Cli, mut config: Config) -> Result<()> {
    if cli.simulate {
        config.backend = BackendMode::Simulation;
    }

    match cli.command {
        Commands::Status => {
            println!("{}", render_status(&config));
            Ok(())
        }

        Commands::Create {
            task,
            title,
            max_attempts,
            target_score,
        } => {
            if task.trim().is_empty() {
                bail!("--task must not be blank");
            }
            let store = open_store(&config).await?;
            let new_run = NewRun::new(
                title.as_deref(),
                &task,
                max_attempts.unwrap_or(config.runs.default_max_attempts),
                target_score.unwrap_or(config.runs.default_target_score),
            );
            let run = store.create_run(&new_run).await?;
            info!(run_id = %run.id, "run created");
            println!("{}", run.id);
            Ok(())
        }

        Commands::Execute { run_id } => {
            let store = open_store(&config).await?;
            let runner = build_runner(&config, store)?;
            execute_and_print(&runner, &run_id).await
        }

        Commands::Show { run_id, json } => {
            let store = open_store(&config).await?;
            let Some(detail) = store.load_run_detail(&run_id).await? else {
                bail!("run {run_id} not found");
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&detail)?);
            } else {
                println!("{}", render_run_detail(&detail));
            }
            Ok(())
        }

        Commands::List => {
            let store = open_store(&config).await?;
            let runs = store.list_runs().await?;
            println!("{}", render_run_list(&runs));
            Ok(())
        }

        Commands::Delete { run_id } => {
            let store = open_store(&config).await?;
            if !store.delete_run(&run_id).await? {
                bail!("run {run_id} not found");
            }
            println!("Deleted run {run_id}");
            Ok(())
        }

        Commands::Demo {
            max_attempts,
            target_score,
        } => {
            let store = open_store(&config).await?;
            let runner = build_runner(&config, Arc::clone(&store))?;
            let new_run = NewRun::new(Some(DEMO_TITLE), DEMO_TASK, max_attempts, target_score);
            let run = store.create_run(&new_run).await?;
            println!("Created demo run {}", run.id);
            execute_and_print(&runner, &run.id).await
        }

        Commands::Serve { port, host } => {
            let store = open_store(&config).await?;
            let port = port.unwrap_or(config.gateway.port);
            let host = host.unwrap_or_else(|| config.gateway.host.clone());
            let runner = build_runner(&config, store)?;
            if port == 0 {
                info!("Starting rulesmith gateway on {host} (random port)");
            } else {
                info!("Starting rulesmith gateway on {host}:{port}");
            }
            run_gateway(&host, port, AppState::new(runner, config.runs.clone())).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;
    use clap::Parser;
    use tempfile::TempDir;

    fn test_config(tmp: &TempDir) -> Config {
        let mut config = Config::default();
        config.workspace_dir = tmp.path().to_path_buf();
        config.config_path = tmp.path().join("config.toml");
        config.database_path = Some(tmp.path().join("runs.db"));
        config.simulation = SimulationConfig::instant();
        config
    }

    #[tokio::test]
    async fn create_then_execute_through_cli() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(&tmp);

        let cli = Cli::parse_from(["rulesmith", "create", "--task", "Reply to a refund request."]);
        dispatch(cli, config.clone()).await.unwrap();

        let store = open_store(&config).await.unwrap();
        let runs = store.list_runs().await.unwrap();
        assert_eq!(runs.len(), 1);

        let cli = Cli::parse_from(["rulesmith", "execute", runs[0].id.as_str()]);
        dispatch(cli, config.clone()).await.unwrap();

        let detail = store.load_run_detail(&runs[0].id).await.unwrap().unwrap();
        assert_eq!(detail.attempts.len(), 4);
    }

    #[tokio::test]
    async fn simulate_flag_overrides_live_backend() {
        let tmp = TempDir::new().unwrap();
        let mut config = test_config(&tmp);
        config.backend = BackendMode::Live;

        let cli = Cli::parse_from(["rulesmith", "demo", "--max-attempts", "2"]);
        let err = dispatch(cli, config.clone()).await.unwrap_err();
        assert!(err.to_string().contains("API key"));

        let cli = Cli::parse_from(["rulesmith", "--simulate", "demo", "--max-attempts", "2"]);
        dispatch(cli, config).await.unwrap();
    }

    #[tokio::test]
    async fn status_does_not_open_the_store() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(&tmp);

        let cli = Cli::parse_from(["rulesmith", "status"]);
        dispatch(cli, config.clone()).await.unwrap();
        assert!(!config.database_path().exists());
    }

    #[tokio::test]
    async fn show_and_delete_unknown_run_fail() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(&tmp);

        let cli = Cli::parse_from(["rulesmith", "show", "missing"]);
        assert!(dispatch(cli, config.clone()).await.is_err());

        let cli = Cli::parse_from(["rulesmith", "delete", "missing"]);
        assert!(dispatch(cli, config).await.is_err());
    }
}
