//! RG-012: CLI subcommands — init, validate, generate, deploy, status.

use crate::core::error::DeployError;
use crate::core::executor::Deployer;
use crate::core::{codegen, parser, state, types};
use crate::journal::eventlog::{self, EventLog};
use crate::transport::local::CommandRunner;
use clap::Subcommand;
use std::path::{Path, PathBuf};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new rigger project
    Init {
        /// Directory to initialize (default: current)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Validate rigger.yaml without running anything
    Validate {
        /// Path to rigger.yaml
        #[arg(short, long, default_value = "rigger.yaml")]
        file: PathBuf,
    },

    /// Write the project and stage scripts without invoking the runner
    Generate {
        /// Path to rigger.yaml
        #[arg(short, long, default_value = "rigger.yaml")]
        file: PathBuf,

        /// Stage to generate
        #[arg(short, long)]
        stage: String,

        /// Host id to leave out of the role list (repeatable)
        #[arg(long = "exclude-host")]
        exclude_hosts: Vec<String>,

        /// Answer for a prompted parameter, as key=value (repeatable)
        #[arg(long = "prompt", value_parser = parse_key_val)]
        prompts: Vec<(String, String)>,
    },

    /// Generate scripts and run a task through the task runner
    Deploy {
        /// Path to rigger.yaml
        #[arg(short, long, default_value = "rigger.yaml")]
        file: PathBuf,

        /// Stage to deploy
        #[arg(short, long)]
        stage: String,

        /// Task to invoke
        #[arg(short, long, default_value = "deploy")]
        task: String,

        /// Host id to leave out of the role list (repeatable)
        #[arg(long = "exclude-host")]
        exclude_hosts: Vec<String>,

        /// Answer for a prompted parameter, as key=value (repeatable)
        #[arg(long = "prompt", value_parser = parse_key_val)]
        prompts: Vec<(String, String)>,

        /// Runner variable set after the stage loads, as key=value
        #[arg(long = "set", value_parser = parse_key_val)]
        vars: Vec<(String, String)>,

        /// Runner variable set before the stage loads, as key=value
        #[arg(long = "pre-set", value_parser = parse_key_val)]
        pre_vars: Vec<(String, String)>,

        /// Extra recipe file for the runner to load (repeatable)
        #[arg(long = "recipe")]
        recipes: Vec<String>,

        /// Journal verbosity, 0 (important only) to 3 (trace)
        #[arg(short, long, default_value_t = 3)]
        verbose: u8,

        /// Deployment id (default: generated)
        #[arg(long)]
        id: Option<String>,
    },

    /// List recorded deployments
    Status {
        /// Path to rigger.yaml
        #[arg(short, long, default_value = "rigger.yaml")]
        file: PathBuf,

        /// Only show deployments of this stage
        #[arg(short, long)]
        stage: Option<String>,
    },
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<(), DeployError> {
    match cmd {
        Commands::Init { path } => cmd_init(&path),
        Commands::Validate { file } => cmd_validate(&file),
        Commands::Generate {
            file,
            stage,
            exclude_hosts,
            prompts,
        } => {
            let target = Target {
                stage,
                exclude_hosts,
                prompts,
            };
            cmd_generate(&file, &target)
        }
        Commands::Deploy {
            file,
            stage,
            task,
            exclude_hosts,
            prompts,
            vars,
            pre_vars,
            recipes,
            verbose,
            id,
        } => {
            let target = Target {
                stage,
                exclude_hosts,
                prompts,
            };
            let options = types::RunOptions {
                recipes,
                actions: Vec::new(),
                vars: vars.into_iter().collect(),
                pre_vars: pre_vars.into_iter().collect(),
                verbose,
            };
            cmd_deploy(&file, &target, &task, id, options)
        }
        Commands::Status { file, stage } => cmd_status(&file, stage.as_deref()),
    }
}

/// Stage selection shared by generate and deploy.
struct Target {
    stage: String,
    exclude_hosts: Vec<String>,
    prompts: Vec<(String, String)>,
}

impl Target {
    fn deployment(&self, id: &str, task: &str) -> types::Deployment {
        let mut deployment = types::Deployment::new(id, &self.stage, task);
        deployment.excluded_host_ids.clone_from(&self.exclude_hosts);
        deployment.prompt_config = self.prompts.iter().cloned().collect();
        deployment
    }
}

/// Parse a `key=value` argument.
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", s))?;
    if key.trim().is_empty() {
        return Err(format!("empty key in '{}'", s));
    }
    Ok((key.trim().to_string(), value.to_string()))
}

fn cmd_init(path: &Path) -> Result<(), DeployError> {
    let config_path = path.join("rigger.yaml");
    if config_path.exists() {
        return Err(DeployError::Validation(format!(
            "{} already exists",
            config_path.display()
        )));
    }

    let state_dir = path.join("state");
    std::fs::create_dir_all(&state_dir)
        .map_err(|e| DeployError::io("cannot create state dir", &state_dir, e))?;

    let template = r#"version: "1.0"

hosts: {}

project:
  name: my-app
  parameters:
    - name: user
      value: deploy
  stages: []
"#;
    std::fs::write(&config_path, template)
        .map_err(|e| DeployError::io("cannot write", &config_path, e))?;

    println!("Initialized rigger project at {}", path.display());
    println!("  Created: {}", config_path.display());
    println!("  Created: {}/", state_dir.display());
    Ok(())
}

fn cmd_validate(file: &Path) -> Result<(), DeployError> {
    let config = parse_and_validate(file)?;
    let roles: usize = config.project.stages.iter().map(|s| s.roles.len()).sum();
    println!(
        "OK: {} ({} hosts, {} stages, {} roles)",
        config.project.name,
        config.hosts.len(),
        config.project.stages.len(),
        roles
    );
    Ok(())
}

/// Parse and validate a rigger config file, printing every validation error.
fn parse_and_validate(file: &Path) -> Result<types::RiggerConfig, DeployError> {
    let config = parser::parse_config_file(file)?;
    let errors = parser::validate_config(&config);
    if errors.is_empty() {
        return Ok(config);
    }
    for e in &errors {
        eprintln!("  ERROR: {}", e);
    }
    Err(DeployError::Validation(format!(
        "{} validation error(s)",
        errors.len()
    )))
}

fn find_stage<'a>(
    config: &'a types::RiggerConfig,
    name: &str,
) -> Result<&'a types::Stage, DeployError> {
    config.project.stage(name).ok_or_else(|| {
        DeployError::Validation(format!(
            "stage '{}' does not exist in project '{}'",
            name, config.project.name
        ))
    })
}

fn cmd_generate(file: &Path, target: &Target) -> Result<(), DeployError> {
    let config = parse_and_validate(file)?;
    let stage = find_stage(&config, &target.stage)?;
    let deployment = target.deployment(&eventlog::generate_run_id(), "deploy");

    let project_dir = codegen::project_dir(&config.settings.root, &config.project);
    std::fs::create_dir_all(&project_dir)
        .map_err(|e| DeployError::io("cannot create project dir", &project_dir, e))?;

    let paths = codegen::artifact_paths(&project_dir, stage);
    let project_script = codegen::project_script(&config.project, stage, &deployment);
    let stage_script =
        codegen::stage_script(&config.project, stage, &config.hosts, &deployment)?;

    codegen::write_artifact(&paths.project_script, &project_script)?;
    codegen::write_artifact(&paths.stage_script, &stage_script)?;

    println!("Generated {} / {}", config.project.name, stage.name);
    println!("  Wrote: {}", paths.project_script.display());
    println!("  Wrote: {}", paths.stage_script.display());
    Ok(())
}

fn cmd_deploy(
    file: &Path,
    target: &Target,
    task: &str,
    id: Option<String>,
    options: types::RunOptions,
) -> Result<(), DeployError> {
    let config = parse_and_validate(file)?;
    let id = id.unwrap_or_else(eventlog::generate_run_id);
    let deployment = target.deployment(&id, task);

    let logger = EventLog::new(
        &config.settings.state_dir,
        &config.project.dir_name(),
        &id,
        types::LogLevel::from_verbosity(options.verbose),
    );
    let runner = CommandRunner::new(config.settings.runner.clone());

    let mut deployer = Deployer::new(&config, deployment, runner, logger)?.with_options(options);
    deployer.save_pid()?;

    println!(
        "Deploying {} to {} ({}), deployment {}",
        config.project.name, target.stage, task, id
    );
    let succeeded = deployer.invoke_task();

    if let Some(output) = deployer.output() {
        print!("{}", output);
    }
    println!("Journal: {}", deployer.logger().path().display());

    let status = deployer.deployment().status;
    println!("Deployment {}: {}", id, status);
    if succeeded {
        Ok(())
    } else {
        Err(DeployError::RunFailed(format!("deployment {} {}", id, status)))
    }
}

fn cmd_status(file: &Path, stage_filter: Option<&str>) -> Result<(), DeployError> {
    let config = parser::parse_config_file(file)?;
    let deployments =
        state::list_deployments(&config.settings.state_dir, &config.project.dir_name())?;

    let shown: Vec<&types::Deployment> = deployments
        .iter()
        .filter(|d| stage_filter.is_none_or(|s| d.stage == s))
        .collect();

    if shown.is_empty() {
        println!("No deployments recorded.");
        return Ok(());
    }

    println!("Project: {}", config.project.name);
    for d in shown {
        let completed = d
            .completed_at
            .as_deref()
            .map(|t| format!(" -> {}", t))
            .unwrap_or_default();
        println!(
            "  {}: {} {} [{}] {}{}",
            d.id, d.stage, d.task, d.status, d.created_at, completed
        );
        if !d.excluded_host_ids.is_empty() {
            println!("    excluded: {}", d.excluded_host_ids.join(", "));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
version: "1.0"
settings:
  root: ROOT/projects
  state_dir: ROOT/state
  runner:
    command: COMMAND
hosts:
  web1:
    name: web1.example.com
  web2:
    name: web2.example.com
project:
  name: Shop
  parameters:
    - name: user
      value: deploy
    - name: repo_url
      value: git@example.com:shop.git
  stages:
    - name: production
      roles:
        - name: app
          host: web1
        - name: db
          host: web2
      parameters:
        - name: branch
          prompt: true
"#;

    fn write_config(dir: &Path, command: &str) -> PathBuf {
        let path = dir.join("rigger.yaml");
        let yaml = CONFIG
            .replace("ROOT", &dir.display().to_string())
            .replace("COMMAND", command);
        std::fs::write(&path, yaml).unwrap();
        path
    }

    fn target(stage: &str) -> Target {
        Target {
            stage: stage.to_string(),
            exclude_hosts: Vec::new(),
            prompts: vec![("branch".to_string(), "main".to_string())],
        }
    }

    #[cfg(unix)]
    fn fake_runner(dir: &Path, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("fake-cap.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().to_string()
    }

    #[test]
    fn test_rg012_parse_key_val() {
        assert_eq!(
            parse_key_val("branch=main").unwrap(),
            ("branch".to_string(), "main".to_string())
        );
        assert_eq!(
            parse_key_val("opts=a=b").unwrap(),
            ("opts".to_string(), "a=b".to_string())
        );
        assert_eq!(parse_key_val("empty=").unwrap().1, "");
        assert!(parse_key_val("novalue").is_err());
        assert!(parse_key_val("=x").is_err());
    }

    #[test]
    fn test_rg012_init() {
        let dir = tempfile::tempdir().unwrap();
        cmd_init(dir.path()).unwrap();
        assert!(dir.path().join("rigger.yaml").exists());
        assert!(dir.path().join("state").is_dir());
        cmd_validate(&dir.path().join("rigger.yaml")).unwrap();
    }

    #[test]
    fn test_rg012_init_already_exists() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("rigger.yaml"), "x").unwrap();
        assert!(matches!(
            cmd_init(dir.path()),
            Err(DeployError::Validation(_))
        ));
    }

    #[test]
    fn test_rg012_validate_valid() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_config(dir.path(), "cap");
        cmd_validate(&file).unwrap();
    }

    #[test]
    fn test_rg012_validate_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_config(dir.path(), "cap");
        let yaml = std::fs::read_to_string(&file)
            .unwrap()
            .replace("host: web2", "host: ghost");
        std::fs::write(&file, yaml).unwrap();
        let err = cmd_validate(&file).unwrap_err();
        assert!(err.to_string().contains("1 validation error(s)"));
    }

    #[test]
    fn test_rg012_generate() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_config(dir.path(), "cap");
        let mut t = target("production");
        t.exclude_hosts.push("web2".to_string());
        cmd_generate(&file, &t).unwrap();

        let project_dir = dir.path().join("projects/shop");
        let deploy_rb = std::fs::read_to_string(project_dir.join("deploy.rb")).unwrap();
        assert_eq!(
            deploy_rb,
            "set :user, 'deploy'\n\
             set :repo_url, 'git@example.com:shop.git'\n\
             after 'production', :custom_log\n\
             after 'deploy:started', :custom_log\n\
             after 'deploy:updated', :custom_log\n\
             after 'deploy:published', :custom_log\n\
             after 'deploy:finished', :custom_log\n"
        );
        let stage_rb = std::fs::read_to_string(project_dir.join("production.rb")).unwrap();
        assert_eq!(
            stage_rb,
            "role :app, %w{deploy@web1.example.com}\nset :branch, 'main'\n"
        );
        assert!(!project_dir.join("Capfile").exists());
    }

    #[test]
    fn test_rg012_generate_unknown_stage() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_config(dir.path(), "cap");
        assert!(matches!(
            cmd_generate(&file, &target("qa")),
            Err(DeployError::Validation(_))
        ));
    }

    #[test]
    fn test_rg012_deploy_runner_missing() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_config(dir.path(), "rigger-no-such-runner-binary");
        let result = cmd_deploy(
            &file,
            &target("production"),
            "deploy",
            Some("d-missing".to_string()),
            types::RunOptions::default(),
        );
        assert!(matches!(result, Err(DeployError::RunFailed(_))));

        let config = parser::parse_config_file(&file).unwrap();
        let saved = state::load_deployment(&config.settings.state_dir, "shop", "d-missing")
            .unwrap()
            .unwrap();
        assert_eq!(saved.status, types::DeploymentStatus::Failed);
        assert_eq!(saved.pid, Some(std::process::id()));
    }

    #[cfg(unix)]
    #[test]
    fn test_rg012_deploy_with_fake_runner() {
        let dir = tempfile::tempdir().unwrap();
        let command = fake_runner(dir.path(), "echo \"cap $*\"");
        let file = write_config(dir.path(), &command);
        let options = types::RunOptions {
            vars: [("branch".to_string(), "main".to_string())].into_iter().collect(),
            ..types::RunOptions::default()
        };
        cmd_deploy(
            &file,
            &target("production"),
            "deploy",
            Some("d-fake".to_string()),
            options,
        )
        .unwrap();

        let config = parser::parse_config_file(&file).unwrap();
        let saved = state::load_deployment(&config.settings.state_dir, "shop", "d-fake")
            .unwrap()
            .unwrap();
        assert_eq!(saved.status, types::DeploymentStatus::Succeeded);

        let events = eventlog::read_events(&config.settings.state_dir, "shop", "d-fake").unwrap();
        assert!(events.iter().any(|e| matches!(
            e.event,
            types::RunEvent::RunCompleted {
                outcome: types::RunOutcome::Succeeded,
                ..
            }
        )));
        assert!(dir.path().join("projects/shop/Capfile").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_rg012_deploy_failure_exits_nonzero() {
        let dir = tempfile::tempdir().unwrap();
        let command = fake_runner(dir.path(), "echo 'boom' >&2; exit 3");
        let file = write_config(dir.path(), &command);
        let err = cmd_deploy(
            &file,
            &target("production"),
            "deploy",
            Some("d-boom".to_string()),
            types::RunOptions::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("FAILED"));
    }

    #[test]
    fn test_rg012_status_empty() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_config(dir.path(), "cap");
        cmd_status(&file, None).unwrap();
    }

    #[test]
    fn test_rg012_status_with_records() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_config(dir.path(), "cap");
        let config = parser::parse_config_file(&file).unwrap();
        let mut d = types::Deployment::new("d-1", "production", "deploy");
        d.complete_successfully();
        state::save_deployment(&config.settings.state_dir, "shop", &d).unwrap();
        cmd_status(&file, Some("production")).unwrap();
        cmd_status(&file, Some("qa")).unwrap();
    }

    #[test]
    fn test_rg012_dispatch_validate() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_config(dir.path(), "cap");
        dispatch(Commands::Validate { file }).unwrap();
    }

    #[test]
    fn test_rg012_dispatch_generate() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_config(dir.path(), "cap");
        dispatch(Commands::Generate {
            file,
            stage: "production".to_string(),
            exclude_hosts: vec!["web1".to_string()],
            prompts: Vec::new(),
        })
        .unwrap();
        let stage_rb =
            std::fs::read_to_string(dir.path().join("projects/shop/production.rb")).unwrap();
        assert_eq!(stage_rb, "role :db, %w{deploy@web2.example.com}\n");
    }
}
