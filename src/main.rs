mod breaker;
mod cache;
mod cli;
mod config;
mod error;
mod executor;
mod genai;
mod job;
mod limiter;
mod logger;
mod orchestrator;
mod store;
mod ui;
mod validator;

use anyhow::{Result, bail};
use clap::Parser;

use crate::cli::{Cli, Command};
use crate::config::EngineConfig;
use crate::genai::{GenAiClient, StubGenerator, TextGenerator};
use crate::job::JobConfig;
use crate::orchestrator::Orchestrator;
use crate::ui::JobProgress;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = EngineConfig::load()?;

    if matches!(cli.command, Command::Demo) {
        let orchestrator = Orchestrator::new(StubGenerator, config)?;
        return dispatch(&orchestrator, &cli).await;
    }

    if config.api_key.is_empty() {
        bail!(
            "no API key configured; set COURSEGEN_API_KEY or add api_key to coursegen.toml"
        );
    }
    let client = GenAiClient::new(config.api_key.clone());
    let orchestrator = Orchestrator::new(client, config)?;
    dispatch(&orchestrator, &cli).await
}

async fn dispatch<C: TextGenerator>(orchestrator: &Orchestrator<C>, cli: &Cli) -> Result<()> {
    match &cli.command {
        Command::Submit {
            title,
            file,
            audience,
            depth,
            duration_weeks,
            modules,
            lessons,
            assessments,
            run,
        } => {
            let mut config = match file {
                Some(path) => toml::from_str::<JobConfig>(&std::fs::read_to_string(path)?)?,
                None => match title {
                    Some(title) => JobConfig {
                        title: title.clone(),
                        ..Default::default()
                    },
                    None => bail!("either a title or --file is required"),
                },
            };
            if let Some(audience) = audience {
                config.audience = Some(audience.clone());
            }
            if let Some(depth) = depth {
                config.depth = depth.clone();
            }
            if let Some(weeks) = duration_weeks {
                config.duration_weeks = *weeks;
            }
            if let Some(modules) = modules {
                config.module_count = *modules;
            }
            if let Some(lessons) = lessons {
                config.lessons_per_module = *lessons;
            }
            if *assessments {
                config.include_assessments = true;
            }

            let job = orchestrator.submit(&cli.owner, cli.role.into(), config)?;
            println!("job {} queued ({})", job.id, job.config.title);
            if *run {
                run_job(orchestrator, &job.id, cli.verbose).await?;
            }
        }

        Command::Run { job_id } => {
            run_job(orchestrator, job_id, cli.verbose).await?;
        }

        Command::Resume => {
            let finished = orchestrator.resume().await?;
            if finished.is_empty() {
                println!("nothing to resume");
            }
            for job in finished {
                println!(
                    "job {} ({}) finished: {} at {}%",
                    job.id, job.config.title, job.status, job.progress
                );
            }
        }

        Command::Status { job_id } => {
            let (job, tasks) = orchestrator.status(job_id)?;
            ui::print_status(&job, &tasks);
        }

        Command::Demo => {
            let config = JobConfig {
                title: "Introduction to Systems Programming".into(),
                module_count: 2,
                lessons_per_module: 2,
                include_assessments: true,
                ..Default::default()
            };
            let job = orchestrator.submit(&cli.owner, cli.role.into(), config)?;
            println!("demo job {} queued", job.id);
            run_job(orchestrator, &job.id, true).await?;
        }
    }
    Ok(())
}

async fn run_job<C: TextGenerator>(
    orchestrator: &Orchestrator<C>,
    job_id: &str,
    verbose: bool,
) -> Result<()> {
    let (job, _) = orchestrator.status(job_id)?;
    let progress = JobProgress::start(&job.config.title);
    let job = orchestrator.run(job_id).await?;
    progress.complete(&job);

    if verbose {
        let (job, tasks) = orchestrator.status(&job.id)?;
        ui::print_status(&job, &tasks);
    }
    Ok(())
}
