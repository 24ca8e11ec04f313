//! Stratum CLI - Layered Sample Repository
//!
//! Command-line interface for the Stratum sample management system.

use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use log::info;

use stratum::cli::{commands, Cli, Commands};

fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    info!("Stratum v{}", env!("CARGO_PKG_VERSION"));

    let repo = cli.repo.as_path();
    match cli.command {
        Some(cmd) => handle_command(cmd, repo)
            .with_context(|| format!("repository: {}", repo.display())),
        None => {
            println!("Stratum v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
            Ok(())
        }
    }
}

fn handle_command(cmd: Commands, repo: &std::path::Path) -> anyhow::Result<()> {
    match cmd {
        Commands::Init => commands::init(repo)?,
        Commands::Attributes => commands::attributes(repo)?,
        Commands::AddAttribute { name, kind, unit } => {
            commands::add_attribute(repo, &name, &kind, unit.as_deref())?
        }
        Commands::Import { core, file, source } => {
            commands::import(repo, &core, &file, source.as_deref())?
        }
        Commands::Cores => commands::cores(repo)?,
        Commands::Show { core } => commands::show(repo, &core)?,
        Commands::Browse {
            core,
            view,
            filter,
            search,
            exact,
            sort_by,
            then_by,
            descending,
            export,
        } => commands::browse(
            repo,
            &commands::BrowseArgs {
                core: &core,
                view: &view,
                filter: filter.as_deref(),
                search: search.as_deref(),
                exact,
                sort_by: &sort_by,
                then_by: &then_by,
                descending,
                export: export.as_deref(),
            },
        )?,
        Commands::AddWorkflow { name, file } => commands::add_workflow(repo, &name, &file)?,
        Commands::AddPlan {
            name,
            workflow,
            description,
        } => commands::add_plan(repo, &name, &workflow, description.as_deref())?,
        Commands::Plans => commands::plans(repo)?,
        Commands::Run { core, plan } => commands::run(repo, &core, &plan)?,
        Commands::Strip { core, plan } => commands::strip(repo, &core, &plan)?,
        Commands::DeleteSample { core, depth } => commands::delete_sample(repo, &core, depth)?,
    }
    Ok(())
}
