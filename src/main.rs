use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use rtd_config_assistant::{
    migrate_repository, AssistantError, AssistantOutcome, AssistantSettings, GitHubForge,
    MigratorRegistry, RepoId, SchemaProvider, DEFAULT_SCHEMA_URL,
};

#[derive(Parser, Debug)]
#[command(name = "rtd-assistant")]
#[command(about = "Upgrade deprecated Read the Docs configuration via pull requests")]
struct Args {
    /// Owner of the repository to migrate
    owner: String,

    /// Name of the repository to migrate
    repository: String,

    /// Migrators to apply, in order
    #[arg(long = "migrator", value_name = "NAME", default_values_t = [String::from("use_build_tools")])]
    migrators: Vec<String>,

    /// GitHub token (defaults to the GH_TOKEN environment variable)
    #[arg(long, value_name = "TOKEN")]
    token: Option<String>,

    /// URL of the configuration schema
    #[arg(long, value_name = "URL", default_value = DEFAULT_SCHEMA_URL)]
    schema_url: String,

    /// Branch to commit the update to in the fork
    #[arg(long, value_name = "NAME", default_value = "assistant-update-config")]
    branch_name: String,

    /// Actually fork, commit and open a pull request (default is a dry run)
    #[arg(long)]
    execute: bool,

    /// Abort when the existing config does not validate, instead of
    /// migrating it anyway
    #[arg(long)]
    strict: bool,

    /// List the available migrators and exit
    #[arg(long)]
    list_migrators: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rtd_config_assistant=info".into()),
        )
        .init();

    let args = Args::parse();
    if let Err(err) = run(args).await {
        eprintln!("Error: {err}");
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), AssistantError> {
    let registry = MigratorRegistry::builtin();

    if args.list_migrators {
        for name in registry.names() {
            let migrator = registry.get(name)?;
            println!("{name}: {}", migrator.title());
        }
        return Ok(());
    }

    let token = args
        .token
        .or_else(|| std::env::var("GH_TOKEN").ok())
        .unwrap_or_default();
    let forge = GitHubForge::new(token);
    let schema = SchemaProvider::new(args.schema_url);
    let repo = RepoId::new(args.owner, args.repository);
    let settings = AssistantSettings {
        branch_name: args.branch_name,
        dry_run: !args.execute,
        strict_validation: args.strict,
        ..AssistantSettings::default()
    };

    let outcome = migrate_repository(
        &forge,
        &schema,
        &registry,
        &repo,
        &args.migrators,
        &settings,
    )
    .await?;

    match outcome {
        AssistantOutcome::NoChange { .. } => {
            println!("{repo}: configuration is already up to date");
        }
        AssistantOutcome::Preview { diff, .. } => {
            println!("{repo}: proposed changes (dry run, pass --execute to publish):\n");
            print!("{diff}");
        }
        AssistantOutcome::Published {
            pull_request_url, ..
        } => {
            println!("{repo}: opened {pull_request_url}");
        }
    }

    Ok(())
}
