use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use branchtally_core::{IdentityPolicy, OutputFormat, TallyConfig, TimeRange};
use branchtally_github::client::{env_token, first_token, GitHubClient, RepoRef};
use branchtally_gitpulse::aggregate::{aggregate, AggregateOptions};
use branchtally_gitpulse::mining::LocalRepository;
use branchtally_gitpulse::patterns;
use clap::{CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use miette::{IntoDiagnostic, Result, WrapErr};
use tracing::{debug, warn};

mod render;

use render::RepoTally;

#[derive(Parser)]
#[command(
    name = "branchtally",
    version,
    about = "Count unique commits per contributor across branches",
    long_about = "branchtally counts each contributor's commits across every branch of a repository,\n\
                  collapsing duplicates (cherry-picks, rebases, branch copies) so every unique\n\
                  change is credited once, to the first branch that carries it.\n\n\
                  Examples:\n  \
                    branchtally count --path .                    Tally the local repository\n  \
                    branchtally count --repo acme/api --detailed  Tally a GitHub repository\n  \
                    branchtally investigate --user alice          Look for suspicious patterns\n  \
                    branchtally init                              Create a .branchtally.toml"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (default: .branchtally.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        global = true,
        default_value = "text",
        long_help = "Output format for command results.\n\n\
                       Formats:\n  \
                         text      Human-readable tables and summaries (default)\n  \
                         json      Machine-readable JSON with camelCase keys\n  \
                         markdown  GitHub-flavored Markdown"
    )]
    format: OutputFormat,

    /// Enable debug logging (RUST_LOG overrides)
    #[arg(long, short, global = true)]
    verbose: bool,

    /// GitHub token (default: GITHUB_TOKEN or GH_TOKEN env var)
    #[arg(long, global = true)]
    github_token: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Count unique commits per contributor
    #[command(long_about = "Count unique commits per contributor.\n\n\
        Walks every branch (or the selected ones), drops merge commits, and deduplicates\n\
        commits by author, message, and tree. Each unique commit is credited to the first\n\
        branch that contains it; main/master are processed first.\n\n\
        Locally, remote-tracking branches (origin/feature) are counted after local ones\n\
        unless a local branch of the same name exists.\n\n\
        Uses GitHub when repositories are given (flag or config), otherwise the local\n\
        repository at --path.\n\n\
        Examples:\n  branchtally count\n  branchtally count --repo api --org acme --detailed\n  branchtally count --identity hash --output tally.json")]
    Count {
        /// GitHub repository (owner/repo, or repo with --org); repeatable
        #[arg(long)]
        repo: Vec<String>,

        /// Owner for bare repository names
        #[arg(long)]
        org: Option<String>,

        /// Local repository path (default: current directory)
        #[arg(long, default_value = ".")]
        path: PathBuf,

        /// Branch to analyze, in processing order; repeatable (default: all)
        #[arg(long)]
        branch: Vec<String>,

        /// Show per-branch breakdown for every contributor
        #[arg(long)]
        detailed: bool,

        /// Count merge commits instead of excluding them
        #[arg(long)]
        include_merge_commits: bool,

        /// Commit identity: content (author, message, tree) or hash
        #[arg(long)]
        identity: Option<IdentityPolicy>,

        /// Also write JSON results to this file
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Analyze one contributor's commits for suspicious patterns
    #[command(long_about = "Analyze one contributor's commits for suspicious patterns.\n\n\
        Collects every commit by the user across all branches (no deduplication) and\n\
        checks duplicate messages, daily rate, commit gaps, and branch spread.\n\n\
        Examples:\n  branchtally investigate --user alice\n  branchtally investigate --user octocat --repo acme/api")]
    Investigate {
        /// Author name (local) or login (GitHub) to investigate
        #[arg(long)]
        user: String,

        /// GitHub repository (owner/repo, or repo with --org)
        #[arg(long)]
        repo: Option<String>,

        /// Owner for a bare repository name
        #[arg(long)]
        org: Option<String>,

        /// Local repository path (default: current directory)
        #[arg(long, default_value = ".")]
        path: PathBuf,

        /// Branch to include; repeatable (default: all)
        #[arg(long)]
        branch: Vec<String>,
    },
    /// Create a default .branchtally.toml configuration file
    #[command(long_about = "Create a default .branchtally.toml configuration file.\n\n\
        Generates a commented template with all available options.\n\
        Fails if .branchtally.toml already exists.")]
    Init,
    /// Generate shell completion scripts
    #[command(hide = true)]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

const DEFAULT_CONFIG: &str = r#"# branchtally configuration

# Owner for bare repository names
# organization = "acme"

# GitHub repositories; when empty, `count` uses the local repository
# repositories = ["api", "octo/web"]

# Branches in processing order; empty means all (main/master first)
# branches = ["main", "develop"]

# exclude_merge_commits = true

# "content" collapses cherry-picks and rebases; "hash" counts every object
# identity = "content"

# Named windows, start inclusive and end exclusive; none means "All Time"
# [[time_ranges]]
# name = "Q1 2024"
# start_date = "2024-01-01"
# end_date = "2024-04-01"

[github]
# token = "ghp_..."
# per_page = 100
# concurrency = 4

[patterns]
# max_commits_per_day = 20.0
# min_gap_seconds = 60.0
# uniform_variance = 100.0
# min_branches_for_uniformity = 10
"#;

const CONFIG_FILE: &str = ".branchtally.toml";

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<TallyConfig> {
    let config = match path {
        Some(path) => TallyConfig::from_file(path)?,
        None => {
            let default_path = Path::new(CONFIG_FILE);
            if default_path.exists() {
                TallyConfig::from_file(default_path)?
            } else {
                TallyConfig::default()
            }
        }
    };
    Ok(config)
}

fn branch_progress(len: usize, label: &str) -> Option<ProgressBar> {
    if !std::io::stderr().is_terminal() {
        return None;
    }
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) =
        ProgressStyle::with_template("{spinner:.cyan} {msg} [{bar:30.cyan/blue}] {pos}/{len} branches")
    {
        pb.set_style(style.progress_chars("=> "));
    }
    pb.set_message(label.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(120));
    Some(pb)
}

/// Where commit streams come from.
enum Source {
    Local(PathBuf),
    GitHub(Vec<RepoRef>),
}

fn github_client(cli_token: Option<&str>, config: &TallyConfig) -> Result<GitHubClient> {
    let token = github_token(cli_token, env_token(), config.github.token.as_deref());
    Ok(GitHubClient::new(token.as_deref(), config.github.per_page)?)
}

/// --github-token, then GITHUB_TOKEN / GH_TOKEN, then the config file.
/// Blank values fall through to the next source.
fn github_token(cli: Option<&str>, env: Option<String>, config: Option<&str>) -> Option<String> {
    first_token([cli.map(str::to_string), env, config.map(str::to_string)])
}

fn count_local(
    path: &Path,
    selected: &[String],
    ranges: &[TimeRange],
    options: &AggregateOptions,
) -> Result<RepoTally> {
    let repo = LocalRepository::open(path)?;
    let branches = if selected.is_empty() {
        repo.branches()?
    } else {
        selected.to_vec()
    };
    debug!(path = %path.display(), branches = branches.len(), "counting local repository");

    let name = std::fs::canonicalize(path)
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| path.display().to_string());

    let mut tally = RepoTally {
        name,
        ranges: Vec::new(),
    };
    for range in ranges {
        let options = AggregateOptions {
            time_range: range.clone(),
            ..options.clone()
        };
        let progress = branch_progress(branches.len(), &format!("{} ({})", tally.name, range.name));
        let result = aggregate(
            &branches,
            |branch: &str| {
                if let Some(pb) = &progress {
                    pb.set_message(format!("{} ({}): {branch}", tally.name, range.name));
                }
                let commits = repo.branch_commits(branch, range);
                if let Some(pb) = &progress {
                    pb.inc(1);
                }
                commits
            },
            &options,
        );
        if let Some(pb) = progress {
            pb.finish_and_clear();
        }
        tally.ranges.push((range.clone(), result));
    }
    Ok(tally)
}

async fn count_github(
    client: &GitHubClient,
    repo: &RepoRef,
    selected: &[String],
    ranges: &[TimeRange],
    options: &AggregateOptions,
    concurrency: usize,
) -> Result<RepoTally> {
    client.verify_repository(repo).await?;
    let branches = if selected.is_empty() {
        primary_first(client.list_branches(repo).await?)
    } else {
        selected.to_vec()
    };

    let mut tally = RepoTally {
        name: repo.to_string(),
        ranges: Vec::new(),
    };
    for range in ranges {
        let options = AggregateOptions {
            time_range: range.clone(),
            ..options.clone()
        };
        let progress = branch_progress(branches.len(), &format!("{repo} ({})", range.name));
        let result = client
            .tally_repository(repo, &branches, concurrency, options, |_, _| {
                if let Some(pb) = &progress {
                    pb.inc(1);
                }
            })
            .await;
        if let Some(pb) = progress {
            pb.finish_and_clear();
        }
        tally.ranges.push((range.clone(), result));
    }
    Ok(tally)
}

/// API order with `main` (or else `master`) moved to the front.
fn primary_first(mut branches: Vec<String>) -> Vec<String> {
    let primary = branches
        .iter()
        .position(|b| b == "main")
        .or_else(|| branches.iter().position(|b| b == "master"));
    if let Some(idx) = primary {
        let name = branches.remove(idx);
        branches.insert(0, name);
    }
    branches
}

fn print_count(tallies: &[RepoTally], format: OutputFormat, detailed: bool) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&render::export(tallies)).into_diagnostic()?
            );
        }
        OutputFormat::Markdown => print!("{}", render::count_markdown(tallies, detailed)),
        OutputFormat::Text => print!("{}", render::count_text(tallies, detailed)),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))
    .expect("miette handler");
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(cli.config.as_deref())?;
    debug!(format = %cli.format, "configuration loaded");

    match cli.command {
        None => {
            Cli::command().print_help().into_diagnostic()?;
        }
        Some(Command::Count {
            ref repo,
            ref org,
            ref path,
            ref branch,
            detailed,
            include_merge_commits,
            identity,
            ref output,
        }) => {
            let options = AggregateOptions {
                exclude_merges: config.exclude_merge_commits && !include_merge_commits,
                identity: identity.unwrap_or(config.identity),
                time_range: TimeRange::all_time(),
            };
            let ranges = config.resolved_time_ranges()?;
            let selected = if branch.is_empty() {
                config.branches.clone()
            } else {
                branch.clone()
            };

            let repos = if repo.is_empty() {
                &config.repositories
            } else {
                repo
            };
            let owner = org.as_deref().or(config.organization.as_deref());
            let source = if repos.is_empty() {
                Source::Local(path.clone())
            } else {
                let refs = repos
                    .iter()
                    .map(|r| RepoRef::parse(r, owner))
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Source::GitHub(refs)
            };

            let mut tallies = Vec::new();
            let mut failed = Vec::new();
            match source {
                Source::Local(path) => {
                    tallies.push(count_local(&path, &selected, &ranges, &options)?);
                }
                Source::GitHub(refs) => {
                    let client = github_client(cli.github_token.as_deref(), &config)?;
                    for repo in &refs {
                        match count_github(
                            &client,
                            repo,
                            &selected,
                            &ranges,
                            &options,
                            config.github.concurrency,
                        )
                        .await
                        {
                            Ok(tally) => tallies.push(tally),
                            Err(e) => {
                                warn!(repo = %repo, error = %e, "skipping repository");
                                failed.push(repo.to_string());
                            }
                        }
                    }
                    if tallies.is_empty() {
                        miette::bail!(miette::miette!(
                            help = "Check the repository names and that the token can read them",
                            "no repository could be analyzed: {}",
                            failed.join(", ")
                        ));
                    }
                }
            }

            print_count(&tallies, cli.format, detailed)?;
            if !failed.is_empty() {
                eprintln!("Skipped repositories: {}", failed.join(", "));
            }

            if let Some(out) = output {
                let json = serde_json::to_string_pretty(&render::export(&tallies))
                    .into_diagnostic()?;
                std::fs::write(out, json)
                    .into_diagnostic()
                    .wrap_err(format!("writing {}", out.display()))?;
                eprintln!("Results written to {}", out.display());
            }
        }
        Some(Command::Investigate {
            ref user,
            ref repo,
            ref org,
            ref path,
            ref branch,
        }) => {
            let selected = if branch.is_empty() {
                config.branches.clone()
            } else {
                branch.clone()
            };

            let commits = match repo {
                Some(reference) => {
                    let owner = org.as_deref().or(config.organization.as_deref());
                    let repo = RepoRef::parse(reference, owner)?;
                    let client = github_client(cli.github_token.as_deref(), &config)?;
                    client.verify_repository(&repo).await?;
                    let branches = if selected.is_empty() {
                        primary_first(client.list_branches(&repo).await?)
                    } else {
                        selected
                    };
                    client
                        .user_commits(&repo, &branches, config.github.concurrency, user)
                        .await
                }
                None => {
                    let local = LocalRepository::open(path)?;
                    let branches = if selected.is_empty() {
                        local.branches()?
                    } else {
                        selected
                    };
                    local.user_commits(&branches, user)
                }
            };

            let report = patterns::analyze(user, &commits, &config.patterns);
            match cli.format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&report).into_diagnostic()?);
                }
                OutputFormat::Markdown => print!("{}", render::investigation_markdown(&report)),
                OutputFormat::Text => print!("{}", render::investigation_text(&report)),
            }
        }
        Some(Command::Init) => {
            let path = Path::new(CONFIG_FILE);
            if path.exists() {
                miette::bail!("{CONFIG_FILE} already exists");
            }
            std::fs::write(path, DEFAULT_CONFIG).into_diagnostic()?;
            println!("Created {CONFIG_FILE} with default configuration");
        }
        Some(Command::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "branchtally", &mut std::io::stdout());
        }
    }

    Ok(())
}
