use anyhow::Context;
use clap::{value_parser, Arg, ArgMatches, Command};
use std::fs;
use std::path::PathBuf;
use stk_artifact::{fingerprint, ArtifactPublisher, LocalRegistry, PublishOutcome, RegistryRef};
use stk_core::{Provisioner, StackConfig, StkError};

fn cli() -> Command {
    let registry_root = || {
        Arg::new("registry-root")
            .long("registry-root")
            .required(true)
            .value_parser(value_parser!(PathBuf))
            .help("Root directory of the local registry")
    };
    let repository = || {
        Arg::new("repository")
            .long("repository")
            .required(true)
            .help("Repository name, e.g. service/chatbot")
    };

    Command::new("stk")
        .version(stk_core::VERSION)
        .about("Declarative stack synthesis with content-addressed image tags")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("fingerprint")
                .about("Print the content fingerprint of a directory")
                .arg(
                    Arg::new("dir")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Directory whose top-level files are hashed"),
                ),
        )
        .subcommand(
            Command::new("publish")
                .about("Publish a directory under its fingerprint unless already present")
                .arg(
                    Arg::new("source")
                        .long("source")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Source directory"),
                )
                .arg(registry_root())
                .arg(repository())
                .arg(
                    Arg::new("host")
                        .long("host")
                        .default_value("localhost")
                        .help("Registry host used in image URIs"),
                ),
        )
        .subcommand(
            Command::new("synth")
                .about("Publish the image, synthesize the stack and write the plan")
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_parser(value_parser!(PathBuf))
                        .help("Stack configuration (TOML); defaults apply when omitted"),
                )
                .arg(
                    Arg::new("out")
                        .long("out")
                        .value_parser(value_parser!(PathBuf))
                        .help("Write the plan here instead of stdout"),
                ),
        )
        .subcommand(
            Command::new("tags")
                .about("List tags published to a repository")
                .arg(registry_root())
                .arg(repository()),
        )
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn required<'a, T: Clone + Send + Sync + 'static>(args: &'a ArgMatches, name: &str) -> anyhow::Result<&'a T> {
    args.get_one::<T>(name)
        .with_context(|| format!("missing argument --{name}"))
}

fn synth(args: &ArgMatches) -> anyhow::Result<()> {
    let config = match args.get_one::<PathBuf>("config") {
        Some(path) => StackConfig::load(path)?,
        None => {
            let mut config = StackConfig::default();
            config.apply_env_overrides()?;
            config
        }
    };

    let provisioner = Provisioner::new(LocalRegistry::new(&config.image.registry_root));
    let report = match provisioner.run(&config) {
        Ok(report) => report,
        Err(e) => {
            if e.is_retryable() {
                tracing::warn!(error = %e, "run failed; a later rerun may succeed");
            }
            return Err(e.into());
        }
    };

    let json = report.plan.to_json_pretty().map_err(StkError::from)?;
    match args.get_one::<PathBuf>("out") {
        Some(out) => {
            fs::write(out, json).map_err(|source| StkError::Io {
                path: out.clone(),
                source,
            })?;
            tracing::info!(out = %out.display(), resources = report.plan.len(), "plan written");
        }
        None => println!("{json}"),
    }
    tracing::info!(
        artifact = %report.artifact,
        published = report.published(),
        visits = report.visits,
        "synth complete"
    );
    Ok(())
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let matches = cli().get_matches();

    match matches.subcommand() {
        Some(("fingerprint", args)) => {
            let dir = required::<PathBuf>(args, "dir")?;
            println!("{}", fingerprint(dir)?);
        }
        Some(("publish", args)) => {
            let source = required::<PathBuf>(args, "source")?;
            let root = required::<PathBuf>(args, "registry-root")?;
            let repository = RegistryRef::new(
                required::<String>(args, "host")?,
                required::<String>(args, "repository")?,
            );

            let publisher = ArtifactPublisher::new(LocalRegistry::new(root));
            let publication = publisher.publish_if_absent(source, &repository)?;
            let status = match publication.outcome {
                PublishOutcome::Published => "published",
                PublishOutcome::AlreadyPresent => "already present",
            };
            println!("{} ({status})", publication.artifact);
        }
        Some(("synth", args)) => synth(args)?,
        Some(("tags", args)) => {
            let root = required::<PathBuf>(args, "registry-root")?;
            let repository = RegistryRef::new("localhost", required::<String>(args, "repository")?);
            for tag in LocalRegistry::new(root).tags(&repository)? {
                println!("{tag}");
            }
        }
        Some((other, _)) => anyhow::bail!("unknown subcommand {other:?}"),
        None => anyhow::bail!("no subcommand given"),
    }
    Ok(())
}
