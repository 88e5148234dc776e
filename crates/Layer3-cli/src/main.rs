//! BoxForge CLI - main entry point

mod run;

use boxforge_foundation::{Error, HostEnv, SettingsStore};
use boxforge_task::{EngineConfig, Operation, TaskEngine};
use boxforge_terminal::TerminalRegistry;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// BoxForge - manage distrobox containers from the command line
#[derive(Parser, Debug)]
#[command(name = "boxforge")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Container tool binary to drive
    #[arg(long, global = true, default_value = "distrobox")]
    tool: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List containers
    List,
    /// List exportable applications inside a container
    Apps {
        /// Container name
        container: String,
    },
    /// Create a container
    Create {
        /// Container name
        name: String,
        /// Source image, e.g. docker.io/library/ubuntu:24.04
        #[arg(short, long)]
        image: String,
        /// Pass the host NVIDIA driver into the container
        #[arg(long)]
        nvidia: bool,
        /// Run an init system (systemd) inside the container
        #[arg(long)]
        init: bool,
        /// Custom home directory on the host
        #[arg(long)]
        home: Option<String>,
        /// Extra volume mount, host:container (repeatable)
        #[arg(long = "volume")]
        volumes: Vec<String>,
    },
    /// Clone a container under a new name
    Clone {
        /// Source container
        source: String,
        /// Name of the copy
        new_name: String,
    },
    /// Delete a container
    Delete {
        /// Container name
        name: String,
    },
    /// Upgrade the packages of one or all containers
    Upgrade {
        /// Container name
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        name: Option<String>,
        /// Upgrade every container
        #[arg(long)]
        all: bool,
    },
    /// Stop one or all running containers
    Stop {
        /// Container name
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        name: Option<String>,
        /// Stop every container
        #[arg(long)]
        all: bool,
    },
    /// Export an application from a container to the host
    Export {
        /// Container name
        container: String,
        /// Absolute path of the .desktop file inside the container
        desktop_file: String,
    },
    /// Remove an exported application from the host
    Unexport {
        /// Container name
        container: String,
        /// Absolute path of the .desktop file inside the container
        desktop_file: String,
    },
    /// Install a package file inside a container
    Install {
        /// Container name
        container: String,
        /// Path to a .deb or .rpm file
        package: String,
    },
    /// Create or delete the application menu entry for a container
    Entry {
        /// Container name
        container: String,
        /// Icon path for the entry
        #[arg(long, conflicts_with = "delete")]
        icon: Option<String>,
        /// Delete the entry instead of creating it
        #[arg(long)]
        delete: bool,
    },
    /// Open an interactive session in the selected terminal
    Enter {
        /// Container name
        container: String,
    },
    /// Manage terminal emulator profiles
    Terminal {
        #[command(subcommand)]
        command: TerminalCommand,
    },
}

#[derive(Subcommand, Debug)]
enum TerminalCommand {
    /// List known terminals
    List,
    /// Add a custom terminal
    Add {
        /// Profile name
        name: String,
        /// Binary to invoke
        command: String,
        /// Human-readable name (defaults to the profile name)
        #[arg(long)]
        display_name: Option<String>,
        /// Flag placed before the payload, e.g. "--" or "-e"
        #[arg(long, default_value = "")]
        separator: String,
    },
    /// Edit a custom terminal
    Edit {
        /// Profile name
        name: String,
        /// New human-readable name
        #[arg(long)]
        display_name: Option<String>,
        /// New binary to invoke
        #[arg(long)]
        command: Option<String>,
        /// New separator flag
        #[arg(long)]
        separator: Option<String>,
    },
    /// Remove a custom terminal
    Remove {
        /// Profile name
        name: String,
    },
    /// Select the terminal used by `enter`
    Use {
        /// Profile name
        name: String,
    },
    /// Discard custom terminals and re-detect the default
    Reset,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let Cli {
        command,
        debug,
        tool,
    } = Cli::parse();

    // Initialize logging. Task output goes to the console already, so
    // default to warnings only unless --debug or RUST_LOG says otherwise.
    let log_level = if debug { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    tracing::debug!(tool = %tool, "BoxForge starting");
    let engine = TaskEngine::new(EngineConfig::default().with_tool(tool.as_str()));

    match command {
        Command::List => list_containers(&engine).await,
        Command::Apps { container } => list_apps(&engine, &container).await,
        Command::Create {
            name,
            image,
            nvidia,
            init,
            home,
            volumes,
        } => {
            run::run_operation(
                &engine,
                Operation::Create {
                    name,
                    image,
                    nvidia,
                    init,
                    home,
                    volumes,
                },
            )
            .await
        }
        Command::Clone { source, new_name } => {
            run::run_operation(&engine, Operation::Clone { source, new_name }).await
        }
        Command::Delete { name } => run::run_operation(&engine, Operation::Delete { name }).await,
        Command::Upgrade { name, all: _ } => {
            let op = match name {
                Some(name) => Operation::Upgrade { name },
                None => Operation::UpgradeAll,
            };
            run::run_operation(&engine, op).await
        }
        Command::Stop { name, all: _ } => {
            let op = match name {
                Some(name) => Operation::Stop { name },
                None => Operation::StopAll,
            };
            run::run_operation(&engine, op).await
        }
        Command::Export {
            container,
            desktop_file,
        } => {
            run::run_operation(
                &engine,
                Operation::ExportApp {
                    container,
                    desktop_file,
                },
            )
            .await
        }
        Command::Unexport {
            container,
            desktop_file,
        } => {
            run::run_operation(
                &engine,
                Operation::UnexportApp {
                    container,
                    desktop_file,
                },
            )
            .await
        }
        Command::Install { container, package } => {
            run::run_operation(
                &engine,
                Operation::InstallPackage {
                    container,
                    package_path: package,
                },
            )
            .await
        }
        Command::Entry {
            container,
            icon,
            delete,
        } => {
            let op = if delete {
                Operation::DeleteEntry { container }
            } else {
                Operation::GenerateEntry { container, icon }
            };
            run::run_operation(&engine, op).await
        }
        Command::Enter { container } => enter_container(&engine, &tool, &container),
        Command::Terminal { command } => terminal_command(command),
    }
}

// ============================================================================
// Queries
// ============================================================================

async fn list_containers(engine: &TaskEngine) -> anyhow::Result<()> {
    let containers = engine.list_containers().await?;
    if containers.is_empty() {
        println!("No containers found.");
        return Ok(());
    }

    println!(
        "{:<14} {:<20} {:<12} {:<44} {}",
        "ID", "NAME", "STATUS", "IMAGE", "DISTRO"
    );
    for container in &containers {
        let distro = container.distro.map(|d| d.display_name).unwrap_or("-");
        println!(
            "{:<14} {:<20} {:<12} {:<44} {}",
            container.id, container.name, container.status, container.image, distro
        );
    }
    Ok(())
}

async fn list_apps(engine: &TaskEngine, container: &str) -> anyhow::Result<()> {
    let apps = engine.list_exportable_apps(container).await?;
    if apps.is_empty() {
        println!("No exportable applications found in '{}'.", container);
        return Ok(());
    }

    for app in &apps {
        if app.exported {
            println!("{:<28} {}  [exported]", app.name, app.path);
        } else {
            println!("{:<28} {}", app.name, app.path);
        }
    }
    Ok(())
}

// ============================================================================
// Interactive Sessions
// ============================================================================

/// Open the selected terminal emulator attached to a container.
///
/// Inside a sandbox the launch command is rewritten to run on the host.
fn enter_container(engine: &TaskEngine, tool: &str, container: &str) -> anyhow::Result<()> {
    let registry = TerminalRegistry::load(SettingsStore::global()?);
    let argv = registry.active_launch_args(&format!("{} enter {}", tool, container))?;
    let argv = HostEnv::detect().wrap_host_command(argv);
    engine.spawn_session(argv)?;

    if let Some(profile) = registry.active_profile() {
        println!("Opening {} in {}", container, profile.display_name);
    }
    Ok(())
}

// ============================================================================
// Terminal Registry Management
// ============================================================================

fn terminal_command(command: TerminalCommand) -> anyhow::Result<()> {
    let mut registry = TerminalRegistry::load(SettingsStore::global()?);

    match command {
        TerminalCommand::List => {
            let active = registry.active_profile().map(|p| p.name.clone());
            for profile in registry.profiles() {
                let marker = if active.as_deref() == Some(profile.name.as_str()) {
                    "*"
                } else {
                    " "
                };
                let kind = if profile.built_in { "built-in" } else { "custom" };
                println!(
                    "{} {:<16} {:<20} {:<18} {:<4} {}",
                    marker,
                    profile.name,
                    profile.display_name,
                    profile.command,
                    profile.separator,
                    kind
                );
            }
        }
        TerminalCommand::Add {
            name,
            command,
            display_name,
            separator,
        } => {
            let display_name = display_name.unwrap_or_else(|| name.clone());
            registry.add_custom(&name, &display_name, &command, &separator)?;
            println!("Added terminal '{}'.", name);
        }
        TerminalCommand::Edit {
            name,
            display_name,
            command,
            separator,
        } => {
            let current = registry
                .find(&name)
                .cloned()
                .ok_or_else(|| Error::NotFound(format!("Unknown terminal '{}'", name)))?;
            let display_name = display_name.unwrap_or(current.display_name);
            let command = command.unwrap_or(current.command);
            let separator = separator.unwrap_or(current.separator);
            registry.edit(&name, &display_name, &command, &separator)?;
            println!("Updated terminal '{}'.", name);
        }
        TerminalCommand::Remove { name } => {
            registry.remove(&name)?;
            println!("Removed terminal '{}'.", name);
        }
        TerminalCommand::Use { name } => {
            registry.set_active(&name)?;
            println!("Selected terminal '{}'.", name);
        }
        TerminalCommand::Reset => {
            registry.reset_to_defaults()?;
            match registry.active_profile() {
                Some(profile) => println!("Reset to defaults; detected {}.", profile.display_name),
                None => println!("Reset to defaults; no terminal emulator detected."),
            }
        }
    }
    Ok(())
}
