use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mstarconf::cli::commands;
use mstarconf::cli::{CommandOptions, ListFormat, SettingsFormat, parse_define};
use mstarconf::context::{DumpFormat, DumpOptions};

/// Parse dump format from string
fn parse_dump_format(s: &str) -> Result<DumpFormat, String> {
    s.parse()
}

fn parse_list_format(s: &str) -> Result<ListFormat, String> {
    s.parse()
}

fn parse_settings_format(s: &str) -> Result<SettingsFormat, String> {
    s.parse()
}

#[derive(Parser)]
#[command(name = "mstarconf")]
#[command(
    version,
    about = "Resolve MineStar configuration, manage overrides and protected values"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, short, global = true, help = "Settings file (merged over global settings)")]
    settings: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        help = "Environment variable holding the keystore password"
    )]
    password_env: Option<String>,

    #[arg(long, global = true)]
    verbose: bool,

    #[arg(long, short, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the merged configuration
    Show {
        #[arg(long, help = "Only keys starting with this prefix")]
        prefix: Option<String>,
        #[arg(long, help = "Show where each value came from")]
        sources: bool,
        #[arg(long, short, help = "Resolve tokens and decode protected values")]
        resolve: bool,
        #[arg(long, help = "Print secure values instead of masking them")]
        reveal: bool,
        #[arg(
            short = 'f',
            long,
            default_value = "text",
            value_parser = parse_dump_format,
            help = "Output format: text, json, toml"
        )]
        format: DumpFormat,
    },

    /// Print the resolved value of a variable
    Get {
        #[arg(help = "Variable name")]
        name: String,
    },

    /// Resolve a template as a path
    Path {
        #[arg(help = "Template, e.g. {_HOME}/logs")]
        template: String,
        #[arg(short = 'D', long = "define", value_parser = parse_define, help = "Per-call binding KEY=VALUE")]
        defines: Vec<(String, String)>,
    },

    /// Resolve every token in a template
    Format {
        #[arg(help = "Template text")]
        template: String,
        #[arg(short = 'D', long = "define", value_parser = parse_define, help = "Per-call binding KEY=VALUE")]
        defines: Vec<(String, String)>,
    },

    /// Show which file or override supplied each key
    Sources {
        #[arg(long, help = "Only keys starting with this prefix")]
        prefix: Option<String>,
        #[arg(
            short = 'f',
            long,
            default_value = "text",
            value_parser = parse_list_format,
            help = "Output format: text, json"
        )]
        format: ListFormat,
    },

    /// Manage persisted overrides
    Override {
        #[command(subcommand)]
        action: OverrideAction,
    },

    /// Obfuscate a value into OBF: form
    Obfuscate { value: String },

    /// Decode an OBF: value
    Deobfuscate { value: String },

    /// Encrypt a value for a property
    Encrypt { name: String, value: String },

    /// Decrypt an ENC: value of a property
    Decrypt { name: String, value: String },

    /// Manage the property keystore
    Keystore {
        #[command(subcommand)]
        action: KeystoreAction,
    },

    /// Manage mstarconf settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand)]
enum OverrideAction {
    /// Set an override (secure properties are stored encrypted)
    Put {
        key: String,
        value: String,
        #[arg(long, help = "Logical file id (default: first config file)")]
        file: Option<String>,
    },
    /// Remove an override
    Remove {
        key: String,
        #[arg(long, help = "Logical file id (default: first config file)")]
        file: Option<String>,
    },
    /// List stored overrides
    List {
        #[arg(
            short = 'f',
            long,
            default_value = "text",
            value_parser = parse_list_format,
            help = "Output format: text, json"
        )]
        format: ListFormat,
    },
}

#[derive(Subcommand)]
enum KeystoreAction {
    /// Generate a new property key sealed with --password-env
    AddKey {
        #[arg(help = "Key alias (default: key_alias setting)")]
        alias: Option<String>,
        #[arg(long, help = "Replace an existing key")]
        force: bool,
    },
    /// List key aliases
    List,
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Show effective settings (merged from all sources)
    Show {
        #[arg(
            short = 'f',
            long,
            default_value = "toml",
            value_parser = parse_settings_format,
            help = "Output format: toml, json"
        )]
        format: SettingsFormat,
    },
    /// Show settings file paths
    Path,
    /// Write the default global settings file
    Init {
        #[arg(long, help = "Overwrite existing settings")]
        force: bool,
    },
}

/// Set up panic handler for graceful error reporting
fn setup_panic_handler() {
    let default_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |panic_info| {
        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("\n\x1b[1;31m━━━ PANIC ━━━\x1b[0m");
        eprintln!("\x1b[31mmstarconf encountered an unexpected error:\x1b[0m");
        eprintln!("  {}", message);

        if let Some(location) = panic_info.location() {
            eprintln!(
                "\x1b[90mLocation: {}:{}:{}\x1b[0m",
                location.file(),
                location.line(),
                location.column()
            );
        }
        eprintln!();

        // backtrace when RUST_BACKTRACE=1
        default_hook(panic_info);
    }));
}

fn main() -> ExitCode {
    setup_panic_handler();

    match run_cli() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("\x1b[31mError:\x1b[0m {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let options = CommandOptions {
        settings: cli.settings,
        password_env: cli.password_env,
    };

    match cli.command {
        Commands::Show {
            prefix,
            sources,
            resolve,
            reveal,
            format,
        } => {
            commands::show::run(
                &options,
                &DumpOptions {
                    prefix,
                    provenance: sources,
                    resolve,
                    mask_secrets: !reveal,
                    format,
                },
            )?;
        }
        Commands::Get { name } => {
            commands::resolve::get(&options, &name)?;
        }
        Commands::Path { template, defines } => {
            commands::resolve::path(&options, &template, &defines)?;
        }
        Commands::Format { template, defines } => {
            commands::resolve::format(&options, &template, &defines)?;
        }
        Commands::Sources { prefix, format } => {
            commands::resolve::sources(&options, prefix.as_deref(), format)?;
        }
        Commands::Override { action } => match action {
            OverrideAction::Put { key, value, file } => {
                commands::overrides::put(&options, &key, &value, file.as_deref())?;
            }
            OverrideAction::Remove { key, file } => {
                commands::overrides::remove(&options, &key, file.as_deref())?;
            }
            OverrideAction::List { format } => {
                commands::overrides::list(&options, format)?;
            }
        },
        Commands::Obfuscate { value } => {
            commands::secret::obfuscate(&value)?;
        }
        Commands::Deobfuscate { value } => {
            commands::secret::deobfuscate(&value)?;
        }
        Commands::Encrypt { name, value } => {
            commands::secret::encrypt(&options, &name, &value)?;
        }
        Commands::Decrypt { name, value } => {
            commands::secret::decrypt(&options, &name, &value)?;
        }
        Commands::Keystore { action } => match action {
            KeystoreAction::AddKey { alias, force } => {
                commands::keystore::add_key(&options, alias.as_deref(), force)?;
            }
            KeystoreAction::List => {
                commands::keystore::list(&options)?;
            }
        },
        Commands::Settings { action } => match action {
            SettingsAction::Show { format } => {
                commands::settings::show(&options, format)?;
            }
            SettingsAction::Path => {
                commands::settings::path(&options)?;
            }
            SettingsAction::Init { force } => {
                commands::settings::init(force)?;
            }
        },
    }

    Ok(())
}
