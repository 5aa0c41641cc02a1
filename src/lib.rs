pub mod breakpoints;
pub mod collector;
pub mod config;
pub mod content;
pub mod converter;
pub mod importer;
pub mod normalizer;
pub mod pipeline;
pub mod scanner;
pub mod settings;
pub mod stylesheet;
pub mod utility;

use crate::config::Config;
use crate::content::{DirectoryContentSource, GlobalClassFile};
use crate::importer::{InlineStyles, JsonFileStore, StyleImporter, StyleMap, StyleSet, css_syntax_errors, fix_css_issues};
use crate::pipeline::ConversionSession;
use serde::Serialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Inputs shared by the commands that read builder content.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Sources {
    pub content: String,
    pub classes: Option<String>,
    pub config: Option<String>,
    pub post_types: Vec<String>,
    pub all_classes: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Scan {
        sources: Sources,
    },
    Count {
        sources: Sources,
    },
    Convert {
        sources: Sources,
        store: Option<String>,
        dry_run: bool,
    },
    Validate {
        inputs: Vec<String>,
        fix: bool,
    },
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct CliError {
    pub message: String,
}

pub fn run(command: Command) -> Result<(), CliError> {
    match command {
        Command::Scan { sources } => run_scan(sources),
        Command::Count { sources } => run_count(sources),
        Command::Convert {
            sources,
            store,
            dry_run,
        } => run_convert(sources, store, dry_run),
        Command::Validate { inputs, fix } => run_validate(inputs, fix),
        Command::Help => {
            print_help();
            Ok(())
        }
    }
}

pub fn run_from_env() -> Result<(), CliError> {
    let command = parse_args(env::args().skip(1))?;
    run(command)
}

pub fn parse_args<I>(args: I) -> Result<Command, CliError>
where
    I: IntoIterator<Item = String>,
{
    let mut iter = args.into_iter();
    let Some(cmd) = iter.next() else {
        return Ok(Command::Help);
    };

    match cmd.as_str() {
        "scan" | "count" | "convert" => parse_source_args(&cmd, iter.collect()),
        "validate" => parse_validate_args(iter.collect()),
        "-h" | "--help" | "help" => Ok(Command::Help),
        _ => Err(CliError {
            message: format!("unknown command: {}", cmd),
        }),
    }
}

fn parse_source_args(command: &str, args: Vec<String>) -> Result<Command, CliError> {
    let mut sources = Sources::default();
    let mut content = None;
    let mut store = None;
    let mut dry_run = false;
    let mut idx = 0;

    while idx < args.len() {
        match args[idx].as_str() {
            "--content" | "-d" => {
                content = Some(flag_value(command, &args, &mut idx, "--content")?);
            }
            "--classes" | "-g" => {
                sources.classes = Some(flag_value(command, &args, &mut idx, "--classes")?);
            }
            "--config" | "-c" => {
                sources.config = Some(flag_value(command, &args, &mut idx, "--config")?);
            }
            "--post-type" | "-t" => {
                sources
                    .post_types
                    .push(flag_value(command, &args, &mut idx, "--post-type")?);
            }
            "--all" => {
                sources.all_classes = true;
            }
            "--store" | "-o" => {
                if command != "convert" {
                    return Err(CliError {
                        message: "--store is only supported with convert".to_string(),
                    });
                }
                store = Some(flag_value(command, &args, &mut idx, "--store")?);
            }
            "--dry-run" => {
                if command != "convert" {
                    return Err(CliError {
                        message: "--dry-run is only supported with convert".to_string(),
                    });
                }
                dry_run = true;
            }
            value => {
                return Err(CliError {
                    message: format!("{} does not accept argument: {}", command, value),
                });
            }
        }
        idx += 1;
    }

    let Some(content) = content else {
        return Err(CliError {
            message: format!("{} requires a content directory (--content)", command),
        });
    };
    sources.content = content;

    if command != "scan" && sources.classes.is_none() {
        return Err(CliError {
            message: format!("{} requires a global classes file (--classes)", command),
        });
    }

    match command {
        "scan" => Ok(Command::Scan { sources }),
        "count" => Ok(Command::Count { sources }),
        _ => {
            if store.is_none() && !dry_run {
                return Err(CliError {
                    message: "convert requires --store <path> or --dry-run".to_string(),
                });
            }
            Ok(Command::Convert {
                sources,
                store,
                dry_run,
            })
        }
    }
}

fn parse_validate_args(args: Vec<String>) -> Result<Command, CliError> {
    let mut inputs = Vec::new();
    let mut fix = false;

    for arg in args {
        match arg.as_str() {
            "--fix" => fix = true,
            value => inputs.push(value.to_string()),
        }
    }

    if inputs.is_empty() {
        return Err(CliError {
            message: "validate requires at least one css file".to_string(),
        });
    }

    Ok(Command::Validate { inputs, fix })
}

fn flag_value(command: &str, args: &[String], idx: &mut usize, flag: &str) -> Result<String, CliError> {
    *idx += 1;
    args.get(*idx).cloned().ok_or_else(|| CliError {
        message: format!("{} requires a value for {}", command, flag),
    })
}

/// Loaded inputs for one command, with command-line overrides applied.
struct Workspace {
    config: Config,
    content: DirectoryContentSource,
    classes: Option<GlobalClassFile>,
}

fn open_workspace(sources: Sources) -> Result<Workspace, CliError> {
    let mut config = match sources.config.as_ref() {
        Some(path) => config::load(Path::new(path)).map_err(|err| CliError {
            message: err.message,
        })?,
        None => Config::default(),
    };
    config.content.post_types.extend(sources.post_types);
    if sources.all_classes {
        config.content.restrict_to_referenced = false;
    }

    let content = DirectoryContentSource::load(Path::new(&sources.content), &config.content.patterns)
        .map_err(|err| CliError {
            message: err.to_string(),
        })?;
    let classes = sources.classes.map(|path| GlobalClassFile {
        path: PathBuf::from(path),
    });

    Ok(Workspace {
        config,
        content,
        classes,
    })
}

fn open_session(config: &Config) -> Result<ConversionSession, CliError> {
    ConversionSession::from_config(config).map_err(|err| CliError {
        message: err.message,
    })
}

fn required_classes(workspace: &Workspace) -> Result<&GlobalClassFile, CliError> {
    workspace.classes.as_ref().ok_or_else(|| CliError {
        message: "a global classes file (--classes) is required".to_string(),
    })
}

fn run_scan(sources: Sources) -> Result<(), CliError> {
    let workspace = open_workspace(sources)?;
    let mut session = open_session(&workspace.config)?;
    let index = session.referenced_identifiers(&workspace.content);

    for identifier in index.iter() {
        println!("{}", identifier);
    }

    eprintln!(
        "scanned {} files, found {} referenced identifiers",
        workspace.content.files_loaded(),
        index.len()
    );

    Ok(())
}

fn run_count(sources: Sources) -> Result<(), CliError> {
    let workspace = open_workspace(sources)?;
    let classes = required_classes(&workspace)?;
    let mut session = open_session(&workspace.config)?;
    let counts = session
        .class_counts(classes, &workspace.content)
        .map_err(|err| CliError {
            message: err.to_string(),
        })?;

    println!("total: {}", counts.total);
    println!("to migrate: {}", counts.to_migrate);
    Ok(())
}

#[derive(Serialize)]
struct DryRunReport<'a> {
    styles: &'a StyleSet,
    style_map: &'a StyleMap,
    inline_styles: &'a InlineStyles,
}

fn run_convert(sources: Sources, store: Option<String>, dry_run: bool) -> Result<(), CliError> {
    let workspace = open_workspace(sources)?;
    let classes = required_classes(&workspace)?;
    let mut session = open_session(&workspace.config)?;
    let output = session
        .convert_global_classes(classes, &workspace.content)
        .map_err(|err| CliError {
            message: err.to_string(),
        })?;

    if dry_run {
        let report = DryRunReport {
            styles: &output.styles,
            style_map: &output.style_map,
            inline_styles: &output.inline_styles,
        };
        let json = serde_json::to_string_pretty(&report).map_err(|err| CliError {
            message: format!("failed to encode styles: {}", err),
        })?;
        println!("{}", json);
        eprintln!(
            "converted {} classes, {} excluded, {} styles",
            output.converted,
            output.excluded,
            output.styles.len()
        );
        return Ok(());
    }

    let Some(store_path) = store else {
        return Err(CliError {
            message: "convert requires --store <path> or --dry-run".to_string(),
        });
    };
    let store = JsonFileStore::open(&store_path).map_err(|err| CliError {
        message: err.to_string(),
    })?;
    let mut importer = StyleImporter::new(store);
    let summary = importer
        .import(output.styles.into_values(), &output.style_map)
        .map_err(|err| CliError {
            message: err.to_string(),
        })?;
    importer
        .save_inline_styles(&output.inline_styles)
        .map_err(|err| CliError {
            message: err.to_string(),
        })?;

    eprintln!(
        "converted {} classes, {} excluded, stored {} styles in {} (version {})",
        output.converted, output.excluded, summary.merged, store_path, summary.version
    );
    Ok(())
}

fn run_validate(inputs: Vec<String>, fix: bool) -> Result<(), CliError> {
    let mut failed = 0;

    for input in &inputs {
        let mut css = fs::read_to_string(input).map_err(|err| CliError {
            message: format!("failed to read css {}: {}", input, err),
        })?;
        if fix {
            let fixed = fix_css_issues(&css);
            if fixed != css {
                fs::write(input, &fixed).map_err(|err| CliError {
                    message: format!("failed to write css {}: {}", input, err),
                })?;
                css = fixed;
            }
        }

        let errors = css_syntax_errors(&css);
        if errors.is_empty() {
            println!("ok {}", input);
        } else {
            failed += 1;
            println!("invalid {}: {}", input, errors.join(", "));
        }
    }

    if failed > 0 {
        return Err(CliError {
            message: format!("{} of {} files failed validation", failed, inputs.len()),
        });
    }
    Ok(())
}

fn print_help() {
    println!("etchcss");
    println!();
    println!("USAGE:");
    println!("  etchcss scan --content <dir> [--config <path>] [--post-type <type>...]");
    println!("  etchcss count --content <dir> --classes <file> [--config <path>] [--post-type <type>...] [--all]");
    println!(
        "  etchcss convert --content <dir> --classes <file> (--store <path> | --dry-run) [--config <path>] [--post-type <type>...] [--all]"
    );
    println!("  etchcss validate [--fix] <file...>");
    println!();
    println!("EXAMPLES:");
    println!("  etchcss scan -d export/content");
    println!("  etchcss count -d export/content -g export/global-classes.json");
    println!("  etchcss convert -d export/content -g export/global-classes.json --dry-run");
    println!("  etchcss convert -c etchcss.toml -d export/content -g export/global-classes.json -o styles.json");
    println!("  etchcss validate --fix custom.css");
    println!();
    println!("Set ETCHCSS_LOG (e.g. ETCHCSS_LOG=debug) to control log output.");
}
