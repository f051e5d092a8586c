//! `weave`: compile, check and explain views described by a TOML manifest

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod manifest;

use anyhow::{bail, Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use manifest::Manifest;
use std::path::PathBuf;
use std::sync::Arc;
use weave_compiler::{resolve_chain, CompileError, CompileStatus, DefinitionStore, MemoryStore, ViewCompiler};
use weave_composition::{CompileContext, Outcome};

fn cli() -> Command {
    Command::new("weave")
        .version(env!("CARGO_PKG_VERSION"))
        .about("View inheritance and extension compiler")
        .subcommand_required(true)
        .arg(
            Arg::new("manifest")
                .long("manifest")
                .short('m')
                .global(true)
                .default_value("weave.toml")
                .value_parser(clap::value_parser!(PathBuf))
                .help("Manifest listing views and extensions"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand(
            context_args(Command::new("compile").about("Compile a view and print the result"))
                .arg(Arg::new("view").required(true).help("View name"))
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print the full artifact as JSON"),
                )
                .arg(
                    Arg::new("compact")
                        .long("compact")
                        .action(ArgAction::SetTrue)
                        .help("Print markup on one line"),
                ),
        )
        .subcommand(
            Command::new("check")
                .about("Validate the manifest: markup, expressions, inheritance and ordering"),
        )
        .subcommand(
            context_args(Command::new("explain").about("Show what every extension did to a view"))
                .arg(Arg::new("view").required(true).help("View name")),
        )
}

fn context_args(command: Command) -> Command {
    command
        .arg(Arg::new("env").long("env").help("Deployment environment"))
        .arg(
            Arg::new("feature")
                .long("feature")
                .action(ArgAction::Append)
                .help("Enabled feature flag (repeatable)"),
        )
        .arg(Arg::new("locale").long("locale").help("Locale, e.g. fr_BE"))
        .arg(
            Arg::new("set")
                .long("set")
                .action(ArgAction::Append)
                .value_name("KEY=VALUE")
                .help("Extra context value (repeatable)"),
        )
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "weave=info".into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn context(args: &ArgMatches) -> Result<CompileContext> {
    let mut ctx = CompileContext::new();
    if let Some(env) = args.get_one::<String>("env") {
        ctx = ctx.with_environment(env);
    }
    if let Some(locale) = args.get_one::<String>("locale") {
        ctx = ctx.with_locale(locale);
    }
    for feature in args.get_many::<String>("feature").into_iter().flatten() {
        ctx = ctx.with_feature(feature);
    }
    for pair in args.get_many::<String>("set").into_iter().flatten() {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("--set expects KEY=VALUE, got '{pair}'");
        };
        ctx = if let Ok(b) = value.parse::<bool>() {
            ctx.with_value(key, b)
        } else if let Ok(i) = value.parse::<i64>() {
            ctx.with_value(key, i)
        } else {
            ctx.with_value(key, value)
        };
    }
    Ok(ctx)
}

fn compiler(manifest: &Manifest) -> Result<ViewCompiler<MemoryStore>> {
    let store = manifest.build_store()?;
    Ok(ViewCompiler::with_config(Arc::new(store), manifest.compiler.clone()))
}

fn compile(manifest: &Manifest, args: &ArgMatches) -> Result<()> {
    let view = args.get_one::<String>("view").context("missing view")?;
    let ctx = context(args)?;
    let out = compiler(manifest)?.compile(view, &ctx)?;
    if let CompileStatus::Stale { reason } = &out.status {
        tracing::warn!(view = %view, %reason, "serving stale artifact");
    }

    if args.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&*out.artifact)?);
    } else if args.get_flag("compact") {
        println!("{}", out.artifact.to_markup());
    } else {
        println!("{}", out.artifact.to_pretty_markup());
    }
    Ok(())
}

fn explain(manifest: &Manifest, args: &ArgMatches) -> Result<()> {
    let view = args.get_one::<String>("view").context("missing view")?;
    let ctx = context(args)?;
    let compiler = compiler(manifest)?;
    let out = compiler.compile(view, &ctx)?;
    let artifact = &out.artifact;

    println!("View: {}", artifact.view);
    println!("Chain: {}", artifact.chain.join(" -> "));
    println!("Content hash: {}", artifact.content_hash);
    println!();
    if artifact.log.is_empty() {
        println!("No extensions.");
    }
    for entry in artifact.log.entries() {
        let module = if entry.module.is_empty() { "-" } else { entry.module.as_str() };
        let outcome = match &entry.outcome {
            Outcome::Applied => "applied".to_string(),
            Outcome::SkippedConditionFalse => "skipped: condition false".to_string(),
            Outcome::SkippedTargetNotFound => "skipped: target not found".to_string(),
            Outcome::Error(message) => format!("error: {message}"),
        };
        println!(
            "  {:<24} {:<12} {:<10} {:<22} matched={:<3} {}",
            entry.extension.as_str(),
            module,
            entry.view,
            entry.operation.as_str(),
            entry.matched,
            outcome
        );
    }

    let conflicts = compiler.ordering_conflicts(view)?;
    if !conflicts.is_empty() {
        println!();
        println!("Ordering decided by id:");
        for conflict in conflicts {
            println!("  {conflict}");
        }
    }
    Ok(())
}

/// Returns the number of problems found
fn check(manifest: &Manifest) -> Result<usize> {
    let (store, mut problems) = manifest.register();
    let compiler = ViewCompiler::with_config(Arc::new(store), manifest.compiler.clone());
    let names = compiler.store().view_names();

    for name in &names {
        match resolve_chain(compiler.store().as_ref(), name, manifest.compiler.max_chain_depth) {
            // every definition inactive
            Ok(_) | Err(CompileError::ViewNotFound(_)) => {}
            Err(e) => problems.push(format!("view '{name}': {e}")),
        }
    }
    for extension in compiler.store().all_extensions() {
        if compiler.store().get_view_definition(&extension.view)?.is_none() {
            problems.push(format!(
                "extension '{}': targets unknown view '{}'",
                extension.id, extension.view
            ));
        }
    }

    let mut warnings = 0;
    for name in &names {
        let Ok(conflicts) = compiler.ordering_conflicts(name) else {
            continue;
        };
        for conflict in conflicts {
            println!("warning: {conflict}");
            warnings += 1;
        }
    }

    for problem in &problems {
        println!("error: {problem}");
    }
    println!(
        "Checked {} views, {} extensions: {} errors, {} warnings",
        names.len(),
        manifest.extensions.len(),
        problems.len(),
        warnings
    );
    Ok(problems.len())
}

fn main() -> Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("log-json"));

    let path = matches
        .get_one::<PathBuf>("manifest")
        .context("missing manifest path")?;
    let manifest = Manifest::load(path)?;
    tracing::debug!(
        manifest = %path.display(),
        views = manifest.views.len(),
        extensions = manifest.extensions.len(),
        "loaded manifest"
    );

    match matches.subcommand() {
        Some(("compile", args)) => compile(&manifest, args),
        Some(("explain", args)) => explain(&manifest, args),
        Some(("check", _)) => {
            let problems = check(&manifest)?;
            std::process::exit(if problems == 0 { 0 } else { 1 });
        }
        _ => Ok(()),
    }
}
