#[macro_use]
extern crate clap;
#[macro_use]
extern crate log;
extern crate loggerv;

extern crate deskribe_adapters_demo;
extern crate deskribe_core;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};

use deskribe_adapters_demo::{
    DemoBackendAdapter, DemoMessagingProvider, DemoResourceProvider, DemoRuntimeAdapter,
};
use deskribe_core::adapters::ResourceProvider;
use deskribe_core::cancel::CancelToken;
use deskribe_core::{engine, Error, Registry};

pub fn print_error_debug(e: &Error) {
    use std::env;
    if env::var("CI").is_ok() {
        warn!("{:?}", e);
    } else {
        for e in e.iter().skip(1) {
            warn!("caused by: {}", e);
        }
    }
}

/// Registers the three known resource types against the in-memory demo
/// adapters, so the CLI can exercise the whole pipeline without any real
/// infrastructure. A production deployment would register its own
/// `ResourceProvider`/`BackendAdapter`/`RuntimeAdapter`/`MessagingProvider`
/// implementations here instead.
pub fn demo_registry() -> Registry {
    let mut registry = Registry::new();

    let providers: Vec<Arc<dyn ResourceProvider>> = vec![
        Arc::new(DemoResourceProvider::new("postgres")),
        Arc::new(DemoResourceProvider::new("redis")),
        Arc::new(DemoResourceProvider::new("kafka.messaging")),
    ];
    for provider in providers {
        registry.register_resource_provider(provider);
    }

    registry.register_backend_adapter(Arc::new(DemoBackendAdapter::new("demo")));
    registry.register_runtime_adapter(Arc::new(DemoRuntimeAdapter::new("demo")));
    registry.register_messaging_provider(Arc::new(DemoMessagingProvider::new("kafka")));

    registry
}

/// Parses `service=tag` pairs from repeated `--image` flags into the map the
/// Merge Engine expects.
pub fn parse_images(args: &ArgMatches) -> BTreeMap<String, String> {
    let mut images = BTreeMap::new();
    if let Some(values) = args.values_of("image") {
        for v in values {
            let mut parts = v.splitn(2, '=');
            match (parts.next(), parts.next()) {
                (Some(svc), Some(tag)) => {
                    images.insert(svc.to_string(), tag.to_string());
                }
                _ => warn!("ignoring malformed --image value (expected service=tag): {}", v),
            }
        }
    }
    images
}

pub fn manifest_path(args: &ArgMatches) -> PathBuf {
    Path::new(args.value_of("manifest").unwrap()).to_path_buf()
}

pub fn platform_path(args: &ArgMatches) -> PathBuf {
    Path::new(args.value_of("platform").unwrap()).to_path_buf()
}

pub fn environment(args: &ArgMatches) -> String {
    args.value_of("env").unwrap().to_string()
}

fn manifest_platform_env_args<'a, 'b>() -> Vec<Arg<'a, 'b>> {
    vec![
        Arg::with_name("manifest")
            .long("manifest")
            .short("m")
            .takes_value(true)
            .required(true)
            .help("Path to the manifest JSON document"),
        Arg::with_name("platform")
            .long("platform")
            .short("p")
            .takes_value(true)
            .required(true)
            .help("Path to the platform directory (base config and envs/<env>.json)"),
        Arg::with_name("env")
            .long("env")
            .short("e")
            .takes_value(true)
            .required(true)
            .help("Environment name, e.g. dev, staging, prod"),
    ]
}

pub fn build_cli() -> App<'static, 'static> {
    App::new("deskribe")
        .version(crate_version!())
        .setting(AppSettings::VersionlessSubcommands)
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .setting(AppSettings::ColoredHelp)
        .setting(AppSettings::DeriveDisplayOrder)
        .global_settings(&[AppSettings::ColoredHelp])
        .about("Intent-as-code orchestrator: validate, plan, apply and destroy a service")
        .arg(Arg::with_name("verbose").short("v").multiple(true).help("Increase verbosity"))
        .arg(
            Arg::with_name("debug")
                .short("d")
                .long("debug")
                .help("Adds line numbers to log statements"),
        )
        .subcommand(
            SubCommand::with_name("validate")
                .about("Load and validate a manifest against a platform and environment")
                .args(&manifest_platform_env_args()),
        )
        .subcommand(
            SubCommand::with_name("plan")
                .about("Produce the merged, resource-planned workload for a manifest")
                .args(&manifest_platform_env_args())
                .arg(
                    Arg::with_name("image")
                        .long("image")
                        .takes_value(true)
                        .multiple(true)
                        .help("service=tag image override, may be repeated"),
                ),
        )
        .subcommand(
            SubCommand::with_name("apply")
                .about("Validate, plan, provision infrastructure and deploy the workload")
                .args(&manifest_platform_env_args())
                .arg(
                    Arg::with_name("image")
                        .long("image")
                        .takes_value(true)
                        .multiple(true)
                        .help("service=tag image override, may be repeated"),
                ),
        )
        .subcommand(
            SubCommand::with_name("destroy")
                .about("Tear down everything apply created for a manifest")
                .args(&manifest_platform_env_args()),
        )
}

pub fn run(args: &ArgMatches) -> deskribe_core::Result<()> {
    loggerv::Logger::new()
        .verbosity(args.occurrences_of("verbose") + 1)
        .module_path(true)
        .line_numbers(args.is_present("debug"))
        .init()
        .unwrap();

    dispatch_commands(args)
}

pub fn dispatch_commands(args: &ArgMatches) -> deskribe_core::Result<()> {
    let registry = demo_registry();

    if let Some(a) = args.subcommand_matches("validate") {
        let result = engine::validate(&registry, &manifest_path(a), &platform_path(a), &environment(a))?;
        result.print()?;
        if !result.is_valid {
            return Err(deskribe_core::ErrorKind::ManifestInvalid(result.errors.join("; ")).into());
        }
        return Ok(());
    }

    if let Some(a) = args.subcommand_matches("plan") {
        let images = parse_images(a);
        let plan = engine::plan(&registry, &manifest_path(a), &platform_path(a), &environment(a), &images)?;
        plan.print()?;
        return Ok(());
    }

    if let Some(a) = args.subcommand_matches("apply") {
        let images = parse_images(a);
        let plan = engine::plan(&registry, &manifest_path(a), &platform_path(a), &environment(a), &images)?;
        let cancel = CancelToken::new();
        let mut rt = tokio::runtime::Runtime::new().expect("failed to start tokio runtime");
        return rt.block_on(engine::apply(&registry, &plan, &cancel));
    }

    if let Some(a) = args.subcommand_matches("destroy") {
        let cancel = CancelToken::new();
        let mut rt = tokio::runtime::Runtime::new().expect("failed to start tokio runtime");
        return rt.block_on(engine::destroy(
            &registry,
            &manifest_path(a),
            &platform_path(a),
            &environment(a),
            &cancel,
        ));
    }

    unreachable!("Subcommand valid, but not implemented");
}
