use std::fs;
use std::path::Path;

use anyhow::Context as _;
use clap::Parser;
use tracing::error;

use slux::cli::{Cli, TopCommand};
use slux::config::options::{InboundOptions, Options};
use slux::config::{self, InjectionStrategy, Registry};
use slux::logging;

fn main() {
    let cli = Cli::parse();
    logging::init_terminal(cli.verbose);

    if let Err(e) = run(cli.command) {
        error!("{:#}", e);
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(command: TopCommand) -> anyhow::Result<()> {
    match command {
        TopCommand::Transform {
            path,
            tun_fd,
            pretty,
        } => {
            let raw = read_config(&path)?;
            let spliced = config::splice(&raw, tun_fd)?;
            if pretty {
                let value: serde_json::Value = serde_json::from_str(&spliced)?;
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                println!("{}", spliced);
            }
        }
        TopCommand::Check {
            path,
            tun_fd,
            strategy,
        } => {
            let raw = read_config(&path)?;
            let strategy = strategy.unwrap_or_default();
            let registry = Registry::standard();
            let options = match strategy {
                InjectionStrategy::RawSplice => config::transform(&raw, tun_fd, &registry)?,
                InjectionStrategy::PlatformDelegate => config::parse_typed(&raw, &registry)?,
            };
            print_summary(&options, strategy, config::usable_fd(tun_fd));
        }
        TopCommand::Version => {
            println!("slux {}", slux::ffi::build_version());
        }
    }
    Ok(())
}

fn read_config(path: &Path) -> anyhow::Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn print_summary(options: &Options, strategy: InjectionStrategy, tun_fd: Option<i32>) {
    println!("strategy: {}", strategy);
    println!("inbounds: {}", options.inbounds.len());
    for inbound in &options.inbounds {
        let tag = inbound.tag.as_deref().unwrap_or("-");
        match &inbound.options {
            InboundOptions::Tun(tun) => {
                let fd = match (strategy, tun.file_descriptor, tun_fd) {
                    (InjectionStrategy::RawSplice, Some(fd), _) => format!("fd={} (spliced)", fd),
                    (InjectionStrategy::PlatformDelegate, _, Some(fd)) => {
                        format!("fd={} (platform)", fd)
                    }
                    _ => "fd=none".to_string(),
                };
                println!("  tun {:<16} {} auto_route={}", tag, fd, tun.auto_route);
            }
            other => println!("  {:<3} {}", other.kind(), tag),
        }
    }
    println!("outbounds: {}", options.outbounds.len());
    for outbound in &options.outbounds {
        println!(
            "  {:<11} {}",
            outbound.options.kind(),
            outbound.tag.as_deref().unwrap_or("-")
        );
    }
    if let Some(dns) = &options.dns {
        println!("dns servers: {}", dns.servers.len());
        for server in &dns.servers {
            println!(
                "  {:<6} {}",
                server.transport.kind(),
                server.tag.as_deref().unwrap_or("-")
            );
        }
    }
}
