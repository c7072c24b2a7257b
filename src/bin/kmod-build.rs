use anyhow::{bail, Result};

use kmod_build::build::Orchestrator;
use kmod_build::catalog::{self, Catalog};
use kmod_build::cli::{self, Command};
use kmod_build::fetch::ReqwestClient;
use kmod_build::preflight;

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    match cli::parse(&args)? {
        Command::List => list(),
        Command::Build(request) => build(request),
    }
}

fn list() -> Result<()> {
    let client = ReqwestClient::new()?;
    let catalog = Catalog::from_env(Box::new(client));
    catalog::print_versions(&catalog)
}

fn build(request: kmod_build::BuildRequest) -> Result<()> {
    preflight::check_host_tools()?;

    let client = ReqwestClient::new()?;
    let catalog = Catalog::from_env(Box::new(client));
    let report = Orchestrator::new(&catalog).run(&request)?;

    for version in &report.succeeded {
        println!("Built modules for {} {}", request.device, version);
    }

    if report.is_failure() {
        let mut versions = report.failed_versions();
        versions.dedup();
        bail!(
            "Could not build modules for version(s): {}\n\
             Run `kmod-build list` to see the published versions for each device.",
            versions.join(", ")
        );
    }

    Ok(())
}
