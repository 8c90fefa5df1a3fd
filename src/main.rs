mod cli;

use clap::Parser;
use cli::Cli;
use log::*;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::process::exit;
use vkdyn::smoke::{self, SmokeOptions, SmokeReport};

fn run(cli: &Cli) -> vkdyn::Result<SmokeReport> {
    let options = SmokeOptions::with_names(cli.app_name.as_deref(), cli.engine_name.as_deref())?;
    // The loader is closed again before this returns.
    return unsafe { smoke::run_scoped(cli.library.as_deref(), &options) };
}

fn main() {
    let cli = Cli::parse();
    vkdyn::logging::init(vkdyn::logging::level_from_verbosity(cli.verbose));

    match catch_unwind(AssertUnwindSafe(|| run(&cli))) {
        Ok(Ok(report)) => {
            println!(
                "{}: Vulkan {}.{}.{}, {} physical device(s), {} instance commands, {} device commands",
                report.device_name,
                vkdyn::vk::api_version_major(report.instance_version),
                vkdyn::vk::api_version_minor(report.instance_version),
                vkdyn::vk::api_version_patch(report.instance_version),
                report.physical_devices,
                report.instance_slots,
                report.device_slots,
            );
        }
        Ok(Err(e)) => {
            error!("{:?}", e);
            println!("vkdyn error: {}", e);
            exit(-1);
        }
        Err(_) => {
            println!("unknown error");
            exit(-1);
        }
    };
}
