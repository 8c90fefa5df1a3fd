use clap::Parser;
use std::path::PathBuf;

/// Load the Vulkan loader at runtime and check that dispatch tables built
/// in one call match ones re-initialized in place.
#[derive(Parser, Debug)]
#[command(name = "dispatch-smoke", version)]
pub struct Cli {
    /// Vulkan loader library to open instead of the platform default
    #[arg(long, env = "VKDYN_LIBRARY")]
    pub library: Option<PathBuf>,

    /// Application name reported to the driver [default: DispatchLoaderDynamic]
    #[arg(long)]
    pub app_name: Option<String>,

    /// Engine name reported to the driver [default: vkdyn]
    #[arg(long)]
    pub engine_name: Option<String>,

    /// More output; repeat for more
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}
