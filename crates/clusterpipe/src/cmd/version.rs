use clusterpipe_packet::DEFAULT_PACKET_CAPACITY;
use clusterpipe_pipe::DEFAULT_WRITE_BUFFER_SIZE;

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("clusterpipe {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: clusterpipe");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("CLUSTERPIPE_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "rustc: {}",
        option_env!("RUSTC_VERSION").unwrap_or("unknown")
    );
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!("default_packet_capacity: {DEFAULT_PACKET_CAPACITY}");
    println!("default_write_buffer: {DEFAULT_WRITE_BUFFER_SIZE}");

    Ok(SUCCESS)
}
