//! Check external tool availability.

use vidsync_common::config::AppConfig;
use vidsync_media::check_tools;

pub fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("VidSync System Check");
    println!("{}", "=".repeat(50));

    let tools = check_tools(&config.tools);
    for tool in &tools {
        if tool.available {
            println!("[OK] {}: {}", tool.name, tool.binary);
        } else {
            println!("[MISSING] {}: {} not found on PATH", tool.name, tool.binary);
        }
    }
    println!("     VMAF image: {}", config.tools.vmaf_image);

    println!();
    if tools.iter().all(|t| t.available) {
        println!("All tools are available. VidSync is ready.");
    } else {
        println!("Some tools are missing. Install them or set their paths in the config file.");
    }
    Ok(())
}
