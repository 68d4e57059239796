use crate::config::Config;
use serde::Serialize;
use std::path::Path;
use sysinfo::System;
use tracing::info;

#[derive(Serialize, Debug)]
pub struct SystemInfo {
    pub version: String,
    pub platform: String,
    pub arch: String,
    pub cpus: usize,
    pub cpu_model: String,
    pub memory_total_gb: f64,
    pub memory_free_gb: f64,
    pub prober: String,
}

/// First line of `<program> -version`, or "not available".
pub fn prober_version(program: &Path) -> String {
    match std::process::Command::new(program).arg("-version").output() {
        Ok(output) if output.status.success() => String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .unwrap_or("unknown")
            .to_string(),
        _ => "not available".to_string(),
    }
}

pub fn get_system_info(config: &Config) -> SystemInfo {
    let mut system = System::new();
    system.refresh_memory();
    system.refresh_cpu();

    let cpu_model = system
        .cpus()
        .first()
        .map(|cpu| cpu.brand().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    SystemInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        platform: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
        cpus: system.cpus().len(),
        cpu_model,
        memory_total_gb: system.total_memory() as f64 / 1024.0 / 1024.0 / 1024.0,
        memory_free_gb: system.free_memory() as f64 / 1024.0 / 1024.0 / 1024.0,
        prober: prober_version(&config.ffprobe_path),
    }
}

pub fn log_startup_info(config: &Config) {
    let sys_info = get_system_info(config);
    info!("{}", "=".repeat(60));
    info!("Tubely backend v{} starting ({})", sys_info.version, config.platform);
    info!("  Platform: {} ({})", sys_info.platform, sys_info.arch);
    info!("  CPUs: {} ({})", sys_info.cpus, sys_info.cpu_model);
    info!(
        "  Memory: {:.2} GB total, {:.2} GB free",
        sys_info.memory_total_gb, sys_info.memory_free_gb
    );
    info!("  Prober: {}", sys_info.prober);
    info!("  Assets root: {:?}", config.assets_root);
    info!("  Bucket: {} ({})", config.s3_bucket, config.s3_region);
    info!("{}", "=".repeat(60));
}
