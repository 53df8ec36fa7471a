//! Check the encoder installation.

use shadercap_common::config::AppConfig;
use shadercap_encoder::{encoder_version, resolve_encoder, BinarySource, Platform};

pub fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("Shadercap System Check");
    println!("{}", "=".repeat(50));

    match Platform::current() {
        Some(platform) => println!("[OK] Platform: {}", platform.dir_name()),
        None => println!("[WARN] Platform: unknown, bundled encoders are skipped"),
    }

    let binary = resolve_encoder(&config.encoder);
    let source = match binary.source {
        BinarySource::Configured => "configured",
        BinarySource::Bundled => "bundled",
        BinarySource::SearchPath => "PATH",
    };
    println!("[OK] Encoder: {} ({source})", binary.program.display());

    println!();
    match encoder_version(&binary) {
        Ok(version) => {
            println!("[OK] {version}");
            println!();
            println!("The encoder is available. Shadercap is ready.");
            Ok(())
        }
        Err(e) => {
            println!("[FAIL] Encoder did not run: {e}");
            println!();
            println!("Install ffmpeg or set `encoder.binary` in the config file.");
            Err(anyhow::anyhow!("encoder check failed"))
        }
    }
}
