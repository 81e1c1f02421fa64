//! Model management: list, download with progress, delete.

use std::io::{self, Write};

use anyhow::{anyhow, Result};
use console::style;

use dikta_core::model::registry::{self, EngineKind};
use dikta_core::{CancelToken, DownloadProgress, ModelStore, REGISTRY};

pub fn list() -> Result<()> {
    let store = ModelStore::new()?;

    for kind in [EngineKind::Whisper, EngineKind::Vosk, EngineKind::Llm] {
        println!("{}", style(kind.display_name()).bold());
        for desc in registry::by_engine(kind) {
            let mark = if store.is_downloaded(desc) {
                style("downloaded").green()
            } else {
                style("not downloaded").dim()
            };
            println!(
                "  {:<18} {:<26} {:>8}  [{}]",
                desc.id,
                desc.name,
                format_size(desc.size),
                mark
            );
        }
        println!();
    }
    println!("Models directory: {}", store.models_dir().display());
    Ok(())
}

pub async fn download(model_id: &str) -> Result<()> {
    let desc = REGISTRY
        .iter()
        .find(|d| d.id == model_id)
        .ok_or_else(|| anyhow!("unknown model: {model_id} (see `dikta models list`)"))?;

    let store = ModelStore::new()?;
    if store.is_downloaded(desc) {
        println!("{} is already downloaded", desc.id);
        return Ok(());
    }

    eprintln!("Downloading {} from {}", desc.id, desc.url);

    let cancel = CancelToken::new();
    let (tx, rx) = crossbeam_channel::bounded::<DownloadProgress>(64);

    let printer = std::thread::spawn(move || {
        for p in rx {
            if let Some(err) = p.error {
                eprintln!("\rDownload failed: {err}");
                return;
            }
            if p.done {
                eprintln!("\rDownload complete ({})          ", format_size(p.total));
                return;
            }
            let percent = if p.total > 0 {
                p.downloaded * 100 / p.total
            } else {
                0
            };
            eprint!(
                "\rDownloading: {percent}% ({} / {})  ",
                format_size(p.downloaded),
                format_size(p.total)
            );
            io::stderr().flush().ok();
        }
    });

    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nCancelling...");
            ctrl_c_cancel.cancel();
        }
    });

    let result =
        tokio::task::spawn_blocking(move || store.download(desc, &cancel, Some(&tx))).await?;
    let _ = printer.join();

    result?;
    println!("{} ready", desc.id);
    Ok(())
}

pub fn delete(model_id: &str) -> Result<()> {
    let desc = REGISTRY
        .iter()
        .find(|d| d.id == model_id)
        .ok_or_else(|| anyhow!("unknown model: {model_id}"))?;

    let store = ModelStore::new()?;
    if !store.is_downloaded(desc) {
        println!("{} is not downloaded", desc.id);
        return Ok(());
    }
    store.delete(desc)?;
    println!("Deleted {}", desc.id);
    Ok(())
}

fn format_size(bytes: u64) -> String {
    const MIB: f64 = 1024.0 * 1024.0;
    let mib = bytes as f64 / MIB;
    if mib >= 1024.0 {
        format!("{:.1} GB", mib / 1024.0)
    } else {
        format!("{mib:.0} MB")
    }
}
