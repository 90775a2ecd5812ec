use std::thread;

use anyhow::{Context, Result};

use droidtap_core::sleep::Cancel;

/// Start a background thread that trips `cancel` on Ctrl-C.
pub fn install(cancel: Cancel) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build signal runtime")?;

    thread::Builder::new()
        .name("signal".into())
        .spawn(move || {
            runtime.block_on(async {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        log::info!("received keyboard interrupt");
                        cancel.cancel();
                    }
                    Err(e) => log::error!("failed to listen for Ctrl-C: {}", e),
                }
            });
        })
        .context("failed to spawn signal thread")?;
    Ok(())
}
