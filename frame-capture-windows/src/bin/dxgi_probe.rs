//! Lists adapters and outputs, then captures a handful of frames.
//!
//! ```text
//! dxgi-probe [FRAMES] [ADAPTER] [OUTPUT]
//! ```
//!
//! Log verbosity follows `RUST_LOG` (e.g. `RUST_LOG=debug`). On hosts
//! without DXGI the simulated backend stands in.

use std::process::ExitCode;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use frame_capture_core::{
    AdapterCatalog, CaptureConfig, CaptureController, CaptureState, DesktopBounds,
    DuplicationBackend,
};

fn main() -> ExitCode {
    env_logger::init();

    let mut args = std::env::args().skip(1).map(|a| a.parse::<usize>());
    let mut next = |default: usize| args.next().unwrap_or(Ok(default));
    let (frames, adapter, output) = match (next(5), next(0), next(0)) {
        (Ok(f), Ok(a), Ok(o)) => (f, a, o),
        _ => {
            eprintln!("usage: dxgi-probe [FRAMES] [ADAPTER] [OUTPUT]");
            return ExitCode::FAILURE;
        }
    };

    #[cfg(target_os = "windows")]
    let (backend, desktop): (_, Arc<dyn DesktopBounds>) = (
        frame_capture_windows::DxgiBackend::new(),
        Arc::new(frame_capture_windows::VirtualScreenMetrics),
    );

    #[cfg(not(target_os = "windows"))]
    let (backend, desktop): (_, Arc<dyn DesktopBounds>) = {
        use frame_capture_core::{FixedDesktop, SimulatedBackend, Size};
        log::warn!("DXGI is unavailable on this platform; using the simulated backend");
        let size = Size::new(1920, 1080);
        (SimulatedBackend::new(size), Arc::new(FixedDesktop(size)))
    };

    match probe(backend, desktop, frames, adapter, output) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}

fn probe<B: DuplicationBackend>(
    backend: B,
    desktop: Arc<dyn DesktopBounds>,
    frames: usize,
    adapter: usize,
    output: usize,
) -> Result<(), String> {
    let catalog = AdapterCatalog::new(&backend);
    let adapters = catalog.list_adapters();
    if adapters.is_empty() {
        return Err("No available capture devices".into());
    }
    for info in &adapters {
        println!(
            "adapter {}: {} ({} MiB)",
            info.index,
            info.description,
            info.dedicated_video_memory / (1024 * 1024)
        );
        for out in catalog.list_outputs(info.index) {
            let attached = if out.attached_to_desktop { "" } else { " (detached)" };
            println!("  output {}: {}{}", out.index, out.name, attached);
        }
    }

    let config = CaptureConfig {
        adapter_index: adapter,
        output_index: output,
        ..CaptureConfig::for_desktop(desktop.virtual_desktop_size())
    };
    let controller =
        CaptureController::with_config(backend, desktop, config).map_err(|e| e.to_string())?;
    if controller.state() == CaptureState::Idle {
        return Err(controller
            .last_error()
            .unwrap_or_else(|| "No available capture devices".into()));
    }

    let (tx, rx) = mpsc::sync_channel(1);
    controller.subscribe(Arc::new(move || {
        let _ = tx.try_send(());
    }));
    controller.start();

    let wait = Duration::from_millis(u64::from(controller.timeout_ms()) * 40);
    for _ in 0..frames {
        rx.recv_timeout(wait)
            .map_err(|_| format!("no frame within {}ms", wait.as_millis()))?;
        if let Some(frame) = controller.latest_frame() {
            println!(
                "frame #{}: {}x{} from {}x{} source, present time {}",
                frame.sequence,
                frame.width,
                frame.height,
                frame.source_size.width,
                frame.source_size.height,
                frame.present_time
            );
        }
    }
    controller.stop();

    let status = controller.status().to_json().map_err(|e| e.to_string())?;
    println!("{status}");
    Ok(())
}
