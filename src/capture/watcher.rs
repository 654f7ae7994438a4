//! Stop signals from the user: any key press, or Ctrl+C in the console.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::JoinHandle;
use std::time::Duration;

use windows::Win32::Foundation::{BOOL, FALSE, TRUE};
use windows::Win32::System::Console::SetConsoleCtrlHandler;
use windows::Win32::UI::Input::KeyboardAndMouse::GetAsyncKeyState;

use crate::automation::abort::CancelToken;

/// Virtual key codes polled by the watcher. Mouse buttons (1-6) are
/// excluded because the session clicks on its own.
const WATCHED_KEYS: std::ops::RangeInclusive<i32> = 0x08..=0xFE;

/// Token cancelled by the console control handler.
static CONSOLE_CANCEL: OnceLock<CancelToken> = OnceLock::new();

/// Polls the keyboard on a background thread and cancels on any key.
///
/// The watcher stops when dropped.
pub struct KeyWatcher {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl KeyWatcher {
    pub fn spawn(cancel: CancelToken) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();

        let handle = std::thread::spawn(move || {
            // Clear "pressed since last call" bits left from before the session
            for key in WATCHED_KEYS {
                unsafe { GetAsyncKeyState(key) };
            }

            while !stop_flag.load(Ordering::SeqCst) {
                let pressed = WATCHED_KEYS
                    .into_iter()
                    .any(|key| unsafe { GetAsyncKeyState(key) } as u16 & 0x8000 != 0);
                if pressed {
                    log::info!("Key pressed, stopping...");
                    cancel.request();
                    return;
                }
                std::thread::sleep(Duration::from_millis(50));
            }
        });

        Self {
            stop,
            handle: Some(handle),
        }
    }
}

impl Drop for KeyWatcher {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

unsafe extern "system" fn console_handler(_ctrl_type: u32) -> BOOL {
    match CONSOLE_CANCEL.get() {
        Some(token) => {
            token.request();
            TRUE
        }
        None => FALSE,
    }
}

/// Routes Ctrl+C and console close events to `cancel`.
///
/// Only the first registered token is used for the lifetime of the process.
pub fn install_console_handler(cancel: CancelToken) {
    if CONSOLE_CANCEL.set(cancel).is_err() {
        return;
    }
    unsafe {
        if let Err(e) = SetConsoleCtrlHandler(Some(console_handler), true) {
            log::warn!("Failed to install console handler: {}", e);
        }
    }
}
