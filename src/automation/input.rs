//! Mouse and keyboard input simulation.
//!
//! Uses SendInput, which simulates hardware-level input and moves the real
//! cursor. The viewer must be in the foreground for clicks to land.

use anyhow::{Result, anyhow};
use std::time::Duration;

use windows::Win32::UI::Input::KeyboardAndMouse::{
    INPUT, INPUT_0, INPUT_KEYBOARD, INPUT_MOUSE, KEYBD_EVENT_FLAGS, KEYBDINPUT, KEYEVENTF_KEYUP,
    MOUSE_EVENT_FLAGS, MOUSEEVENTF_ABSOLUTE, MOUSEEVENTF_LEFTDOWN, MOUSEEVENTF_LEFTUP,
    MOUSEEVENTF_MOVE, MOUSEINPUT, SendInput, VIRTUAL_KEY,
};
use windows::Win32::UI::WindowsAndMessaging::{GetSystemMetrics, SM_CXSCREEN, SM_CYSCREEN};

/// Primary screen size in pixels.
pub fn screen_size() -> (u32, u32) {
    let width = unsafe { GetSystemMetrics(SM_CXSCREEN) };
    let height = unsafe { GetSystemMetrics(SM_CYSCREEN) };
    (width.max(1) as u32, height.max(1) as u32)
}

/// Normalizes screen coordinates to the 0-65535 range required by
/// MOUSEEVENTF_ABSOLUTE.
fn normalize(x: i32, y: i32) -> (i32, i32) {
    let (width, height) = screen_size();
    (
        ((x as i64 * 65535) / width as i64) as i32,
        ((y as i64 * 65535) / height as i64) as i32,
    )
}

fn mouse_input(x: i32, y: i32, flags: MOUSE_EVENT_FLAGS) -> INPUT {
    let (dx, dy) = normalize(x, y);
    INPUT {
        r#type: INPUT_MOUSE,
        Anonymous: INPUT_0 {
            mi: MOUSEINPUT {
                dx,
                dy,
                dwFlags: flags | MOUSEEVENTF_ABSOLUTE | MOUSEEVENTF_MOVE,
                ..Default::default()
            },
        },
    }
}

fn key_input(key: VIRTUAL_KEY, flags: KEYBD_EVENT_FLAGS) -> INPUT {
    INPUT {
        r#type: INPUT_KEYBOARD,
        Anonymous: INPUT_0 {
            ki: KEYBDINPUT {
                wVk: key,
                dwFlags: flags,
                ..Default::default()
            },
        },
    }
}

fn send(inputs: &[INPUT]) -> Result<()> {
    let sent = unsafe { SendInput(inputs, std::mem::size_of::<INPUT>() as i32) };
    if sent as usize != inputs.len() {
        return Err(anyhow!(
            "SendInput delivered {} of {} events",
            sent,
            inputs.len()
        ));
    }
    Ok(())
}

/// Moves the cursor to absolute screen coordinates.
pub fn move_cursor(x: i32, y: i32) -> Result<()> {
    send(&[mouse_input(x, y, MOUSE_EVENT_FLAGS(0))])
}

/// Moves to the position, then presses and releases the left button.
///
/// Moving first makes menu clicks register reliably.
pub fn click_at(x: i32, y: i32) -> Result<()> {
    move_cursor(x, y)?;
    std::thread::sleep(Duration::from_millis(100));

    send(&[mouse_input(x, y, MOUSEEVENTF_LEFTDOWN)])?;
    std::thread::sleep(Duration::from_millis(50));
    send(&[mouse_input(x, y, MOUSEEVENTF_LEFTUP)])?;
    std::thread::sleep(Duration::from_millis(300));
    Ok(())
}

/// Presses and releases a key.
pub fn press_key(key: VIRTUAL_KEY) -> Result<()> {
    send(&[
        key_input(key, KEYBD_EVENT_FLAGS(0)),
        key_input(key, KEYEVENTF_KEYUP),
    ])
}
