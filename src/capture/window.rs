//! Window discovery and control for the viewer application.

use anyhow::{Result, anyhow};
use std::ffi::OsString;
use std::os::windows::ffi::OsStringExt;
use std::time::Duration;

use windows::Win32::Foundation::{BOOL, HWND, LPARAM, RECT, TRUE};
use windows::Win32::System::Threading::{
    OpenProcess, PROCESS_NAME_WIN32, PROCESS_QUERY_LIMITED_INFORMATION, QueryFullProcessImageNameW,
};
use windows::Win32::UI::WindowsAndMessaging::{
    BringWindowToTop, EnumWindows, GetWindowRect, GetWindowTextLengthW, GetWindowThreadProcessId,
    IsIconic, IsWindow, IsWindowVisible, SW_MINIMIZE, SW_RESTORE, SetForegroundWindow, ShowWindow,
};

use crate::automation::input::screen_size;
use crate::calibration::Region;

/// Executable file name of a process, without its directory.
fn process_name(process_id: u32) -> Option<String> {
    unsafe {
        let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, process_id).ok()?;

        let mut name_buf: Vec<u16> = vec![0; 1024];
        let mut len = name_buf.len() as u32;
        let result = QueryFullProcessImageNameW(
            handle,
            PROCESS_NAME_WIN32,
            windows::core::PWSTR(name_buf.as_mut_ptr()),
            &mut len,
        );
        let _ = windows::Win32::Foundation::CloseHandle(handle);

        if result.is_err() || len == 0 {
            return None;
        }

        let full_path = OsString::from_wide(&name_buf[..len as usize])
            .to_string_lossy()
            .to_string();
        full_path.rsplit('\\').next().map(|s| s.to_string())
    }
}

/// Finds the largest visible, titled window owned by a process with the
/// given executable name (case-insensitive).
pub fn find_viewer_window(executable: &str) -> Result<HWND> {
    struct EnumData {
        target: String,
        best: Option<(HWND, i64)>,
    }

    unsafe extern "system" fn enum_callback(hwnd: HWND, lparam: LPARAM) -> BOOL {
        unsafe {
            let data = &mut *(lparam.0 as *mut EnumData);

            if !IsWindowVisible(hwnd).as_bool() || GetWindowTextLengthW(hwnd) == 0 {
                return TRUE;
            }

            let mut process_id: u32 = 0;
            GetWindowThreadProcessId(hwnd, Some(&mut process_id));
            if process_id == 0 {
                return TRUE;
            }

            let Some(name) = process_name(process_id) else {
                return TRUE;
            };
            if name.to_lowercase() != data.target {
                return TRUE;
            }

            // A process can own several windows; the main one is the largest
            let mut rect = RECT::default();
            if GetWindowRect(hwnd, &mut rect).is_ok() {
                let area = (rect.right - rect.left) as i64 * (rect.bottom - rect.top) as i64;
                if data.best.is_none_or(|(_, best)| area > best) {
                    data.best = Some((hwnd, area));
                }
            }

            TRUE
        }
    }

    log::info!("Searching for {} window...", executable);
    let mut data = EnumData {
        target: executable.to_lowercase(),
        best: None,
    };
    unsafe {
        let _ = EnumWindows(Some(enum_callback), LPARAM(&mut data as *mut _ as isize));
    }

    data.best
        .map(|(hwnd, _)| hwnd)
        .ok_or_else(|| anyhow!("Could not find a {} window. Is the viewer running?", executable))
}

pub fn is_window_alive(hwnd: HWND) -> bool {
    unsafe { IsWindow(hwnd).as_bool() }
}

/// Restores the window if minimized and brings it to the foreground.
pub fn activate_window(hwnd: HWND) -> Result<()> {
    if !is_window_alive(hwnd) {
        return Err(anyhow!("Viewer window no longer exists"));
    }
    unsafe {
        if IsIconic(hwnd).as_bool() {
            let _ = ShowWindow(hwnd, SW_RESTORE);
            std::thread::sleep(Duration::from_millis(300));
        }
        let _ = BringWindowToTop(hwnd);
        let _ = SetForegroundWindow(hwnd);
    }
    std::thread::sleep(Duration::from_millis(300));
    Ok(())
}

pub fn minimize_window(hwnd: HWND) {
    unsafe {
        let _ = ShowWindow(hwnd, SW_MINIMIZE);
    }
}

/// Window rectangle in screen coordinates, clamped to the primary screen.
pub fn window_bounds(hwnd: HWND) -> Result<Region> {
    let mut rect = RECT::default();
    unsafe { GetWindowRect(hwnd, &mut rect)? };

    Region::clamped(
        rect.left as i64,
        rect.top as i64,
        rect.right as i64,
        rect.bottom as i64,
        screen_size(),
    )
    .ok_or_else(|| anyhow!("Viewer window is not on the primary screen"))
}
