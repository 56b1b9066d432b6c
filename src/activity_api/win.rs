use std::sync::Arc;

use anyhow::{anyhow, Result};
use tracing::error;
use windows::{
    Win32::{
        Foundation::{BOOL, CloseHandle, HWND},
        System::{
            SystemInformation::GetTickCount64,
            Threading::{
                OpenProcess, PROCESS_NAME_WIN32, PROCESS_QUERY_INFORMATION, PROCESS_VM_READ,
                QueryFullProcessImageNameW,
            },
        },
        UI::{
            Input::KeyboardAndMouse::{GetLastInputInfo, LASTINPUTINFO},
            WindowsAndMessaging::{GetForegroundWindow, GetWindowTextW, GetWindowThreadProcessId},
        },
    },
};

use super::{app_name_from_path, ActivitySource, ForegroundApp, UNKNOWN_WINDOW};

pub struct WindowsActivitySource {}

impl WindowsActivitySource {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for WindowsActivitySource {
    fn default() -> Self {
        Self::new()
    }
}

fn foreground_window() -> Option<HWND> {
    let window = unsafe { GetForegroundWindow() };
    if window.is_invalid() {
        None
    } else {
        Some(window)
    }
}

fn process_image_path(window: HWND) -> Result<String> {
    let mut id = 0u32;
    unsafe { GetWindowThreadProcessId(window, Some(&mut id)) };
    if id == 0 {
        return Err(anyhow!("Foreground window has no owning process"));
    }

    let process_handle = unsafe {
        OpenProcess(
            PROCESS_QUERY_INFORMATION | PROCESS_VM_READ,
            BOOL::from(false),
            id,
        )
    }
    .inspect_err(|e| error!("Failed to open process {e:?}"))?;

    let mut text: [u16; 4096] = [0; 4096];
    let mut length = text.len() as u32;
    let path = unsafe {
        QueryFullProcessImageNameW(
            process_handle,
            PROCESS_NAME_WIN32,
            windows::core::PWSTR(text.as_mut_ptr()),
            &mut length,
        )
    }
    .map(|_| String::from_utf16_lossy(&text[..length as usize]));

    unsafe { CloseHandle(process_handle) }
        .inspect_err(|e| error!("Failed to close handle {e:?}"))?;

    Ok(path?)
}

fn window_title(window: HWND) -> Arc<str> {
    let mut text: [u16; 4096] = [0; 4096];
    let len = unsafe { GetWindowTextW(window, &mut text) };
    if len <= 0 {
        return UNKNOWN_WINDOW.into();
    }
    String::from_utf16_lossy(&text[..len as usize]).into()
}

impl ActivitySource for WindowsActivitySource {
    fn sample_idle_seconds(&mut self) -> Result<f64> {
        let mut last: LASTINPUTINFO = LASTINPUTINFO {
            cbSize: size_of::<LASTINPUTINFO>() as u32,
            dwTime: 0,
        };
        let is_success = unsafe { GetLastInputInfo(&mut last) };
        if !is_success.as_bool() {
            error!("Failed to retrieve user idle time");
            return Err(anyhow!("Failed to retrieve user idle time"));
        }

        let tick_count = unsafe { GetTickCount64() };
        let idle_ms = tick_count.saturating_sub(last.dwTime as u64);
        Ok(idle_ms as f64 / 1000.0)
    }

    fn sample_foreground_app(&mut self) -> Result<Option<ForegroundApp>> {
        let Some(window) = foreground_window() else {
            return Ok(None);
        };
        let path = process_image_path(window)
            .inspect_err(|e| error!("Failed to get foreground process {e:?}"))?;
        Ok(Some(ForegroundApp {
            name: app_name_from_path(&path),
        }))
    }

    fn sample_window_title(&mut self, _app: &ForegroundApp) -> Arc<str> {
        match foreground_window() {
            Some(window) => window_title(window),
            None => UNKNOWN_WINDOW.into(),
        }
    }
}
