//! Contains logic for sampling foreground activity from different
//! environments. [GenericActivitySource] is the main artifact of this module
//! that abstracts the operations.

#[cfg(feature = "win")]
pub mod win;
#[cfg(feature = "x11")]
pub mod x11;

#[cfg(feature = "win")]
extern crate windows;

#[cfg(feature = "x11")]
extern crate xcb;

use std::sync::Arc;

use anyhow::Result;

/// Title reported when the platform cannot read the focused window's name.
pub const UNKNOWN_WINDOW: &str = "Unknown Window";

/// Foreground application as reported by the platform. `name` is the
/// executable's file name, not its full path: 'Code', 'firefox', 'Slack'.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForegroundApp {
    pub name: Arc<str>,
}

/// Contract every platform sampler must implement. The sampler core never
/// branches on platform; it only talks to this trait.
#[cfg_attr(test, mockall::automock)]
pub trait ActivitySource {
    /// Seconds since the last user input.
    fn sample_idle_seconds(&mut self) -> Result<f64>;

    /// Currently focused application, `None` when the desktop has no focused
    /// window (e.g. lock screen).
    fn sample_foreground_app(&mut self) -> Result<Option<ForegroundApp>>;

    /// Title of the focused window. Never fails: platforms that cannot read
    /// it report [UNKNOWN_WINDOW].
    fn sample_window_title(&mut self, app: &ForegroundApp) -> Arc<str>;
}

/// Serves as a cross-compatible [ActivitySource] implementation.
pub struct GenericActivitySource {
    inner: Box<dyn ActivitySource>,
}

impl GenericActivitySource {
    pub fn new() -> Result<Self> {
        cfg_if::cfg_if! {
            if #[cfg(feature = "win")] {
                use win::WindowsActivitySource;
                Ok(Self {
                    inner: Box::new(WindowsActivitySource::new()),
                })
            }
            else if #[cfg(feature = "x11")] {
                use x11::X11ActivitySource;
                Ok(Self {
                    inner: Box::new(X11ActivitySource::new()?),
                })
            }
            else {
                // This runtime error is needed to allow the project to be compiled for during testing.
                unimplemented!("No activity source was specified")
            }
        }
    }
}

impl ActivitySource for GenericActivitySource {
    fn sample_idle_seconds(&mut self) -> Result<f64> {
        self.inner.sample_idle_seconds()
    }

    fn sample_foreground_app(&mut self) -> Result<Option<ForegroundApp>> {
        self.inner.sample_foreground_app()
    }

    fn sample_window_title(&mut self, app: &ForegroundApp) -> Arc<str> {
        self.inner.sample_window_title(app)
    }
}

/// Executable path -> presentable application name. Splits on both separator
/// styles because a unix-built cli may still read windows-recorded logs.
pub(crate) fn app_name_from_path(path: &str) -> Arc<str> {
    let base = path.rsplit(['/', '\\']).next().unwrap_or(path);
    base.strip_suffix(".exe")
        .or_else(|| base.strip_suffix(".EXE"))
        .unwrap_or(base)
        .into()
}

#[cfg(test)]
mod tests {
    use super::app_name_from_path;

    #[test]
    fn app_name_strips_directories_and_extension() {
        assert_eq!(&*app_name_from_path("/usr/bin/firefox"), "firefox");
        assert_eq!(&*app_name_from_path(r"C:\Program Files\Code\Code.exe"), "Code");
        assert_eq!(&*app_name_from_path("Slack"), "Slack");
    }
}
