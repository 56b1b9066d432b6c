use std::sync::Arc;

use anyhow::Result;
use sysinfo::Pid;
use tracing::{instrument, warn};
use xcb::{
    Connection,
    screensaver::{QueryInfo, QueryInfoReply},
    x::{self, ATOM_ANY, Atom, Drawable, GetProperty, GrabServer, InternAtom, UngrabServer, Window},
};

use super::{app_name_from_path, ActivitySource, ForegroundApp, UNKNOWN_WINDOW};

fn intern_atom(conn: &Connection, name: &[u8]) -> Result<Atom> {
    let reply = conn.wait_for_reply(conn.send_request(&InternAtom {
        only_if_exists: false,
        name,
    }))?;
    Ok(reply.atom())
}

fn window_pid(conn: &Connection, window: Window, pid_atom: Atom) -> Result<Option<u32>> {
    let result = conn.wait_for_reply(conn.send_request(&GetProperty {
        delete: false,
        window,
        property: pid_atom,
        r#type: ATOM_ANY,
        long_offset: 0,
        long_length: 1,
    }))?;
    let result_slice = result.value::<u32>();
    if result_slice.is_empty() {
        return Ok(None);
    }
    Ok(Some(result_slice[0]))
}

fn process_path(id: u32) -> Option<String> {
    let system = sysinfo::System::new_all();
    let process = system.process(Pid::from_u32(id))?;
    process.exe().and_then(|v| v.to_str()).map(|v| v.to_string())
}

fn active_window(conn: &Connection, root: &Window, active_window_atom: Atom) -> Result<Window> {
    let result = conn.wait_for_reply(conn.send_request(&GetProperty {
        delete: false,
        window: *root,
        property: active_window_atom,
        r#type: ATOM_ANY,
        long_offset: 0,
        long_length: 1,
    }))?;
    Ok(result.value::<Window>()[0])
}

fn window_name(conn: &Connection, window: Window, wm_name_atom: Atom) -> Result<String> {
    let wm_name = conn.wait_for_reply(conn.send_request(&x::GetProperty {
        delete: false,
        window,
        property: wm_name_atom,
        r#type: x::ATOM_ANY,
        long_offset: 0,
        long_length: 1024,
    }))?;
    Ok(String::from_utf8_lossy(wm_name.value()).into_owned())
}

pub struct X11ActivitySource {
    connection: Connection,
    preferred_screen: i32,
    active_window_atom: Atom,
    window_name_atom: Atom,
    pid_atom: Atom,
}

impl X11ActivitySource {
    pub fn new() -> Result<Self> {
        let (connection, preferred_screen) = xcb::Connection::connect(None)?;
        let active_window_atom = intern_atom(&connection, b"_NET_ACTIVE_WINDOW")?;
        let window_name_atom = intern_atom(&connection, b"_NET_WM_NAME")?;
        let pid_atom = intern_atom(&connection, b"_NET_WM_PID")?;
        Ok(Self {
            connection,
            preferred_screen,
            active_window_atom,
            window_name_atom,
            pid_atom,
        })
    }

    fn root_window(&self) -> Window {
        let setup = self.connection.get_setup();
        // Currently the application only supports 1 x11 screen.
        setup
            .roots()
            .nth(self.preferred_screen.max(0) as usize)
            .unwrap()
            .root()
    }

    #[instrument(skip(self))]
    fn focused_window(&self) -> Result<Window> {
        let root = self.root_window();
        active_window(&self.connection, &root, self.active_window_atom)
    }

    fn sample_app_inner(&self) -> Result<Option<ForegroundApp>> {
        let window = self.focused_window()?;
        let Some(pid) = window_pid(&self.connection, window, self.pid_atom)? else {
            return Ok(None);
        };
        Ok(process_path(pid).map(|path| ForegroundApp {
            name: app_name_from_path(&path),
        }))
    }
}

impl ActivitySource for X11ActivitySource {
    fn sample_idle_seconds(&mut self) -> Result<f64> {
        let root = self.root_window();
        let idle = self.connection.send_request(&QueryInfo {
            drawable: Drawable::Window(root),
        });
        let reply: QueryInfoReply = self.connection.wait_for_reply(idle)?;
        Ok(reply.ms_since_user_input() as f64 / 1000.0)
    }

    #[instrument(skip(self))]
    fn sample_foreground_app(&mut self) -> Result<Option<ForegroundApp>> {
        let _ = self.connection.send_request(&GrabServer {});
        let result = self.sample_app_inner();
        let _ = self.connection.send_request(&UngrabServer {});
        result
    }

    fn sample_window_title(&mut self, _app: &ForegroundApp) -> Arc<str> {
        let title = self
            .focused_window()
            .and_then(|window| window_name(&self.connection, window, self.window_name_atom));
        match title {
            Ok(title) if !title.is_empty() => title.into(),
            Ok(_) => UNKNOWN_WINDOW.into(),
            Err(e) => {
                warn!("Failed to read window title: {e}");
                UNKNOWN_WINDOW.into()
            }
        }
    }
}
