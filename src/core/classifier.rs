use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::config::keywords::ProjectKeywordMap;

/// Project label for activity nothing matched. Also the grouping bucket for
/// sessions that carry no label at all.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// Browsers for which productivity is decided by the visited site rather than
/// the application itself.
const BROWSERS: [&str; 6] = [
    "Safari",
    "Google Chrome",
    "Chrome",
    "Firefox",
    "Edge",
    "Brave",
];

/// Decides whether a sample counts as work. App names match the configured
/// allow-list by substring, case-sensitive. A recognized browser is judged by
/// its window title against the website allow-list instead.
pub fn is_productive(
    app_name: Option<&str>,
    window_title: Option<&str>,
    productive_apps: &[String],
    productive_websites: &[String],
) -> bool {
    let Some(app) = app_name else {
        return false;
    };

    if productive_apps.iter().any(|p| app.contains(p.as_str())) {
        return true;
    }

    if BROWSERS.iter().any(|b| app.contains(b)) {
        let Some(title) = window_title else {
            return false;
        };
        return productive_websites.iter().any(|w| title.contains(w.as_str()));
    }

    false
}

/// `"<name> - <editor>"` titles. The capture is only trusted when it doesn't
/// look like a bare filename (no dot, short).
static EDITOR_TITLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(.+?)\s+[-\u{2013}\u{2014}]\s+(?:Visual Studio Code|VSCodium|Code|Cursor|Zed|Sublime Text|IntelliJ IDEA|PyCharm|CLion|RustRover|WebStorm|Android Studio|Xcode|Neovim|NVIM|GNU Emacs|Emacs|Vim)\b",
    )
    .unwrap()
});

/// A path separator followed by a final segment, as in `~/dev/myapp` or
/// `C:\work\myapp`.
static PATH_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[/\\]([A-Za-z0-9._~-]+)(?:\s|$)").unwrap());

/// Hosting-service titles like `GitHub - owner/repo: description`.
static HOSTED_REPO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[-\u{2013}\u{2014}:]\s*[A-Za-z0-9._-]+/([A-Za-z0-9._-]+)").unwrap()
});

/// Issue-tracker tickets like `[PROJ-123]`.
static TICKET: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[([A-Za-z]+)-\d+\]").unwrap());

/// Attributes a sample to a project. Configured keywords are checked first in
/// map order; heuristic title patterns follow in fixed priority. Always
/// returns a label, [UNCATEGORIZED] when nothing matches.
pub fn detect_project(
    window_title: Option<&str>,
    app_name: Option<&str>,
    keywords: &ProjectKeywordMap,
) -> Arc<str> {
    let search = format!(
        "{} {}",
        window_title.unwrap_or_default(),
        app_name.unwrap_or_default()
    )
    .to_lowercase();

    for entry in keywords.iter() {
        if entry
            .keywords
            .iter()
            .any(|k| !k.is_empty() && search.contains(&k.to_lowercase()))
        {
            return entry.project.as_str().into();
        }
    }

    if let Some(title) = window_title {
        if let Some(project) = extract_from_title(title) {
            return project;
        }
    }

    UNCATEGORIZED.into()
}

fn extract_from_title(title: &str) -> Option<Arc<str>> {
    if let Some(caps) = EDITOR_TITLE.captures(title) {
        let name = caps[1].trim();
        if !name.contains('.') && name.len() < 50 {
            return Some(name.into());
        }
    }

    // Take the deepest segment when the title contains a path.
    if let Some(caps) = PATH_SEGMENT.captures_iter(title).last() {
        let segment = caps[1].trim_matches('~');
        if !segment.is_empty() {
            return Some(segment.into());
        }
    }

    if let Some(caps) = HOSTED_REPO.captures(title) {
        let repo = caps[1].trim_end_matches(':');
        if !repo.is_empty() {
            return Some(repo.into());
        }
    }

    if let Some(caps) = TICKET.captures(title) {
        return Some(caps[1].to_string().into());
    }

    None
}
