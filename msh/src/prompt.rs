use console::style;
use std::path::Path;

fn current_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("LOGNAME"))
        .unwrap_or_else(|_| "user".to_string())
}

/// Last component of `cwd`; `/` stays `/` and the home directory is `~`.
fn cwd_name(cwd: &Path) -> String {
    if dirs::home_dir().is_some_and(|home| home == cwd) {
        return "~".to_string();
    }
    cwd.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| cwd.to_string_lossy().into_owned())
}

/// Fills in `{user}`, `{cwd}` and `{status}`. `{status}` is empty after a
/// successful command.
pub fn render(template: &str, user: &str, cwd: &Path, status: i32, colored: bool) -> String {
    let user = style(user).green().bold().force_styling(colored);
    let cwd = style(cwd_name(cwd)).blue().bold().force_styling(colored);
    let status = if status == 0 {
        String::new()
    } else {
        style(format!("[{status}]"))
            .red()
            .force_styling(colored)
            .to_string()
    };
    template
        .replace("{user}", &user.to_string())
        .replace("{cwd}", &cwd.to_string())
        .replace("{status}", &status)
}

/// The prompt for the current process state.
pub fn current(template: &str, status: i32) -> String {
    let cwd = std::env::current_dir().unwrap_or_else(|_| "?".into());
    render(
        template,
        &current_user(),
        &cwd,
        status,
        console::colors_enabled(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_PROMPT;

    #[test]
    fn default_template() {
        let prompt = render(DEFAULT_PROMPT, "alice", Path::new("/srv/www"), 0, false);
        assert_eq!("alice@msh:www$ ", prompt);
    }

    #[test]
    fn status_and_root() {
        let prompt = render("{cwd}{status}> ", "bob", Path::new("/"), 130, false);
        assert_eq!("/[130]> ", prompt);
    }

    #[test]
    fn styled_prompt_measures_as_plain() {
        let prompt = render(DEFAULT_PROMPT, "alice", Path::new("/srv/www"), 0, true);
        assert_ne!("alice@msh:www$ ", prompt);
        assert_eq!(
            "alice@msh:www$ ".len(),
            console::measure_text_width(&prompt)
        );
    }
}
