//! Hook commands and the provisioning script.

use std::path::Path;

use tracing::{error, info};

use crate::error::{Error, Result};
use crate::system::CommandRunner;

/// Placeholder replaced with the link name in per-interface hooks.
pub const IFACE_VAR: &str = "$iface";

/// Default location the provisioning script is written to.
pub const DEFAULT_SCRIPT_PATH: &str = "/var/lib/rancher/conf/network.sh";

/// Split one hook into an argument vector, substituting `$iface`.
///
/// Without a link (global hooks) `$iface` expands to nothing. Returns
/// `Ok(None)` for blank commands.
pub fn command_argv(cmd: &str, iface: Option<&str>) -> Result<Option<Vec<String>>> {
    let cmd = cmd.trim();
    if cmd.is_empty() {
        return Ok(None);
    }

    let cmd = cmd.replace(IFACE_VAR, iface.unwrap_or(""));

    let argv = shell_words::split(&cmd).map_err(|source| Error::CommandParse {
        command: cmd.clone(),
        source,
    })?;
    Ok((!argv.is_empty()).then_some(argv))
}

/// Run each command in order. Failures are logged and do not stop the rest.
pub async fn run_commands<R: CommandRunner + ?Sized>(runner: &R, cmds: &[String], iface: Option<&str>) {
    for cmd in cmds {
        let argv = match command_argv(cmd, iface) {
            Ok(Some(argv)) => argv,
            Ok(None) => continue,
            Err(e) => {
                error!(error = %e, "skipping hook");
                continue;
            }
        };

        info!(command = %argv.join(" "), link = iface.unwrap_or(""), "running hook");
        if let Err(e) = runner.run_command(&argv).await {
            error!(error = %e, link = iface.unwrap_or(""), "hook failed");
        }
    }
}

/// Write `body` to `path` as an executable script and run it.
pub async fn run_script<R: CommandRunner + ?Sized>(runner: &R, body: &str, path: &Path) -> Result<()> {
    write_script(body, path)?;
    info!(path = %path.display(), "running network script");
    runner.run_command(&[path.display().to_string()]).await
}

fn write_script(body: &str, path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, body)?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}
