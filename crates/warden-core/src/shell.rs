//! The one place where strings become shell syntax.
//!
//! Guest commands are argument vectors wherever possible. Only first-boot
//! configuration and a few guest-side conveniences run a script, and every
//! value spliced into such a script goes through [`quote`].

use std::path::Path;

use crate::error::{WardenError, WardenResult};

/// Single-quote `value` for POSIX `sh`
pub fn quote(value: &str) -> String {
    if !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+,".contains(c))
    {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// Quote and join an argument vector into one command line
pub fn join(args: &[impl AsRef<str>]) -> String {
    args.iter()
        .map(|a| quote(a.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Valid POSIX account name (lowercase, digits, `_`, `-`, max 32)
pub fn is_valid_user_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    name.len() <= 32
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

/// Valid environment variable name
pub fn is_valid_env_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Argument vector that writes `content` to `path` inside the guest. Both
/// travel as positional parameters, so neither is parsed by the shell.
pub fn write_file_argv(path: &str, content: &str) -> Vec<String> {
    vec![
        "sh".to_string(),
        "-c".to_string(),
        r#"mkdir -p "$(dirname "$2")" && printf '%s' "$1" > "$2""#.to_string(),
        "sh".to_string(),
        content.to_string(),
        path.to_string(),
    ]
}

/// Translate a host path to the guest's mount convention.
///
/// - `C:\Users\foo` -> `/mnt/c/Users/foo`
/// - `\\wsl$\warden\home\x` -> `/home/x`
/// - already-POSIX paths are returned unchanged
pub fn host_to_guest_path(path: &Path) -> WardenResult<String> {
    let text = path.to_string_lossy();

    for prefix in ["\\\\wsl$\\", "\\\\wsl.localhost\\"] {
        if let Some(rest) = text.strip_prefix(prefix) {
            return match rest.split_once('\\') {
                Some((_distro, inner)) => Ok(format!("/{}", inner.replace('\\', "/"))),
                None => Ok("/".to_string()),
            };
        }
    }

    let forward = text.replace('\\', "/");
    let bytes = forward.as_bytes();
    if bytes.len() >= 2 && bytes[1] == b':' {
        let drive = bytes[0] as char;
        if !drive.is_ascii_alphabetic() {
            return Err(WardenError::validation(format!("invalid drive letter in {}", text)));
        }
        if bytes.len() > 2 && bytes[2] != b'/' {
            return Err(WardenError::validation(format!("drive-relative path cannot be translated: {}", text)));
        }
        let rest = forward[2..].trim_end_matches('/');
        return Ok(format!("/mnt/{}{}", drive.to_ascii_lowercase(), rest));
    }

    if forward.starts_with('/') {
        Ok(forward)
    } else {
        Err(WardenError::validation(format!(
            "relative path cannot be translated into the guest: {}",
            text
        )))
    }
}
