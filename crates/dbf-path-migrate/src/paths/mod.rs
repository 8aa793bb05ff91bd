//! Windows path handling for stored file locations.
//!
//! Paths stored in the tables are Windows paths regardless of the platform
//! the migration runs on, so everything here works on strings with `\` as
//! the separator instead of going through [`std::path::Path`].
//!
//! - [`PathConfig`]: source anchor and destination base for one run
//! - [`rewrite`]: the pure old-path to new-path mapping

pub mod rewrite;

pub use rewrite::{resolve, transform, TransformResult};

use crate::error::{MigrateError, Result};

/// Path separator used in stored paths.
pub const SEP: char = '\\';

/// Default installation subpath below the drive root.
pub const DEFAULT_BASE_PATH: &str = r"Compacw\Empresas";

/// Default source drive letter.
pub const DEFAULT_DRIVE: char = 'C';

/// Source anchor and destination base for a run.
///
/// Built once per run. The target base is fixed by one of the `with_*`
/// builders and never changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathConfig {
    drive_letter: char,
    base_path: String,
    anchor_token: String,
    parent_token: Option<String>,
    target_base: String,
    net_host: Option<String>,
}

impl PathConfig {
    /// Create a config for `<drive>:\<base_path>` targeting the same drive.
    pub fn new(drive_letter: char, base_path: &str) -> Result<Self> {
        let drive_letter = parse_drive_letter(drive_letter)?;

        let base_path = clean_relative(base_path);
        if base_path.is_empty() {
            return Err(MigrateError::Config(
                "install.base_path must not be empty".into(),
            ));
        }

        let mut components = base_path.rsplit(SEP);
        let anchor_token = components.next().unwrap_or_default().to_string();
        let parent_token = components.next().map(str::to_string);

        Ok(Self {
            drive_letter,
            target_base: format!("{}:", drive_letter),
            base_path,
            anchor_token,
            parent_token,
            net_host: None,
        })
    }

    /// Target a local drive (`D:`), keeping the installation layout.
    pub fn with_local_target(mut self, drive_letter: char) -> Result<Self> {
        let drive_letter = parse_drive_letter(drive_letter)?;
        self.target_base = format!("{}:", drive_letter);
        self.net_host = None;
        Ok(self)
    }

    /// Target a network share on `host`.
    ///
    /// Without a share path the target is `\\host\<base_path>`. A share path
    /// that does not end with the anchor token gets it appended.
    pub fn with_network_target(mut self, host: &str, share_path: Option<&str>) -> Result<Self> {
        let host = host.trim().trim_matches(|c| c == '\\' || c == '/');
        if host.is_empty() {
            return Err(MigrateError::Config("target.host must not be empty".into()));
        }

        let share = share_path.map(clean_relative).unwrap_or_default();
        let target = if share.is_empty() {
            format!(r"\\{}\{}", host, self.base_path)
        } else if last_component(&share).eq_ignore_ascii_case(&self.anchor_token) {
            format!(r"\\{}\{}", host, share)
        } else {
            format!(r"\\{}\{}\{}", host, share, self.anchor_token)
        };

        self.target_base = normalize_target_base(&target);
        self.net_host = Some(host.to_string());
        Ok(self)
    }

    /// Use an explicit target base (drive, UNC root, UNC path or local path).
    pub fn with_target_base(mut self, target_base: &str) -> Result<Self> {
        let target = normalize_target_base(target_base);
        if target.is_empty() {
            return Err(MigrateError::Config("target.base must not be empty".into()));
        }
        self.net_host = unc_host(&target).map(str::to_string);
        self.target_base = target;
        Ok(self)
    }

    /// Source drive letter, uppercase.
    pub fn drive_letter(&self) -> char {
        self.drive_letter
    }

    /// Installation subpath, e.g. `Compacw\Empresas`.
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Final component of the base path, e.g. `Empresas`.
    pub fn anchor_token(&self) -> &str {
        &self.anchor_token
    }

    /// Component immediately before the anchor, e.g. `Compacw`.
    pub fn parent_token(&self) -> Option<&str> {
        self.parent_token.as_deref()
    }

    /// Destination base, never ending with a separator.
    pub fn target_base(&self) -> &str {
        &self.target_base
    }

    /// Host name when the target is a network share.
    pub fn net_host(&self) -> Option<&str> {
        self.net_host.as_deref()
    }

    /// Whether the target base is a UNC path.
    pub fn is_network_target(&self) -> bool {
        self.target_base.starts_with(r"\\")
    }

    /// Local drive designator, e.g. `C:`.
    pub fn local_letter_base(&self) -> String {
        format!("{}:", self.drive_letter)
    }

    /// Local installation root, e.g. `C:\Compacw\Empresas`.
    pub fn local_root(&self) -> String {
        format!("{}:{}{}", self.drive_letter, SEP, self.base_path)
    }

    /// The target base extended so that it ends with the anchor token.
    ///
    /// This is what every rewritten path starts with.
    pub fn target_prefix(&self) -> String {
        let root = root_len(&self.target_base);
        let last = last_component(&self.target_base[root..]);

        if last.eq_ignore_ascii_case(&self.anchor_token) {
            self.target_base.clone()
        } else if self
            .parent_token
            .as_deref()
            .is_some_and(|parent| last.eq_ignore_ascii_case(parent))
        {
            format!("{}{}{}", self.target_base, SEP, self.anchor_token)
        } else {
            format!("{}{}{}", self.target_base, SEP, self.base_path)
        }
    }

    /// Split `path` after the installation anchor.
    ///
    /// Looks for the full base path first, then for the anchor token alone,
    /// as case-insensitive text anywhere after the path root. Returns the
    /// remainder with leading separators stripped, or `None` when neither
    /// occurs.
    pub fn suffix_after_anchor<'a>(&self, path: &'a str) -> Option<&'a str> {
        find_text(path, &self.base_path)
            .or_else(|| find_text(path, &self.anchor_token))
            .map(|end| path[end..].trim_start_matches(SEP))
    }

    /// Split a path that already lives under [`PathConfig::target_prefix`].
    ///
    /// The prefix must match whole components. Returns the remainder with
    /// leading separators stripped.
    pub fn suffix_after_target<'a>(&self, path: &'a str) -> Option<&'a str> {
        let prefix = normalize_separators(&self.target_prefix());
        strip_component_prefix(path, &prefix).map(|end| path[end..].trim_start_matches(SEP))
    }
}

/// Validate and uppercase a drive letter.
pub fn parse_drive_letter(letter: char) -> Result<char> {
    if letter.is_ascii_alphabetic() {
        Ok(letter.to_ascii_uppercase())
    } else {
        Err(MigrateError::Config(format!(
            "drive letter must be a single letter A-Z, got '{}'",
            letter
        )))
    }
}

/// Convert `/` to `\` and collapse repeated separators.
///
/// A leading run of two or more separators is a UNC prefix and is kept as
/// exactly two.
pub fn normalize_separators(path: &str) -> String {
    let unified = path.replace('/', "\\");
    let body = unified.trim_start_matches(SEP);
    let leading = unified.len() - body.len();

    let mut out = String::with_capacity(unified.len());
    match leading {
        0 => {}
        1 => out.push(SEP),
        _ => out.push_str(r"\\"),
    }

    let mut previous_sep = false;
    for c in body.chars() {
        if c == SEP {
            if !previous_sep {
                out.push(c);
            }
            previous_sep = true;
        } else {
            out.push(c);
            previous_sep = false;
        }
    }
    out
}

/// Normalize a target base: trimmed, backslashes, no trailing separator.
///
/// A single letter is read as a drive (`d` → `D:`).
pub fn normalize_target_base(target: &str) -> String {
    let trimmed = target.trim();
    let mut chars = trimmed.chars();
    if let (Some(letter), None) = (chars.next(), chars.next()) {
        if letter.is_ascii_alphabetic() {
            return format!("{}:", letter.to_ascii_uppercase());
        }
    }

    let normalized = normalize_separators(trimmed);
    let keep = if normalized.starts_with(r"\\") { 2 } else { 0 };
    let end = normalized.trim_end_matches(SEP).len().max(keep);
    normalized[..end].to_string()
}

/// Normalize a relative path: backslashes, no leading, trailing or doubled
/// separators.
pub fn clean_relative(path: &str) -> String {
    normalize_separators(path.trim())
        .trim_matches(SEP)
        .to_string()
}

/// Whether the path is in drive-letter (`X:\...`) or UNC (`\\host\...`) form.
pub fn is_absolute(path: &str) -> bool {
    let path = path.trim();
    if path.starts_with(r"\\") || path.starts_with("//") {
        return true;
    }
    let bytes = path.as_bytes();
    bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes[2] == b'\\' || bytes[2] == b'/')
}

/// Host name of a UNC path.
pub fn unc_host(path: &str) -> Option<&str> {
    let rest = path.strip_prefix(r"\\")?;
    let host = rest.split(SEP).next().unwrap_or_default();
    (!host.is_empty()).then_some(host)
}

/// Byte length of the path root: `X:` or `\\host`.
fn root_len(path: &str) -> usize {
    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        return 2;
    }
    if let Some(host) = unc_host(path) {
        return 2 + host.len();
    }
    0
}

/// Last non-empty component of a backslash-separated path.
fn last_component(path: &str) -> &str {
    path.trim_end_matches(SEP)
        .rsplit(SEP)
        .next()
        .unwrap_or_default()
}

/// Find `needle` in `haystack`, case-insensitively and outside the root.
/// Returns the byte index just past the first match.
///
/// The match is plain text: `Empresas` is found inside `EmpresasOld` too.
pub(crate) fn find_text(haystack: &str, needle: &str) -> Option<usize> {
    let hay = haystack.as_bytes();
    let pat = needle.as_bytes();
    let root = root_len(haystack);
    if pat.is_empty() || root + pat.len() > hay.len() {
        return None;
    }

    (root..=hay.len() - pat.len())
        .find(|&start| hay[start..start + pat.len()].eq_ignore_ascii_case(pat))
        .map(|start| start + pat.len())
}

/// Whether `path` starts with `prefix` (case-insensitive) followed by a
/// separator or the end of the string. Returns the byte index past the
/// prefix.
pub(crate) fn strip_component_prefix(path: &str, prefix: &str) -> Option<usize> {
    let hay = path.as_bytes();
    let pat = prefix.as_bytes();
    if pat.len() > hay.len() || !hay[..pat.len()].eq_ignore_ascii_case(pat) {
        return None;
    }
    (hay.len() == pat.len() || hay[pat.len()] == b'\\').then_some(pat.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PathConfig {
        PathConfig::new('c', DEFAULT_BASE_PATH).unwrap()
    }

    #[test]
    fn test_new_derives_tokens() {
        let cfg = config();
        assert_eq!(cfg.drive_letter(), 'C');
        assert_eq!(cfg.base_path(), r"Compacw\Empresas");
        assert_eq!(cfg.anchor_token(), "Empresas");
        assert_eq!(cfg.parent_token(), Some("Compacw"));
        assert_eq!(cfg.target_base(), "C:");
        assert_eq!(cfg.local_root(), r"C:\Compacw\Empresas");
        assert_eq!(cfg.local_letter_base(), "C:");
    }

    #[test]
    fn test_base_path_is_normalized() {
        let cfg = PathConfig::new('C', r"/Compacw//Empresas\ ").unwrap();
        assert_eq!(cfg.base_path(), r"Compacw\Empresas");
    }

    #[test]
    fn test_empty_base_path_rejected() {
        assert!(PathConfig::new('C', r"\\").is_err());
        assert!(PathConfig::new('C', "   ").is_err());
    }

    #[test]
    fn test_bad_drive_rejected() {
        assert!(PathConfig::new('1', DEFAULT_BASE_PATH).is_err());
        assert!(config().with_local_target(':').is_err());
    }

    #[test]
    fn test_single_component_base_has_no_parent() {
        let cfg = PathConfig::new('C', "Empresas").unwrap();
        assert_eq!(cfg.anchor_token(), "Empresas");
        assert_eq!(cfg.parent_token(), None);
    }

    #[test]
    fn test_network_target_defaults_to_base_path() {
        let cfg = config().with_network_target("SRV", None).unwrap();
        assert_eq!(cfg.target_base(), r"\\SRV\Compacw\Empresas");
        assert_eq!(cfg.net_host(), Some("SRV"));
        assert!(cfg.is_network_target());
    }

    #[test]
    fn test_network_target_appends_anchor() {
        let cfg = config()
            .with_network_target(r"\\SRV", Some("Datos/Contpaq/"))
            .unwrap();
        assert_eq!(cfg.target_base(), r"\\SRV\Datos\Contpaq\Empresas");
    }

    #[test]
    fn test_network_target_keeps_anchor() {
        let cfg = config()
            .with_network_target("SRV", Some(r"\empresas\"))
            .unwrap();
        assert_eq!(cfg.target_base(), r"\\SRV\empresas");
    }

    #[test]
    fn test_network_target_requires_host() {
        assert!(config().with_network_target("  ", None).is_err());
    }

    #[test]
    fn test_explicit_target_base_normalized() {
        let cfg = config().with_target_base("//NEW/Compacw/Empresas/").unwrap();
        assert_eq!(cfg.target_base(), r"\\NEW\Compacw\Empresas");
        assert_eq!(cfg.net_host(), Some("NEW"));

        let cfg = config().with_target_base(r"e:\").unwrap();
        assert_eq!(cfg.target_base(), "e:");
        assert_eq!(cfg.net_host(), None);

        let cfg = config().with_target_base("d").unwrap();
        assert_eq!(cfg.target_base(), "D:");
    }

    #[test]
    fn test_target_prefix_shapes() {
        let cfg = config().with_target_base(r"\\SRV\Empresas").unwrap();
        assert_eq!(cfg.target_prefix(), r"\\SRV\Empresas");

        let cfg = config().with_target_base(r"\\SRV\compacw").unwrap();
        assert_eq!(cfg.target_prefix(), r"\\SRV\compacw\Empresas");

        let cfg = config().with_target_base("D:").unwrap();
        assert_eq!(cfg.target_prefix(), r"D:\Compacw\Empresas");

        // A host named like the anchor is still just a host.
        let cfg = config().with_target_base(r"\\Empresas").unwrap();
        assert_eq!(cfg.target_prefix(), r"\\Empresas\Compacw\Empresas");
    }

    #[test]
    fn test_normalize_separators_keeps_unc_prefix() {
        assert_eq!(normalize_separators(r"\\SRV\\a\\\b"), r"\\SRV\a\b");
        assert_eq!(normalize_separators(r"\\\SRV\a"), r"\\SRV\a");
        assert_eq!(normalize_separators("//SRV/a//b"), r"\\SRV\a\b");
        assert_eq!(normalize_separators(r"C:\\a\b"), r"C:\a\b");
        assert_eq!(normalize_separators(r"\a"), r"\a");
    }

    #[test]
    fn test_is_absolute() {
        assert!(is_absolute(r"C:\Compacw"));
        assert!(is_absolute("c:/Compacw"));
        assert!(is_absolute(r"\\SRV\share"));
        assert!(!is_absolute(r"Compacw\Empresas"));
        assert!(!is_absolute("C:"));
    }

    #[test]
    fn test_find_text_ignores_case_and_root() {
        assert_eq!(find_text(r"C:\Compacw\Empresas\X", "empresas"), Some(19));
        assert_eq!(find_text(r"C:\MisEmpresas\X", "Empresas"), Some(14));
        assert_eq!(find_text(r"\\EMPRESAS\Empresas\X", "Empresas"), Some(19));
        assert_eq!(find_text(r"\\EMPRESAS\X", "Empresas"), None);
        assert_eq!(find_text(r"Empresas\X", "Empresas"), Some(8));
    }

    #[test]
    fn test_suffix_after_anchor() {
        let cfg = config();
        assert_eq!(
            cfg.suffix_after_anchor(r"\\OLD\Compacw\Empresas\0001"),
            Some("0001")
        );
        assert_eq!(cfg.suffix_after_anchor(r"\\OLD\Empresas\0001\x"), Some(r"0001\x"));
        assert_eq!(cfg.suffix_after_anchor(r"C:\Compacw\Empresas"), Some(""));
        assert_eq!(cfg.suffix_after_anchor(r"C:\Otro\0001"), None);
        assert_eq!(cfg.suffix_after_anchor(r"C:\Compacw\EmpresasOld\Co1"), Some(r"Old\Co1"));
    }

    #[test]
    fn test_suffix_after_target() {
        let cfg = config()
            .with_target_base(r"\\SRV\Compacw\Empresas\Migrado")
            .unwrap();
        assert_eq!(
            cfg.suffix_after_target(r"\\srv\compacw\empresas\migrado\Compacw\Empresas\0001"),
            Some("0001")
        );
        assert_eq!(cfg.suffix_after_target(r"\\SRV\Compacw\Empresas\0001"), None);
        assert_eq!(cfg.suffix_after_target(r"\\SRV\Compacw\Empresas\MigradoX\Compacw\Empresas"), None);
    }
}
