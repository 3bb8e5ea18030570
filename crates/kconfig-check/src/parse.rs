//! Parser for kernel `.config` files and defconfig fragments.
//!
//! Both formats share two productions, `CONFIG_X=value` and
//! `# CONFIG_X is not set`. Defconfig fragments may additionally carry a
//! trailing `# nocheck[:][ reason]` annotation, and treat `CONFIG_X=n` as
//! unsetting the option.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigValue {
    /// Empty means "not set".
    pub value: String,
    pub source: PathBuf,
    /// `Some` only for defconfig entries annotated with `# nocheck`.
    pub nocheck_reason: Option<String>,
}

impl ConfigValue {
    pub fn new(value: impl Into<String>, source: impl Into<PathBuf>) -> Self {
        Self {
            value: value.into(),
            source: source.into(),
            nocheck_reason: None,
        }
    }

    pub fn with_nocheck(
        value: impl Into<String>,
        source: impl Into<PathBuf>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            value: value.into(),
            source: source.into(),
            nocheck_reason: Some(reason.into()),
        }
    }

    /// The value an option has when a file does not mention it.
    pub fn unset(source: impl Into<PathBuf>) -> Self {
        Self::new("", source)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// Resolved `.config` written by the kernel build.
    DotConfig,
    /// Source-controlled defconfig or defconfig fragment.
    Defconfig,
}

/// Key to value mapping of a single parsed file.
///
/// Iterates in first-insertion order. Inserting an existing key replaces its
/// value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedConfig {
    entries: Vec<(String, ConfigValue)>,
    index: HashMap<String, usize>,
}

impl ParsedConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    pub fn insert(&mut self, key: String, value: ConfigValue) {
        match self.index.get(&key) {
            Some(&i) => self.entries[i].1 = value,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
            }
        }
    }

    /// Merges `other` into `self`; values from `other` win.
    pub fn update(&mut self, other: ParsedConfig) {
        for (key, value) in other.entries {
            self.insert(key, value);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConfigValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_entries(self) -> Vec<(String, ConfigValue)> {
        self.entries
    }
}

impl FromIterator<(String, ConfigValue)> for ParsedConfig {
    fn from_iter<I: IntoIterator<Item = (String, ConfigValue)>>(iter: I) -> Self {
        let mut out = ParsedConfig::new();
        for (k, v) in iter {
            out.insert(k, v);
        }
        out
    }
}

struct Grammar {
    set_value: Regex,
    unset: Regex,
}

fn grammar(format: ConfigFormat) -> &'static Grammar {
    static DOT_CONFIG: OnceLock<Grammar> = OnceLock::new();
    static DEFCONFIG: OnceLock<Grammar> = OnceLock::new();

    match format {
        ConfigFormat::DotConfig => DOT_CONFIG.get_or_init(|| Grammar {
            set_value: compile(r"^(?P<key>CONFIG_\w*)=(?P<value>.*)"),
            unset: compile(r"^# (?P<key>CONFIG_\w*) is not set$"),
        }),
        ConfigFormat::Defconfig => DEFCONFIG.get_or_init(|| {
            let nocheck = r"(?P<nocheck>\s*# nocheck:?\s*(?P<reason>.*))?";
            Grammar {
                set_value: compile(&format!(
                    r"^(?P<key>CONFIG_\w*)=(?P<value>.*?){nocheck}$"
                )),
                unset: compile(&format!(r"^# (?P<key>CONFIG_\w*) is not set{nocheck}$")),
            }
        }),
    }
}

fn compile(pattern: &str) -> Regex {
    // Patterns are literals in this file.
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid config grammar '{pattern}': {e}"))
}

/// Parses the config file at `path`.
pub fn parse_config(path: &Path, format: ConfigFormat) -> Result<ParsedConfig> {
    let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    let parsed = parse_config_str(&text, path, format)?;
    tracing::debug!(
        path = %path.display(),
        format = ?format,
        entries = parsed.len(),
        "parsed config"
    );
    Ok(parsed)
}

/// Parses config text, attributing every value to `source`.
pub fn parse_config_str(text: &str, source: &Path, format: ConfigFormat) -> Result<ParsedConfig> {
    let grammar = grammar(format);
    let mut ret = ParsedConfig::new();

    for raw in text.lines() {
        let line = raw.trim_end();

        if let Some(caps) = grammar.set_value.captures(line) {
            let key = caps["key"].to_string();
            let reason = caps.name("reason").map(|m| m.as_str().trim().to_string());
            let mut value = caps.name("value").map_or("", |m| m.as_str());
            // In a defconfig, CONFIG_X=n means unsetting it.
            if format == ConfigFormat::Defconfig && value == "n" {
                value = "";
            }
            ret.insert(
                key,
                ConfigValue {
                    value: unquote(value).to_string(),
                    source: source.to_path_buf(),
                    nocheck_reason: reason,
                },
            );
            continue;
        }

        if let Some(caps) = grammar.unset.captures(line) {
            let reason = caps.name("reason").map(|m| m.as_str().trim().to_string());
            ret.insert(
                caps["key"].to_string(),
                ConfigValue {
                    value: String::new(),
                    source: source.to_path_buf(),
                    nocheck_reason: reason,
                },
            );
            continue;
        }

        if line.trim_start().starts_with('#') || line.trim().is_empty() {
            continue;
        }

        return Err(Error::Parse {
            path: source.to_path_buf(),
            line: line.to_string(),
        });
    }

    Ok(ret)
}

/// Strips one pair of surrounding double quotes.
///
/// This is naive and does not match how kconfig handles escapes; a value with
/// embedded quotes is returned with them untouched.
pub fn unquote(s: &str) -> &str {
    if s.starts_with('"') && s.ends_with('"') {
        if s.len() == 1 {
            return "";
        }
        return &s[1..s.len() - 1];
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str, format: ConfigFormat) -> Vec<(String, ConfigValue)> {
        parse_config_str(text, Path::new("defconfig"), format)
            .expect("parse")
            .into_entries()
    }

    fn v(value: &str) -> ConfigValue {
        ConfigValue::new(value, "defconfig")
    }

    fn nc(value: &str, reason: &str) -> ConfigValue {
        ConfigValue::with_nocheck(value, "defconfig", reason)
    }

    fn kv(key: &str, value: ConfigValue) -> (String, ConfigValue) {
        (key.to_string(), value)
    }

    #[test]
    fn parses_dot_config() {
        let got = parse(
            r#"CONFIG_A=y
CONFIG_B="hello world"
CONFIG_C=m
# CONFIG_D is not set
CONFIG_E=""
# Blank lines are okay

"#,
            ConfigFormat::DotConfig,
        );
        assert_eq!(
            got,
            vec![
                kv("CONFIG_A", v("y")),
                kv("CONFIG_B", v("hello world")),
                kv("CONFIG_C", v("m")),
                kv("CONFIG_D", v("")),
                kv("CONFIG_E", v("")),
            ]
        );
    }

    #[test]
    fn parses_defconfig() {
        let got = parse(
            r#"CONFIG_A=y
CONFIG_B=hello world
CONFIG_C=m
# CONFIG_D is not set
CONFIG_E=y # nocheck: this is a test
CONFIG_F=n
CONFIG_G="quoted string"
CONFIG_H=""
CONFIG_I=
CONFIG_J= # nocheck: empty string with comment
CONFIG_K="n"
# Blank lines are okay

"#,
            ConfigFormat::Defconfig,
        );
        assert_eq!(
            got,
            vec![
                kv("CONFIG_A", v("y")),
                kv("CONFIG_B", v("hello world")),
                kv("CONFIG_C", v("m")),
                kv("CONFIG_D", v("")),
                kv("CONFIG_E", nc("y", "this is a test")),
                kv("CONFIG_F", v("")),
                kv("CONFIG_G", v("quoted string")),
                kv("CONFIG_H", v("")),
                kv("CONFIG_I", v("")),
                kv("CONFIG_J", nc("", "empty string with comment")),
                kv("CONFIG_K", v("n")),
            ]
        );
    }

    #[test]
    fn nocheck_reason_variants() {
        let got = parse(
            "CONFIG_A=y # nocheck\nCONFIG_B=y # nocheck:\nCONFIG_C=y # nocheck: with reason\n",
            ConfigFormat::Defconfig,
        );
        assert_eq!(
            got,
            vec![
                kv("CONFIG_A", nc("y", "")),
                kv("CONFIG_B", nc("y", "")),
                kv("CONFIG_C", nc("y", "with reason")),
            ]
        );
    }

    #[test]
    fn nocheck_without_space_after_colon() {
        let got = parse(
            "# CONFIG_A is not set # nocheck:tracked elsewhere  \n",
            ConfigFormat::Defconfig,
        );
        assert_eq!(got, vec![kv("CONFIG_A", nc("", "tracked elsewhere"))]);
    }

    #[test]
    fn dot_config_ignores_nocheck_annotations() {
        let got = parse("CONFIG_A=y # nocheck\n", ConfigFormat::DotConfig);
        assert_eq!(got, vec![kv("CONFIG_A", v("y # nocheck"))]);

        let parsed = parse_config_str(
            "# CONFIG_A is not set # nocheck\n",
            Path::new(".config"),
            ConfigFormat::DotConfig,
        )
        .expect("comment line");
        // Only a plain comment in a .config, not an unset option.
        assert!(parsed.is_empty());
    }

    #[test]
    fn n_is_unset_only_in_defconfig() {
        assert_eq!(
            parse("CONFIG_X=n\n", ConfigFormat::Defconfig),
            parse("# CONFIG_X is not set\n", ConfigFormat::Defconfig)
        );
        assert_eq!(
            parse("CONFIG_X=n\n", ConfigFormat::DotConfig),
            vec![kv("CONFIG_X", v("n"))]
        );
    }

    #[test]
    fn last_occurrence_wins_in_place() {
        let got = parse("CONFIG_A=y\nCONFIG_B=m\nCONFIG_A=m\n", ConfigFormat::DotConfig);
        assert_eq!(got, vec![kv("CONFIG_A", v("m")), kv("CONFIG_B", v("m"))]);
    }

    #[test]
    fn crlf_and_trailing_whitespace_are_stripped() {
        let got = parse("CONFIG_A=y  \r\n# CONFIG_B is not set\r\n", ConfigFormat::DotConfig);
        assert_eq!(got, vec![kv("CONFIG_A", v("y")), kv("CONFIG_B", v(""))]);
    }

    #[test]
    fn bad_line_fails_in_both_formats() {
        for format in [ConfigFormat::DotConfig, ConfigFormat::Defconfig] {
            let err = parse_config_str("bad line\n", Path::new("frag"), format)
                .expect_err("must fail");
            match &err {
                Error::Parse { path, line } => {
                    assert_eq!(path, Path::new("frag"));
                    assert_eq!(line, "bad line");
                }
                other => panic!("unexpected error: {other}"),
            }
            assert_eq!(err.to_string(), "Unexpected line in frag: bad line");
        }
    }

    #[test]
    fn indented_comments_are_ignored() {
        assert!(parse("   # just a note\n\t\n", ConfigFormat::Defconfig).is_empty());
    }

    #[test]
    fn unquote_is_naive() {
        assert_eq!(unquote(r#""a""#), "a");
        assert_eq!(unquote(r#""a"b""#), r#"a"b"#);
        assert_eq!(unquote(r#""a"#), r#""a"#);
        assert_eq!(unquote(r#""""#), "");
        assert_eq!(unquote(r#"""#), "");
        assert_eq!(unquote("plain"), "plain");
    }

    #[test]
    fn update_overwrites_in_place_and_appends_new_keys() {
        let mut base: ParsedConfig = [
            ("CONFIG_A".to_string(), v("y")),
            ("CONFIG_B".to_string(), v("y")),
        ]
        .into_iter()
        .collect();
        let overlay: ParsedConfig = [
            ("CONFIG_C".to_string(), v("m")),
            ("CONFIG_A".to_string(), v("")),
        ]
        .into_iter()
        .collect();
        base.update(overlay);
        assert_eq!(
            base.into_entries(),
            vec![
                kv("CONFIG_A", v("")),
                kv("CONFIG_B", v("y")),
                kv("CONFIG_C", v("m")),
            ]
        );
    }

    #[test]
    fn parse_config_reads_files_and_reports_missing_ones() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("gki_defconfig");
        fs::write(&path, "CONFIG_A=y\n").expect("write defconfig");

        let parsed = parse_config(&path, ConfigFormat::Defconfig).expect("parse");
        assert_eq!(parsed.get("CONFIG_A"), Some(&ConfigValue::new("y", &path)));

        let missing = tmp.path().join("missing");
        let err = parse_config(&missing, ConfigFormat::Defconfig).expect_err("must fail");
        assert!(matches!(err, Error::Io { .. }), "unexpected err: {err}");
    }
}
