//! Checks that a `.config` has every CONFIG_ listed in a defconfig and its
//! fragments.

use std::collections::HashSet;
use std::path::PathBuf;

use crate::error::Result;
use crate::parse::{ConfigFormat, ConfigValue, ParsedConfig, parse_config};

/// Merged defconfig expectations. Keys may repeat when post fragments
/// disagree; every entry is checked.
pub type MergedDefconfig = Vec<(String, ConfigValue)>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub key: String,
    pub expected: ConfigValue,
    pub actual: ConfigValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl Mismatch {
    /// Report block for this mismatch, including the trailing blank line.
    pub fn render(&self, severity: Severity) -> String {
        let label = match severity {
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
        };
        let mut out = format!(
            "{label}: {}: actual '{}', expected '{}' from {}\n",
            self.key,
            self.actual.value,
            self.expected.value,
            self.expected.source.display()
        );
        if severity == Severity::Warning {
            out.push_str(&format!(
                "    (ignore reason: {})\n",
                self.expected.nocheck_reason.as_deref().unwrap_or_default()
            ));
        }
        out.push('\n');
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckReport {
    pub errors: Vec<Mismatch>,
    pub warnings: Vec<Mismatch>,
}

impl CheckReport {
    pub fn passed(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for m in &self.errors {
            out.push_str(&m.render(Severity::Error));
        }
        for m in &self.warnings {
            out.push_str(&m.render(Severity::Warning));
        }
        out
    }
}

#[derive(Debug, Clone, Default)]
pub struct CheckInputs {
    pub dot_config: PathBuf,
    pub defconfig: Option<PathBuf>,
    pub pre_defconfig_fragments: Vec<PathBuf>,
    pub post_defconfig_fragments: Vec<PathBuf>,
}

impl CheckInputs {
    pub fn new(dot_config: impl Into<PathBuf>) -> Self {
        Self {
            dot_config: dot_config.into(),
            ..Self::default()
        }
    }
}

/// Kernel config checker.
#[derive(Debug)]
pub struct CheckConfig {
    inputs: CheckInputs,
    actual: ParsedConfig,
    expected: MergedDefconfig,
}

impl CheckConfig {
    /// Parses the `.config` and merges all defconfig layers.
    pub fn new(inputs: CheckInputs) -> Result<Self> {
        let actual = parse_config(&inputs.dot_config, ConfigFormat::DotConfig)?;
        let expected = merge_defconfig(&inputs)?;
        Ok(Self {
            inputs,
            actual,
            expected,
        })
    }

    pub fn expected(&self) -> &MergedDefconfig {
        &self.expected
    }

    /// Compares every merged expectation against the `.config`.
    pub fn check(&self) -> CheckReport {
        let mut report = CheckReport::default();
        let missing = ConfigValue::unset(&self.inputs.dot_config);

        for (key, expected) in &self.expected {
            let actual = self.actual.get(key).unwrap_or(&missing);
            if actual.value == expected.value {
                continue;
            }
            let mismatch = Mismatch {
                key: key.clone(),
                expected: expected.clone(),
                actual: actual.clone(),
            };
            if expected.nocheck_reason.is_some() {
                report.warnings.push(mismatch);
            } else {
                report.errors.push(mismatch);
            }
        }

        tracing::info!(
            dot_config = %self.inputs.dot_config.display(),
            checked = self.expected.len(),
            errors = report.errors.len(),
            warnings = report.warnings.len(),
            "config check finished"
        );
        report
    }

    /// Runs the check and prints errors, then warnings, to stderr.
    ///
    /// Returns true if there are no errors.
    pub fn run(&self) -> bool {
        let report = self.check();
        eprint!("{}", report.render());
        report.passed()
    }
}

/// Merges a defconfig with its pre and post fragments.
///
/// Pre overrides defconfig, and later pre fragments override earlier ones.
/// Post overrides pre and defconfig. Post fragments do not override each
/// other: all of their entries are kept so conflicting requirements are all
/// checked.
pub fn merge_defconfig(inputs: &CheckInputs) -> Result<MergedDefconfig> {
    let mut defconfig_and_pre = ParsedConfig::new();
    if let Some(defconfig) = &inputs.defconfig {
        defconfig_and_pre.update(parse_config(defconfig, ConfigFormat::Defconfig)?);
    }
    for path in &inputs.pre_defconfig_fragments {
        defconfig_and_pre.update(parse_config(path, ConfigFormat::Defconfig)?);
    }

    let mut merged_post = MergedDefconfig::new();
    for path in &inputs.post_defconfig_fragments {
        merged_post.extend(parse_config(path, ConfigFormat::Defconfig)?.into_entries());
    }

    Ok(merge_layers(defconfig_and_pre, merged_post))
}

/// Drops every defconfig/pre entry whose key also appears in a post fragment,
/// then appends the post entries as-is.
pub fn merge_layers(
    defconfig_and_pre: ParsedConfig,
    merged_post: MergedDefconfig,
) -> MergedDefconfig {
    let post_keys: HashSet<&str> = merged_post.iter().map(|(k, _)| k.as_str()).collect();

    let pre_len = defconfig_and_pre.len();
    let mut ret: MergedDefconfig = defconfig_and_pre
        .into_entries()
        .into_iter()
        .filter(|(k, _)| !post_keys.contains(k.as_str()))
        .collect();
    tracing::debug!(
        defconfig_and_pre = pre_len,
        overridden_by_post = pre_len - ret.len(),
        post = merged_post.len(),
        "merged defconfig layers"
    );

    ret.extend(merged_post);
    ret
}
