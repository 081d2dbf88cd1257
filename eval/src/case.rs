//! Case file parsing and validation.
//!
//! Cases are TOML files pairing a task description with the analysis and
//! plan the conductor is expected to produce. See `eval/cases/` for examples.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use conductor::core::code_refs::CodeRef;
use conductor::core::selector::Preset;
use conductor::core::types::{Complexity, Intent, StageName};

/// A parsed case file: description plus expectations.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CaseFile {
    pub case: CaseMeta,
    #[serde(default)]
    pub expect: Expectations,
}

/// Case metadata: identifier and task description.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CaseMeta {
    /// Unique identifier (slug format: `[a-z0-9_-]+`).
    pub id: String,
    /// Task description fed to the analyzer. May be empty.
    pub description: String,
}

/// What the analyzer and selector should produce. Unset fields are not judged.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Expectations {
    pub intent: Option<Intent>,
    pub complexity: Option<Complexity>,
    pub preset: Option<Preset>,
    /// Stages that run, in execution order.
    pub active_stages: Option<Vec<StageName>>,
    /// Code references in mention order.
    pub code_refs: Option<Vec<CodeRef>>,
}

/// A case file together with the path it was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedCase {
    pub path: PathBuf,
    pub file: CaseFile,
}

impl LoadedCase {
    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self {
            path: path.to_path_buf(),
            file: CaseFile::load(path)?,
        })
    }

    pub fn id(&self) -> &str {
        &self.file.case.id
    }
}

impl Expectations {
    fn is_empty(&self) -> bool {
        self.intent.is_none()
            && self.complexity.is_none()
            && self.preset.is_none()
            && self.active_stages.is_none()
            && self.code_refs.is_none()
    }
}

impl CaseFile {
    /// Load and validate a case file from the given path.
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("read case {}", path.display()))?;
        Self::parse_str(&contents).with_context(|| format!("load case {}", path.display()))
    }

    pub fn parse_str(contents: &str) -> Result<Self> {
        let case: CaseFile = toml::from_str(contents).context("parse case")?;
        case.validate()?;
        Ok(case)
    }

    fn validate(&self) -> Result<()> {
        validate_case_id(&self.case.id)?;
        if self.expect.is_empty() {
            bail!("expect must set at least one expectation");
        }
        if let Some(stages) = &self.expect.active_stages {
            for pair in stages.windows(2) {
                if pair[0] >= pair[1] {
                    bail!("expect.active_stages must follow stage order without repeats");
                }
            }
        }
        if let Some(refs) = &self.expect.code_refs {
            for (index, code_ref) in refs.iter().enumerate() {
                if code_ref.path.trim().is_empty() {
                    bail!("expect.code_refs[{index}].path must be non-empty");
                }
                if let Some(lines) = code_ref.lines
                    && (lines.start == 0 || lines.start > lines.end)
                {
                    bail!("expect.code_refs[{index}].lines must satisfy 1 <= start <= end");
                }
            }
        }
        Ok(())
    }
}

/// Load every `*.toml` case in `dir`, ordered by case id.
///
/// A missing directory yields no cases. Two files declaring the same id is an
/// error. File names need not match ids; each case keeps its own path.
pub fn discover_cases(dir: &Path) -> Result<Vec<LoadedCase>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut by_id: BTreeMap<String, LoadedCase> = BTreeMap::new();
    for entry in fs::read_dir(dir).with_context(|| format!("list {}", dir.display()))? {
        let path = entry.with_context(|| format!("list {}", dir.display()))?.path();
        if path.extension().is_none_or(|ext| ext != "toml") {
            continue;
        }
        let case = LoadedCase::load(&path)?;
        if let Some(first) = by_id.get(case.id()) {
            bail!(
                "case id '{}' declared by both {} and {}",
                case.id(),
                first.path.display(),
                path.display()
            );
        }
        by_id.insert(case.id().to_string(), case);
    }
    Ok(by_id.into_values().collect())
}

/// Path of the case file for `case_id` inside `cases_dir`.
pub fn case_path(cases_dir: &Path, case_id: &str) -> Result<PathBuf> {
    validate_case_id(case_id)?;
    Ok(cases_dir.join(format!("{case_id}.toml")))
}

/// Case ids double as file names, so only `[a-z0-9_-]` is allowed.
fn validate_case_id(id: &str) -> Result<()> {
    let slug_char = |ch: char| matches!(ch, 'a'..='z' | '0'..='9' | '-' | '_');
    match id.chars().find(|ch| !slug_char(*ch)) {
        _ if id.is_empty() => bail!("case.id must be non-empty"),
        Some(ch) => bail!("case.id '{id}' contains '{ch}'; use [a-z0-9_-] only"),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor::core::types::LineRange;

    #[test]
    fn parses_valid_case() {
        let input = r#"
[case]
id = "validate-cleanup"
description = "Validate the cleanup logic"

[expect]
intent = "validate"
preset = "validation"
active_stages = ["enhance", "analyze", "design"]

[[expect.code_refs]]
path = "project_cleanup_agent.py"
lines = { start = 751, end = 878 }
"#;
        let case = CaseFile::parse_str(input).expect("case parses");
        assert_eq!(case.case.id, "validate-cleanup");
        assert_eq!(case.expect.intent, Some(Intent::Validate));
        assert_eq!(case.expect.preset, Some(Preset::Validation));
        assert_eq!(
            case.expect.code_refs,
            Some(vec![CodeRef {
                path: "project_cleanup_agent.py".to_string(),
                lines: Some(LineRange::new(751, 878)),
            }])
        );
    }

    #[test]
    fn rejects_invalid_id() {
        let input = r#"
[case]
id = "bad/id"
description = "do the thing"

[expect]
intent = "build"
"#;
        let err = CaseFile::parse_str(input).expect_err("invalid id");
        assert!(err.to_string().contains("case.id"));
    }

    #[test]
    fn rejects_case_without_expectations() {
        let input = r#"
[case]
id = "empty"
description = "do the thing"
"#;
        let err = CaseFile::parse_str(input).expect_err("no expectations");
        assert!(err.to_string().contains("at least one"));
    }

    #[test]
    fn rejects_out_of_order_stages() {
        let input = r#"
[case]
id = "order"
description = "do the thing"

[expect]
active_stages = ["test", "implement"]
"#;
        let _err = CaseFile::parse_str(input).expect_err("stage order");
    }

    #[test]
    fn rejects_unknown_expectation_keys() {
        let input = r#"
[case]
id = "typo"
description = "do the thing"

[expect]
intnet = "fix"
"#;
        let _err = CaseFile::parse_str(input).expect_err("unknown key");
    }

    #[test]
    fn bundled_cases_parse() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("cases");
        let cases = discover_cases(&dir).expect("bundled cases");
        assert!(cases.iter().any(|case| case.id() == "small-bug-fix"));
    }

    #[test]
    fn discovers_cases_sorted_by_id() {
        let temp = tempfile::tempdir().expect("tempdir");
        for id in ["b-case", "a-case"] {
            fs::write(
                temp.path().join(format!("{id}.toml")),
                format!("[case]\nid = \"{id}\"\ndescription = \"x\"\n[expect]\nintent = \"build\"\n"),
            )
            .expect("write case");
        }
        fs::write(temp.path().join("notes.md"), "ignored").expect("write notes");

        let cases = discover_cases(temp.path()).expect("discover");
        let ids: Vec<&str> = cases.iter().map(LoadedCase::id).collect();
        assert_eq!(ids, vec!["a-case", "b-case"]);
        assert_eq!(cases[0].path, temp.path().join("a-case.toml"));
    }
}
