//! Parse formula files (TOML and JSON) and resolve formula paths.

use std::path::{Path, PathBuf};

use crate::types::{Formula, FormulaError};

const SUFFIXES: [&str; 4] = [".formula.toml", ".formula.json", ".toml", ".json"];

pub fn parse_toml(content: &str) -> Result<Formula, FormulaError> {
    toml::from_str(content).map_err(|e| FormulaError::Parse(e.to_string()))
}

pub fn parse_json(content: &str) -> Result<Formula, FormulaError> {
    serde_json::from_str(content).map_err(|e| FormulaError::Parse(e.to_string()))
}

/// Load a formula from a file path (auto-detect TOML vs JSON by extension).
pub fn load_formula(path: &Path) -> Result<Formula, FormulaError> {
    let content = std::fs::read_to_string(path)?;
    let mut formula = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => parse_toml(&content)?,
        Some("json") => parse_json(&content)?,
        _ => parse_json(&content).or_else(|_| parse_toml(&content))?,
    };
    formula.source = path.display().to_string();
    Ok(formula)
}

/// Search for a formula by name.
///
/// Search order: the name as a path (absolute or relative to `cwd`), then
/// `cwd`, `.beads/formulas/` under `cwd` and `~/.beads/formulas/`, each with
/// the standard suffixes.
pub fn find_formula(name: &str, cwd: &Path) -> Result<PathBuf, FormulaError> {
    let exact = Path::new(name);
    if exact.is_absolute() && exact.is_file() {
        return Ok(exact.to_path_buf());
    }
    let relative = cwd.join(name);
    if relative.is_file() {
        return Ok(relative);
    }

    let mut dirs = vec![cwd.to_path_buf(), cwd.join(".beads").join("formulas")];
    if let Some(home) = home_dir() {
        dirs.push(home.join(".beads").join("formulas"));
    }

    for dir in &dirs {
        for suffix in SUFFIXES {
            let candidate = dir.join(format!("{name}{suffix}"));
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
    }

    Err(FormulaError::NotFound {
        name: name.to_string(),
        searched: dirs.iter().map(|d| d.display().to_string()).collect(),
    })
}

/// Resolve `name` with [`find_formula`] and load it.
pub fn load_named(name: &str, cwd: &Path) -> Result<Formula, FormulaError> {
    load_formula(&find_formula(name, cwd)?)
}

fn home_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE").ok().map(PathBuf::from)
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME").ok().map(PathBuf::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_json_minimal() {
        let json = r#"{"formula": "test", "steps": [{"id": "a", "title": "Do A"}]}"#;
        let f = parse_json(json).unwrap();
        assert_eq!(f.formula, "test");
        assert_eq!(f.steps.len(), 1);
        assert_eq!(f.steps[0].r#type, "task");
        assert_eq!(f.steps[0].priority, 2);
        assert!(f.steps[0].children.is_empty());
    }

    #[test]
    fn parse_toml_nested_with_vars() {
        let toml_str = r#"
formula = "mol-feature"
description = "Feature workflow"
version = 1

[vars.component]
description = "Component name"
required = true

[[steps]]
id = "design"
title = "Design {{component}}"

[[steps]]
id = "build"
title = "Build"
type = "epic"
needs = ["design"]

[[steps.children]]
id = "implement"
title = "Implement {{component}}"

[[steps.children]]
id = "review"
title = "Review"
waits_for = ["implement"]
"#;
        let f = parse_toml(toml_str).unwrap();
        assert!(f.vars["component"].required);
        assert_eq!(f.steps.len(), 2);
        assert_eq!(f.steps[1].children.len(), 2);
        assert_eq!(f.steps[1].children[1].waits_for, vec!["implement"]);
    }

    #[test]
    fn parse_json_with_gate() {
        let json = r#"{
            "formula": "release",
            "steps": [
                {"id": "tests", "title": "Run tests",
                 "gate": {"type": "gh:run", "id": "ci.yml", "timeout": "30m"}}
            ]
        }"#;
        let f = parse_json(json).unwrap();
        assert_eq!(f.steps[0].gate.as_ref().unwrap().r#type, "gh:run");
    }

    #[test]
    fn invalid_toml_is_parse_error() {
        assert!(matches!(parse_toml("formula = "), Err(FormulaError::Parse(_))));
    }

    #[test]
    fn find_in_beads_formulas_dir() {
        let dir = tempfile::tempdir().unwrap();
        let formulas = dir.path().join(".beads").join("formulas");
        std::fs::create_dir_all(&formulas).unwrap();
        std::fs::write(
            formulas.join("ship.formula.toml"),
            "formula = \"ship\"\n[[steps]]\nid = \"a\"\ntitle = \"A\"\n",
        )
        .unwrap();

        let f = load_named("ship", dir.path()).unwrap();
        assert_eq!(f.formula, "ship");
        assert!(f.source.ends_with("ship.formula.toml"));

        let err = find_formula("nope", dir.path()).unwrap_err();
        assert!(matches!(err, FormulaError::NotFound { .. }));
    }
}
