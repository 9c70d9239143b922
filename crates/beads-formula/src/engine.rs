//! Cook formulas: variable substitution, condition evaluation, step
//! flattening and validation.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use tracing::debug;

use crate::types::{CookedStep, Formula, FormulaError, Step};

/// Finds every well-formed `{{name}}` placeholder in `text`.
///
/// Yields `(start, end, name)` with `end` exclusive. Names are
/// `[A-Za-z_][A-Za-z0-9_]*`; anything else between braces is left alone.
fn placeholders(text: &str) -> Vec<(usize, usize, &str)> {
    let mut found = Vec::new();
    let mut from = 0;
    while let Some(offset) = text[from..].find("{{") {
        let open = from + offset;
        let name_start = open + 2;
        let name_len = text[name_start..]
            .char_indices()
            .find(|&(i, c)| !(c == '_' || c.is_ascii_alphabetic() || (i > 0 && c.is_ascii_digit())))
            .map_or(text.len() - name_start, |(i, _)| i);
        let name_end = name_start + name_len;
        if name_len > 0 && text[name_end..].starts_with("}}") {
            found.push((open, name_end + 2, &text[name_start..name_end]));
            from = name_end + 2;
        } else {
            from = open + 1;
        }
    }
    found
}

/// Substitute `{{variable}}` patterns in a string with provided values.
/// Unresolved variables are left as-is.
pub fn substitute_vars(text: &str, vars: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for (start, end, name) in placeholders(text) {
        out.push_str(&text[last..start]);
        match vars.get(name) {
            Some(value) => out.push_str(value),
            None => out.push_str(&text[start..end]),
        }
        last = end;
    }
    out.push_str(&text[last..]);
    out
}

/// Fails on the first required variable that was not provided.
pub fn validate_vars(
    formula: &Formula,
    provided: &HashMap<String, String>,
) -> Result<(), FormulaError> {
    let mut missing: Vec<&String> = formula
        .vars
        .iter()
        .filter(|(name, def)| def.required && !provided.contains_key(*name))
        .map(|(name, _)| name)
        .collect();
    missing.sort();
    match missing.first() {
        Some(name) => Err(FormulaError::MissingVariable((*name).clone())),
        None => Ok(()),
    }
}

/// Defaults overlaid with provided values.
pub fn resolve_vars(
    formula: &Formula,
    provided: &HashMap<String, String>,
) -> HashMap<String, String> {
    let mut vars: HashMap<String, String> = formula
        .vars
        .iter()
        .filter_map(|(name, def)| def.default.clone().map(|d| (name.clone(), d)))
        .collect();
    vars.extend(provided.iter().map(|(k, v)| (k.clone(), v.clone())));
    vars
}

/// Evaluate a simple condition string against variables.
///
/// Supported formats:
/// - `"{{var}}"` -- truthy (non-empty and not "false"/"0")
/// - `"!{{var}}"` -- negated truthy
/// - `"{{var}} == value"` -- equality
/// - `"{{var}} != value"` -- inequality
pub fn evaluate_condition(condition: &str, vars: &HashMap<String, String>) -> bool {
    let cond = condition.trim();
    if cond.is_empty() {
        return true;
    }

    if let Some((lhs, rhs)) = cond.split_once("!=") {
        return substitute_vars(lhs.trim(), vars) != rhs.trim();
    }
    if let Some((lhs, rhs)) = cond.split_once("==") {
        return substitute_vars(lhs.trim(), vars) == rhs.trim();
    }

    let (negated, expr) = match cond.strip_prefix('!') {
        Some(rest) => (true, rest.trim()),
        None => (false, cond),
    };
    let value = substitute_vars(expr, vars);
    let truthy = !matches!(value.as_str(), "" | "false" | "0");
    truthy != negated
}

struct Flattened<'a> {
    step: &'a Step,
    parent: Option<&'a str>,
}

/// Depth-first, declaration order. Steps whose condition fails are
/// dropped along with their whole subtree; `all_ids` still records them.
fn flatten<'a>(
    steps: &'a [Step],
    parent: Option<&'a str>,
    included: bool,
    vars: &HashMap<String, String>,
    all_ids: &mut HashSet<&'a str>,
    out: &mut Vec<Flattened<'a>>,
) -> Result<(), FormulaError> {
    for step in steps {
        if !all_ids.insert(step.id.as_str()) {
            return Err(FormulaError::DuplicateStep(step.id.clone()));
        }
        let keep = included
            && step
                .condition
                .as_deref()
                .is_none_or(|c| evaluate_condition(c, vars));
        if keep {
            out.push(Flattened { step, parent });
        }
        flatten(&step.children, Some(step.id.as_str()), keep, vars, all_ids, out)?;
    }
    Ok(())
}

/// Kahn's algorithm over needs + waits_for. Returns the steps left over
/// when no further progress can be made.
fn check_acyclic(steps: &[CookedStep]) -> Result<(), FormulaError> {
    let mut pending: HashMap<&str, usize> = HashMap::new();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for step in steps {
        let deps: BTreeSet<&str> = step
            .needs
            .iter()
            .chain(&step.waits_for)
            .map(String::as_str)
            .collect();
        pending.insert(&step.id, deps.len());
        for dep in deps {
            dependents.entry(dep).or_default().push(&step.id);
        }
    }

    let mut queue: VecDeque<&str> = pending
        .iter()
        .filter(|(_, n)| **n == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut resolved = 0;
    while let Some(id) = queue.pop_front() {
        resolved += 1;
        for dependent in dependents.get(id).into_iter().flatten() {
            if let Some(n) = pending.get_mut(dependent) {
                *n -= 1;
                if *n == 0 {
                    queue.push_back(*dependent);
                }
            }
        }
    }

    if resolved == steps.len() {
        return Ok(());
    }
    let mut stuck: Vec<String> = pending
        .into_iter()
        .filter(|(_, n)| *n > 0)
        .map(|(id, _)| id.to_owned())
        .collect();
    stuck.sort();
    Err(FormulaError::CycleDetected(stuck))
}

/// Cook a formula: validate variables, evaluate conditions, substitute,
/// flatten nested steps and validate step references.
///
/// References to steps that exist but were excluded by a condition are
/// dropped; references to steps that do not exist at all are an error.
pub fn cook(
    formula: &Formula,
    provided: &HashMap<String, String>,
) -> Result<Vec<CookedStep>, FormulaError> {
    validate_vars(formula, provided)?;
    let vars = resolve_vars(formula, provided);

    let mut all_ids = HashSet::new();
    all_ids.insert(formula.formula.as_str());
    let mut flat = Vec::new();
    flatten(&formula.steps, None, true, &vars, &mut all_ids, &mut flat)?;

    let included: HashSet<&str> = flat.iter().map(|f| f.step.id.as_str()).collect();
    let keep_refs = |refs: &[String]| -> Result<Vec<String>, FormulaError> {
        let mut kept = Vec::new();
        for r in refs {
            if !all_ids.contains(r.as_str()) || r == &formula.formula {
                return Err(FormulaError::StepNotFound(r.clone()));
            }
            if included.contains(r.as_str()) {
                kept.push(r.clone());
            }
        }
        Ok(kept)
    };

    let mut cooked = Vec::with_capacity(flat.len());
    for Flattened { step, parent } in &flat {
        cooked.push(CookedStep {
            id: step.id.clone(),
            parent: parent.map(str::to_owned),
            title: substitute_vars(&step.title, &vars),
            description: substitute_vars(&step.description, &vars),
            issue_type: step.r#type.clone(),
            priority: step.priority,
            needs: keep_refs(&step.needs)?,
            waits_for: keep_refs(&step.waits_for)?,
            gate: step.gate.clone(),
            assignee: step.assignee.as_ref().map(|a| substitute_vars(a, &vars)),
            labels: step.labels.clone(),
        });
    }

    check_acyclic(&cooked)?;
    debug!(
        formula = %formula.formula,
        declared = all_ids.len() - 1,
        cooked = cooked.len(),
        "cooked formula"
    );
    Ok(cooked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{StepGate, VarDef};
    use pretty_assertions::assert_eq;

    fn make_vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn formula(steps: Vec<Step>) -> Formula {
        Formula {
            formula: "wf".into(),
            description: String::new(),
            version: 1,
            vars: HashMap::new(),
            steps,
            source: String::new(),
        }
    }

    fn ids(steps: &[CookedStep]) -> Vec<&str> {
        steps.iter().map(|s| s.id.as_str()).collect()
    }

    #[test]
    fn substitute_simple_and_missing() {
        let vars = make_vars(&[("name", "auth")]);
        assert_eq!(substitute_vars("Fix {{name}} now", &vars), "Fix auth now");
        assert_eq!(substitute_vars("{{other}} {{name}}", &vars), "{{other}} auth");
        assert_eq!(substitute_vars("plain", &vars), "plain");
    }

    #[test]
    fn substitute_ignores_malformed() {
        let vars = make_vars(&[("a", "X"), ("a1", "Y")]);
        assert_eq!(substitute_vars("{{1a}} {{a1}} {{a", &vars), "{{1a}} Y {{a");
        assert_eq!(substitute_vars("{{{a}}", &vars), "{X");
    }

    #[test]
    fn conditions() {
        let vars = make_vars(&[("type", "feature"), ("flag", "0"), ("on", "yes")]);
        assert!(evaluate_condition("{{type}} == feature", &vars));
        assert!(!evaluate_condition("{{type}} != feature", &vars));
        assert!(evaluate_condition("{{on}}", &vars));
        assert!(!evaluate_condition("{{flag}}", &vars));
        assert!(evaluate_condition("!{{flag}}", &vars));
        assert!(evaluate_condition("  ", &vars));
    }

    #[test]
    fn cook_flattens_nested_steps_with_parents() {
        let mut build = Step::new("build", "Build");
        build.r#type = "epic".into();
        build.children = vec![Step::new("compile", "Compile"), Step::new("link", "Link")];
        build.children[1].needs = vec!["compile".into()];
        let cooked = cook(&formula(vec![Step::new("design", "Design"), build]), &HashMap::new())
            .unwrap();

        assert_eq!(ids(&cooked), vec!["design", "build", "compile", "link"]);
        assert_eq!(cooked[0].parent, None);
        assert_eq!(cooked[2].parent.as_deref(), Some("build"));
        assert_eq!(cooked[3].needs, vec!["compile"]);
    }

    #[test]
    fn failed_condition_drops_subtree_and_references() {
        let mut optional = Step::new("docs", "Docs");
        optional.condition = Some("{{with_docs}}".into());
        optional.children.push(Step::new("proofread", "Proofread"));
        let mut ship = Step::new("ship", "Ship");
        ship.needs = vec!["docs".into(), "proofread".into()];

        let f = formula(vec![optional, ship]);
        let cooked = cook(&f, &make_vars(&[("with_docs", "false")])).unwrap();
        assert_eq!(ids(&cooked), vec!["ship"]);
        assert!(cooked[0].needs.is_empty());

        let cooked = cook(&f, &make_vars(&[("with_docs", "true")])).unwrap();
        assert_eq!(ids(&cooked), vec!["docs", "proofread", "ship"]);
        assert_eq!(cooked[2].needs, vec!["docs", "proofread"]);
    }

    #[test]
    fn cook_substitutes_with_defaults() {
        let mut f = formula(vec![Step::new("a", "Work on {{component}}")]);
        f.vars.insert(
            "component".into(),
            VarDef {
                default: Some("core".into()),
                ..VarDef::default()
            },
        );
        assert_eq!(cook(&f, &HashMap::new()).unwrap()[0].title, "Work on core");
        let cooked = cook(&f, &make_vars(&[("component", "ui")])).unwrap();
        assert_eq!(cooked[0].title, "Work on ui");
    }

    #[test]
    fn cook_missing_required_var() {
        let mut f = formula(vec![Step::new("a", "A")]);
        f.vars.insert(
            "who".into(),
            VarDef {
                required: true,
                ..VarDef::default()
            },
        );
        let err = cook(&f, &HashMap::new()).unwrap_err();
        assert!(matches!(err, FormulaError::MissingVariable(ref v) if v == "who"));
    }

    #[test]
    fn cook_rejects_unknown_and_duplicate_steps() {
        let mut a = Step::new("a", "A");
        a.needs = vec!["ghost".into()];
        let err = cook(&formula(vec![a]), &HashMap::new()).unwrap_err();
        assert!(matches!(err, FormulaError::StepNotFound(ref s) if s == "ghost"));

        let mut parent = Step::new("a", "A");
        parent.children.push(Step::new("a", "A again"));
        let err = cook(&formula(vec![parent]), &HashMap::new()).unwrap_err();
        assert!(matches!(err, FormulaError::DuplicateStep(_)));

        let err = cook(&formula(vec![Step::new("wf", "Clashes with root")]), &HashMap::new())
            .unwrap_err();
        assert!(matches!(err, FormulaError::DuplicateStep(_)));
    }

    #[test]
    fn cook_detects_cycles_across_needs_and_waits() {
        let mut a = Step::new("a", "A");
        a.needs = vec!["b".into()];
        let mut b = Step::new("b", "B");
        b.waits_for = vec!["a".into()];
        let c = Step::new("c", "C");
        let err = cook(&formula(vec![a, b, c]), &HashMap::new()).unwrap_err();
        match err {
            FormulaError::CycleDetected(stuck) => assert_eq!(stuck, vec!["a", "b"]),
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn cook_keeps_gate_definition() {
        let mut deploy = Step::new("deploy", "Deploy");
        deploy.gate = Some(StepGate {
            r#type: "human".into(),
            id: "release-approval".into(),
            timeout: "1h".into(),
        });
        let cooked = cook(&formula(vec![deploy]), &HashMap::new()).unwrap();
        assert_eq!(cooked[0].gate.as_ref().unwrap().id, "release-approval");
    }
}
