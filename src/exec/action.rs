// ABOUTME: Action descriptors: one external command plus its success predicate.
// ABOUTME: Handles ${VAR} expansion of arguments against release bindings.

use crate::config::EnvValue;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;

use super::ActionResult;

/// How an action's result is judged successful.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuccessPredicate {
    /// Exit code is one of the listed codes.
    ExitCodes(Vec<i32>),
    /// Exit code is zero and stdout contains the given text.
    StdoutContains(String),
}

impl Default for SuccessPredicate {
    fn default() -> Self {
        SuccessPredicate::ExitCodes(vec![0])
    }
}

impl SuccessPredicate {
    pub fn evaluate(&self, result: &ActionResult) -> bool {
        match self {
            SuccessPredicate::ExitCodes(codes) => result
                .exit_code
                .is_some_and(|code| codes.contains(&code)),
            SuccessPredicate::StdoutContains(needle) => {
                result.exit_code == Some(0) && result.stdout.contains(needle.as_str())
            }
        }
    }
}

/// A single external command descriptor owned by a stage.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Action {
    pub program: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub env: HashMap<String, EnvValue>,

    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    #[serde(default)]
    pub success: SuccessPredicate,
}

impl Action {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: HashMap::new(),
            working_dir: None,
            success: SuccessPredicate::default(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: EnvValue) -> Self {
        self.env.insert(key.into(), value);
        self
    }

    pub fn success(mut self, predicate: SuccessPredicate) -> Self {
        self.success = predicate;
        self
    }

    /// Resolve this action against the release bindings.
    ///
    /// Arguments have `${NAME}` references replaced from `bindings`, and the
    /// action's own env entries are resolved and layered on top of them.
    pub fn render(&self, bindings: &BTreeMap<String, String>) -> Result<RenderedAction> {
        let args = self
            .args
            .iter()
            .map(|arg| expand(arg, bindings))
            .collect::<Result<Vec<_>>>()?;

        let mut env = bindings.clone();
        for (key, value) in &self.env {
            env.insert(key.clone(), value.resolve()?);
        }

        Ok(RenderedAction {
            program: self.program.clone(),
            args,
            env,
            working_dir: self.working_dir.clone(),
        })
    }

    /// Whether this command creates resources without apply semantics, so a
    /// repeated release would fail or duplicate state instead of converging.
    pub fn is_create_only(&self) -> bool {
        let first = self.args.first().map(String::as_str);
        match (program_name(&self.program), first) {
            ("kubectl", Some("create")) => true,
            ("helm", Some("install")) => true,
            ("helm", Some("upgrade")) => !self
                .args
                .iter()
                .any(|a| a == "--install" || a == "-i"),
            _ => false,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// An action with arguments expanded and environment resolved, ready to spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedAction {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub working_dir: Option<PathBuf>,
}

impl RenderedAction {
    /// Command line for logs and reports. Environment values are never shown.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn program_name(program: &str) -> &str {
    program.rsplit('/').next().unwrap_or(program)
}

fn expand(input: &str, bindings: &BTreeMap<String, String>) -> Result<String> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find('}')
            .ok_or_else(|| Error::InvalidConfig(format!("unterminated variable in '{input}'")))?;
        let name = &after[..end];
        let value = bindings
            .get(name)
            .ok_or_else(|| Error::InvalidConfig(format!("unbound variable '{name}' in '{input}'")))?;
        out.push_str(value);
        rest = &after[end + 1..];
    }
    out.push_str(rest);

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn result(code: Option<i32>, stdout: &str) -> ActionResult {
        ActionResult {
            exit_code: code,
            stdout: stdout.to_string(),
            stderr: String::new(),
            duration: Duration::ZERO,
            truncated: false,
        }
    }

    #[test]
    fn default_predicate_accepts_only_zero() {
        let p = SuccessPredicate::default();
        assert!(p.evaluate(&result(Some(0), "")));
        assert!(!p.evaluate(&result(Some(1), "")));
        assert!(!p.evaluate(&result(None, "")));
    }

    #[test]
    fn stdout_predicate_requires_text_and_zero_exit() {
        let p = SuccessPredicate::StdoutContains("STATUS: deployed".to_string());
        assert!(p.evaluate(&result(Some(0), "NAME: demo\nSTATUS: deployed\n")));
        assert!(!p.evaluate(&result(Some(0), "STATUS: failed")));
        assert!(!p.evaluate(&result(Some(1), "STATUS: deployed")));
    }

    #[test]
    fn render_expands_bindings() {
        let mut bindings = BTreeMap::new();
        bindings.insert("RELEASE_NAME".to_string(), "demo".to_string());
        bindings.insert("RELEASE_ARTIFACT".to_string(), "ghcr.io/o/demo:1".to_string());

        let action = Action::new("helm").args([
            "upgrade",
            "--install",
            "${RELEASE_NAME}",
            "./chart",
            "--set",
            "image=${RELEASE_ARTIFACT}",
        ]);
        let rendered = action.render(&bindings).unwrap();
        assert_eq!(rendered.args[2], "demo");
        assert_eq!(rendered.args[5], "image=ghcr.io/o/demo:1");
        assert_eq!(rendered.env.get("RELEASE_NAME").map(String::as_str), Some("demo"));
    }

    #[test]
    fn render_rejects_unbound_variable() {
        let action = Action::new("echo").arg("${NOPE}");
        assert!(action.render(&BTreeMap::new()).is_err());
    }

    #[test]
    fn detects_create_only_commands() {
        assert!(Action::new("kubectl").args(["create", "-f", "m.yaml"]).is_create_only());
        assert!(Action::new("/usr/bin/helm").args(["install", "demo", "."]).is_create_only());
        assert!(Action::new("helm").args(["upgrade", "demo", "."]).is_create_only());
        assert!(!Action::new("helm").args(["upgrade", "--install", "demo", "."]).is_create_only());
        assert!(!Action::new("kubectl").args(["apply", "-f", "m.yaml"]).is_create_only());
        assert!(!Action::new("docker").args(["push", "img"]).is_create_only());
    }
}
