//! Lightweight project context inference from manifest files.

use std::{
    collections::BTreeSet,
    path::Path,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Inferred shape of a project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectContext {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default)]
    pub frameworks: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

impl ProjectContext {
    /// Context with only a name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Relevance keywords: language, frameworks and domain, lowercased and
    /// kept whole.
    ///
    /// The project name is not included.
    #[must_use]
    pub fn keywords(&self) -> BTreeSet<String> {
        self.language
            .iter()
            .chain(self.frameworks.iter())
            .chain(self.domain.iter())
            .map(|part| part.trim().to_lowercase())
            .filter(|part| !part.is_empty())
            .collect()
    }
}

/// Project context detection.
#[async_trait]
pub trait ContextDetector: Send + Sync {
    /// Infer the context of the project at `root`. Never fails; unknown
    /// projects get a context with only a name.
    async fn detect(&self, root: &Path) -> ProjectContext;
}

const WEB_FRAMEWORKS: &[&str] = &[
    "axum", "actix-web", "rocket", "warp", "react", "vue", "svelte", "next", "express", "django",
    "flask", "fastapi", "gin", "echo", "fiber",
];
const CLI_FRAMEWORKS: &[&str] = &["clap", "structopt", "argh", "commander", "yargs", "click", "typer", "cobra"];
const DATA_FRAMEWORKS: &[&str] = &["polars", "arrow", "datafusion", "pandas", "numpy", "scikit-learn", "torch"];

fn known_frameworks() -> impl Iterator<Item = &'static str> {
    WEB_FRAMEWORKS
        .iter()
        .chain(CLI_FRAMEWORKS)
        .chain(DATA_FRAMEWORKS)
        .copied()
}

fn infer_domain(frameworks: &[String]) -> Option<String> {
    let has = |list: &[&str]| frameworks.iter().any(|f| list.contains(&f.as_str()));
    if has(WEB_FRAMEWORKS) {
        Some("web".to_string())
    } else if has(DATA_FRAMEWORKS) {
        Some("data".to_string())
    } else if has(CLI_FRAMEWORKS) {
        Some("cli".to_string())
    } else {
        None
    }
}

fn pick_frameworks<'a>(deps: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let deps: BTreeSet<String> = deps
        .into_iter()
        .map(|d| d.to_lowercase().replace('_', "-"))
        .collect();
    known_frameworks()
        .filter(|f| deps.contains(*f))
        .map(str::to_string)
        .collect()
}

fn project_name(root: &Path) -> String {
    root.file_name()
        .map_or_else(|| "project".to_string(), |n| n.to_string_lossy().into_owned())
}

/// Detector that reads `Cargo.toml`, `package.json`, `pyproject.toml`,
/// `requirements.txt` and `go.mod`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestDetector;

impl ManifestDetector {
    async fn read(root: &Path, file: &str) -> Option<String> {
        tokio::fs::read_to_string(root.join(file)).await.ok()
    }

    fn cargo(content: &str) -> Option<(String, Vec<String>)> {
        let manifest: toml::Table = toml::from_str(content).ok()?;
        let deps = ["dependencies", "dev-dependencies"]
            .iter()
            .filter_map(|k| manifest.get(*k).and_then(toml::Value::as_table))
            .chain(
                manifest
                    .get("workspace")
                    .and_then(|w| w.get("dependencies"))
                    .and_then(toml::Value::as_table),
            )
            .flat_map(|t| t.keys().map(String::as_str))
            .collect::<Vec<_>>();
        Some(("rust".to_string(), pick_frameworks(deps)))
    }

    fn package_json(content: &str, has_tsconfig: bool) -> Option<(String, Vec<String>)> {
        let manifest: serde_json::Value = serde_json::from_str(content).ok()?;
        let deps: Vec<&str> = ["dependencies", "devDependencies"]
            .iter()
            .filter_map(|k| manifest.get(*k).and_then(serde_json::Value::as_object))
            .flat_map(|o| o.keys().map(String::as_str))
            .collect();
        let language = if has_tsconfig || deps.contains(&"typescript") {
            "typescript"
        } else {
            "javascript"
        };
        Some((language.to_string(), pick_frameworks(deps)))
    }

    fn python(content: &str) -> (String, Vec<String>) {
        let names: Vec<String> = content
            .split(|c: char| !(c.is_alphanumeric() || c == '-' || c == '_'))
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
            .collect();
        (
            "python".to_string(),
            pick_frameworks(names.iter().map(String::as_str)),
        )
    }

    fn go(content: &str) -> (String, Vec<String>) {
        let modules = content
            .lines()
            .filter_map(|l| l.split_whitespace().next())
            .filter_map(|m| m.rsplit('/').next());
        ("go".to_string(), pick_frameworks(modules))
    }
}

#[async_trait]
impl ContextDetector for ManifestDetector {
    async fn detect(&self, root: &Path) -> ProjectContext {
        let mut context = ProjectContext::named(project_name(root));

        let detected = if let Some(content) = Self::read(root, "Cargo.toml").await {
            Self::cargo(&content)
        } else if let Some(content) = Self::read(root, "package.json").await {
            let has_tsconfig = tokio::fs::try_exists(root.join("tsconfig.json")).await.unwrap_or(false);
            Self::package_json(&content, has_tsconfig)
        } else if let Some(content) = Self::read(root, "pyproject.toml").await {
            Some(Self::python(&content))
        } else if let Some(content) = Self::read(root, "requirements.txt").await {
            Some(Self::python(&content))
        } else {
            Self::read(root, "go.mod").await.map(|c| Self::go(&c))
        };

        match detected {
            Some((language, frameworks)) => {
                context.domain = infer_domain(&frameworks);
                context.language = Some(language);
                context.frameworks = frameworks;
            }
            None => tracing::debug!(root = %root.display(), "No recognizable manifest"),
        }
        context
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn test_cargo_project() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("Cargo.toml"),
            "[package]\nname = \"svc\"\n\n[dependencies]\naxum = \"0.7\"\ntokio = \"1\"\n",
        )
        .unwrap();

        let context = ManifestDetector.detect(dir.path()).await;
        assert_eq!(context.language.as_deref(), Some("rust"));
        assert_eq!(context.frameworks, vec!["axum"]);
        assert_eq!(context.domain.as_deref(), Some("web"));
        assert!(context.keywords().contains("axum"));
    }

    #[tokio::test]
    async fn test_typescript_package() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("package.json"),
            r#"{"dependencies": {"commander": "^11"}, "devDependencies": {"typescript": "^5"}}"#,
        )
        .unwrap();

        let context = ManifestDetector.detect(dir.path()).await;
        assert_eq!(context.language.as_deref(), Some("typescript"));
        assert_eq!(context.domain.as_deref(), Some("cli"));
    }

    #[tokio::test]
    async fn test_python_requirements() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("requirements.txt"), "pandas==2.1\nnumpy>=1.26\n").unwrap();

        let context = ManifestDetector.detect(dir.path()).await;
        assert_eq!(context.language.as_deref(), Some("python"));
        assert_eq!(context.domain.as_deref(), Some("data"));
    }

    #[tokio::test]
    async fn test_go_module_keeps_short_language_keyword() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("go.mod"), "module example.com/svc\n\ngo 1.22\n").unwrap();

        let context = ManifestDetector.detect(dir.path()).await;
        assert_eq!(context.language.as_deref(), Some("go"));
        assert!(context.frameworks.is_empty());
        assert!(context.keywords().contains("go"));

        std::fs::write(
            dir.path().join("go.mod"),
            "module example.com/svc\n\nrequire (\n\tgithub.com/gin-gonic/gin v1.9.1\n)\n",
        )
        .unwrap();
        let context = ManifestDetector.detect(dir.path()).await;
        let keywords = context.keywords();
        assert!(keywords.contains("go"));
        assert!(keywords.contains("gin"));
        assert!(keywords.contains("web"));
    }

    #[tokio::test]
    async fn test_unknown_or_malformed_falls_back() {
        let dir = TempDir::new().unwrap();
        let context = ManifestDetector.detect(dir.path()).await;
        assert!(context.language.is_none());
        assert!(context.keywords().is_empty());

        std::fs::write(dir.path().join("Cargo.toml"), "not [valid").unwrap();
        let context = ManifestDetector.detect(dir.path()).await;
        assert!(context.language.is_none());
        assert!(!context.name.is_empty());
    }
}
