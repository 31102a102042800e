use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CANONICAL_REFERENCE: &str = "github:luochen1990/Nix-FHS";
pub const DEFAULT_LOCAL_SCHEME: &str = "path";
pub const DEFAULT_MANIFEST: &str = "flake.nix";
pub const DEFAULT_TOOL_PROGRAM: &str = "nix";
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub paths: PathsConfig,
    pub reference: ReferenceConfig,
    pub tool: ToolConfig,
    pub discovery: DiscoveryConfig,
    pub ui: UiConfig,
    pub logs: LogsConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PathsConfig {
    pub project_root: PathBuf,
    pub templates_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReferenceConfig {
    pub canonical: String,
    pub local_scheme: String,
    pub manifest: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolConfig {
    pub program: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryConfig {
    pub exclude: Vec<String>,
    pub jobs: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct UiConfig {
    pub color: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

impl Default for EffectiveConfig {
    fn default() -> Self {
        Self {
            paths: PathsConfig {
                project_root: PathBuf::from("."),
                templates_dir: PathBuf::from("templates"),
            },
            reference: ReferenceConfig {
                canonical: DEFAULT_CANONICAL_REFERENCE.to_string(),
                local_scheme: DEFAULT_LOCAL_SCHEME.to_string(),
                manifest: DEFAULT_MANIFEST.to_string(),
            },
            tool: ToolConfig {
                program: DEFAULT_TOOL_PROGRAM.to_string(),
                timeout_secs: DEFAULT_TOOL_TIMEOUT_SECS,
            },
            discovery: DiscoveryConfig {
                exclude: vec![],
                jobs: 1,
            },
            ui: UiConfig { color: true },
            logs: LogsConfig { dir: None },
            config_path: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    paths: Option<RawPathsConfig>,
    reference: Option<RawReferenceConfig>,
    tool: Option<RawToolConfig>,
    discovery: Option<RawDiscoveryConfig>,
    ui: Option<RawUiConfig>,
    logs: Option<RawLogsConfig>,
}

#[derive(Debug, Deserialize)]
struct RawPathsConfig {
    project_root: Option<PathBuf>,
    templates_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct RawReferenceConfig {
    canonical: Option<String>,
    local_scheme: Option<String>,
    manifest: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawToolConfig {
    program: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawDiscoveryConfig {
    exclude: Option<Vec<String>>,
    jobs: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RawUiConfig {
    color: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct RawLogsConfig {
    dir: Option<PathBuf>,
}

pub fn default_config_path(home_dir: &Path) -> PathBuf {
    home_dir.join(".config/template-check/config.toml")
}

pub fn load(config_path: Option<&Path>, home_dir: Option<&Path>) -> Result<EffectiveConfig> {
    let mut cfg = EffectiveConfig::default();

    let path = config_path
        .map(ToOwned::to_owned)
        .or_else(|| home_dir.map(default_config_path));

    if let Some(path) = path {
        if config_path.is_some() && !path.exists() {
            return Err(anyhow::anyhow!(
                "config file not found: {}",
                path.display()
            ));
        }
        if path.exists() {
            let s = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config file: {}", path.display()))?;
            let raw: RawConfig = toml::from_str(&s)
                .with_context(|| format!("failed to parse config file (TOML): {}", path.display()))?;
            apply_raw_config(&mut cfg, raw);
            cfg.config_path = Some(path.display().to_string());
        }
    }

    apply_env_overrides(&mut cfg)?;
    validate(&cfg)?;

    Ok(cfg)
}

fn apply_raw_config(cfg: &mut EffectiveConfig, raw: RawConfig) {
    if let Some(paths) = raw.paths {
        if let Some(project_root) = paths.project_root {
            cfg.paths.project_root = project_root;
        }
        if let Some(templates_dir) = paths.templates_dir {
            cfg.paths.templates_dir = templates_dir;
        }
    }

    if let Some(reference) = raw.reference {
        if let Some(canonical) = reference.canonical {
            cfg.reference.canonical = canonical;
        }
        if let Some(local_scheme) = reference.local_scheme {
            cfg.reference.local_scheme = local_scheme;
        }
        if let Some(manifest) = reference.manifest {
            cfg.reference.manifest = manifest;
        }
    }

    if let Some(tool) = raw.tool {
        if let Some(program) = tool.program {
            cfg.tool.program = program;
        }
        if let Some(timeout_secs) = tool.timeout_secs {
            cfg.tool.timeout_secs = timeout_secs;
        }
    }

    if let Some(discovery) = raw.discovery {
        if let Some(exclude) = discovery.exclude {
            cfg.discovery.exclude = exclude;
        }
        if let Some(jobs) = discovery.jobs {
            cfg.discovery.jobs = jobs;
        }
    }

    if let Some(ui) = raw.ui {
        if let Some(color) = ui.color {
            cfg.ui.color = color;
        }
    }

    if let Some(logs) = raw.logs {
        if let Some(dir) = logs.dir {
            cfg.logs.dir = Some(dir);
        }
    }
}

fn apply_env_overrides(cfg: &mut EffectiveConfig) -> Result<()> {
    if let Some(v) = non_empty_env("TEMPLATE_CHECK_PROJECT_ROOT") {
        cfg.paths.project_root = PathBuf::from(v);
    }
    if let Some(v) = non_empty_env("TEMPLATE_CHECK_TEMPLATES_DIR") {
        cfg.paths.templates_dir = PathBuf::from(v);
    }
    if let Some(v) = non_empty_env("TEMPLATE_CHECK_CANONICAL_REFERENCE") {
        cfg.reference.canonical = v;
    }
    if let Some(v) = non_empty_env("TEMPLATE_CHECK_TOOL_PROGRAM") {
        cfg.tool.program = v;
    }
    if let Ok(v) = std::env::var("TEMPLATE_CHECK_TOOL_TIMEOUT_SECS") {
        cfg.tool.timeout_secs = v
            .trim()
            .parse::<u64>()
            .with_context(|| "TEMPLATE_CHECK_TOOL_TIMEOUT_SECS")?;
    }
    if let Ok(v) = std::env::var("TEMPLATE_CHECK_EXCLUDE") {
        let parts: Vec<String> = v
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect();
        if !parts.is_empty() {
            cfg.discovery.exclude = parts;
        }
    }
    if let Ok(v) = std::env::var("TEMPLATE_CHECK_JOBS") {
        cfg.discovery.jobs = v
            .trim()
            .parse::<usize>()
            .with_context(|| "TEMPLATE_CHECK_JOBS")?;
    }
    if let Ok(v) = std::env::var("TEMPLATE_CHECK_UI_COLOR") {
        cfg.ui.color = parse_bool(&v).with_context(|| "TEMPLATE_CHECK_UI_COLOR")?;
    }
    if let Some(v) = non_empty_env("TEMPLATE_CHECK_LOG_DIR") {
        cfg.logs.dir = Some(PathBuf::from(v));
    }

    Ok(())
}

fn validate(cfg: &EffectiveConfig) -> Result<()> {
    if cfg.reference.canonical.trim().is_empty() {
        return Err(anyhow::anyhow!("reference.canonical must not be empty"));
    }
    if cfg.reference.local_scheme.trim().is_empty() || cfg.reference.local_scheme.contains(':') {
        return Err(anyhow::anyhow!(
            "reference.local_scheme must be a bare scheme name (e.g. `path`): {:?}",
            cfg.reference.local_scheme
        ));
    }
    let manifest = Path::new(&cfg.reference.manifest);
    if manifest.components().count() != 1 || manifest.file_name().is_none() {
        return Err(anyhow::anyhow!(
            "reference.manifest must be a plain file name: {:?}",
            cfg.reference.manifest
        ));
    }
    if cfg.tool.timeout_secs == 0 {
        return Err(anyhow::anyhow!("tool.timeout_secs must be greater than 0"));
    }
    if cfg.discovery.jobs == 0 {
        return Err(anyhow::anyhow!("discovery.jobs must be at least 1"));
    }
    Ok(())
}

fn non_empty_env(key: &str) -> Option<String> {
    let v = std::env::var(key).ok()?;
    let v = v.trim();
    if v.is_empty() {
        None
    } else {
        Some(v.to_string())
    }
}

fn parse_bool(s: &str) -> Result<bool> {
    let s = s.trim().to_ascii_lowercase();
    match s.as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow::anyhow!(
            "invalid boolean: {s} (expected true|false|1|0|yes|no|on|off)"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_config_overrides_only_present_fields() {
        let mut cfg = EffectiveConfig::default();
        let raw: RawConfig = toml::from_str(
            r#"
[tool]
timeout_secs = 30

[discovery]
exclude = ["wip-*"]
"#,
        )
        .expect("parse");
        apply_raw_config(&mut cfg, raw);
        assert_eq!(cfg.tool.timeout_secs, 30);
        assert_eq!(cfg.tool.program, DEFAULT_TOOL_PROGRAM);
        assert_eq!(cfg.discovery.exclude, vec!["wip-*".to_string()]);
        assert_eq!(cfg.reference.canonical, DEFAULT_CANONICAL_REFERENCE);
    }

    #[test]
    fn unknown_section_is_rejected() {
        assert!(toml::from_str::<RawConfig>("[nope]\nx = 1\n").is_err());
    }

    #[test]
    fn validate_rejects_nested_manifest_and_zero_jobs() {
        let mut cfg = EffectiveConfig::default();
        cfg.reference.manifest = "nested/flake.nix".to_string();
        assert!(validate(&cfg).is_err());

        let mut cfg = EffectiveConfig::default();
        cfg.discovery.jobs = 0;
        assert!(validate(&cfg).is_err());

        assert!(validate(&EffectiveConfig::default()).is_ok());
    }

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert!(parse_bool(" Yes ").expect("yes"));
        assert!(!parse_bool("off").expect("off"));
        assert!(parse_bool("maybe").is_err());
    }
}
