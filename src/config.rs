use crate::errors::{DeployError, DeployResult};
use anyhow::{Context, Result};
use clap::Parser;
use std::{env, fmt, path::PathBuf};

pub const DEFAULT_ROOT: &str = "public";
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Centralized deploy configuration.
/// Combines environment variables and CLI arguments.
#[derive(Clone)]
pub struct AppConfig {
    pub access_key_id: String,
    pub access_key_secret: String,
    pub security_token: Option<String>,
    pub bucket: String,
    pub endpoint: String,
    pub cname: bool,
    pub root: PathBuf,
    pub dry_run: bool,
    pub max_depth: usize,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Publish a local directory tree to an OSS bucket")]
pub struct Args {
    /// Local directory to publish (overrides OSS_DEPLOY_ROOT)
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Service endpoint (overrides OSS_ENDPOINT)
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Target bucket (overrides OSS_BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,

    /// Walk the tree and report what would be uploaded without touching the bucket
    #[arg(long)]
    pub dry_run: bool,

    /// Refuse to descend deeper than this many directory levels
    #[arg(long)]
    pub max_depth: Option<usize>,
}

impl AppConfig {
    /// Parse CLI args and the process environment into an AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        let args = Args::parse();
        Self::from_parts(args, |name| env::var(name).ok()).context("loading deploy configuration")
    }

    /// Merge parsed args over values produced by `lookup`.
    ///
    /// Empty environment values count as unset.
    pub fn from_parts<F>(args: Args, lookup: F) -> DeployResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &'static str| lookup(name).filter(|v| !v.trim().is_empty());
        let required = |name: &'static str| var(name).ok_or(DeployError::MissingConfig(name));

        let access_key_id = required("OSS_ACCESS_KEY_ID")?;
        let access_key_secret = required("OSS_ACCESS_KEY_SECRET")?;
        let bucket = match args.bucket {
            Some(bucket) => bucket,
            None => required("OSS_BUCKET")?,
        };
        let endpoint = match args.endpoint {
            Some(endpoint) => endpoint,
            None => required("OSS_ENDPOINT")?,
        };
        let cname = var("OSS_CNAME")
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);
        let root = args
            .root
            .or_else(|| var("OSS_DEPLOY_ROOT").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ROOT));

        Ok(Self {
            access_key_id,
            access_key_secret,
            security_token: var("OSS_SECURITY_TOKEN"),
            bucket,
            endpoint,
            cname,
            root,
            dry_run: args.dry_run,
            max_depth: args.max_depth.unwrap_or(DEFAULT_MAX_DEPTH),
        })
    }
}

// Credentials never reach the logs.
impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("access_key_id", &self.access_key_id)
            .field("access_key_secret", &"***")
            .field("security_token", &self.security_token.as_ref().map(|_| "***"))
            .field("bucket", &self.bucket)
            .field("endpoint", &self.endpoint)
            .field("cname", &self.cname)
            .field("root", &self.root)
            .field("dry_run", &self.dry_run)
            .field("max_depth", &self.max_depth)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    const FULL: &[(&str, &str)] = &[
        ("OSS_ACCESS_KEY_ID", "id"),
        ("OSS_ACCESS_KEY_SECRET", "secret"),
        ("OSS_BUCKET", "site"),
        ("OSS_ENDPOINT", "oss-cn-hangzhou.aliyuncs.com"),
    ];

    #[test]
    fn reads_required_variables_with_defaults() {
        let cfg = AppConfig::from_parts(Args::default(), env_of(FULL)).unwrap();
        assert_eq!(cfg.access_key_id, "id");
        assert_eq!(cfg.access_key_secret, "secret");
        assert_eq!(cfg.bucket, "site");
        assert_eq!(cfg.endpoint, "oss-cn-hangzhou.aliyuncs.com");
        assert_eq!(cfg.root, PathBuf::from("public"));
        assert_eq!(cfg.max_depth, DEFAULT_MAX_DEPTH);
        assert!(cfg.security_token.is_none());
        assert!(!cfg.cname);
        assert!(!cfg.dry_run);
    }

    #[test]
    fn missing_variable_is_named() {
        let err = AppConfig::from_parts(Args::default(), env_of(&FULL[..2])).unwrap_err();
        assert!(matches!(err, DeployError::MissingConfig("OSS_BUCKET")));
        assert_eq!(err.to_string(), "environment variable `OSS_BUCKET` is not set");
    }

    #[test]
    fn blank_variable_counts_as_missing() {
        let mut pairs = FULL.to_vec();
        pairs[0] = ("OSS_ACCESS_KEY_ID", "  ");
        let err = AppConfig::from_parts(Args::default(), env_of(&pairs)).unwrap_err();
        assert!(matches!(err, DeployError::MissingConfig("OSS_ACCESS_KEY_ID")));
    }

    #[test]
    fn args_override_environment() {
        let mut pairs = FULL.to_vec();
        pairs.push(("OSS_DEPLOY_ROOT", "dist"));
        let args = Args {
            root: Some(PathBuf::from("site/out")),
            endpoint: Some("https://oss-cn-beijing.aliyuncs.com".into()),
            bucket: Some("other".into()),
            dry_run: true,
            max_depth: Some(3),
        };
        let cfg = AppConfig::from_parts(args, env_of(&pairs)).unwrap();
        assert_eq!(cfg.root, PathBuf::from("site/out"));
        assert_eq!(cfg.endpoint, "https://oss-cn-beijing.aliyuncs.com");
        assert_eq!(cfg.bucket, "other");
        assert!(cfg.dry_run);
        assert_eq!(cfg.max_depth, 3);
    }

    #[test]
    fn optional_variables() {
        let mut pairs = FULL.to_vec();
        pairs.push(("OSS_SECURITY_TOKEN", "sts"));
        pairs.push(("OSS_CNAME", "True"));
        pairs.push(("OSS_DEPLOY_ROOT", "dist"));
        let cfg = AppConfig::from_parts(Args::default(), env_of(&pairs)).unwrap();
        assert_eq!(cfg.security_token.as_deref(), Some("sts"));
        assert!(cfg.cname);
        assert_eq!(cfg.root, PathBuf::from("dist"));
    }

    #[test]
    fn debug_output_hides_secrets() {
        let mut pairs = FULL.to_vec();
        pairs.push(("OSS_SECURITY_TOKEN", "sts-token"));
        let cfg = AppConfig::from_parts(Args::default(), env_of(&pairs)).unwrap();
        let rendered = format!("{:?}", cfg);
        assert!(!rendered.contains("\"secret\""));
        assert!(!rendered.contains("sts-token"));
        assert!(rendered.contains("site"));
    }
}
