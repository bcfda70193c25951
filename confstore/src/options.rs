use std::io::IsTerminal as _;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{ColorChoice, Parser, ValueEnum};
use confstore_storage::BackendConfig;

#[derive(Parser, Debug, Clone)]
pub struct Options {
    #[arg(short, long, global = true, default_value = "false")]
    pub verbose: bool,

    #[arg(long, global = true, default_value_t = ColorChoice::Auto)]
    pub color: ColorChoice,

    /// JSON file selecting the storage backend; overrides the backend flags
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// The storage backend to use
    #[arg(long, global = true, value_enum)]
    pub backend: Option<BackendKind>,

    /// Root directory of the filesystem or history backend
    #[arg(long, global = true, value_name = "DIR")]
    pub path: Option<PathBuf>,

    /// Bucket of the object-store backend
    #[arg(long, global = true)]
    pub bucket: Option<String>,

    /// Directory holding the buckets of the object-store backend
    #[arg(long, global = true, value_name = "DIR")]
    pub endpoint: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Filesystem,
    History,
    ObjectStore,
}

impl Options {
    /// Whether log output on stderr gets ANSI colors.
    pub fn color_enabled(&self) -> bool {
        match self.color {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => std::io::stderr().is_terminal(),
        }
    }

    /// The backend selected by `--config`, or else by the backend flags.
    pub fn backend_config(&self) -> Result<BackendConfig> {
        if let Some(file) = &self.config {
            let text = std::fs::read_to_string(file)
                .with_context(|| format!("failed to read config file {}", file.display()))?;
            return serde_json::from_str(&text)
                .with_context(|| format!("failed to parse config file {}", file.display()));
        }
        let Some(kind) = self.backend else {
            bail!("no storage backend configured; pass --config FILE or --backend");
        };
        Ok(match kind {
            BackendKind::Filesystem => BackendConfig::Filesystem {
                path: self.required_path()?,
            },
            BackendKind::History => BackendConfig::History {
                path: self.required_path()?,
            },
            BackendKind::ObjectStore => BackendConfig::ObjectStore {
                bucket: self
                    .bucket
                    .clone()
                    .context("--backend object-store requires --bucket")?,
                endpoint: self
                    .endpoint
                    .clone()
                    .context("--backend object-store requires --endpoint")?,
            },
        })
    }

    fn required_path(&self) -> Result<PathBuf> {
        self.path
            .clone()
            .context("--backend filesystem and --backend history require --path")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Options {
        #[derive(Parser)]
        struct Wrapper {
            #[command(flatten)]
            options: Options,
        }
        Wrapper::try_parse_from(std::iter::once("confstore").chain(args.iter().copied()))
            .unwrap()
            .options
    }

    #[test]
    fn test_backend_from_flags() {
        assert_eq!(
            parse(&["--backend", "history", "--path", "/srv/repo"])
                .backend_config()
                .unwrap(),
            BackendConfig::History {
                path: PathBuf::from("/srv/repo")
            }
        );
        assert_eq!(
            parse(&[
                "--backend",
                "object-store",
                "--bucket",
                "configs",
                "--endpoint",
                "/srv/objects"
            ])
            .backend_config()
            .unwrap(),
            BackendConfig::ObjectStore {
                bucket: "configs".to_string(),
                endpoint: PathBuf::from("/srv/objects")
            }
        );
    }

    #[test]
    fn test_backend_flags_incomplete() {
        assert!(parse(&[]).backend_config().is_err());
        assert!(parse(&["--backend", "filesystem"]).backend_config().is_err());
        assert!(parse(&["--backend", "object-store", "--bucket", "b"])
            .backend_config()
            .is_err());
    }

    #[test]
    fn test_config_file_wins() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("confstore.json");
        std::fs::write(&file, r#"{"backend":"filesystem","path":"/srv/fs"}"#).unwrap();
        let options = parse(&[
            "--config",
            file.to_str().unwrap(),
            "--backend",
            "history",
            "--path",
            "/elsewhere",
        ]);
        assert_eq!(
            options.backend_config().unwrap(),
            BackendConfig::Filesystem {
                path: PathBuf::from("/srv/fs")
            }
        );
    }

    #[test]
    fn test_config_file_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("confstore.json");
        std::fs::write(&file, r#"{"backend":"ftp"}"#).unwrap();
        let options = parse(&["--config", file.to_str().unwrap()]);
        let err = options.backend_config().unwrap_err();
        assert!(format!("{:#}", err).contains("failed to parse config file"));
    }
}
