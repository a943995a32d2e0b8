use clap::{ArgGroup, CommandFactory, Parser, ValueEnum, error::ErrorKind};
use pkg_constants::network::{DEFAULT_SERVER, ENV_SERVER, ENV_TOKEN};
use pkg_constants::paths::{DEFAULT_CONFIG, DEFAULT_VALIDATION_REPORT};
use pkg_constants::provision::{DEFAULT_PREFIX, DEFAULT_SUFFIX};
use pkg_gateway::SecretRef;
use pkg_provision::{BatchOptions, ProvisionSettings, UserSource, WorkspaceTemplate};
use pkg_types::config::WorkshopConfigFile;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "workshopctl",
    version,
    about = "Provision per-user workshop environments on a shared cluster"
)]
#[command(group(
    ArgGroup::new("mode")
        .required(true)
        .args(["provision", "cleanup", "setup_prerequisites", "validate", "generate_urls"])
))]
#[command(group(
    ArgGroup::new("source").args(["count", "users_file", "users_list", "use_existing"])
))]
pub struct Cli {
    /// Create credentials, namespaces and workspaces
    #[arg(long)]
    pub provision: bool,

    /// Delete user namespaces and everything in them
    #[arg(long)]
    pub cleanup: bool,

    /// Prepare the cluster for a first batch
    #[arg(long)]
    pub setup_prerequisites: bool,

    /// Run read-only checks and write a report
    #[arg(long)]
    pub validate: bool,

    /// Print access summaries without changing anything
    #[arg(long)]
    pub generate_urls: bool,

    /// Number of numbered users ({prefix}1..{prefix}N)
    #[arg(long)]
    pub count: Option<u32>,

    /// File with one username per line
    #[arg(long)]
    pub users_file: Option<PathBuf>,

    /// Comma-separated usernames
    #[arg(long, value_delimiter = ',')]
    pub users_list: Option<Vec<String>>,

    /// Every existing user matching the prefix
    #[arg(long)]
    pub use_existing: bool,

    /// Username prefix
    #[arg(long)]
    pub prefix: Option<String>,

    /// Password for every user of the batch
    #[arg(long)]
    pub password: Option<String>,

    /// Namespace suffix ({user}-{suffix})
    #[arg(long)]
    pub suffix: Option<String>,

    /// Detect and print planned actions without changing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Skip the cleanup confirmation
    #[arg(long)]
    pub force: bool,

    /// Leave fully provisioned users untouched
    #[arg(long)]
    pub incremental: bool,

    /// Users provisioned in parallel
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Cluster API endpoint
    #[arg(long)]
    pub server: Option<String>,

    /// Bearer token for the cluster API
    #[arg(long)]
    pub token: Option<String>,

    /// Accept invalid TLS certificates
    #[arg(long)]
    pub insecure: bool,

    /// Path to YAML config file
    #[arg(long, short, default_value = DEFAULT_CONFIG)]
    pub config: String,

    /// Also write access summaries here (.json for JSON)
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Validation report path
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Probe the database, broker and tool services during validation
    #[arg(long)]
    pub probe: bool,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// What one invocation does, with exactly the inputs that mode needs.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Provision {
        source: UserSource,
        password: String,
        options: BatchOptions,
    },
    Cleanup {
        source: UserSource,
        options: BatchOptions,
    },
    Setup {
        dry_run: bool,
    },
    Validate {
        source: UserSource,
        report: PathBuf,
        probe: bool,
    },
    GenerateUrls {
        source: UserSource,
        output: Option<PathBuf>,
    },
}

impl Cli {
    /// Checks clap's groups cannot express; failures render like clap's own.
    pub fn resolve(&self) -> Result<Command, clap::Error> {
        let source = self.source();
        let needs_source = || {
            source.clone().ok_or_else(|| {
                usage_error(
                    ErrorKind::MissingRequiredArgument,
                    "one of --count, --users-file, --users-list or --use-existing is required",
                )
            })
        };
        let only_for = |flag: bool, name: &str, mode: &str| {
            if flag {
                Err(usage_error(
                    ErrorKind::ArgumentConflict,
                    &format!("{} only applies to {}", name, mode),
                ))
            } else {
                Ok(())
            }
        };

        only_for(!self.provision && self.password.is_some(), "--password", "--provision")?;
        only_for(!self.provision && self.incremental, "--incremental", "--provision")?;
        only_for(!self.cleanup && self.force, "--force", "--cleanup")?;
        only_for(
            (self.validate || self.generate_urls) && self.dry_run,
            "--dry-run",
            "--provision, --cleanup and --setup-prerequisites",
        )?;
        only_for(
            !(self.provision || self.generate_urls) && self.output.is_some(),
            "--output",
            "--provision and --generate-urls",
        )?;
        only_for(!self.validate && self.report.is_some(), "--report", "--validate")?;
        only_for(!self.validate && self.probe, "--probe", "--validate")?;
        only_for(
            self.setup_prerequisites && self.concurrency.is_some(),
            "--concurrency",
            "batch modes",
        )?;

        if self.provision {
            let password = self.password.clone().ok_or_else(|| {
                usage_error(
                    ErrorKind::MissingRequiredArgument,
                    "--provision requires --password",
                )
            })?;
            return Ok(Command::Provision {
                source: needs_source()?,
                password,
                options: self.options(),
            });
        }
        if self.cleanup {
            return Ok(Command::Cleanup {
                source: needs_source()?,
                options: self.options(),
            });
        }
        if self.setup_prerequisites {
            if source.is_some() {
                return Err(usage_error(
                    ErrorKind::ArgumentConflict,
                    "--setup-prerequisites does not take a user source",
                ));
            }
            return Ok(Command::Setup {
                dry_run: self.dry_run,
            });
        }
        if self.validate {
            return Ok(Command::Validate {
                source: needs_source()?,
                report: self
                    .report
                    .clone()
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_VALIDATION_REPORT)),
                probe: self.probe,
            });
        }
        Ok(Command::GenerateUrls {
            source: needs_source()?,
            output: self.output.clone(),
        })
    }

    fn source(&self) -> Option<UserSource> {
        if let Some(n) = self.count {
            Some(UserSource::Count(n))
        } else if let Some(path) = &self.users_file {
            Some(UserSource::File(path.clone()))
        } else if let Some(list) = &self.users_list {
            Some(UserSource::List(list.clone()))
        } else if self.use_existing {
            Some(UserSource::Existing)
        } else {
            None
        }
    }

    fn options(&self) -> BatchOptions {
        BatchOptions {
            dry_run: self.dry_run,
            force: self.force,
            incremental: self.incremental,
        }
    }

    /// Merge: CLI args > environment > config file > defaults.
    pub fn endpoint(&self, file: &WorkshopConfigFile) -> (String, Option<String>) {
        let server = self
            .server
            .clone()
            .or_else(|| std::env::var(ENV_SERVER).ok())
            .or_else(|| file.server.clone())
            .unwrap_or_else(|| DEFAULT_SERVER.to_string());
        let token = self
            .token
            .clone()
            .or_else(|| std::env::var(ENV_TOKEN).ok())
            .or_else(|| file.token.clone());
        (server, token)
    }

    /// Merge: CLI args > config file > defaults.
    pub fn settings(&self, file: &WorkshopConfigFile) -> pkg_provision::Result<ProvisionSettings> {
        let prefix = self
            .prefix
            .clone()
            .or_else(|| file.prefix.clone())
            .unwrap_or_else(|| DEFAULT_PREFIX.to_string());
        let suffix = self
            .suffix
            .clone()
            .or_else(|| file.suffix.clone())
            .unwrap_or_else(|| DEFAULT_SUFFIX.to_string());

        let defaults = WorkspaceTemplate::default();
        let template = WorkspaceTemplate {
            repository: file.repository.clone().unwrap_or(defaults.repository),
            descriptor_path: file
                .descriptor_path
                .clone()
                .unwrap_or(defaults.descriptor_path),
            tool_image: file.tool_image.clone().unwrap_or(defaults.tool_image),
            db_image: file.db_image.clone().unwrap_or(defaults.db_image),
            broker_image: file.broker_image.clone().unwrap_or(defaults.broker_image),
        };

        let mut settings = ProvisionSettings::new(&prefix, &suffix, &template)?;
        if let Some(ns) = &file.credential_namespace {
            settings.credential_store = SecretRef::new(ns, &settings.credential_store.name);
        }
        if let Some(quota) = &file.quota {
            settings.quota = quota.clone();
        }
        if let Some(url) = &file.console_url {
            settings.console_url = url.clone();
        }
        if let Some(secs) = file.ready_interval_secs {
            settings.readiness.interval = Duration::from_secs(secs);
        }
        if let Some(attempts) = file.ready_max_attempts {
            settings.readiness.max_attempts = attempts;
        }
        if let Some(n) = self.concurrency.or(file.concurrency) {
            settings.concurrency = n;
        }
        settings.validate()?;
        Ok(settings)
    }
}

fn usage_error(kind: ErrorKind, msg: &str) -> clap::Error {
    Cli::command().error(kind, msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkg_types::quantity::Memory;

    fn parse(args: &[&str]) -> Result<Command, clap::Error> {
        let mut argv = vec!["workshopctl"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv)?.resolve()
    }

    #[test]
    fn provision_with_count() {
        let cmd = parse(&["--provision", "--count", "3", "--password", "p1"]).unwrap();
        assert_eq!(
            cmd,
            Command::Provision {
                source: UserSource::Count(3),
                password: "p1".to_string(),
                options: BatchOptions::default(),
            }
        );
    }

    #[test]
    fn users_list_is_split() {
        let cmd = parse(&["--cleanup", "--users-list", "u1,u3", "--force"]).unwrap();
        let Command::Cleanup { source, options } = cmd else {
            panic!("expected cleanup");
        };
        assert_eq!(source, UserSource::List(vec!["u1".into(), "u3".into()]));
        assert!(options.force);
    }

    #[test]
    fn modes_are_exclusive() {
        let err = parse(&["--provision", "--cleanup", "--count", "1"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentConflict);
        let err = parse(&["--count", "1"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn sources_are_exclusive() {
        let err = parse(&["--validate", "--count", "1", "--use-existing"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentConflict);
    }

    #[test]
    fn mode_specific_requirements() {
        assert_eq!(
            parse(&["--provision", "--count", "1"]).unwrap_err().kind(),
            ErrorKind::MissingRequiredArgument
        );
        assert_eq!(
            parse(&["--validate"]).unwrap_err().kind(),
            ErrorKind::MissingRequiredArgument
        );
        assert_eq!(
            parse(&["--cleanup", "--count", "1", "--incremental"])
                .unwrap_err()
                .kind(),
            ErrorKind::ArgumentConflict
        );
        assert_eq!(
            parse(&["--setup-prerequisites", "--count", "2"])
                .unwrap_err()
                .kind(),
            ErrorKind::ArgumentConflict
        );
        assert_eq!(
            parse(&["--setup-prerequisites", "--dry-run"]).unwrap(),
            Command::Setup { dry_run: true }
        );
    }

    #[test]
    fn flags_outside_their_mode_are_rejected() {
        let misplaced: &[&[&str]] = &[
            &["--cleanup", "--count", "1", "--password", "p1"],
            &["--validate", "--count", "1", "--password", "p1"],
            &["--generate-urls", "--count", "1", "--password", "p1"],
            &["--cleanup", "--count", "1", "--output", "urls.json"],
            &["--validate", "--count", "1", "--output", "urls.json"],
            &["--provision", "--count", "1", "--password", "p1", "--report", "r.json"],
            &["--generate-urls", "--count", "1", "--report", "r.json"],
            &["--cleanup", "--count", "1", "--probe"],
            &["--provision", "--count", "1", "--password", "p1", "--probe"],
            &["--setup-prerequisites", "--concurrency", "4"],
            &["--provision", "--count", "1", "--password", "p1", "--force"],
            &["--validate", "--count", "1", "--dry-run"],
        ];
        for args in misplaced {
            assert_eq!(
                parse(args).unwrap_err().kind(),
                ErrorKind::ArgumentConflict,
                "{:?}",
                args
            );
        }

        let Command::GenerateUrls { output, .. } =
            parse(&["--generate-urls", "--count", "1", "--output", "urls.json"]).unwrap()
        else {
            panic!("expected generate-urls");
        };
        assert_eq!(output, Some(PathBuf::from("urls.json")));
        assert!(
            parse(&["--provision", "--count", "1", "--password", "p1", "--output", "u.txt"]).is_ok()
        );
        assert!(parse(&["--cleanup", "--count", "1", "--concurrency", "4"]).is_ok());
        assert!(parse(&["--validate", "--count", "1", "--report", "r.json"]).is_ok());
    }

    #[test]
    fn validate_defaults_report_path() {
        let Command::Validate { report, probe, .. } =
            parse(&["--validate", "--use-existing", "--probe"]).unwrap()
        else {
            panic!("expected validate");
        };
        assert_eq!(report, PathBuf::from(DEFAULT_VALIDATION_REPORT));
        assert!(probe);
    }

    #[test]
    fn help_is_not_a_usage_error() {
        let err = Cli::try_parse_from(["workshopctl", "--help"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        assert!(!err.use_stderr());
    }

    #[test]
    fn cli_beats_file_beats_default() {
        let cli = Cli::try_parse_from([
            "workshopctl",
            "--generate-urls",
            "--count",
            "1",
            "--suffix",
            "lab",
            "--concurrency",
            "4",
        ])
        .unwrap();
        let file = WorkshopConfigFile {
            prefix: Some("attendee".to_string()),
            suffix: Some("ignored".to_string()),
            concurrency: Some(2),
            server: Some("https://api.example:6443".to_string()),
            quota: Some(pkg_types::quota::Quota {
                memory_limit: Memory::gibibytes(32),
                ..Default::default()
            }),
            ..Default::default()
        };
        let settings = cli.settings(&file).unwrap();
        assert_eq!(settings.prefix, "attendee");
        assert_eq!(settings.suffix, "lab");
        assert_eq!(settings.concurrency, 4);
        assert_eq!(settings.quota.memory_limit, Memory::gibibytes(32));

        let defaults = Cli::try_parse_from(["workshopctl", "--validate", "--count", "1"])
            .unwrap()
            .settings(&WorkshopConfigFile::default())
            .unwrap();
        assert_eq!(defaults.prefix, DEFAULT_PREFIX);
        assert_eq!(defaults.concurrency, 1);
    }

    #[test]
    fn out_of_range_concurrency_is_rejected() {
        let cli = Cli::try_parse_from([
            "workshopctl",
            "--provision",
            "--count",
            "1",
            "--password",
            "p",
            "--concurrency",
            "64",
        ])
        .unwrap();
        let err = cli.settings(&WorkshopConfigFile::default()).unwrap_err();
        assert_eq!(err.category(), "usage");
    }
}
